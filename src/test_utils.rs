//! In-memory fixture builders for tests: ZIP containers, binary XML manifests, certificates and
//! signing blocks.

use flate2::{write::DeflateEncoder, Compression, Crc};
use std::io::Write;

pub(crate) const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

/// Raw-deflates the given bytes.
pub(crate) fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// CRC-32 of the given bytes, as recorded in ZIP headers.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}

struct ZipEntry {
    name: String,
    method: u16,
    payload: Vec<u8>,
    size: u32,
    crc32: u32,
}

/// Builds ZIP containers, optionally with an APK signing block before the central directory.
#[derive(Default)]
pub(crate) struct ZipBuilder {
    entries: Vec<ZipEntry>,
    signing_block: Vec<u8>,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn stored<S: Into<String>>(self, name: S, data: &[u8]) -> Self {
        let size = data.len() as u32;
        self.raw(name, 0, data.to_vec(), size)
    }

    pub(crate) fn deflated<S: Into<String>>(self, name: S, data: &[u8]) -> Self {
        let size = data.len() as u32;
        self.raw(name, 8, deflate(data), size).crc32(crc32(data))
    }

    /// Overrides the CRC-32 recorded for the last added entry.
    pub(crate) fn crc32(mut self, value: u32) -> Self {
        if let Some(entry) = self.entries.last_mut() {
            entry.crc32 = value;
        }
        self
    }

    /// Adds an entry with an arbitrary payload and declared decompressed size.
    ///
    /// The recorded CRC-32 is the one of the payload for stored entries and zero otherwise.
    pub(crate) fn raw<S: Into<String>>(
        mut self,
        name: S,
        method: u16,
        payload: Vec<u8>,
        size: u32,
    ) -> Self {
        let crc32 = if method == 0 { crc32(&payload) } else { 0 };
        self.entries.push(ZipEntry {
            name: name.into(),
            method,
            payload,
            size,
            crc32,
        });
        self
    }

    pub(crate) fn signing_block(mut self, block: Vec<u8>) -> Self {
        self.signing_block = block;
        self
    }

    pub(crate) fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut offsets = Vec::new();

        for entry in &self.entries {
            offsets.push(out.len() as u32);
            put_u32(&mut out, 0x0403_4b50);
            put_u16(&mut out, 20);
            put_u16(&mut out, 0x0800);
            put_u16(&mut out, entry.method);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u32(&mut out, entry.crc32);
            put_u32(&mut out, entry.payload.len() as u32);
            put_u32(&mut out, entry.size);
            put_u16(&mut out, entry.name.len() as u16);
            put_u16(&mut out, 0);
            out.extend_from_slice(entry.name.as_bytes());
            out.extend_from_slice(&entry.payload);
        }

        out.extend_from_slice(&self.signing_block);

        let central_directory_offset = out.len() as u32;
        for (entry, offset) in self.entries.iter().zip(offsets) {
            put_u32(&mut out, 0x0201_4b50);
            put_u16(&mut out, 20);
            put_u16(&mut out, 20);
            put_u16(&mut out, 0x0800);
            put_u16(&mut out, entry.method);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u32(&mut out, entry.crc32);
            put_u32(&mut out, entry.payload.len() as u32);
            put_u32(&mut out, entry.size);
            put_u16(&mut out, entry.name.len() as u16);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u32(&mut out, 0);
            put_u32(&mut out, offset);
            out.extend_from_slice(entry.name.as_bytes());
        }
        let central_directory_size = out.len() as u32 - central_directory_offset;

        put_u32(&mut out, 0x0605_4b50);
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        put_u16(&mut out, self.entries.len() as u16);
        put_u16(&mut out, self.entries.len() as u16);
        put_u32(&mut out, central_directory_size);
        put_u32(&mut out, central_directory_offset);
        put_u16(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);

        out
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Typed attribute value for the binary XML builder.
#[derive(Clone, Copy)]
pub(crate) enum Value<'a> {
    Str(&'a str),
    Int(i32),
    Hex(u32),
    Bool(bool),
    Ref(u32),
    Typed(u8, u32),
}

/// Attribute name, either interned by the builder or an explicit pool index.
#[derive(Clone, Copy)]
pub(crate) enum Name<'a> {
    Str(&'a str),
    Index(u32),
}

#[derive(Clone, Copy)]
pub(crate) struct Attr<'a> {
    pub(crate) android: bool,
    pub(crate) name: Name<'a>,
    pub(crate) value: Value<'a>,
}

/// Attribute in the android namespace.
pub(crate) fn attr<'a>(name: &'a str, value: Value<'a>) -> Attr<'a> {
    Attr {
        android: true,
        name: Name::Str(name),
        value,
    }
}

/// Attribute without namespace.
pub(crate) fn plain_attr<'a>(name: &'a str, value: Value<'a>) -> Attr<'a> {
    Attr {
        android: false,
        name: Name::Str(name),
        value,
    }
}

const NO_ENTRY: u32 = 0xffff_ffff;

/// Builds Android binary XML documents.
pub(crate) struct AxmlBuilder {
    strings: Vec<String>,
    resource_ids: Vec<u32>,
    body: Vec<u8>,
    utf8: bool,
}

impl AxmlBuilder {
    pub(crate) fn new() -> Self {
        Self {
            strings: Vec::new(),
            resource_ids: Vec::new(),
            body: Vec::new(),
            utf8: false,
        }
    }

    /// Uses a UTF-8 string pool instead of UTF-16.
    pub(crate) fn utf8(mut self) -> Self {
        self.utf8 = true;
        self
    }

    /// Adds a resource mapped string. Must be called before anything else is interned.
    pub(crate) fn resource_string(&mut self, name: &str, id: u32) -> u32 {
        assert_eq!(self.strings.len(), self.resource_ids.len());
        self.strings.push(name.to_owned());
        self.resource_ids.push(id);
        (self.strings.len() - 1) as u32
    }

    pub(crate) fn string(&mut self, s: &str) -> u32 {
        if let Some(i) = self
            .strings
            .iter()
            .skip(self.resource_ids.len())
            .position(|e| e == s)
        {
            return (i + self.resource_ids.len()) as u32;
        }
        self.strings.push(s.to_owned());
        (self.strings.len() - 1) as u32
    }

    pub(crate) fn start_namespace(&mut self, prefix: &str, uri: &str) -> &mut Self {
        let prefix = self.string(prefix);
        let uri = self.string(uri);
        self.node(0x0100, &[prefix, uri], &[]);
        self
    }

    pub(crate) fn end_namespace(&mut self, prefix: &str, uri: &str) -> &mut Self {
        let prefix = self.string(prefix);
        let uri = self.string(uri);
        self.node(0x0101, &[prefix, uri], &[]);
        self
    }

    pub(crate) fn start(&mut self, name: &str, attrs: &[Attr<'_>]) -> &mut Self {
        let name = self.string(name);
        let mut encoded = Vec::new();
        for attr in attrs {
            let ns = if attr.android {
                self.string(ANDROID_NS)
            } else {
                NO_ENTRY
            };
            let attr_name = match attr.name {
                Name::Str(s) => self.string(s),
                Name::Index(i) => i,
            };
            let (raw, data_type, data) = match attr.value {
                Value::Str(s) => {
                    let i = self.string(s);
                    (i, 0x03, i)
                }
                Value::Int(i) => (NO_ENTRY, 0x10, i as u32),
                Value::Hex(h) => (NO_ENTRY, 0x11, h),
                Value::Bool(b) => (NO_ENTRY, 0x12, if b { NO_ENTRY } else { 0 }),
                Value::Ref(r) => (NO_ENTRY, 0x01, r),
                Value::Typed(t, d) => (NO_ENTRY, t, d),
            };
            put_u32(&mut encoded, ns);
            put_u32(&mut encoded, attr_name);
            put_u32(&mut encoded, raw);
            put_u16(&mut encoded, 8);
            encoded.push(0);
            encoded.push(data_type);
            put_u32(&mut encoded, data);
        }

        let mut ext = Vec::new();
        put_u32(&mut ext, NO_ENTRY);
        put_u32(&mut ext, name);
        put_u16(&mut ext, 20);
        put_u16(&mut ext, 20);
        put_u16(&mut ext, attrs.len() as u16);
        put_u16(&mut ext, 0);
        put_u16(&mut ext, 0);
        put_u16(&mut ext, 0);
        ext.extend_from_slice(&encoded);

        self.chunk(0x0102, &ext);
        self
    }

    pub(crate) fn end(&mut self, name: &str) -> &mut Self {
        let name = self.string(name);
        self.node(0x0103, &[NO_ENTRY, name], &[]);
        self
    }

    /// Appends an arbitrary chunk to the body.
    pub(crate) fn raw_chunk(&mut self, chunk_type: u16, ext: &[u8]) -> &mut Self {
        self.chunk(chunk_type, ext);
        self
    }

    fn node(&mut self, chunk_type: u16, fields: &[u32], tail: &[u8]) {
        let mut ext = Vec::new();
        for field in fields {
            put_u32(&mut ext, *field);
        }
        ext.extend_from_slice(tail);
        self.chunk(chunk_type, &ext);
    }

    fn chunk(&mut self, chunk_type: u16, ext: &[u8]) {
        put_u16(&mut self.body, chunk_type);
        put_u16(&mut self.body, 16);
        put_u32(&mut self.body, 16 + ext.len() as u32);
        put_u32(&mut self.body, 1);
        put_u32(&mut self.body, NO_ENTRY);
        self.body.extend_from_slice(ext);
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let pool = self.string_pool();
        let mut resource_map = Vec::new();
        if !self.resource_ids.is_empty() {
            put_u16(&mut resource_map, 0x0180);
            put_u16(&mut resource_map, 8);
            put_u32(&mut resource_map, 8 + 4 * self.resource_ids.len() as u32);
            for id in &self.resource_ids {
                put_u32(&mut resource_map, *id);
            }
        }

        let mut out = Vec::new();
        put_u16(&mut out, 0x0003);
        put_u16(&mut out, 8);
        put_u32(
            &mut out,
            (8 + pool.len() + resource_map.len() + self.body.len()) as u32,
        );
        out.extend_from_slice(&pool);
        out.extend_from_slice(&resource_map);
        out.extend_from_slice(&self.body);
        out
    }

    fn string_pool(&self) -> Vec<u8> {
        let mut data = Vec::new();
        let mut offsets = Vec::new();
        for s in &self.strings {
            offsets.push(data.len() as u32);
            if self.utf8 {
                let units = s.encode_utf16().count();
                put_utf8_len(&mut data, units);
                put_utf8_len(&mut data, s.len());
                data.extend_from_slice(s.as_bytes());
                data.push(0);
            } else {
                let units: Vec<u16> = s.encode_utf16().collect();
                if units.len() > 0x7fff {
                    put_u16(&mut data, 0x8000 | (units.len() >> 16) as u16);
                    put_u16(&mut data, units.len() as u16);
                } else {
                    put_u16(&mut data, units.len() as u16);
                }
                for unit in units {
                    put_u16(&mut data, unit);
                }
                put_u16(&mut data, 0);
            }
        }
        while data.len() % 4 != 0 {
            data.push(0);
        }

        let header_size = 28_u32;
        let strings_start = header_size + 4 * self.strings.len() as u32;
        let mut out = Vec::new();
        put_u16(&mut out, 0x0001);
        put_u16(&mut out, header_size as u16);
        put_u32(&mut out, strings_start + data.len() as u32);
        put_u32(&mut out, self.strings.len() as u32);
        put_u32(&mut out, 0);
        put_u32(&mut out, if self.utf8 { 0x100 } else { 0 });
        put_u32(&mut out, strings_start);
        put_u32(&mut out, 0);
        for offset in offsets {
            put_u32(&mut out, offset);
        }
        out.extend_from_slice(&data);
        out
    }
}

fn put_utf8_len(out: &mut Vec<u8>, len: usize) {
    if len > 0x7f {
        out.push(0x80 | (len >> 8) as u8);
        out.push(len as u8);
    } else {
        out.push(len as u8);
    }
}

/// Version facts used by [`manifest`].
pub(crate) struct ManifestFacts<'a> {
    pub(crate) package: Option<&'a str>,
    pub(crate) version_code: Option<i32>,
    pub(crate) version_name: Option<&'a str>,
    pub(crate) min_sdk: Option<i32>,
    pub(crate) target_sdk: Option<i32>,
    pub(crate) permissions: &'a [&'a str],
    pub(crate) debuggable: bool,
}

impl Default for ManifestFacts<'_> {
    fn default() -> Self {
        Self {
            package: Some("com.example.app"),
            version_code: Some(7),
            version_name: Some("1.2.0"),
            min_sdk: Some(21),
            target_sdk: Some(33),
            permissions: &[],
            debuggable: false,
        }
    }
}

/// Builds a typical binary manifest.
pub(crate) fn manifest(facts: &ManifestFacts<'_>) -> Vec<u8> {
    let mut builder = AxmlBuilder::new();
    builder.start_namespace("android", ANDROID_NS);

    let mut root = Vec::new();
    if let Some(code) = facts.version_code {
        root.push(attr("versionCode", Value::Int(code)));
    }
    if let Some(name) = facts.version_name {
        root.push(attr("versionName", Value::Str(name)));
    }
    if let Some(package) = facts.package {
        root.push(plain_attr("package", Value::Str(package)));
    }
    builder.start("manifest", &root);

    let mut sdk = Vec::new();
    if let Some(min) = facts.min_sdk {
        sdk.push(attr("minSdkVersion", Value::Int(min)));
    }
    if let Some(target) = facts.target_sdk {
        sdk.push(attr("targetSdkVersion", Value::Int(target)));
    }
    builder.start("uses-sdk", &sdk).end("uses-sdk");

    for permission in facts.permissions {
        builder
            .start("uses-permission", &[attr("name", Value::Str(*permission))])
            .end("uses-permission");
    }

    builder
        .start(
            "application",
            &[
                attr("label", Value::Ref(0x7f0a_0001)),
                attr("debuggable", Value::Bool(facts.debuggable)),
            ],
        )
        .start(
            "activity",
            &[
                attr("name", Value::Str(".MainActivity")),
                attr("exported", Value::Bool(true)),
            ],
        )
        .end("activity")
        .end("application")
        .end("manifest")
        .end_namespace("android", ANDROID_NS);

    builder.build()
}

/// Encodes one DER TLV.
pub(crate) fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = (len as u32).to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (4 - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

pub(crate) fn sequence(items: &[Vec<u8>]) -> Vec<u8> {
    der(0x30, &items.concat())
}

/// Encodes a dotted object identifier.
pub(crate) fn oid(dotted: &str) -> Vec<u8> {
    let arcs: Vec<u64> = dotted.split('.').map(|a| a.parse().unwrap()).collect();
    let mut content = Vec::new();
    let mut push_arc = |mut arc: u64| {
        let mut bytes = vec![(arc & 0x7f) as u8];
        arc >>= 7;
        while arc > 0 {
            bytes.push(0x80 | (arc & 0x7f) as u8);
            arc >>= 7;
        }
        bytes.reverse();
        content.extend_from_slice(&bytes);
    };
    push_arc(arcs[0] * 40 + arcs[1]);
    for arc in &arcs[2..] {
        push_arc(*arc);
    }
    der(0x06, &content)
}

fn name(attributes: &[(&str, &str)]) -> Vec<u8> {
    let sets: Vec<Vec<u8>> = attributes
        .iter()
        .map(|(attr_oid, value)| {
            der(
                0x31,
                &sequence(&[oid(attr_oid), der(0x0c, value.as_bytes())]),
            )
        })
        .collect();
    sequence(&sets)
}

/// X.509 certificate builder.
pub(crate) struct CertificateBuilder<'a> {
    pub(crate) subject: &'a [(&'a str, &'a str)],
    pub(crate) issuer: &'a [(&'a str, &'a str)],
    pub(crate) serial: &'a [u8],
    pub(crate) not_before: &'a str,
    pub(crate) not_after: &'a str,
    pub(crate) tbs_algorithm: &'a str,
    pub(crate) algorithm: &'a str,
}

pub(crate) const RELEASE_NAME: &[(&str, &str)] = &[
    ("2.5.4.3", "Example Release"),
    ("2.5.4.10", "Example Corp"),
    ("2.5.4.6", "US"),
];

pub(crate) const DEBUG_NAME: &[(&str, &str)] = &[
    ("2.5.4.3", "Android Debug"),
    ("2.5.4.10", "Android"),
    ("2.5.4.6", "US"),
];

impl Default for CertificateBuilder<'_> {
    fn default() -> Self {
        Self {
            subject: RELEASE_NAME,
            issuer: RELEASE_NAME,
            serial: &[0x01, 0x02, 0x03, 0x04],
            not_before: "200101000000Z",
            not_after: "491231235959Z",
            tbs_algorithm: "1.2.840.113549.1.1.11",
            algorithm: "1.2.840.113549.1.1.11",
        }
    }
}

impl CertificateBuilder<'_> {
    pub(crate) fn build(&self) -> Vec<u8> {
        let time = |t: &str| {
            if t.len() == 13 {
                der(0x17, t.as_bytes())
            } else {
                der(0x18, t.as_bytes())
            }
        };
        let tbs = sequence(&[
            der(0xa0, &der(0x02, &[0x02])),
            der(0x02, self.serial),
            sequence(&[oid(self.tbs_algorithm), der(0x05, &[])]),
            name(self.issuer),
            sequence(&[time(self.not_before), time(self.not_after)]),
            name(self.subject),
            sequence(&[
                sequence(&[oid("1.2.840.113549.1.1.1"), der(0x05, &[])]),
                der(0x03, &[0x00, 0x30, 0x03, 0x02, 0x01, 0x05]),
            ]),
        ]);
        sequence(&[
            tbs,
            sequence(&[oid(self.algorithm), der(0x05, &[])]),
            der(0x03, &[0x00, 0xde, 0xad, 0xbe, 0xef]),
        ])
    }
}

/// Release certificate with default fields.
pub(crate) fn release_certificate() -> Vec<u8> {
    CertificateBuilder::default().build()
}

/// Wraps certificates in a PKCS#7 SignedData ContentInfo, as found in `META-INF/*.RSA`.
pub(crate) fn pkcs7(certificates: &[Vec<u8>]) -> Vec<u8> {
    let signed_data = sequence(&[
        der(0x02, &[0x01]),
        der(
            0x31,
            &sequence(&[oid("2.16.840.1.101.3.4.2.1"), der(0x05, &[])]),
        ),
        sequence(&[oid("1.2.840.113549.1.7.1")]),
        der(0xa0, &certificates.concat()),
        der(0x31, &[]),
    ]);
    sequence(&[oid("1.2.840.113549.1.7.2"), der(0xa0, &signed_data)])
}

fn length_prefixed(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    put_u32(&mut out, content.len() as u32);
    out.extend_from_slice(content);
    out
}

fn length_prefixed_sequence(items: &[Vec<u8>]) -> Vec<u8> {
    let inner: Vec<u8> = items.iter().flat_map(|i| length_prefixed(i)).collect();
    length_prefixed(&inner)
}

/// Encodes the value of a v2 signature scheme block, one signer per certificate chain.
pub(crate) fn v2_signers(chains: &[Vec<Vec<u8>>]) -> Vec<u8> {
    let signers: Vec<Vec<u8>> = chains
        .iter()
        .map(|chain| {
            let signed_data = [
                length_prefixed_sequence(&[]),
                length_prefixed_sequence(chain),
                length_prefixed_sequence(&[]),
            ]
            .concat();
            [
                length_prefixed(&signed_data),
                length_prefixed_sequence(&[]),
                length_prefixed(&[0x01, 0x02]),
            ]
            .concat()
        })
        .collect();
    length_prefixed_sequence(&signers)
}

/// Encodes the value of a v3 signature scheme block, one signer per certificate chain.
pub(crate) fn v3_signers(chains: &[Vec<Vec<u8>>]) -> Vec<u8> {
    let signers: Vec<Vec<u8>> = chains
        .iter()
        .map(|chain| {
            let mut signed_data = [
                length_prefixed_sequence(&[]),
                length_prefixed_sequence(chain),
            ]
            .concat();
            put_u32(&mut signed_data, 24);
            put_u32(&mut signed_data, 0x7fff_ffff);
            signed_data.extend_from_slice(&length_prefixed_sequence(&[]));

            let mut signer = length_prefixed(&signed_data);
            put_u32(&mut signer, 24);
            put_u32(&mut signer, 0x7fff_ffff);
            signer.extend_from_slice(&length_prefixed_sequence(&[]));
            signer.extend_from_slice(&length_prefixed(&[0x01, 0x02]));
            signer
        })
        .collect();
    length_prefixed_sequence(&signers)
}

/// Encodes an APK signing block holding the given ID-value pairs.
pub(crate) fn signing_block(pairs: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (id, value) in pairs {
        put_u64(&mut body, 4 + value.len() as u64);
        put_u32(&mut body, *id);
        body.extend_from_slice(value);
    }
    let size = body.len() as u64 + 8 + 16;

    let mut out = Vec::new();
    put_u64(&mut out, size);
    out.extend_from_slice(&body);
    put_u64(&mut out, size);
    out.extend_from_slice(b"APK Sig Block 42");
    out
}

/// Assembles a minimal APK from an optional manifest and optional v1 certificates.
pub(crate) fn apk(manifest: Option<&[u8]>, v1_certificates: &[Vec<u8>]) -> Vec<u8> {
    let mut builder = ZipBuilder::new();
    if let Some(manifest) = manifest {
        builder = builder.deflated("AndroidManifest.xml", manifest);
    }
    builder = builder
        .stored("classes.dex", b"dex\n035\0")
        .deflated("res/layout/main.xml", &[0_u8; 64]);
    if !v1_certificates.is_empty() {
        builder = builder
            .deflated("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n")
            .deflated("META-INF/CERT.SF", b"Signature-Version: 1.0\r\n")
            .stored("META-INF/CERT.RSA", &pkcs7(v1_certificates));
    }
    builder.build()
}
