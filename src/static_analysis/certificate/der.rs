//! Minimal DER reader: enough X.509 and PKCS#7 to describe a signer.
//!
//! Nothing here validates signatures. Every length is checked against its enclosing element
//! before use, and nesting is walked iteratively by the callers.

use crate::error::CertificateError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_OID: u8 = 0x06;
const TAG_UTF8_STRING: u8 = 0x0c;
const TAG_PRINTABLE_STRING: u8 = 0x13;
const TAG_T61_STRING: u8 = 0x14;
const TAG_IA5_STRING: u8 = 0x16;
const TAG_UTC_TIME: u8 = 0x17;
const TAG_GENERALIZED_TIME: u8 = 0x18;
const TAG_UNIVERSAL_STRING: u8 = 0x1c;
const TAG_BMP_STRING: u8 = 0x1e;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_CONTEXT_0: u8 = 0xa0;

const OID_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";

/// One decoded TLV.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tlv<'a> {
    pub(crate) tag: u8,
    pub(crate) content: &'a [u8],
    pub(crate) raw: &'a [u8],
}

/// Sequential reader over the elements of one constructed value.
#[derive(Debug, Clone)]
pub(crate) struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn byte(&mut self) -> Result<u8, CertificateError> {
        let byte = self
            .data
            .get(self.pos)
            .copied()
            .ok_or_else(|| CertificateError::Der("unexpected end of data".to_owned()))?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read(&mut self) -> Result<Tlv<'a>, CertificateError> {
        let start = self.pos;
        let tag = self.byte()?;
        if tag & 0x1f == 0x1f {
            return Err(CertificateError::Der(
                "multi-byte tags are not supported".to_owned(),
            ));
        }

        let first = self.byte()?;
        let len = match first {
            0x00..=0x7f => usize::from(first),
            0x80 => {
                return Err(CertificateError::Der(
                    "indefinite lengths are not valid DER".to_owned(),
                ))
            }
            0x81..=0x84 => {
                let mut len = 0_usize;
                for _ in 0..(first & 0x7f) {
                    len = (len << 8) | usize::from(self.byte()?);
                }
                len
            }
            _ => {
                return Err(CertificateError::Der(format!(
                    "length with {} octets is too long",
                    first & 0x7f
                )))
            }
        };

        let content_start = self.pos;
        let end = content_start
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                CertificateError::Der(format!(
                    "element of {} bytes extends past its parent",
                    len
                ))
            })?;
        self.pos = end;

        Ok(Tlv {
            tag,
            content: &self.data[content_start..end],
            raw: &self.data[start..end],
        })
    }

    pub(crate) fn expect(&mut self, tag: u8, what: &str) -> Result<Tlv<'a>, CertificateError> {
        let tlv = self.read()?;
        if tlv.tag != tag {
            return Err(CertificateError::Der(format!(
                "expected {} (tag 0x{:02x}), found tag 0x{:02x}",
                what, tag, tlv.tag
            )));
        }
        Ok(tlv)
    }

    pub(crate) fn optional(&mut self, tag: u8) -> Result<Option<Tlv<'a>>, CertificateError> {
        if self.peek_tag() == Some(tag) {
            self.read().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Decodes an object identifier into its dotted form.
pub(crate) fn decode_oid(content: &[u8]) -> Result<String, CertificateError> {
    if content.is_empty() {
        return Err(CertificateError::Der("empty object identifier".to_owned()));
    }

    let mut arcs: Vec<u64> = Vec::new();
    let mut value = 0_u64;
    let mut pending = false;
    for byte in content {
        if value > u64::MAX >> 7 {
            return Err(CertificateError::Der(
                "object identifier arc overflows".to_owned(),
            ));
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        pending = byte & 0x80 != 0;
        if !pending {
            arcs.push(value);
            value = 0;
        }
    }
    if pending {
        return Err(CertificateError::Der(
            "object identifier ends inside an arc".to_owned(),
        ));
    }

    let first = arcs[0];
    let (root, second) = match first {
        0..=39 => (0, first),
        40..=79 => (1, first - 40),
        _ => (2, first - 80),
    };
    let mut dotted = format!("{}.{}", root, second);
    for arc in &arcs[1..] {
        dotted.push('.');
        dotted.push_str(&arc.to_string());
    }
    Ok(dotted)
}

/// Short name of a distinguished name attribute.
fn attribute_name(oid: &str) -> Option<&'static str> {
    match oid {
        "2.5.4.3" => Some("CN"),
        "2.5.4.4" => Some("SN"),
        "2.5.4.5" => Some("serialNumber"),
        "2.5.4.6" => Some("C"),
        "2.5.4.7" => Some("L"),
        "2.5.4.8" => Some("ST"),
        "2.5.4.9" => Some("STREET"),
        "2.5.4.10" => Some("O"),
        "2.5.4.11" => Some("OU"),
        "2.5.4.12" => Some("T"),
        "2.5.4.42" => Some("GN"),
        "1.2.840.113549.1.9.1" => Some("emailAddress"),
        "0.9.2342.19200300.100.1.25" => Some("DC"),
        _ => None,
    }
}

/// Name of a signature algorithm.
pub(crate) fn algorithm_name(oid: &str) -> Option<&'static str> {
    match oid {
        "1.2.840.113549.1.1.4" => Some("md5WithRSAEncryption"),
        "1.2.840.113549.1.1.5" => Some("sha1WithRSAEncryption"),
        "1.2.840.113549.1.1.10" => Some("RSASSA-PSS"),
        "1.2.840.113549.1.1.11" => Some("sha256WithRSAEncryption"),
        "1.2.840.113549.1.1.12" => Some("sha384WithRSAEncryption"),
        "1.2.840.113549.1.1.13" => Some("sha512WithRSAEncryption"),
        "1.2.840.10040.4.3" => Some("dsa-with-SHA1"),
        "2.16.840.1.101.3.4.3.2" => Some("dsa-with-SHA256"),
        "1.2.840.10045.4.1" => Some("ecdsa-with-SHA1"),
        "1.2.840.10045.4.3.2" => Some("ecdsa-with-SHA256"),
        "1.2.840.10045.4.3.3" => Some("ecdsa-with-SHA384"),
        "1.2.840.10045.4.3.4" => Some("ecdsa-with-SHA512"),
        "1.3.101.112" => Some("Ed25519"),
        _ => None,
    }
}

fn decode_string(tlv: &Tlv<'_>) -> String {
    match tlv.tag {
        TAG_UTF8_STRING | TAG_PRINTABLE_STRING | TAG_IA5_STRING => {
            String::from_utf8_lossy(tlv.content).into_owned()
        }
        TAG_T61_STRING => tlv.content.iter().map(|b| char::from(*b)).collect(),
        TAG_BMP_STRING => {
            let units: Vec<u16> = tlv
                .content
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        TAG_UNIVERSAL_STRING => tlv
            .content
            .chunks_exact(4)
            .map(|quad| {
                char::from_u32(u32::from_be_bytes([quad[0], quad[1], quad[2], quad[3]]))
                    .unwrap_or(char::REPLACEMENT_CHARACTER)
            })
            .collect(),
        _ => format!("#{}", hex::encode(tlv.raw)),
    }
}

/// Renders a distinguished name as `CN=..., O=..., C=...`, in encoded order.
fn decode_name(name: &Tlv<'_>) -> Result<String, CertificateError> {
    let mut parts = Vec::new();
    let mut rdns = DerReader::new(name.content);
    while !rdns.is_empty() {
        let rdn = rdns.expect(TAG_SET, "relative distinguished name")?;
        let mut attributes = DerReader::new(rdn.content);
        while !attributes.is_empty() {
            let attribute = attributes.expect(TAG_SEQUENCE, "name attribute")?;
            let mut fields = DerReader::new(attribute.content);
            let oid = decode_oid(fields.expect(TAG_OID, "attribute type")?.content)?;
            let value = decode_string(&fields.read()?);
            let key = attribute_name(&oid).map_or(oid.clone(), str::to_owned);
            parts.push(format!("{}={}", key, value));
        }
    }
    Ok(parts.join(", "))
}

fn decode_time(tlv: &Tlv<'_>) -> Result<DateTime<Utc>, CertificateError> {
    let text = std::str::from_utf8(tlv.content)
        .map_err(|_| CertificateError::Der("time is not ASCII".to_owned()))?;
    let full = match tlv.tag {
        TAG_UTC_TIME => {
            let year: u32 = text
                .get(..2)
                .and_then(|y| y.parse().ok())
                .ok_or_else(|| CertificateError::Der(format!("invalid UTCTime `{}`", text)))?;
            let century = if year < 50 { "20" } else { "19" };
            format!("{}{}", century, text)
        }
        TAG_GENERALIZED_TIME => text.to_owned(),
        other => {
            return Err(CertificateError::Der(format!(
                "expected a time, found tag 0x{:02x}",
                other
            )))
        }
    };

    let naive = NaiveDateTime::parse_from_str(&full, "%Y%m%d%H%M%SZ")
        .map_err(|_| CertificateError::Der(format!("invalid time `{}`", text)))?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn algorithm_identifier(tlv: &Tlv<'_>) -> Result<String, CertificateError> {
    let mut fields = DerReader::new(tlv.content);
    let oid = decode_oid(fields.expect(TAG_OID, "algorithm")?.content)?;
    Ok(algorithm_name(&oid).map_or(oid, str::to_owned))
}

/// Fields of an X.509 certificate relevant to signer identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedCertificate {
    pub(crate) subject: String,
    pub(crate) issuer: String,
    pub(crate) serial_number: String,
    pub(crate) signature_algorithm: String,
    pub(crate) not_before: DateTime<Utc>,
    pub(crate) not_after: DateTime<Utc>,
    pub(crate) issues: Vec<String>,
}

/// Parses a DER encoded X.509 certificate.
pub(crate) fn parse_certificate(der: &[u8]) -> Result<ParsedCertificate, CertificateError> {
    let mut top = DerReader::new(der);
    let certificate = top.expect(TAG_SEQUENCE, "certificate")?;
    if !top.is_empty() {
        return Err(CertificateError::Der(
            "trailing bytes after the certificate".to_owned(),
        ));
    }

    let mut parts = DerReader::new(certificate.content);
    let tbs = parts.expect(TAG_SEQUENCE, "to-be-signed certificate")?;
    let outer_algorithm = algorithm_identifier(&parts.expect(TAG_SEQUENCE, "algorithm")?)?;
    let _signature = parts.expect(TAG_BIT_STRING, "signature value")?;

    let mut fields = DerReader::new(tbs.content);
    let _version = fields.optional(TAG_CONTEXT_0)?;
    let serial = fields.expect(TAG_INTEGER, "serial number")?;
    if serial.content.is_empty() {
        return Err(CertificateError::Der("empty serial number".to_owned()));
    }
    let inner_algorithm = algorithm_identifier(&fields.expect(TAG_SEQUENCE, "algorithm")?)?;
    let issuer = decode_name(&fields.expect(TAG_SEQUENCE, "issuer")?)?;
    let validity = fields.expect(TAG_SEQUENCE, "validity")?;
    let subject = decode_name(&fields.expect(TAG_SEQUENCE, "subject")?)?;
    let _public_key = fields.expect(TAG_SEQUENCE, "subject public key info")?;

    let mut times = DerReader::new(validity.content);
    let not_before = decode_time(&times.read()?)?;
    let not_after = decode_time(&times.read()?)?;

    let mut issues = Vec::new();
    if inner_algorithm != outer_algorithm {
        issues.push(format!(
            "The certificate declares {} but is signed with {}.",
            inner_algorithm, outer_algorithm
        ));
    }
    if not_after < not_before {
        issues.push("The certificate validity period ends before it starts.".to_owned());
    }

    Ok(ParsedCertificate {
        subject,
        issuer,
        serial_number: hex::encode(serial.content),
        signature_algorithm: outer_algorithm,
        not_before,
        not_after,
        issues,
    })
}

/// Extracts the raw certificates of a PKCS#7 `SignedData` `ContentInfo`.
pub(crate) fn pkcs7_certificates(data: &[u8]) -> Result<Vec<&[u8]>, CertificateError> {
    let pkcs7 = |e: CertificateError| CertificateError::Pkcs7(e.to_string());

    let content_info = DerReader::new(data)
        .expect(TAG_SEQUENCE, "content info")
        .map_err(pkcs7)?;
    let mut fields = DerReader::new(content_info.content);
    let content_type = decode_oid(fields.expect(TAG_OID, "content type").map_err(pkcs7)?.content)
        .map_err(pkcs7)?;
    if content_type != OID_SIGNED_DATA {
        return Err(CertificateError::Pkcs7(format!(
            "content type {} is not signed data",
            content_type
        )));
    }
    let explicit = fields
        .expect(TAG_CONTEXT_0, "signed data content")
        .map_err(pkcs7)?;
    let signed_data = DerReader::new(explicit.content)
        .expect(TAG_SEQUENCE, "signed data")
        .map_err(pkcs7)?;

    let mut fields = DerReader::new(signed_data.content);
    let _version = fields.expect(TAG_INTEGER, "version").map_err(pkcs7)?;
    let _digests = fields.expect(TAG_SET, "digest algorithms").map_err(pkcs7)?;
    let _content = fields
        .expect(TAG_SEQUENCE, "encapsulated content")
        .map_err(pkcs7)?;

    let mut certificates = Vec::new();
    if let Some(set) = fields.optional(TAG_CONTEXT_0).map_err(pkcs7)? {
        let mut entries = DerReader::new(set.content);
        while !entries.is_empty() {
            let entry = entries.read().map_err(pkcs7)?;
            // Other certificate choices are obsolete and skipped.
            if entry.tag == TAG_SEQUENCE {
                certificates.push(entry.raw);
            }
        }
    }

    Ok(certificates)
}

#[cfg(test)]
mod tests {
    use super::{decode_oid, parse_certificate, pkcs7_certificates, DerReader};
    use crate::{
        error::CertificateError,
        test_utils::{der, oid, pkcs7, release_certificate, CertificateBuilder, DEBUG_NAME},
    };
    use chrono::{Datelike, TimeZone, Utc};

    #[test]
    fn it_decode_oid() {
        let encoded = oid("1.2.840.113549.1.1.11");
        assert_eq!(
            decode_oid(&encoded[2..]).unwrap(),
            "1.2.840.113549.1.1.11"
        );
        assert_eq!(decode_oid(&[0x55, 0x04, 0x03]).unwrap(), "2.5.4.3");
        assert!(decode_oid(&[]).is_err());
        assert!(decode_oid(&[0x2a, 0x86]).is_err());
        assert!(decode_oid(&[0xff; 12]).is_err());
    }

    #[test]
    fn it_reads_long_lengths() {
        let content = vec![0x41_u8; 300];
        let encoded = der(0x04, &content);
        let tlv = DerReader::new(&encoded).read().unwrap();

        assert_eq!(tlv.content.len(), 300);
        assert_eq!(tlv.raw.len(), encoded.len());
    }

    #[test]
    fn it_rejects_bad_lengths() {
        assert!(DerReader::new(&[0x30, 0x80, 0x00, 0x00]).read().is_err());
        assert!(DerReader::new(&[0x30, 0x05, 0x01]).read().is_err());
        assert!(DerReader::new(&[0x30, 0x89, 0x01]).read().is_err());
        assert!(DerReader::new(&[0x30, 0x84, 0xff, 0xff, 0xff, 0xff]).read().is_err());
        assert!(DerReader::new(&[0x1f, 0x01, 0x00]).read().is_err());
    }

    #[test]
    fn it_parses_certificate() {
        let parsed = parse_certificate(&release_certificate()).unwrap();

        assert_eq!(parsed.subject, "CN=Example Release, O=Example Corp, C=US");
        assert_eq!(parsed.issuer, parsed.subject);
        assert_eq!(parsed.serial_number, "01020304");
        assert_eq!(parsed.signature_algorithm, "sha256WithRSAEncryption");
        assert_eq!(
            parsed.not_before,
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parsed.not_after,
            Utc.with_ymd_and_hms(2049, 12, 31, 23, 59, 59).unwrap()
        );
        assert!(parsed.issues.is_empty());
    }

    #[test]
    fn it_maps_utc_time_centuries() {
        let der = CertificateBuilder {
            not_before: "491231000000Z",
            not_after: "500101000000Z",
            ..CertificateBuilder::default()
        }
        .build();
        let parsed = parse_certificate(&der).unwrap();

        assert_eq!(parsed.not_before.year(), 2049);
        assert_eq!(parsed.not_after.year(), 1950);
    }

    #[test]
    fn it_parses_generalized_time_and_debug_names() {
        let der = CertificateBuilder {
            subject: DEBUG_NAME,
            issuer: DEBUG_NAME,
            not_after: "20520101000000Z",
            ..CertificateBuilder::default()
        }
        .build();
        let parsed = parse_certificate(&der).unwrap();

        assert_eq!(parsed.issuer, "CN=Android Debug, O=Android, C=US");
        assert_eq!(parsed.not_after.year(), 2052);
    }

    #[test]
    fn it_reports_inconsistencies() {
        let der = CertificateBuilder {
            not_before: "300101000000Z",
            not_after: "200101000000Z",
            tbs_algorithm: "1.2.840.113549.1.1.5",
            ..CertificateBuilder::default()
        }
        .build();
        let parsed = parse_certificate(&der).unwrap();

        assert_eq!(parsed.issues.len(), 2);
    }

    #[test]
    fn it_rejects_truncated_certificate() {
        let der = release_certificate();

        assert!(matches!(
            parse_certificate(&der[..der.len() - 10]),
            Err(CertificateError::Der(_))
        ));
        assert!(parse_certificate(&[]).is_err());
    }

    #[test]
    fn it_extracts_pkcs7_certificates() {
        let first = release_certificate();
        let second = CertificateBuilder {
            serial: &[0x09],
            ..CertificateBuilder::default()
        }
        .build();
        let block = pkcs7(&[first.clone(), second.clone()]);
        let certificates = pkcs7_certificates(&block).unwrap();

        assert_eq!(certificates, vec![&first[..], &second[..]]);
    }

    #[test]
    fn it_rejects_foreign_pkcs7_content() {
        let block = der(
            0x30,
            &[oid("1.2.840.113549.1.7.1"), der(0xa0, &der(0x30, &[]))].concat(),
        );

        assert!(matches!(
            pkcs7_certificates(&block),
            Err(CertificateError::Pkcs7(_))
        ));
        assert!(matches!(
            pkcs7_certificates(b"garbage"),
            Err(CertificateError::Pkcs7(_))
        ));
    }
}
