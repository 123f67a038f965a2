//! Signing certificate extraction.
//!
//! Certificates are collected from the JAR signature files under `META-INF/` (scheme v1) and
//! from the APK signing block (schemes v2, v3 and v3.1). A certificate found by several schemes
//! is reported once. Unreadable signature data never aborts the extraction: it becomes a
//! placeholder entry flagged with `parse_error`.

mod der;
mod signing_block;

use crate::{
    archive::PackageArchive,
    error::{ArchiveError, CertificateError, SignatureError},
    utils::{sha1_hex, sha256_hex},
};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value reported for certificate fields that could not be read.
const UNKNOWN: &str = "unknown";

/// Subject or issuer fragment of the certificates generated by the Android SDK for debugging.
const DEBUG_COMMON_NAME: &str = "CN=Android Debug";

/// Extensions of the v1 signature block files.
const SIGNATURE_BLOCK_EXTENSIONS: [&str; 3] = ["RSA", "DSA", "EC"];

/// APK signature scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SignatureScheme {
    /// JAR signing.
    #[serde(rename = "v1")]
    V1,
    /// APK signature scheme v2.
    #[serde(rename = "v2")]
    V2,
    /// APK signature scheme v3.
    #[serde(rename = "v3")]
    V3,
    /// APK signature scheme v3.1.
    #[serde(rename = "v3.1")]
    V31,
}

impl SignatureScheme {
    /// Gets the display name of the scheme.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
            Self::V31 => "v3.1",
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive facts of one signing certificate.
///
/// Nothing here implies the signature was verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    subject: String,
    issuer: String,
    serial_number: String,
    signature_algorithm: String,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
    sha256_fingerprint: String,
    sha1_fingerprint: String,
    schemes: Vec<SignatureScheme>,
    source: String,
    parse_error: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    issues: Vec<String>,
}

impl CertificateInfo {
    /// Describes a DER certificate, or a placeholder if it cannot be parsed.
    fn from_der(der: &[u8], scheme: SignatureScheme, source: &str) -> Self {
        match der::parse_certificate(der) {
            Ok(parsed) => Self {
                subject: parsed.subject,
                issuer: parsed.issuer,
                serial_number: parsed.serial_number,
                signature_algorithm: parsed.signature_algorithm,
                not_before: Some(parsed.not_before),
                not_after: Some(parsed.not_after),
                sha256_fingerprint: sha256_hex(der),
                sha1_fingerprint: sha1_hex(der),
                schemes: vec![scheme],
                source: source.to_owned(),
                parse_error: false,
                issues: parsed.issues,
            },
            Err(e) => Self::placeholder(Some(scheme), source, &e),
        }
    }

    /// Entry standing for signature data that could not be read.
    fn placeholder(scheme: Option<SignatureScheme>, source: &str, error: &CertificateError) -> Self {
        Self {
            subject: UNKNOWN.to_owned(),
            issuer: UNKNOWN.to_owned(),
            serial_number: UNKNOWN.to_owned(),
            signature_algorithm: UNKNOWN.to_owned(),
            not_before: None,
            not_after: None,
            sha256_fingerprint: UNKNOWN.to_owned(),
            sha1_fingerprint: UNKNOWN.to_owned(),
            schemes: scheme.into_iter().collect(),
            source: source.to_owned(),
            parse_error: true,
            issues: vec![format!("The signature data in {} could not be read: {}.", source, error)],
        }
    }

    /// Gets the subject distinguished name.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Gets the issuer distinguished name.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Gets the serial number, in hexadecimal.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Gets the signature algorithm name.
    pub fn signature_algorithm(&self) -> &str {
        &self.signature_algorithm
    }

    /// Gets the start of the validity period.
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    /// Gets the end of the validity period.
    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        self.not_after
    }

    /// Gets the SHA-256 fingerprint of the DER encoding.
    pub fn sha256_fingerprint(&self) -> &str {
        &self.sha256_fingerprint
    }

    /// Gets the SHA-1 fingerprint of the DER encoding.
    pub fn sha1_fingerprint(&self) -> &str {
        &self.sha1_fingerprint
    }

    /// Gets the schemes the certificate was found in.
    pub fn schemes(&self) -> &[SignatureScheme] {
        &self.schemes
    }

    /// Gets where the certificate was first found.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the signature data behind this entry could not be read.
    pub fn parse_error(&self) -> bool {
        self.parse_error
    }

    /// Gets the self-consistency problems of the certificate.
    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    /// Whether the certificate was fully parsed.
    pub fn is_usable(&self) -> bool {
        !self.parse_error
    }

    /// Whether this is an Android SDK debug certificate.
    pub fn is_debug(&self) -> bool {
        self.is_usable()
            && (self.subject.contains(DEBUG_COMMON_NAME) || self.issuer.contains(DEBUG_COMMON_NAME))
    }

    /// Whether the subject and issuer are the same.
    pub fn is_self_signed(&self) -> bool {
        self.is_usable() && self.subject == self.issuer
    }
}

/// Certificates gathered so far, deduplicated by fingerprint.
struct Collector {
    certificates: Vec<CertificateInfo>,
    limit: usize,
}

impl Collector {
    fn add(&mut self, certificate: CertificateInfo) -> Result<(), SignatureError> {
        if certificate.is_usable() {
            if let Some(known) = self.certificates.iter_mut().find(|known| {
                known.is_usable() && known.sha256_fingerprint == certificate.sha256_fingerprint
            }) {
                for scheme in certificate.schemes {
                    if !known.schemes.contains(&scheme) {
                        known.schemes.push(scheme);
                    }
                }
                known.schemes.sort();
                for issue in certificate.issues {
                    if !known.issues.contains(&issue) {
                        known.issues.push(issue);
                    }
                }
                return Ok(());
            }
        }

        if self.certificates.len() >= self.limit {
            return Err(SignatureError::TooManyCertificates { limit: self.limit });
        }
        self.certificates.push(certificate);
        Ok(())
    }
}

/// Whether the entry is a v1 signature block file directly under `META-INF/`.
fn is_signature_block_file(name: &str) -> bool {
    match name.strip_prefix("META-INF/") {
        Some(file) if !file.contains('/') => file.rsplit_once('.').map_or(false, |(_, ext)| {
            SIGNATURE_BLOCK_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        }),
        _ => false,
    }
}

/// Extracts the signing certificates of a package.
///
/// Fails only if the archive cannot serve a signature file, the deadline passes, or the
/// package carries more certificates than its limits allow.
pub fn extract(archive: &PackageArchive<'_>) -> Result<Vec<CertificateInfo>, SignatureError> {
    let mut collector = Collector {
        certificates: Vec::new(),
        limit: archive.limits().max_certificates,
    };

    extract_v1(archive, &mut collector)?;
    if archive.deadline().is_expired() {
        return Err(ArchiveError::DeadlineExceeded.into());
    }
    extract_signing_block(archive, &mut collector)?;

    debug!(
        "{} signing certificates found",
        collector.certificates.len()
    );
    Ok(collector.certificates)
}

fn extract_v1(
    archive: &PackageArchive<'_>,
    collector: &mut Collector,
) -> Result<(), SignatureError> {
    let block_files = archive
        .list_entries()
        .iter()
        .filter(|entry| !entry.is_dir() && is_signature_block_file(entry.name()))
        .map(|entry| entry.name().to_owned())
        .collect::<Vec<_>>();

    for name in block_files {
        let contents = match archive.read_entry(&name) {
            Ok(contents) => contents,
            Err(e @ ArchiveError::Corrupt(_)) | Err(e @ ArchiveError::Truncated(_)) => {
                debug!("signature block {} cannot be read: {}", name, e);
                collector.add(CertificateInfo::placeholder(
                    Some(SignatureScheme::V1),
                    &name,
                    &CertificateError::Pkcs7(e.to_string()),
                ))?;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let signature_file = name
            .rsplit_once('.')
            .map(|(stem, _)| format!("{}.SF", stem))
            .unwrap_or_default();
        let has_signature_file = archive.entry(&signature_file).is_some();

        match der::pkcs7_certificates(&contents) {
            Ok(certificates) if certificates.is_empty() => {
                debug!("signature block {} holds no certificate", name);
                collector.add(CertificateInfo::placeholder(
                    Some(SignatureScheme::V1),
                    &name,
                    &CertificateError::Pkcs7("no certificates present".to_owned()),
                ))?;
            }
            Ok(certificates) => {
                for encoded in certificates {
                    let mut certificate = CertificateInfo::from_der(encoded, SignatureScheme::V1, &name);
                    if !has_signature_file && certificate.is_usable() {
                        certificate.issues.push(format!(
                            "The signature block {} has no matching {}.",
                            name, signature_file
                        ));
                    }
                    collector.add(certificate)?;
                }
            }
            Err(e) => {
                debug!("could not read signature block {}: {}", name, e);
                collector.add(CertificateInfo::placeholder(
                    Some(SignatureScheme::V1),
                    &name,
                    &e,
                ))?;
            }
        }
    }

    Ok(())
}

fn extract_signing_block(
    archive: &PackageArchive<'_>,
    collector: &mut Collector,
) -> Result<(), SignatureError> {
    const SOURCE: &str = "APK Signing Block";

    let pairs = match signing_block::find(archive.signing_block_region()) {
        Ok(Some(pairs)) => pairs,
        Ok(None) => return Ok(()),
        Err(e) => {
            debug!("could not read the signing block: {}", e);
            return collector.add(CertificateInfo::placeholder(None, SOURCE, &e));
        }
    };

    for (id, value) in pairs {
        let scheme = match signing_block::scheme_of(id) {
            Some(scheme) => scheme,
            None => {
                debug!("skipping signing block pair 0x{:08x}", id);
                continue;
            }
        };
        let source = format!("{} ({})", SOURCE, scheme);

        let signers = match signing_block::signer_certificates(value) {
            Ok(signers) => signers,
            Err(e) => {
                debug!("could not read the {} signers: {}", scheme, e);
                collector.add(CertificateInfo::placeholder(Some(scheme), &source, &e))?;
                continue;
            }
        };
        for signer in signers {
            match signer {
                Ok(certificates) => {
                    for encoded in certificates {
                        collector.add(CertificateInfo::from_der(encoded, scheme, &source))?;
                    }
                }
                Err(e) => {
                    debug!("could not read a {} signer: {}", scheme, e);
                    collector.add(CertificateInfo::placeholder(Some(scheme), &source, &e))?;
                }
            }
        }
    }

    Ok(())
}
