//! Analysis results.
//!
//! [`AnalysisResult`] is the terminal value of an analysis. It is built once by the engine and
//! never mutated afterwards. Its serialized form is the contract consumed by the presentation
//! layer, so field names and order are part of the public interface.

pub mod report;

use crate::{
    risk_level::RiskLevel,
    static_analysis::{
        certificate::{CertificateInfo, SignatureScheme},
        permission::ClassifiedPermissions,
    },
};
use serde::{Deserialize, Serialize};

/// Value reported for facts that could not be derived.
const UNKNOWN: &str = "unknown";

/// Sole warning of an analysis in which nothing was noted and no rule fired.
pub const NO_CONCERNS: &str = "No immediate security concerns detected.";

/// Snapshot of the package facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    package_name: String,
    version_name: String,
    version_code: String,
    file_size: String,
    sha256: String,
    file_name: String,
    file_size_bytes: u64,
    min_sdk_version: Option<u32>,
    target_sdk_version: Option<u32>,
}

impl Metadata {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        package_name: String,
        version_name: String,
        version_code: String,
        file_size: String,
        sha256: String,
        file_name: String,
        file_size_bytes: u64,
        min_sdk_version: Option<u32>,
        target_sdk_version: Option<u32>,
    ) -> Self {
        Self {
            package_name,
            version_name,
            version_code,
            file_size,
            sha256,
            file_name,
            file_size_bytes,
            min_sdk_version,
            target_sdk_version,
        }
    }

    /// Gets the package name, or `unknown`.
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Gets the version name, or `unknown`.
    pub fn version_name(&self) -> &str {
        &self.version_name
    }

    /// Gets the version code, or `unknown`.
    pub fn version_code(&self) -> &str {
        &self.version_code
    }

    /// Gets the human readable declared file size.
    pub fn file_size(&self) -> &str {
        &self.file_size
    }

    /// Gets the SHA-256 of the input bytes, in hexadecimal.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Gets the declared file name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Gets the declared file size in bytes.
    pub fn file_size_bytes(&self) -> u64 {
        self.file_size_bytes
    }

    /// Gets the minimum platform API level.
    pub fn min_sdk_version(&self) -> Option<u32> {
        self.min_sdk_version
    }

    /// Gets the target platform API level.
    pub fn target_sdk_version(&self) -> Option<u32> {
        self.target_sdk_version
    }
}

/// A dangerous permission with its description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DangerousPermission {
    name: String,
    description: String,
}

impl DangerousPermission {
    /// Gets the permission name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the description.
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Requested permissions by tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionReport {
    dangerous: Vec<DangerousPermission>,
    normal: Vec<String>,
    unknown: Vec<String>,
}

impl PermissionReport {
    /// Gets the dangerous permissions.
    pub fn dangerous(&self) -> &[DangerousPermission] {
        &self.dangerous
    }

    /// Gets the normal permission names.
    pub fn normal(&self) -> &[String] {
        &self.normal
    }

    /// Gets the names of the permissions missing from the reference table.
    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }
}

impl From<&ClassifiedPermissions> for PermissionReport {
    fn from(permissions: &ClassifiedPermissions) -> Self {
        Self {
            dangerous: permissions
                .dangerous()
                .iter()
                .map(|verdict| DangerousPermission {
                    name: verdict.name().to_owned(),
                    description: verdict.description().to_owned(),
                })
                .collect(),
            normal: permissions
                .normal()
                .iter()
                .map(|verdict| verdict.name().to_owned())
                .collect(),
            unknown: permissions
                .unknown()
                .iter()
                .map(|verdict| verdict.name().to_owned())
                .collect(),
        }
    }
}

/// Kind of signer of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateType {
    /// No signature data was found.
    Unsigned,
    /// Signature data was found, but no certificate could be used.
    Unverifiable,
    /// Signed with an Android SDK debug certificate.
    Debug,
    /// Signed with any other certificate.
    Release,
}

impl CertificateType {
    /// Gets the type name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unsigned => "Unsigned",
            Self::Unverifiable => "Unverifiable",
            Self::Debug => "Debug",
            Self::Release => "Release",
        }
    }
}

/// Summary of the package signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureReport {
    is_signed: bool,
    certificate_type: CertificateType,
    issuer: String,
    schemes: Vec<SignatureScheme>,
    certificates: Vec<CertificateInfo>,
}

impl SignatureReport {
    /// Summarizes the extracted certificates. The first usable one is the signer.
    pub(crate) fn from_certificates(certificates: Vec<CertificateInfo>) -> Self {
        let signer = certificates.iter().find(|c| c.is_usable());
        let certificate_type = match signer {
            Some(signer) if signer.is_debug() => CertificateType::Debug,
            Some(_) => CertificateType::Release,
            None if certificates.is_empty() => CertificateType::Unsigned,
            None => CertificateType::Unverifiable,
        };
        let issuer = signer.map_or(UNKNOWN, |signer| signer.issuer()).to_owned();

        let mut schemes: Vec<SignatureScheme> = certificates
            .iter()
            .flat_map(|c| c.schemes().iter().copied())
            .collect();
        schemes.sort();
        schemes.dedup();

        Self {
            is_signed: !certificates.is_empty(),
            certificate_type,
            issuer,
            schemes,
            certificates,
        }
    }

    /// Signature data exists but could not be examined.
    pub(crate) fn unverifiable() -> Self {
        Self {
            is_signed: true,
            certificate_type: CertificateType::Unverifiable,
            issuer: UNKNOWN.to_owned(),
            schemes: Vec::new(),
            certificates: Vec::new(),
        }
    }

    /// Whether the package carries signature data.
    pub fn is_signed(&self) -> bool {
        self.is_signed
    }

    /// Gets the kind of signer.
    pub fn certificate_type(&self) -> CertificateType {
        self.certificate_type
    }

    /// Gets the issuer of the signer certificate, or `unknown`.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Gets the schemes the package is signed with.
    pub fn schemes(&self) -> &[SignatureScheme] {
        &self.schemes
    }

    /// Gets every certificate found.
    pub fn certificates(&self) -> &[CertificateInfo] {
        &self.certificates
    }
}

/// Result of the analysis of one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    risk_score: u8,
    risk_level: RiskLevel,
    summary: String,
    warnings: Vec<String>,
    metadata: Metadata,
    permissions: PermissionReport,
    signature: SignatureReport,
    degraded: bool,
}

impl AnalysisResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        risk_score: u8,
        risk_level: RiskLevel,
        summary: String,
        warnings: Vec<String>,
        metadata: Metadata,
        permissions: PermissionReport,
        signature: SignatureReport,
        degraded: bool,
    ) -> Self {
        let mut warnings = warnings;
        if warnings.is_empty() {
            warnings.push(NO_CONCERNS.to_owned());
        }

        Self {
            risk_score,
            risk_level,
            summary,
            warnings,
            metadata,
            permissions,
            signature,
            degraded,
        }
    }

    /// Gets the score, between 0 and 100.
    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    /// Gets the verdict.
    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    /// Gets the one sentence summary.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Gets the warnings, degradation notes first and then one per triggered rule.
    ///
    /// Never empty: if nothing was noted, the list holds [`NO_CONCERNS`].
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Gets the package facts.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Gets the classified permissions.
    pub fn permissions(&self) -> &PermissionReport {
        &self.permissions
    }

    /// Gets the signature summary.
    pub fn signature(&self) -> &SignatureReport {
        &self.signature
    }

    /// Whether part of the package could not be examined.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

#[cfg(test)]
mod tests {
    use super::{CertificateType, PermissionReport, SignatureReport};
    use crate::static_analysis::permission::classify;

    #[test]
    fn it_permission_report() {
        let report = PermissionReport::from(&classify(&[
            "android.permission.INTERNET",
            "android.permission.READ_CONTACTS",
            "org.example.CUSTOM",
        ]));

        assert_eq!(report.dangerous().len(), 1);
        assert_eq!(report.dangerous()[0].name(), "android.permission.READ_CONTACTS");
        assert!(!report.dangerous()[0].description().is_empty());
        assert_eq!(report.normal(), &["android.permission.INTERNET"]);
        assert_eq!(report.unknown(), &["org.example.CUSTOM"]);
    }

    #[test]
    fn it_unsigned_signature_report() {
        let report = SignatureReport::from_certificates(Vec::new());

        assert!(!report.is_signed());
        assert_eq!(report.certificate_type(), CertificateType::Unsigned);
        assert_eq!(report.issuer(), "unknown");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["isSigned"], false);
        assert_eq!(json["certificateType"], "Unsigned");
        assert_eq!(
            CertificateType::Unverifiable.as_str(),
            SignatureReport::unverifiable().certificate_type().as_str()
        );
    }
}
