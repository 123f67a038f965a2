//! Module containing the definition of error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while opening or reading the package container.
///
/// Every variant except `NotFound` is fatal for an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    /// The container structure is internally inconsistent.
    #[error("the archive is corrupt: {0}")]
    Corrupt(String),
    /// The input ended before a structure it declared.
    #[error("the archive is truncated: {0}")]
    Truncated(String),
    /// A size, count or path guard tripped.
    #[error("the archive was rejected as hostile: {0}")]
    Malicious(String),
    /// The requested entry does not exist.
    #[error("entry `{0}` was not found in the archive")]
    NotFound(String),
    /// The analysis ran out of time while reading the container.
    #[error("the archive could not be processed within the time limit")]
    DeadlineExceeded,
}

/// Errors raised while decoding the binary manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// The package has no `AndroidManifest.xml` entry.
    #[error("the package does not contain an AndroidManifest.xml file")]
    Missing,
    /// The token stream is structurally invalid.
    #[error("the manifest is malformed: {0}")]
    Malformed(String),
    /// A chunk extends past the end of the document.
    #[error("the manifest is truncated: {0}")]
    Truncated(String),
    /// A string reference points outside the string pool.
    #[error("the manifest references string {index}, but its string pool holds {pool_size}")]
    BadReference {
        /// Referenced index.
        index: u32,
        /// Number of strings in the pool.
        pool_size: usize,
    },
}

/// Errors raised while parsing one certificate or signature block.
///
/// These never abort an analysis: the affected certificate is reported with its parse error flag
/// set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    /// Invalid DER encoding or unexpected X.509 structure.
    #[error("invalid certificate encoding: {0}")]
    Der(String),
    /// Invalid PKCS#7 signed data envelope.
    #[error("invalid PKCS#7 signature block: {0}")]
    Pkcs7(String),
    /// Invalid APK signing block.
    #[error("invalid APK signing block: {0}")]
    SigningBlock(String),
}

/// Errors returned by the certificate extractor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The container could not be read.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    /// The package carries more certificates than the configured ceiling.
    #[error("the package carries more than {limit} signing certificates")]
    TooManyCertificates {
        /// Configured ceiling.
        limit: usize,
    },
}

/// Fatal analysis errors.
///
/// All variants carry the SHA-256 of the input, which can always be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The container is not a valid or acceptable archive.
    #[error("the package could not be analyzed: {source}")]
    Archive {
        /// Hex SHA-256 of the input bytes.
        sha256: String,
        /// Underlying archive error.
        #[source]
        source: ArchiveError,
    },
    /// The analysis did not finish within its time limit.
    #[error("the analysis did not finish within {} ms", limit.as_millis())]
    Timeout {
        /// Hex SHA-256 of the input bytes.
        sha256: String,
        /// Configured limit.
        limit: Duration,
    },
    /// The input is larger than the engine accepts.
    #[error("the package is {size} bytes long, but at most {limit} bytes are accepted")]
    ResourceLimit {
        /// Hex SHA-256 of the input bytes.
        sha256: String,
        /// Actual input size.
        size: u64,
        /// Configured ceiling.
        limit: u64,
    },
}

impl EngineError {
    /// Gets the SHA-256 of the input that failed.
    pub fn sha256(&self) -> &str {
        match self {
            Self::Archive { sha256, .. }
            | Self::Timeout { sha256, .. }
            | Self::ResourceLimit { sha256, .. } => sha256,
        }
    }

    /// Whether the failure is caused by the content of the input rather than by its cost.
    ///
    /// Content errors must not be retried without changing the input.
    pub fn is_content_error(&self) -> bool {
        matches!(self, Self::Archive { .. })
    }
}
