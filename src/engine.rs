//! Analysis engine.
//!
//! The engine runs the stages of an analysis over one immutable input buffer: container,
//! manifest, certificates, permissions and scoring. Recoverable problems become warnings and set
//! the degraded flag, fatal ones are returned as [`EngineError`]. An [`Engine`] holds no mutable
//! state, so it can be shared by any number of threads.

use crate::{
    archive::{ArchiveLimits, PackageArchive},
    config::Config,
    error::{ArchiveError, EngineError, ManifestError, SignatureError},
    results::{AnalysisResult, Metadata, PermissionReport, SignatureReport},
    scoring::{self, ScoringPolicy},
    static_analysis::{
        certificate::{self, CertificateInfo},
        manifest::{self, ManifestDocument, MANIFEST_ENTRY},
        permission,
    },
    utils::{format_file_size, sha256_hex, Deadline},
};
use log::debug;
use std::time::Duration;

/// Default wall-clock budget of one analysis.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default largest accepted input.
const DEFAULT_MAX_INPUT_SIZE: u64 = 100 * 1024 * 1024;

/// Analyzes one package with the default settings.
pub fn analyze(
    bytes: &[u8],
    declared_name: &str,
    declared_size: u64,
) -> Result<AnalysisResult, EngineError> {
    Engine::default().analyze(bytes, declared_name, declared_size)
}

/// Package analysis engine.
#[derive(Debug, Clone)]
pub struct Engine {
    limits: ArchiveLimits,
    policy: ScoringPolicy,
    timeout: Duration,
    max_input_size: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            limits: ArchiveLimits::default(),
            policy: ScoringPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
        }
    }
}

impl Engine {
    /// Creates an engine with the limits and policy of the given configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            limits: *config.archive_limits(),
            policy: config.scoring_policy().clone(),
            timeout: config.timeout(),
            max_input_size: config.max_input_size(),
        }
    }

    /// Replaces the container limits.
    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replaces the scoring policy.
    pub fn with_policy(mut self, policy: ScoringPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the wall-clock budget of each analysis.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the largest accepted input.
    pub fn with_max_input_size(mut self, max_input_size: u64) -> Self {
        self.max_input_size = max_input_size;
        self
    }

    /// Gets the scoring policy.
    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Analyzes one package.
    ///
    /// `declared_name` and `declared_size` are reported as given. The engine never trusts the
    /// declared size: the input ceiling applies to the actual length of `bytes`.
    pub fn analyze(
        &self,
        bytes: &[u8],
        declared_name: &str,
        declared_size: u64,
    ) -> Result<AnalysisResult, EngineError> {
        let deadline = Deadline::after(self.timeout);
        let sha256 = sha256_hex(bytes);

        let size = bytes.len() as u64;
        if size > self.max_input_size {
            return Err(EngineError::ResourceLimit {
                sha256,
                size,
                limit: self.max_input_size,
            });
        }

        let archive = PackageArchive::open(bytes, &self.limits, deadline)
            .map_err(|e| self.archive_error(&sha256, e))?;
        debug!(
            "{}: {} entries in the container",
            declared_name,
            archive.list_entries().len()
        );

        let mut stage = Stage::default();
        if declared_size != size {
            stage.note(format!(
                "The declared file size ({} bytes) differs from the received size ({} bytes).",
                declared_size, size
            ));
        }

        let manifest = self.read_manifest(&archive, &sha256, &mut stage)?;
        self.check_deadline(deadline, &sha256)?;

        let certificates = self.read_certificates(&archive, &sha256, &mut stage)?;
        self.check_deadline(deadline, &sha256)?;

        let permissions = permission::classify(manifest.permissions());
        let (score, level, summary, rule_warnings) = scoring::score(
            &manifest,
            &permissions,
            certificates.as_deref().unwrap_or(&[]),
            stage.degraded,
            &self.policy,
        )
        .into_parts();
        debug!("{}: scored {} ({})", declared_name, score, level);

        let Stage {
            mut warnings,
            degraded,
        } = stage;
        warnings.extend(rule_warnings);

        let metadata = Metadata::new(
            manifest.package().to_owned(),
            manifest.version_name().to_owned(),
            manifest.version_code().to_owned(),
            format_file_size(declared_size),
            sha256,
            declared_name.to_owned(),
            declared_size,
            manifest.min_sdk(),
            manifest.target_sdk(),
        );
        let signature = match certificates {
            Some(certificates) => SignatureReport::from_certificates(certificates),
            None => SignatureReport::unverifiable(),
        };

        Ok(AnalysisResult::new(
            score,
            level,
            summary,
            warnings,
            metadata,
            PermissionReport::from(&permissions),
            signature,
            degraded,
        ))
    }

    /// Decodes the manifest, falling back to an unknown document if it is missing or invalid.
    ///
    /// A manifest entry that cannot be decompressed counts as an invalid manifest. Hostile
    /// entries still abort the analysis.
    fn read_manifest(
        &self,
        archive: &PackageArchive<'_>,
        sha256: &str,
        stage: &mut Stage,
    ) -> Result<ManifestDocument, EngineError> {
        let decoded = match archive.read_entry(MANIFEST_ENTRY) {
            Ok(contents) => manifest::decode(&contents),
            Err(ArchiveError::NotFound(_)) => Err(ManifestError::Missing),
            Err(ArchiveError::Corrupt(e)) | Err(ArchiveError::Truncated(e)) => {
                Err(ManifestError::Malformed(e))
            }
            Err(e) => return Err(self.archive_error(sha256, e)),
        };

        match decoded {
            Ok(document) => {
                for diagnostic in document.diagnostics() {
                    stage.note(diagnostic.clone());
                }
                Ok(document)
            }
            Err(e) => {
                stage.degrade(format!("The manifest could not be read: {}.", e));
                Ok(ManifestDocument::unknown())
            }
        }
    }

    /// Extracts the signing certificates.
    ///
    /// Returns `None` if signature data exists but could not be examined at all.
    fn read_certificates(
        &self,
        archive: &PackageArchive<'_>,
        sha256: &str,
        stage: &mut Stage,
    ) -> Result<Option<Vec<CertificateInfo>>, EngineError> {
        match certificate::extract(archive) {
            Ok(certificates) => {
                for certificate in &certificates {
                    for issue in certificate.issues() {
                        stage.note(issue.clone());
                    }
                    stage.degraded |= certificate.parse_error();
                }
                Ok(Some(certificates))
            }
            Err(SignatureError::TooManyCertificates { limit }) => {
                stage.degrade(format!(
                    "The signature data lists more than {} certificates and was not examined.",
                    limit
                ));
                Ok(None)
            }
            Err(SignatureError::Archive(e)) => Err(self.archive_error(sha256, e)),
        }
    }

    fn check_deadline(&self, deadline: Deadline, sha256: &str) -> Result<(), EngineError> {
        if deadline.is_expired() {
            Err(self.timeout_error(sha256))
        } else {
            Ok(())
        }
    }

    fn archive_error(&self, sha256: &str, error: ArchiveError) -> EngineError {
        match error {
            ArchiveError::DeadlineExceeded => self.timeout_error(sha256),
            source => EngineError::Archive {
                sha256: sha256.to_owned(),
                source,
            },
        }
    }

    fn timeout_error(&self, sha256: &str) -> EngineError {
        EngineError::Timeout {
            sha256: sha256.to_owned(),
            limit: self.timeout,
        }
    }
}

/// Degradation notes collected while the stages run.
#[derive(Default)]
struct Stage {
    warnings: Vec<String>,
    degraded: bool,
}

impl Stage {
    fn note<S: Into<String>>(&mut self, warning: S) {
        self.warnings.push(warning.into());
    }

    fn degrade<S: Into<String>>(&mut self, warning: S) {
        self.degraded = true;
        self.note(warning);
    }
}
