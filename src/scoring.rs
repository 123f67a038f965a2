//! Risk scoring.
//!
//! The score is a weighted sum of independent rules, clamped to 0-100. Every rule only adds
//! points, so the score never decreases when more risk is observed. Rule weights and verdict
//! thresholds come from a [`ScoringPolicy`], which can be loaded from the configuration file.

use crate::{
    risk_level::RiskLevel,
    sdk_number::SdkNumber,
    static_analysis::{
        certificate::CertificateInfo, manifest::ManifestDocument,
        permission::ClassifiedPermissions,
    },
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

/// Highest possible score.
pub const MAX_SCORE: u8 = 100;

lazy_static! {
    static ref PACKAGE_NAME: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)+$")
            .expect("package name pattern is valid");
}

/// Score boundaries between verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Lowest score considered suspicious.
    pub suspicious: u8,
    /// Lowest score considered malicious.
    pub malicious: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            suspicious: 30,
            malicious: 60,
        }
    }
}

impl Thresholds {
    /// Gets the verdict for a score.
    pub fn level(&self, score: u8) -> RiskLevel {
        if score >= self.malicious {
            RiskLevel::Malicious
        } else if score >= self.suspicious {
            RiskLevel::Suspicious
        } else {
            RiskLevel::Safe
        }
    }
}

/// Extra points for a risky combination of requested permissions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombinationRule {
    /// Permissions that must all be requested.
    #[serde(default)]
    pub all_of: Vec<String>,
    /// Permissions of which at least one must be requested. Ignored if empty.
    #[serde(default)]
    pub any_of: Vec<String>,
    /// Minimum number of dangerous permissions.
    #[serde(default)]
    pub min_dangerous: usize,
    /// Points added when the rule matches.
    pub weight: u32,
    /// Warning reported when the rule matches.
    pub warning: String,
}

impl CombinationRule {
    fn new(
        all_of: &[&str],
        any_of: &[&str],
        min_dangerous: usize,
        weight: u32,
        warning: &str,
    ) -> Self {
        Self {
            all_of: all_of.iter().map(|p| (*p).to_owned()).collect(),
            any_of: any_of.iter().map(|p| (*p).to_owned()).collect(),
            min_dangerous,
            weight,
            warning: warning.to_owned(),
        }
    }

    /// Whether the rule names at least one permission.
    pub fn is_valid(&self) -> bool {
        !self.all_of.is_empty() || !self.any_of.is_empty()
    }

    fn matches(&self, permissions: &ClassifiedPermissions) -> bool {
        self.is_valid()
            && self.all_of.iter().all(|p| permissions.contains(p))
            && (self.any_of.is_empty() || self.any_of.iter().any(|p| permissions.contains(p)))
            && permissions.dangerous().len() >= self.min_dangerous
    }
}

fn default_combinations() -> Vec<CombinationRule> {
    const INTERNET: &str = "android.permission.INTERNET";
    vec![
        CombinationRule::new(
            &[INTERNET],
            &[
                "android.permission.SEND_SMS",
                "android.permission.READ_SMS",
                "android.permission.RECEIVE_SMS",
            ],
            0,
            20,
            "The package can handle text messages and reach the network, a common pattern \
             of premium SMS fraud and one-time code theft.",
        ),
        CombinationRule::new(
            &[],
            &["android.permission.BIND_ACCESSIBILITY_SERVICE"],
            0,
            25,
            "The package requests an accessibility service, which can observe and control \
             everything on screen.",
        ),
        CombinationRule::new(
            &[INTERNET, "android.permission.SYSTEM_ALERT_WINDOW"],
            &[],
            0,
            15,
            "The package can draw over other apps and reach the network, a common phishing \
             overlay pattern.",
        ),
        CombinationRule::new(
            &[],
            &["android.permission.BIND_DEVICE_ADMIN"],
            0,
            20,
            "The package requests device administration, which can lock or wipe the device.",
        ),
        CombinationRule::new(
            &[INTERNET],
            &[
                "android.permission.ACCESS_FINE_LOCATION",
                "android.permission.ACCESS_COARSE_LOCATION",
                "android.permission.ACCESS_BACKGROUND_LOCATION",
            ],
            4,
            10,
            "The package can track the location and reach the network alongside several \
             other dangerous permissions.",
        ),
    ]
}

/// Weights and thresholds of the scoring rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringPolicy {
    /// Points per dangerous permission.
    pub dangerous_weight: u32,
    /// Maximum points contributed by dangerous permissions.
    pub dangerous_cap: u32,
    /// Points if no usable signing certificate was found.
    pub unsigned_weight: u32,
    /// Points if the version facts are missing or inconsistent.
    pub version_facts_weight: u32,
    /// Target API levels below this one are considered stale.
    pub stale_target_sdk: u32,
    /// Points per unknown permission beyond the tolerance.
    pub unknown_weight: u32,
    /// Number of unknown permissions that add no points.
    pub unknown_tolerance: usize,
    /// Points if the package name is missing or malformed.
    pub package_name_weight: u32,
    /// Points if part of the package could not be examined.
    pub degraded_weight: u32,
    /// Verdict thresholds.
    pub thresholds: Thresholds,
    /// Whether the rules below are evaluated.
    pub extended: bool,
    /// Points if the package is signed with a debug certificate.
    pub debug_certificate_weight: u32,
    /// Points if the application is debuggable.
    pub debuggable_weight: u32,
    /// Risky permission combinations.
    pub combinations: Vec<CombinationRule>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            dangerous_weight: 8,
            dangerous_cap: 40,
            unsigned_weight: 15,
            version_facts_weight: 10,
            stale_target_sdk: 14,
            unknown_weight: 10,
            unknown_tolerance: 3,
            package_name_weight: 5,
            degraded_weight: 10,
            thresholds: Thresholds::default(),
            extended: false,
            debug_certificate_weight: 15,
            debuggable_weight: 10,
            combinations: default_combinations(),
        }
    }
}

impl ScoringPolicy {
    /// Default policy with the extended rules enabled.
    pub fn extended() -> Self {
        Self {
            extended: true,
            ..Self::default()
        }
    }
}

/// Outcome of the scoring rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreReport {
    score: u8,
    level: RiskLevel,
    summary: String,
    warnings: Vec<String>,
}

impl ScoreReport {
    /// Gets the score, between 0 and 100.
    pub fn score(&self) -> u8 {
        self.score
    }

    /// Gets the verdict.
    pub fn level(&self) -> RiskLevel {
        self.level
    }

    /// Gets the one sentence summary.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Gets one warning per triggered rule, in evaluation order.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub(crate) fn into_parts(self) -> (u8, RiskLevel, String, Vec<String>) {
        (self.score, self.level, self.summary, self.warnings)
    }
}

/// Running total of the triggered rules.
#[derive(Default)]
struct Tally {
    points: u32,
    warnings: Vec<String>,
}

impl Tally {
    fn add<S: Into<String>>(&mut self, points: u32, warning: S) {
        if points > 0 {
            self.points = self.points.saturating_add(points);
            self.warnings.push(warning.into());
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Describes the first problem found in the version facts.
fn version_facts_problem(manifest: &ManifestDocument, stale_target_sdk: u32) -> Option<String> {
    if !manifest.has_version_code() {
        return Some("The package does not declare a version code.".to_owned());
    }
    let target = match manifest.target_sdk() {
        Some(target) => target,
        None => return Some("The package does not declare a target platform.".to_owned()),
    };
    if let Some(min) = manifest.min_sdk() {
        if target < min {
            return Some(format!(
                "The target platform {} is older than the minimum platform {}.",
                SdkNumber::from(target),
                SdkNumber::from(min)
            ));
        }
    }
    if target < stale_target_sdk {
        return Some(format!(
            "The package targets {}, a very old platform that bypasses modern protections.",
            SdkNumber::from(target)
        ));
    }
    None
}

/// Summary sentence of a verdict.
pub fn summary(level: RiskLevel, dangerous: usize) -> String {
    let s = plural(dangerous);
    match level {
        RiskLevel::Safe => format!(
            "This APK requests {} dangerous permission{} and shows no immediate red flags. \
             Always verify the source before installing any app.",
            dangerous, s
        ),
        RiskLevel::Suspicious => format!(
            "This APK requests {} potentially dangerous permission{} and shows concerning \
             patterns. Exercise extreme caution before installing.",
            dangerous, s
        ),
        RiskLevel::Malicious => format!(
            "This APK exhibits multiple high-risk behaviors ({} dangerous permission{}) and \
             should NOT be installed.",
            dangerous, s
        ),
    }
}

/// Scores the facts extracted from a package.
///
/// `degraded` tells whether a recoverable failure kept part of the package from being examined.
/// Missing data is scored as risk, never as a clean result.
pub fn score(
    manifest: &ManifestDocument,
    permissions: &ClassifiedPermissions,
    certificates: &[CertificateInfo],
    degraded: bool,
    policy: &ScoringPolicy,
) -> ScoreReport {
    let mut tally = Tally::default();

    let dangerous = permissions.dangerous().len();
    let dangerous_points = u32::try_from(dangerous)
        .unwrap_or(u32::MAX)
        .saturating_mul(policy.dangerous_weight)
        .min(policy.dangerous_cap);
    tally.add(
        dangerous_points,
        format!(
            "The package requests {} dangerous permission{}.",
            dangerous,
            plural(dangerous)
        ),
    );

    if !certificates.iter().any(CertificateInfo::is_usable) {
        let warning = if certificates.is_empty() {
            "No signing certificate was found."
        } else {
            "None of the signing certificates could be read."
        };
        tally.add(policy.unsigned_weight, warning);
    }

    if let Some(problem) = version_facts_problem(manifest, policy.stale_target_sdk) {
        tally.add(policy.version_facts_weight, problem);
    }

    let unknown = permissions.unknown().len();
    if unknown > policy.unknown_tolerance {
        let extra = unknown - policy.unknown_tolerance;
        tally.add(
            u32::try_from(extra)
                .unwrap_or(u32::MAX)
                .saturating_mul(policy.unknown_weight),
            format!(
                "The package requests {} permission{} missing from the reference table.",
                unknown,
                plural(unknown)
            ),
        );
    }

    if !manifest.has_package() {
        tally.add(policy.package_name_weight, "The package name is missing.");
    } else if !PACKAGE_NAME.is_match(manifest.package()) {
        tally.add(
            policy.package_name_weight,
            format!(
                "The package name {:?} is not in reverse domain notation.",
                manifest.package()
            ),
        );
    }

    if degraded {
        tally.add(
            policy.degraded_weight,
            "Part of the package could not be examined, so its facts are incomplete.",
        );
    }

    if policy.extended {
        if certificates.iter().any(CertificateInfo::is_debug) {
            tally.add(
                policy.debug_certificate_weight,
                "The package is signed with a debug certificate.",
            );
        }
        if manifest.is_debuggable() {
            tally.add(policy.debuggable_weight, "The application is debuggable.");
        }
        for rule in &policy.combinations {
            if rule.matches(permissions) {
                tally.add(rule.weight, rule.warning.as_str());
            }
        }
    }

    let score = u8::try_from(tally.points.min(u32::from(MAX_SCORE))).unwrap_or(MAX_SCORE);
    let level = policy.thresholds.level(score);
    ScoreReport {
        score,
        level,
        summary: summary(level, dangerous),
        warnings: tally.warnings,
    }
}
