//! Permission classification.

mod table;

pub use self::table::TABLE_VERSION;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

/// Description given to permissions missing from the reference table.
const UNKNOWN_DESCRIPTION: &str =
    "Not a known platform permission, possibly defined by the application or a vendor";

/// Severity tier of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionTier {
    /// Low risk permission, granted at install time.
    Normal,
    /// Permission whose misuse has material security or privacy impact.
    Dangerous,
    /// Permission missing from the reference table. Not proven benign.
    Unknown,
}

impl PermissionTier {
    /// Gets the tier name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Dangerous => "DANGEROUS",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PermissionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested permission and its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionVerdict {
    name: String,
    tier: PermissionTier,
    description: String,
}

impl PermissionVerdict {
    /// Classifies a single permission.
    pub fn new<S: Into<String>>(name: S) -> Self {
        let name = name.into();
        let (tier, description) =
            table::get(&name).unwrap_or((PermissionTier::Unknown, UNKNOWN_DESCRIPTION));
        Self {
            name,
            tier,
            description: description.to_owned(),
        }
    }

    /// Gets the permission name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the tier.
    pub fn tier(&self) -> PermissionTier {
        self.tier
    }

    /// Gets the human readable description.
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Requested permissions grouped by tier, each group in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedPermissions {
    dangerous: Vec<PermissionVerdict>,
    normal: Vec<PermissionVerdict>,
    unknown: Vec<PermissionVerdict>,
}

impl ClassifiedPermissions {
    /// Gets the dangerous permissions.
    pub fn dangerous(&self) -> &[PermissionVerdict] {
        &self.dangerous
    }

    /// Gets the normal permissions.
    pub fn normal(&self) -> &[PermissionVerdict] {
        &self.normal
    }

    /// Gets the permissions missing from the reference table.
    pub fn unknown(&self) -> &[PermissionVerdict] {
        &self.unknown
    }

    /// Whether the given permission was requested, whatever its tier.
    pub fn contains(&self, name: &str) -> bool {
        self.iter().any(|verdict| verdict.name == name)
    }

    /// Iterates over every verdict, dangerous first, then normal, then unknown.
    pub fn iter(&self) -> impl Iterator<Item = &PermissionVerdict> {
        self.dangerous
            .iter()
            .chain(self.normal.iter())
            .chain(self.unknown.iter())
    }

    /// Total number of classified permissions.
    pub fn len(&self) -> usize {
        self.dangerous.len() + self.normal.len() + self.unknown.len()
    }

    /// Whether no permission was classified.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classifies the given permission names against the reference table.
///
/// Repeated names are classified once.
pub fn classify<S: AsRef<str>>(names: &[S]) -> ClassifiedPermissions {
    let mut classified = ClassifiedPermissions::default();
    let mut seen = HashSet::new();
    for name in names {
        let name = name.as_ref();
        if !seen.insert(name) {
            continue;
        }
        let verdict = PermissionVerdict::new(name);
        match verdict.tier {
            PermissionTier::Dangerous => classified.dangerous.push(verdict),
            PermissionTier::Normal => classified.normal.push(verdict),
            PermissionTier::Unknown => classified.unknown.push(verdict),
        }
    }

    debug!(
        "permissions classified with table v{}: {} dangerous, {} normal, {} unknown",
        TABLE_VERSION,
        classified.dangerous.len(),
        classified.normal.len(),
        classified.unknown.len()
    );
    classified
}
