//! Verdict tiers.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Three-level verdict derived from the risk score.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
pub enum RiskLevel {
    /// No immediate red flags.
    Safe,
    /// Concerning patterns, install with caution.
    Suspicious,
    /// Multiple high-risk behaviors.
    Malicious,
}

impl RiskLevel {
    /// Gets the uppercase wire name of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Suspicious => "SUSPICIOUS",
            Self::Malicious => "MALICIOUS",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown risk level name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown risk level `{0}`")]
pub struct ParseRiskLevelError(String);

impl FromStr for RiskLevel {
    type Err = ParseRiskLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "suspicious" => Ok(Self::Suspicious),
            "malicious" => Ok(Self::Malicious),
            _ => Err(ParseRiskLevelError(s.to_owned())),
        }
    }
}

impl Serialize for RiskLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RiskLevel {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(de)?;
        name.parse().map_err(de::Error::custom)
    }
}
