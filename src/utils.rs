//! Utilities module.

use crate::risk_level::RiskLevel;
use colored::{ColoredString, Colorize};
use log::{error, warn};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

/// Prints a warning through the logger.
pub fn print_warning<S: AsRef<str>>(warning: S) {
    warn!("{}", warning.as_ref());
}

/// Prints an error through the logger.
pub fn print_error<S: AsRef<str>>(error: S) {
    error!("{}", error.as_ref());
}

/// Prints a verdict line, colored by its risk level.
#[allow(clippy::print_stdout)]
pub fn print_verdict<S: AsRef<str>>(package: S, score: u8, level: RiskLevel) {
    let verdict = colorize_level(level, format!("{} ({}/100)", level, score));
    println!("{}: {}", package.as_ref().italic(), verdict.bold());
}

/// Colors a text by the risk level it belongs to.
pub fn colorize_level(level: RiskLevel, text: String) -> ColoredString {
    match level {
        RiskLevel::Safe => text.green(),
        RiskLevel::Suspicious => text.yellow(),
        RiskLevel::Malicious => text.red(),
    }
}

/// Renders a byte count with two decimals in the largest fitting binary unit.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    #[allow(clippy::cast_precision_loss)]
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", size, UNITS[unit])
}

/// Lowercase hex SHA-256 of the given bytes.
pub fn sha256_hex<B: AsRef<[u8]>>(bytes: B) -> String {
    hex::encode(Sha256::digest(bytes.as_ref()))
}

/// Lowercase hex SHA-1 of the given bytes.
pub fn sha1_hex<B: AsRef<[u8]>>(bytes: B) -> String {
    hex::encode(Sha1::digest(bytes.as_ref()))
}

/// Wall-clock budget of one analysis, checked cooperatively between units of work.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires: Option<Instant>,
}

impl Deadline {
    /// Creates a deadline that expires `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires: Instant::now().checked_add(timeout),
        }
    }

    /// Creates a deadline that never expires.
    pub fn unbounded() -> Self {
        Self { expires: None }
    }

    /// Whether the budget is spent.
    pub fn is_expired(&self) -> bool {
        self.expires
            .map_or(false, |expires| Instant::now() >= expires)
    }
}
