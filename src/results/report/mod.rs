//! Report generation module.

mod console;
mod json;

use crate::{config::Config, results::AnalysisResult};
use anyhow::Result;

pub use self::{console::Console, json::Json};

/// Trait that represents a type that can generate a report.
pub trait Generator {
    /// Generates an actual report.
    fn generate(&mut self, config: &Config, result: &AnalysisResult) -> Result<()>;
}
