//! JSON report generation module.

use crate::{
    config::Config,
    results::{report::Generator, AnalysisResult},
};
use anyhow::{Context, Result};
use log::debug;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// JSON report generator.
///
/// Writes `<file stem>.json` to the configured output folder.
#[derive(Debug, Default)]
pub struct Json {
    written: Vec<PathBuf>,
}

impl Json {
    /// Creates a new JSON report generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the reports written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Path of the report of the given result inside `folder`.
    pub fn report_path(folder: &Path, result: &AnalysisResult) -> PathBuf {
        let stem = Path::new(result.metadata().file_name())
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| result.metadata().sha256().to_owned());
        folder.join(format!("{}.json", stem))
    }
}

impl Generator for Json {
    fn generate(&mut self, config: &Config, result: &AnalysisResult) -> Result<()> {
        let folder = config
            .output_folder()
            .context("no output folder was configured for the JSON report")?;
        if !folder.exists() {
            fs::create_dir_all(folder).with_context(|| {
                format!("could not create the output folder {}", folder.display())
            })?;
        }

        let path = Self::report_path(folder, result);
        debug!("writing JSON report to {}", path.display());
        let mut f = BufWriter::new(
            File::create(&path)
                .with_context(|| format!("could not create the report {}", path.display()))?,
        );
        serde_json::to_writer_pretty(&mut f, result)?;
        f.flush()?;

        self.written.push(path);
        Ok(())
    }
}
