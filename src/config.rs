//! Configuration module.
//!
//! Handles and configures the initial settings and variables needed to run the program. Every
//! key of the configuration file is optional: missing keys keep their default values.

use crate::{archive::ArchiveLimits, scoring::ScoringPolicy};
use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Largest accepted number of worker threads.
const MAX_THREADS: usize = 256;

/// Configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Boolean representing if the application is being run in verbose mode.
    verbose: bool,
    /// Boolean representing if the application is being run in quiet mode.
    quiet: bool,
    /// Print the results as JSON instead of the human readable report.
    json: bool,
    /// Folder where JSON reports are written, if any.
    output_folder: Option<PathBuf>,
    /// Number of packages analyzed at the same time.
    threads: usize,
    /// Wall-clock budget of a single analysis, in milliseconds.
    timeout_ms: u64,
    /// Largest input accepted, in bytes.
    max_input_size: u64,
    /// Container limits.
    archive: ArchiveLimits,
    /// Scoring policy.
    scoring: ScoringPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            quiet: false,
            json: false,
            output_folder: None,
            threads: num_cpus::get().clamp(1, MAX_THREADS),
            timeout_ms: 30_000,
            max_input_size: 100 * 1024 * 1024,
            archive: ArchiveLimits::default(),
            scoring: ScoringPolicy::default(),
        }
    }
}

impl Config {
    /// Loads a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("could not read the configuration file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("the configuration file {} is invalid", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Modifies the options from the CLI.
    pub fn decorate_with_cli(&mut self, cli: &ArgMatches) -> Result<()> {
        self.verbose = self.verbose || cli.get_flag("verbose");
        self.quiet = self.quiet || cli.get_flag("quiet");
        self.json = self.json || cli.get_flag("json");

        if let Some(folder) = cli.get_one::<PathBuf>("output") {
            self.output_folder = Some(folder.clone());
        }
        if let Some(threads) = cli.get_one::<usize>("threads") {
            self.threads = *threads;
        }
        if let Some(timeout) = cli.get_one::<u64>("timeout") {
            self.timeout_ms = *timeout;
        }
        if cli.get_flag("extended") {
            self.scoring.extended = true;
        }

        if self.verbose && self.quiet {
            bail!("the verbose and quiet modes cannot be used at the same time");
        }
        self.validate()
    }

    /// Checks that the values can be used.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 || self.threads > MAX_THREADS {
            bail!(
                "the number of threads must be between 1 and {}, found {}",
                MAX_THREADS,
                self.threads
            );
        }
        if self.max_input_size == 0 {
            bail!("the maximum input size cannot be zero");
        }

        let archive = &self.archive;
        if archive.max_entries == 0
            || archive.max_entry_size == 0
            || archive.max_total_size == 0
            || archive.max_compression_ratio == 0
            || archive.max_certificates == 0
        {
            bail!("the archive limits cannot be zero");
        }

        let thresholds = &self.scoring.thresholds;
        if thresholds.suspicious > thresholds.malicious || thresholds.malicious > 100 {
            bail!(
                "the score thresholds must satisfy suspicious ({}) <= malicious ({}) <= 100",
                thresholds.suspicious,
                thresholds.malicious
            );
        }
        if let Some(rule) = self.scoring.combinations.iter().find(|r| !r.is_valid()) {
            bail!(
                "the combination rule `{}` does not name any permission",
                rule.warning
            );
        }
        Ok(())
    }

    /// Returns true if the application is running in `--verbose` mode, false otherwise.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Returns true if the application is running in `--quiet` mode, false otherwise.
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Returns true if results are printed as JSON.
    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Returns the folder where JSON reports are written, if any.
    pub fn output_folder(&self) -> Option<&Path> {
        self.output_folder.as_deref()
    }

    /// Returns the number of worker threads.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Returns the wall-clock budget of one analysis.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the largest accepted input, in bytes.
    pub fn max_input_size(&self) -> u64 {
        self.max_input_size
    }

    /// Returns the container limits.
    pub fn archive_limits(&self) -> &ArchiveLimits {
        &self.archive
    }

    /// Returns the scoring policy.
    pub fn scoring_policy(&self) -> &ScoringPolicy {
        &self.scoring
    }
}
