//! APK triage
//!
//! Static risk triage for Android application packages. The library reads an APK from memory,
//! decodes its binary manifest, extracts its signing certificates, classifies the requested
//! permissions and turns those facts into a risk score and a verdict:
//!
//! ```no_run
//! let bytes = std::fs::read("app.apk").unwrap();
//! let result = apk_triage::analyze(&bytes, "app.apk", bytes.len() as u64).unwrap();
//! println!("{} ({}/100)", result.risk_level(), result.risk_score());
//! ```
//!
//! Analyses are deterministic and share no mutable state, so a single [`Engine`] can serve any
//! number of threads.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    unused_qualifications,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_results,
    variant_size_differences,
    clippy::doc_markdown,
    clippy::items_after_statements,
    clippy::nonminimal_bool,
    clippy::string_add,
    clippy::use_debug
)]

pub mod archive;
mod byte_reader;
pub mod cli;
mod config;
pub mod engine;
mod error;
pub mod results;
mod risk_level;
pub mod scoring;
mod sdk_number;
pub mod static_analysis;
#[cfg(test)]
mod test_utils;
mod utils;

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::{env, io::Write, path::PathBuf};

pub use crate::{
    config::Config,
    engine::{analyze, Engine},
    error::{ArchiveError, CertificateError, EngineError, ManifestError, SignatureError},
    results::AnalysisResult,
    risk_level::{ParseRiskLevelError, RiskLevel},
    sdk_number::SdkNumber,
    utils::{format_file_size, print_error, print_verdict, print_warning},
};

/// Initialize the config with the config files and command line options.
///
/// On UNIX, if the local file (`config.toml`) does not exist, but the global one does
/// (`/etc/apk-triage/config.toml`), the latter is used. Otherwise, the local file is used.
/// Finally, if none of the files could be loaded, the default config is used.
pub fn initialize_config(cli: &ArgMatches) -> Result<Config> {
    let config_path = PathBuf::from("config.toml");
    let global_config_path = PathBuf::from("/etc/apk-triage/config.toml");

    let mut config =
        if cfg!(target_family = "unix") && !config_path.exists() && global_config_path.exists() {
            Config::from_file(&global_config_path).context(
                "there was an error when reading the /etc/apk-triage/config.toml file",
            )?
        } else if config_path.exists() {
            Config::from_file(&config_path)
                .context("there was an error when reading the config.toml file")?
        } else {
            print_warning("Config file not found. Using default configuration");
            Config::default()
        };

    config
        .decorate_with_cli(cli)
        .context("the command line options are not valid")?;
    Ok(config)
}

/// Initializes the logger.
///
/// `RUST_LOG` takes precedence over the verbosity flags when it is set.
pub fn initialize_logger(is_verbose: bool, is_quiet: bool) -> Result<()> {
    let log_level = if is_verbose {
        LevelFilter::Debug
    } else if is_quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    let _ = builder.format(|buf, record| match record.level() {
        Level::Warn => writeln!(
            buf,
            "{}{}",
            "Warning: ".bold().yellow(),
            record.args().to_string().yellow()
        ),
        Level::Error => writeln!(
            buf,
            "{}{}",
            "Error: ".bold().red(),
            record.args().to_string().red()
        ),
        Level::Debug => writeln!(
            buf,
            "{}{}",
            "Debug: ".bold(),
            record.args().to_string().bold()
        ),
        Level::Info => writeln!(buf, "{}", record.args()),
        Level::Trace => writeln!(buf, "{}: {}", record.level(), record.args()),
    });

    let _ = if let Ok(env_log) = env::var("RUST_LOG") {
        builder.parse_filters(&env_log)
    } else {
        builder.filter(Some("apk_triage"), log_level)
    };

    builder
        .try_init()
        .context("could not initialize the logger")
}
