//! Human readable report, printed to a terminal.

use crate::{
    config::Config,
    results::{report::Generator, AnalysisResult, CertificateType},
    sdk_number::SdkNumber,
    utils::colorize_level,
};
use anyhow::Result;
use colored::Colorize;
use std::io::{self, Stdout, Write};

/// Console report generator.
#[derive(Debug)]
pub struct Console<W: Write = Stdout> {
    out: W,
}

impl Console<Stdout> {
    /// Creates a generator printing to the standard output.
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> Console<W> {
    /// Creates a generator printing to the given writer.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Gets the writer back.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_report(&mut self, config: &Config, result: &AnalysisResult) -> io::Result<()> {
        let metadata = result.metadata();
        writeln!(
            self.out,
            "{} {}",
            metadata.file_name().bold(),
            format!("({})", metadata.package_name()).italic()
        )?;
        writeln!(
            self.out,
            "  Verdict: {}",
            colorize_level(
                result.risk_level(),
                format!("{} ({}/100)", result.risk_level(), result.risk_score())
            )
            .bold()
        )?;
        writeln!(self.out, "  {}", result.summary())?;
        if result.is_degraded() {
            writeln!(
                self.out,
                "  {}",
                "Part of the package could not be examined.".yellow()
            )?;
        }

        writeln!(self.out)?;
        writeln!(self.out, "  {}", "Warnings:".bold())?;
        for warning in result.warnings() {
            writeln!(self.out, "    - {}", warning)?;
        }

        writeln!(self.out)?;
        writeln!(self.out, "  {}", "Package:".bold())?;
        writeln!(
            self.out,
            "    Version: {} ({})",
            metadata.version_name(),
            metadata.version_code()
        )?;
        writeln!(self.out, "    Size: {}", metadata.file_size())?;
        writeln!(self.out, "    SHA-256: {}", metadata.sha256())?;
        if let Some(min) = metadata.min_sdk_version() {
            writeln!(self.out, "    Minimum platform: {}", SdkNumber::from(min))?;
        }
        if let Some(target) = metadata.target_sdk_version() {
            writeln!(self.out, "    Target platform: {}", SdkNumber::from(target))?;
        }

        let permissions = result.permissions();
        writeln!(self.out)?;
        writeln!(
            self.out,
            "  {} {} dangerous, {} normal, {} unknown",
            "Permissions:".bold(),
            permissions.dangerous().len(),
            permissions.normal().len(),
            permissions.unknown().len()
        )?;
        for permission in permissions.dangerous() {
            writeln!(
                self.out,
                "    {} {}",
                permission.name().red(),
                format!("- {}", permission.description()).dimmed()
            )?;
        }
        if config.is_verbose() {
            for name in permissions.normal() {
                writeln!(self.out, "    {}", name)?;
            }
        }
        for name in permissions.unknown() {
            writeln!(self.out, "    {} {}", name.yellow(), "- unknown".dimmed())?;
        }

        let signature = result.signature();
        writeln!(self.out)?;
        let certificate_type = match signature.certificate_type() {
            CertificateType::Release => CertificateType::Release.as_str().green(),
            other => other.as_str().yellow(),
        };
        writeln!(self.out, "  {} {}", "Signature:".bold(), certificate_type)?;
        writeln!(self.out, "    Issuer: {}", signature.issuer())?;
        if !signature.schemes().is_empty() {
            let schemes: Vec<&str> = signature.schemes().iter().map(|s| s.as_str()).collect();
            writeln!(self.out, "    Schemes: {}", schemes.join(", "))?;
        }
        if config.is_verbose() {
            for certificate in signature.certificates() {
                writeln!(
                    self.out,
                    "    {} {}",
                    certificate.sha256_fingerprint(),
                    certificate.subject()
                )?;
            }
        }

        writeln!(self.out)?;
        self.out.flush()
    }
}

impl<W: Write> Generator for Console<W> {
    fn generate(&mut self, config: &Config, result: &AnalysisResult) -> Result<()> {
        self.write_report(config, result)?;
        Ok(())
    }
}
