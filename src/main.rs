//! APK triage command line tool.

#![forbid(unsafe_code)]

use anyhow::{anyhow, bail, Context, Result};
use apk_triage::{
    cli, initialize_config, initialize_logger, print_error, print_verdict,
    results::report::{Console, Generator, Json},
    AnalysisResult, Config, Engine,
};
use colored::Colorize;
use log::{debug, log_enabled, Level};
use std::{
    fs, mem,
    path::{Path, PathBuf},
    process,
    sync::{Arc, Mutex},
    thread,
};

/// Outcome of one package, tagged with its position in the command line.
type Outcome = (usize, PathBuf, Result<AnalysisResult>);

fn main() {
    if let Err(e) = run() {
        print_error(format!("{:#}", e));
        if !log_enabled!(Level::Debug) {
            eprintln!(
                "If you need more information, try to run the program again with the {} flag.",
                "-v".bold()
            );
        }

        process::exit(1);
    }
}

/// Analyzes every package given in the command line and prints the reports.
fn run() -> Result<()> {
    let cli = cli::generate().get_matches();
    initialize_logger(cli.get_flag("verbose"), cli.get_flag("quiet"))?;
    let config = initialize_config(&cli)?;

    let packages: Vec<PathBuf> = cli
        .get_many::<PathBuf>("packages")
        .map(|packages| packages.cloned().collect())
        .unwrap_or_default();
    let total = packages.len();
    debug!(
        "analyzing {} package{} with {} thread{}",
        total,
        if total == 1 { "" } else { "s" },
        config.threads(),
        if config.threads() == 1 { "" } else { "s" }
    );

    let outcomes = analyze_all(&config, packages)?;

    let mut failed = 0;
    let mut json = Json::new();
    let mut console = Console::stdout();
    let mut json_results = Vec::new();
    for (_, path, outcome) in outcomes {
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                print_error(format!("{}: {:#}", path.display(), e));
                failed += 1;
                continue;
            }
        };

        if config.output_folder().is_some() {
            if let Err(e) = json.generate(&config, &result) {
                print_error(format!("{}: {:#}", path.display(), e));
                failed += 1;
            }
        }
        if config.is_json() {
            json_results.push(result);
        } else if config.is_quiet() {
            print_verdict(
                result.metadata().file_name(),
                result.risk_score(),
                result.risk_level(),
            );
        } else {
            console.generate(&config, &result)?;
        }
    }

    if config.is_json() {
        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }
    for report in json.written() {
        debug!("report written to {}", report.display());
    }

    if failed > 0 {
        bail!("{} of {} packages could not be analyzed", failed, total);
    }
    Ok(())
}

/// Runs the analyses on a pool of worker threads, returning the outcomes in command line order.
fn analyze_all(config: &Config, packages: Vec<PathBuf>) -> Result<Vec<Outcome>> {
    let total = packages.len();
    let engine = Arc::new(Engine::new(config));
    let max_input_size = config.max_input_size();
    let queue = Arc::new(Mutex::new(
        packages.into_iter().enumerate().rev().collect::<Vec<_>>(),
    ));
    let outcomes = Arc::new(Mutex::new(Vec::with_capacity(total)));

    let handles = (0..config.threads().min(total))
        .map(|_| {
            let engine = Arc::clone(&engine);
            let queue = Arc::clone(&queue);
            let outcomes = Arc::clone(&outcomes);

            thread::spawn(move || loop {
                let next = match queue.lock() {
                    Ok(mut queue) => queue.pop(),
                    Err(_) => break,
                };
                let (index, path) = match next {
                    Some(next) => next,
                    None => break,
                };

                let outcome = analyze_file(&engine, &path, max_input_size);
                match outcomes.lock() {
                    Ok(mut outcomes) => outcomes.push((index, path, outcome)),
                    Err(_) => break,
                }
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow!("an analysis thread panicked"))?;
    }

    let mut outcomes = mem::take(
        &mut *outcomes
            .lock()
            .map_err(|_| anyhow!("the analysis results could not be collected"))?,
    );
    if outcomes.len() != total {
        bail!(
            "only {} of {} analyses finished",
            outcomes.len(),
            total
        );
    }
    outcomes.sort_by_key(|(index, _, _)| *index);
    Ok(outcomes)
}

/// Checks the boundary rules of one package file and analyzes it.
fn analyze_file(engine: &Engine, path: &Path, max_input_size: u64) -> Result<AnalysisResult> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .context("the path does not name a file")?;
    if !name.to_ascii_lowercase().ends_with(".apk") {
        bail!("only .apk files can be analyzed");
    }

    let size = fs::metadata(path)
        .with_context(|| format!("could not read the metadata of {}", path.display()))?
        .len();
    if size > max_input_size {
        bail!(
            "the file is {} bytes long, but at most {} bytes are accepted",
            size,
            max_input_size
        );
    }

    let bytes = fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
    debug!("analyzing {} ({} bytes)", path.display(), bytes.len());
    match engine.analyze(&bytes, &name, size) {
        Ok(result) => Ok(result),
        Err(e) => {
            let sha256 = e.sha256().to_owned();
            Err(anyhow::Error::new(e).context(format!("the package with SHA-256 {}", sha256)))
        }
    }
}
