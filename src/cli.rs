//! Command line interface.

use clap::{crate_authors, crate_description, crate_version, value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

/// Generates the command line interface.
pub fn generate() -> Command {
    Command::new("apk-triage")
        .version(crate_version!())
        .author(crate_authors!())
        .about(crate_description!())
        .arg(
            Arg::new("packages")
                .help("Android packages (.apk) to analyze")
                .value_name("PACKAGE")
                .value_parser(value_parser!(PathBuf))
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .conflicts_with("quiet")
                .help("If you'd like the analyzer to talk more than necessary"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("If you'd like a zen analyzer. Only errors and verdicts are printed"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Prints the results as JSON"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Writes a JSON report for every package to the given folder"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("THREADS")
                .value_parser(value_parser!(usize))
                .help("Number of packages analyzed at the same time"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .help("Time limit of each analysis, in milliseconds"),
        )
        .arg(
            Arg::new("extended")
                .long("extended")
                .action(ArgAction::SetTrue)
                .help("Enables the extended scoring rules"),
        )
}

#[cfg(test)]
mod tests {
    use super::generate;
    use std::path::PathBuf;

    #[test]
    fn it_cli() {
        generate().debug_assert();

        let matches = generate()
            .try_get_matches_from(vec!["apk-triage", "a.apk", "b.APK"])
            .unwrap();
        let packages: Vec<&PathBuf> = matches.get_many::<PathBuf>("packages").unwrap().collect();
        assert_eq!(packages.len(), 2);
        assert!(!matches.get_flag("verbose"));
        assert!(matches.get_one::<usize>("threads").is_none());

        assert!(generate().try_get_matches_from(vec!["apk-triage"]).is_err());
        assert!(generate()
            .try_get_matches_from(vec!["apk-triage", "-t", "many", "a.apk"])
            .is_err());
    }
}
