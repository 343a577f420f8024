//! Kindly CLI: run a compositional model checker and explain its verdicts.

mod commands;
mod manifest;
mod report;

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use manifest::KindlyManifest;
use report::ReportFormat;

#[derive(Parser)]
#[command(name = "kindly", version, about = "Explain compositional verification results")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a program and print suggestions
    Check {
        /// Program file
        program: PathBuf,
        /// Engine timeout in seconds (overrides kindly.toml)
        #[arg(long)]
        timeout: Option<u64>,
        /// Top node to verify
        #[arg(long)]
        main: Option<String>,
        /// Report format (human, json)
        #[arg(long)]
        report: Option<String>,
        /// Save the engine's raw output for `kindly replay`
        #[arg(long)]
        save_output: Option<PathBuf>,
        /// Extra engine arguments, passed verbatim
        #[arg(last = true)]
        engine_args: Vec<String>,
    },
    /// Explain a previously captured engine output
    Replay {
        /// Captured output file
        output: PathBuf,
        /// Report format (human, json)
        #[arg(long)]
        report: Option<String>,
    },
    /// Check that the engine is installed and usable
    Doctor,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Check {
            program,
            timeout,
            main,
            report,
            save_output,
            engine_args,
        } => {
            let manifest = load_manifest_or_default(&cwd)?;
            let opts = commands::check::CheckOptions {
                program: &program,
                timeout,
                main_node: main.as_deref(),
                engine_args: &engine_args,
                report: ReportFormat::parse(report.as_deref())?,
                save_output: save_output.as_deref(),
            };
            commands::check::run(&manifest, &opts)
        }

        Commands::Replay { output, report } => {
            let manifest = load_manifest_or_default(&cwd)?;
            commands::replay::run(
                &output,
                &manifest.display,
                ReportFormat::parse(report.as_deref())?,
            )
        }

        Commands::Doctor => commands::doctor::run(&cwd),
    }
}

fn load_manifest_or_default(cwd: &Path) -> anyhow::Result<KindlyManifest> {
    Ok(KindlyManifest::find_and_load(cwd)?
        .map(|(manifest, _)| manifest)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn check_collects_engine_args() {
        let cli = Cli::try_parse_from([
            "kindly", "-vv", "check", "model.lus", "--timeout", "9", "--", "--smt_solver", "Z3",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Check {
                program,
                timeout,
                engine_args,
                ..
            } => {
                assert_eq!(program, PathBuf::from("model.lus"));
                assert_eq!(timeout, Some(9));
                assert_eq!(engine_args, vec!["--smt_solver", "Z3"]);
            }
            _ => panic!("expected check"),
        }
    }
}
