//! `kindly check`: run the engine on a program and explain the verdicts.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use kindly_driver::{EngineArgs, ProcessDriver, ProgramInput};
use tracing::info;

use crate::manifest::KindlyManifest;
use crate::report::{self, ReportFormat};

/// Options collected from the command line.
#[derive(Debug, Clone)]
pub struct CheckOptions<'a> {
    pub program: &'a Path,
    /// Overrides the manifest timeout, in seconds.
    pub timeout: Option<u64>,
    pub main_node: Option<&'a str>,
    /// Appended after the manifest's engine arguments.
    pub engine_args: &'a [String],
    pub report: ReportFormat,
    /// Where to keep the engine's raw output for `kindly replay`.
    pub save_output: Option<&'a Path>,
}

pub fn run(manifest: &KindlyManifest, opts: &CheckOptions<'_>) -> Result<()> {
    if !opts.program.is_file() {
        bail!("program file not found: {}", opts.program.display());
    }

    let args = engine_args(manifest, opts);
    let mut driver = ProcessDriver::new(manifest.engine.driver_config());
    let outcome = driver.execute(
        &args,
        ProgramInput::File(opts.program.to_path_buf()),
        |completion| info!(?completion, "engine finished"),
    );

    let mut session = match outcome {
        Ok(session) => session,
        Err(e) => {
            if let (Some(path), Some(output)) = (opts.save_output, e.output()) {
                save(path, &output.stdout)?;
            }
            if let Some(partial) = e.partial_model() {
                eprintln!(
                    "note: {} component(s) were decoded before the failure",
                    partial.component_count()
                );
            }
            return Err(e).with_context(|| format!("checking {}", opts.program.display()));
        }
    };
    if let Some(path) = opts.save_output {
        save(path, &session.output.stdout)?;
    }

    let transcript = std::mem::take(&mut session.transcript);
    let model = session
        .into_final()
        .context("verification was cancelled; results are incomplete")?;
    report::print(&model, &transcript, &manifest.display, opts.report)
}

fn engine_args(manifest: &KindlyManifest, opts: &CheckOptions<'_>) -> Vec<String> {
    let mut args = EngineArgs::new();
    if let Some(secs) = opts.timeout.or(manifest.engine.timeout) {
        args = args.timeout(Duration::from_secs(secs));
    }
    if let Some(node) = opts.main_node {
        args = args.main_node(node);
    }
    for raw in manifest.engine.args.iter().chain(opts.engine_args) {
        args = args.arg(raw.clone());
    }
    args.to_args()
}

fn save(path: &Path, stdout: &str) -> Result<()> {
    fs::write(path, stdout).with_context(|| format!("writing {}", path.display()))
}
