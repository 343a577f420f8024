//! `kindly doctor`: engine availability diagnostics.

use std::path::Path;

use anyhow::{Context, Result};
use kindly_driver::ProcessDriver;

use crate::manifest::{KindlyManifest, MANIFEST_NAME};

/// Probe the configured engine and print what was found.
pub fn run(project_dir: &Path) -> Result<()> {
    println!("=== Kindly Doctor ===");
    println!();
    println!("kindly version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("--- Project ---");
    let manifest = match KindlyManifest::find_and_load(project_dir) {
        Ok(Some((manifest, dir))) => {
            println!("  {MANIFEST_NAME}: found at {}", dir.display());
            manifest
        }
        Ok(None) => {
            println!("  {MANIFEST_NAME}: not found, using defaults");
            KindlyManifest::default()
        }
        Err(e) => {
            println!("  {MANIFEST_NAME}: error: {e:#}");
            KindlyManifest::default()
        }
    };
    println!();

    println!("--- Engine ---");
    let config = manifest.engine.driver_config();
    println!("  binary: {}", config.binary.display());
    if let Some(minimum) = &config.minimum_version {
        println!("  minimum version: {minimum}");
    }
    let info = ProcessDriver::new(config)
        .check_availability()
        .context("engine is not usable")?;
    println!("  banner: {}", info.banner);
    match &info.version {
        Some(version) => println!("  version: {version}"),
        None => println!("  version: (not reported)"),
    }
    Ok(())
}
