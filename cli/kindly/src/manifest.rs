//! `kindly.toml` manifest parsing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use kindly_driver::DriverConfig;
use kindly_results::DisplaySettings;
use semver::Version;
use serde::Deserialize;

pub const MANIFEST_NAME: &str = "kindly.toml";

/// Project-level settings for running the engine and presenting results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindlyManifest {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub display: DisplaySettings,
}

/// `[engine]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Engine executable (default: `kind2` on `PATH`).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Arguments placed before the engine arguments, for launching the
    /// engine through a wrapper such as a container runtime.
    #[serde(default)]
    pub base_args: Vec<String>,
    /// Wall-clock timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Extra engine arguments, passed verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub grace_period_ms: Option<u64>,
    #[serde(default)]
    pub termination_marker: Option<String>,
    #[serde(default)]
    pub minimum_version: Option<Version>,
}

impl EngineConfig {
    /// Driver configuration with the manifest's overrides applied.
    pub fn driver_config(&self) -> DriverConfig {
        let mut config = DriverConfig::default();
        if let Some(path) = &self.path {
            config.binary = path.clone();
        }
        config.base_args = self.base_args.clone();
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.grace_period_ms {
            config.grace_period = Duration::from_millis(ms);
        }
        config.termination_marker = self.termination_marker.clone();
        config.minimum_version = self.minimum_version.clone();
        config
    }
}

impl KindlyManifest {
    /// Search `start_dir` and its ancestors for `kindly.toml`.
    ///
    /// Returns the manifest and the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(MANIFEST_NAME);
            if candidate.is_file() {
                let content = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("reading {}", candidate.display()))?;
                let manifest = Self::from_str(&content)
                    .with_context(|| format!("parsing {}", candidate.display()))?;
                return Ok(Some((manifest, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    pub fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_manifest() {
        let manifest = KindlyManifest::from_str(
            r#"
[engine]
path = "docker"
base_args = ["run", "--rm", "kind2/kind2"]
timeout = 60
args = ["--smt_solver", "Yices2"]
poll_interval_ms = 50
grace_period_ms = 500
minimum_version = "2.1.0"

[display]
open_bracket = "'"
close_bracket = "'"
real_precision = 3
"#,
        )
        .unwrap();
        assert_eq!(manifest.engine.timeout, Some(60));
        assert_eq!(manifest.engine.args, vec!["--smt_solver", "Yices2"]);
        assert_eq!(manifest.display.name("N"), "'N'");
        assert_eq!(manifest.display.real_precision, Some(3));
        // Unset display keys keep their defaults.
        assert!(manifest.display.print_counter_examples);

        let config = manifest.engine.driver_config();
        assert_eq!(config.binary, PathBuf::from("docker"));
        assert_eq!(config.base_args, vec!["run", "--rm", "kind2/kind2"]);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.grace_period, Duration::from_millis(500));
        assert_eq!(config.minimum_version, Some(Version::new(2, 1, 0)));
    }

    #[test]
    fn empty_manifest_uses_defaults() {
        let manifest = KindlyManifest::from_str("").unwrap();
        assert_eq!(manifest.engine.driver_config(), DriverConfig::default());
        assert_eq!(manifest.display, DisplaySettings::default());
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(KindlyManifest::from_str("[engine]\nbinary = \"kind2\"\n").is_err());
    }

    #[test]
    fn find_and_load_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_NAME), "[engine]\ntimeout = 5\n").unwrap();
        let nested = dir.path().join("models").join("sub");
        std::fs::create_dir_all(&nested).unwrap();

        let (manifest, found) = KindlyManifest::find_and_load(&nested).unwrap().unwrap();
        assert_eq!(manifest.engine.timeout, Some(5));
        assert_eq!(found, dir.path());
    }

    #[test]
    fn malformed_manifest_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_NAME), "[engine\n").unwrap();
        let err = KindlyManifest::find_and_load(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains(MANIFEST_NAME));
    }
}
