//! Process driver configuration.

use std::path::PathBuf;
use std::time::Duration;

use semver::Version;

/// How the engine is located, polled and stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Engine executable, resolved through `PATH` when not absolute.
    pub binary: PathBuf,
    /// Arguments placed before every argument list (e.g. `-c <script>`).
    pub base_args: Vec<String>,
    /// Arguments for the availability probe.
    pub version_args: Vec<String>,
    /// Sleep between completion checks.
    pub poll_interval: Duration,
    /// Time a cancelled engine gets to exit before it is killed.
    pub grace_period: Duration,
    /// Written to the engine's input channel when cancelling.
    pub termination_marker: Option<String>,
    /// Oldest engine version the availability probe accepts.
    pub minimum_version: Option<Version>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("kind2"),
            base_args: Vec::new(),
            version_args: vec!["--version".into()],
            poll_interval: Duration::from_millis(100),
            grace_period: Duration::from_secs(2),
            termination_marker: None,
            minimum_version: None,
        }
    }
}

impl DriverConfig {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }
}

/// Extract the first `major.minor[.patch]` version from a banner line.
pub fn parse_version(banner: &str) -> Option<Version> {
    banner
        .split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
        .map(|word| word.trim_start_matches('v'))
        .find_map(|word| {
            let core: String = word
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            let mut parts = core.split('.').filter(|p| !p.is_empty());
            let major = parts.next()?.parse().ok()?;
            let minor = parts.next()?.parse().ok()?;
            let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
            Some(Version::new(major, minor, patch))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.binary, PathBuf::from("kind2"));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.version_args, vec!["--version"]);
    }

    #[test]
    fn banner_versions() {
        assert_eq!(parse_version("Kind 2 v2.2.0"), Some(Version::new(2, 2, 0)));
        assert_eq!(
            parse_version("Kind 2 v1.9.0-12-gabcdef (built 2023)"),
            Some(Version::new(1, 9, 0))
        );
        assert_eq!(parse_version("engine 3.1"), Some(Version::new(3, 1, 0)));
        assert_eq!(parse_version("no version here"), None);
        // A lone number is not a version.
        assert_eq!(parse_version("Kind 2"), None);
    }
}
