//! `kindly replay`: explain a captured engine output.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use kindly_driver::parse_output;
use kindly_results::DisplaySettings;

use crate::report::{self, ReportFormat};

/// Decode a saved engine output and report on it as if the run just ended.
pub fn run(path: &Path, settings: &DisplaySettings, format: ReportFormat) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (model, transcript) = match parse_output(&bytes) {
        Ok(parts) => parts,
        Err((err, partial)) => {
            eprintln!(
                "note: {} component(s) were decoded before the failure",
                partial.component_count()
            );
            return Err(err).with_context(|| format!("decoding {}", path.display()));
        }
    };
    report::print(&model.freeze(), &transcript, settings, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSING: &str = r#"[
{"objectType": "analysisStart", "top": "Top", "concrete": [], "abstract": [], "assumptions": []},
{"objectType": "property", "name": "g", "scope": "Top", "source": "Guarantee", "answer": {"source": "ind", "value": "valid"}},
{"objectType": "analysisStop"}
]"#;

    #[test]
    fn replay_passing_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        fs::write(&path, PASSING).unwrap();
        run(&path, &DisplaySettings::default(), ReportFormat::Human).unwrap();
    }

    #[test]
    fn replay_falsified_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        fs::write(&path, PASSING.replace("\"valid\"", "\"falsifiable\"")).unwrap();
        let err = run(&path, &DisplaySettings::default(), ReportFormat::Json).unwrap_err();
        assert!(err.to_string().contains("falsified"));
    }

    #[test]
    fn replay_reports_decode_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "[{\"objectType\": \"analysisStop\"}]").unwrap();
        let err = run(&path, &DisplaySettings::default(), ReportFormat::Human).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }

    #[test]
    fn replay_missing_file() {
        let err = run(
            Path::new("/nonexistent/out.json"),
            &DisplaySettings::default(),
            ReportFormat::Human,
        )
        .unwrap_err();
        assert!(err.to_string().contains("reading"));
    }
}
