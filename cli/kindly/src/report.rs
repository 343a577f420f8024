//! Printing verdicts and suggestions for a finished run.

use anyhow::{bail, Result};
use kindly_driver::Transcript;
use kindly_results::{
    render_component, render_suggestions, synthesize, Answer, DisplaySettings, FrozenModel,
    Suggestion,
};
use serde_json::{json, Value};

/// Output format selected with `--report`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Json,
}

impl ReportFormat {
    pub fn parse(name: Option<&str>) -> Result<Self> {
        match name {
            None | Some("human") => Ok(ReportFormat::Human),
            Some("json") => Ok(ReportFormat::Json),
            Some(other) => bail!("unknown report format: '{other}'. Choose: human, json"),
        }
    }
}

/// Falsified properties across all components, counting each component's
/// last analysis and its mode-exhaustiveness analysis.
pub fn falsified_count(model: &FrozenModel) -> usize {
    model
        .components()
        .map(|c| {
            let own = model.last_analysis(c.id).map_or(0, |a| a.falsified().len());
            let modes = model.mode_analysis(c.id).map_or(0, |a| a.falsified().len());
            own + modes
        })
        .sum()
}

pub fn to_json(model: &FrozenModel, transcript: &Transcript, suggestions: &[Suggestion]) -> Value {
    let components: Vec<Value> = model
        .components()
        .filter_map(|c| {
            let last = model.last_analysis(c.id).ok()?;
            let properties: Vec<Value> = last
                .authoritative()
                .map(|p| {
                    json!({
                        "name": p.display_name(),
                        "scope": p.scope,
                        "source": p.source.to_string(),
                        "answer": p.answer.to_string(),
                        "k": p.k,
                        "location": p.location,
                        "runtime": p.runtime,
                    })
                })
                .collect();
            Some(json!({
                "name": c.name,
                "analyses": c.analyses().len(),
                "properties": properties,
            }))
        })
        .collect();
    json!({
        "components": components,
        "suggestions": suggestions,
        "errors": transcript.errors().map(|l| l.message.as_str()).collect::<Vec<_>>(),
    })
}

/// Print the report for a finished run and fail if anything was falsified.
pub fn print(
    model: &FrozenModel,
    transcript: &Transcript,
    settings: &DisplaySettings,
    format: ReportFormat,
) -> Result<()> {
    let suggestions = synthesize(model, settings);
    match format {
        ReportFormat::Json => {
            let report = to_json(model, transcript, &suggestions);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ReportFormat::Human => {
            for entry in transcript.errors() {
                eprintln!("engine error: {}", entry.message);
            }
            for component in model.components() {
                if !component.analyses().is_empty() {
                    print!("{}", render_component(model, component.id, settings));
                }
            }
            println!();
            print!("{}", render_suggestions(&suggestions, settings));
        }
    }

    let falsified = falsified_count(model);
    if falsified > 0 {
        bail!("verification failed: {falsified} property(ies) falsified");
    }
    let unknown: usize = model
        .components()
        .filter_map(|c| model.last_analysis(c.id).ok())
        .map(|a| a.with_answer(Answer::Unknown).len())
        .sum();
    if unknown > 0 && format == ReportFormat::Human {
        println!("{unknown} property(ies) left unknown.");
    }
    Ok(())
}
