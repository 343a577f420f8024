//! Plain-text rendering of suggestions and counterexamples.

use std::fmt::Write;

use crate::counterexample::{CexKind, CexNode, CounterExample, StreamValue};
use crate::model::{ComponentId, ResultModel};
use crate::settings::DisplaySettings;
use crate::suggestion::Suggestion;

/// Format a single trace value, rounding reals to the configured precision.
pub fn format_value(value: &StreamValue, settings: &DisplaySettings) -> String {
    match value {
        StreamValue::Bool(b) => b.to_string(),
        StreamValue::Int(i) => i.to_string(),
        StreamValue::Real(text) => match (settings.real_precision, value.as_f64()) {
            (Some(digits), Some(v)) => format!("{v:.digits$}"),
            _ => text.clone(),
        },
        StreamValue::Text(text) => text.clone(),
        StreamValue::Array(items) => {
            let inner: Vec<String> = items.iter().map(|v| format_value(v, settings)).collect();
            format!("[{}]", inner.join(", "))
        }
    }
}

/// Render a counterexample as one table per component instance.
///
/// Returns `None` when the settings disable printing this kind of trace.
pub fn render_counter_example(cex: &CounterExample, settings: &DisplaySettings) -> Option<String> {
    let enabled = match cex.kind {
        CexKind::Base => settings.print_counter_examples,
        CexKind::Inductive => settings.print_inductive_counter_examples,
    };
    if !enabled {
        return None;
    }
    let steps = cex.length();
    let mut out = String::new();
    for block in &cex.blocks {
        render_node(block, steps, 0, settings, &mut out);
    }
    Some(out)
}

fn render_node(node: &CexNode, steps: u64, depth: usize, settings: &DisplaySettings, out: &mut String) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{indent}{} {}", node.block_type, settings.name(&node.name));

    let width = node
        .streams
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max(4);

    let mut header = format!("{indent}  {:<width$}", "step");
    for step in 0..steps {
        let _ = write!(header, " {step:>8}");
    }
    let _ = writeln!(out, "{}", header.trim_end());

    for stream in &node.streams {
        let mut row = format!("{indent}  {:<width$}", stream.name);
        for step in 0..steps {
            let cell = stream
                .at(step)
                .map(|v| format_value(v, settings))
                .unwrap_or_else(|| "-".into());
            let _ = write!(row, " {cell:>8}");
        }
        let _ = writeln!(out, "{}", row.trim_end());
    }

    for sub in &node.subnodes {
        render_node(sub, steps, depth + 1, settings, out);
    }
}

/// Render a list of suggestions, one block per suggestion.
pub fn render_suggestions(suggestions: &[Suggestion], settings: &DisplaySettings) -> String {
    if suggestions.is_empty() {
        return "No suggestions.\n".to_string();
    }
    let mut out = String::new();
    for s in suggestions {
        let _ = writeln!(out, "{} {}", settings.name(&s.component), s.label);
        for explanation in &s.explanations {
            let _ = writeln!(out, "    {explanation}");
        }
    }
    out
}

/// Render the authoritative verdicts of one component's last analysis,
/// followed by the counterexamples the settings allow.
pub fn render_component(model: &ResultModel, id: ComponentId, settings: &DisplaySettings) -> String {
    let mut out = String::new();
    let Some(component) = model.component(id) else {
        return out;
    };
    let _ = writeln!(
        out,
        "=== {} ({} analyses) ===",
        settings.name(&component.name),
        component.analyses().len()
    );
    let Ok(last) = model.last_analysis(id) else {
        let _ = writeln!(out, "not analyzed");
        return out;
    };
    for p in last.authoritative() {
        let mut line = format!("{:<12} {}", p.answer.to_string(), settings.name(p.display_name()));
        if let Some(k) = p.k {
            let _ = write!(line, " (k = {k})");
        }
        let _ = writeln!(out, "{line}");
        if let Some(table) = p
            .counter_example
            .as_ref()
            .and_then(|cex| render_counter_example(cex, settings))
        {
            out.push_str(&table);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisContext;
    use crate::counterexample::Stream;
    use crate::property::{Answer, Property, PropertySource};

    fn cex(kind: CexKind) -> CounterExample {
        CounterExample {
            kind,
            blocks: vec![CexNode {
                block_type: "node".into(),
                name: "Top".into(),
                streams: vec![
                    Stream {
                        name: "x".into(),
                        ty: "real".into(),
                        class: "input".into(),
                        values: vec![
                            (0, StreamValue::Real("1/3".into())),
                            (1, StreamValue::Real("2".into())),
                        ],
                    },
                    Stream {
                        name: "ok".into(),
                        ty: "bool".into(),
                        class: "output".into(),
                        values: vec![(0, StreamValue::Bool(true)), (1, StreamValue::Bool(false))],
                    },
                ],
                subnodes: vec![],
            }],
        }
    }

    #[test]
    fn real_precision_applied() {
        let exact = DisplaySettings::default();
        let rounded = DisplaySettings::default().with_precision(2);
        let v = StreamValue::Real("1/3".into());
        assert_eq!(format_value(&v, &exact), "1/3");
        assert_eq!(format_value(&v, &rounded), "0.33");
        let arr = StreamValue::Array(vec![StreamValue::Int(1), StreamValue::Bool(false)]);
        assert_eq!(format_value(&arr, &exact), "[1, false]");
    }

    #[test]
    fn counter_example_table() {
        let settings = DisplaySettings::default().with_precision(1);
        let table = render_counter_example(&cex(CexKind::Base), &settings).unwrap();
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "node [Top]");
        assert!(lines[1].starts_with("  step"));
        assert!(lines[2].contains("0.3"));
        assert!(lines[2].ends_with("2.0"));
        assert!(lines[3].ends_with("false"));
    }

    #[test]
    fn inductive_traces_hidden_by_default() {
        let settings = DisplaySettings::default();
        assert!(render_counter_example(&cex(CexKind::Inductive), &settings).is_none());
        let settings = DisplaySettings {
            print_counter_examples: false,
            ..Default::default()
        };
        assert!(render_counter_example(&cex(CexKind::Base), &settings).is_none());
    }

    #[test]
    fn component_summary() {
        let mut model = ResultModel::new();
        let a = model.add_analysis("Top", AnalysisContext::default());
        model
            .add_property(
                a,
                Property::new("g", "Top", PropertySource::Guarantee, Answer::Falsifiable)
                    .with_k(1)
                    .with_counter_example(cex(CexKind::Base)),
            )
            .unwrap();
        let id = model.component_id("Top").unwrap();
        let text = render_component(&model, id, &DisplaySettings::plain());
        assert!(text.starts_with("=== Top (1 analyses) ==="));
        assert!(text.contains("falsifiable  g (k = 1)"));
        assert!(text.contains("node Top"));
    }

    #[test]
    fn empty_suggestion_list() {
        assert_eq!(
            render_suggestions(&[], &DisplaySettings::default()),
            "No suggestions.\n"
        );
    }
}
