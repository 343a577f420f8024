//! Checked properties and their verdicts.

use std::fmt;

use serde::Serialize;

use crate::counterexample::{CexKind, CounterExample};

/// Where a property came from in the program text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PropertySource {
    /// An assumption of a contract (possibly declared by a subcomponent).
    Assumption,
    /// A guarantee of a contract.
    Guarantee,
    /// A mode's `ensure` clause.
    Ensure,
    /// A `--%PROPERTY` style annotation.
    Annotation,
    /// The mode exhaustiveness check of a contract.
    OneModeActive,
    /// A property generated by the engine itself.
    Generated,
}

impl PropertySource {
    /// Parse the engine's spelling of a property source.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "Assumption" => Some(PropertySource::Assumption),
            "Guarantee" => Some(PropertySource::Guarantee),
            "Ensure" => Some(PropertySource::Ensure),
            "PropAnnot" | "Annotation" => Some(PropertySource::Annotation),
            "OneModeActive" => Some(PropertySource::OneModeActive),
            "Generated" => Some(PropertySource::Generated),
            _ => None,
        }
    }
}

impl fmt::Display for PropertySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertySource::Assumption => write!(f, "assumption"),
            PropertySource::Guarantee => write!(f, "guarantee"),
            PropertySource::Ensure => write!(f, "ensure"),
            PropertySource::Annotation => write!(f, "annotation"),
            PropertySource::OneModeActive => write!(f, "one-mode-active"),
            PropertySource::Generated => write!(f, "generated"),
        }
    }
}

/// The verdict the engine reached for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Answer {
    Valid,
    Falsifiable,
    Unknown,
    Reachable,
    Unreachable,
}

impl Answer {
    /// All verdicts, in a fixed order.
    pub const ALL: [Answer; 5] = [
        Answer::Valid,
        Answer::Falsifiable,
        Answer::Unknown,
        Answer::Reachable,
        Answer::Unreachable,
    ];

    /// Parse the engine's spelling of a verdict.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "valid" => Some(Answer::Valid),
            "falsifiable" => Some(Answer::Falsifiable),
            "unknown" => Some(Answer::Unknown),
            "reachable" => Some(Answer::Reachable),
            "unreachable" => Some(Answer::Unreachable),
            _ => None,
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Valid => write!(f, "valid"),
            Answer::Falsifiable => write!(f, "falsifiable"),
            Answer::Unknown => write!(f, "unknown"),
            Answer::Reachable => write!(f, "reachable"),
            Answer::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Wall-clock time the engine spent on a property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Runtime {
    pub seconds: f64,
    pub timed_out: bool,
}

/// Position of a property in the program text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// One checked obligation as decoded from the engine output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    /// Name as reported by the engine, including any depth suffix.
    pub name: String,
    /// The component that declared the property.
    pub scope: String,
    pub source: PropertySource,
    pub answer: Answer,
    /// Engine module that produced the answer (e.g. `bmc`, `ind`).
    pub answered_by: Option<String>,
    pub location: Option<Location>,
    /// Induction depth (or unrolling bound) at which the answer was reached.
    pub k: Option<u64>,
    pub runtime: Option<Runtime>,
    pub counter_example: Option<CounterExample>,
}

impl Property {
    /// Create a property with the required fields set and all metadata empty.
    pub fn new(
        name: impl Into<String>,
        scope: impl Into<String>,
        source: PropertySource,
        answer: Answer,
    ) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
            source,
            answer,
            answered_by: None,
            location: None,
            k: None,
            runtime: None,
            counter_example: None,
        }
    }

    /// Attach a counterexample.
    pub fn with_counter_example(mut self, cex: CounterExample) -> Self {
        self.counter_example = Some(cex);
        self
    }

    /// Set the depth at which the answer was reached.
    pub fn with_k(mut self, k: u64) -> Self {
        self.k = Some(k);
        self
    }

    /// The logical name of the property, without an induction-depth suffix.
    pub fn display_name(&self) -> &str {
        strip_depth_suffix(&self.name)
    }

    /// Whether the engine gave up on this property.
    pub fn is_unresolved(&self) -> bool {
        matches!(self.answer, Answer::Falsifiable | Answer::Unknown)
    }

    /// Whether this attempt carried an inductive-step counterexample.
    pub fn has_inductive_counter_example(&self) -> bool {
        self.counter_example
            .as_ref()
            .is_some_and(|cex| cex.kind == CexKind::Inductive)
    }
}

/// Strip a trailing `[<digits>]` induction-depth suffix from a property name.
///
/// Bracketed suffixes that are not purely numeric (such as the engine's
/// `[l12c5]` position tags) are part of the logical name and are kept.
pub fn strip_depth_suffix(name: &str) -> &str {
    let Some(body) = name.strip_suffix(']') else {
        return name;
    };
    let Some(open) = body.rfind('[') else {
        return name;
    };
    let depth = &body[open + 1..];
    if !depth.is_empty() && depth.bytes().all(|b| b.is_ascii_digit()) && open > 0 {
        &name[..open]
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_suffix_stripped() {
        assert_eq!(strip_depth_suffix("ok[3]"), "ok");
        assert_eq!(strip_depth_suffix("ok"), "ok");
        assert_eq!(strip_depth_suffix("guarantee[l12c5]"), "guarantee[l12c5]");
        assert_eq!(strip_depth_suffix("g[l12c5][2]"), "g[l12c5]");
        assert_eq!(strip_depth_suffix("[4]"), "[4]");
        assert_eq!(strip_depth_suffix("x[]"), "x[]");
    }

    #[test]
    fn wire_spellings() {
        assert_eq!(
            PropertySource::from_wire("PropAnnot"),
            Some(PropertySource::Annotation)
        );
        assert_eq!(
            PropertySource::from_wire("OneModeActive"),
            Some(PropertySource::OneModeActive)
        );
        assert_eq!(PropertySource::from_wire("Candidate"), None);
        assert_eq!(Answer::from_wire("falsifiable"), Some(Answer::Falsifiable));
        assert_eq!(Answer::from_wire("FALSIFIABLE"), None);
    }

    #[test]
    fn unresolved_answers() {
        let p = Property::new("p", "N", PropertySource::Guarantee, Answer::Unknown);
        assert!(p.is_unresolved());
        let p = Property::new("p", "N", PropertySource::Guarantee, Answer::Valid);
        assert!(!p.is_unresolved());
    }
}
