//! Presentation settings threaded through suggestion synthesis and rendering.

use serde::{Deserialize, Serialize};

/// How names, real values and counterexamples are presented.
///
/// A value of this type is created once and passed by reference to every
/// consumer; nothing reads presentation state from anywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Symbol placed before a component or property name.
    pub open_bracket: String,
    /// Symbol placed after a component or property name.
    pub close_bracket: String,
    /// Decimal digits for real-valued trace values; `None` keeps the exact text.
    pub real_precision: Option<usize>,
    pub print_counter_examples: bool,
    pub print_inductive_counter_examples: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            open_bracket: "[".into(),
            close_bracket: "]".into(),
            real_precision: None,
            print_counter_examples: true,
            print_inductive_counter_examples: false,
        }
    }
}

impl DisplaySettings {
    /// Settings with plain names (no brackets).
    pub fn plain() -> Self {
        Self {
            open_bracket: String::new(),
            close_bracket: String::new(),
            ..Default::default()
        }
    }

    /// Set the precision used for real values.
    pub fn with_precision(mut self, digits: usize) -> Self {
        self.real_precision = Some(digits);
        self
    }

    /// Wrap a name in the configured brackets.
    pub fn name(&self, name: &str) -> String {
        format!("{}{name}{}", self.open_bracket, self.close_bracket)
    }

    /// Wrap and comma-join several names.
    pub fn names<'a, I>(&self, names: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .map(|n| self.name(n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brackets_applied() {
        let settings = DisplaySettings::default();
        assert_eq!(settings.name("Filter"), "[Filter]");
        assert_eq!(settings.names(["A", "B"]), "[A], [B]");

        let plain = DisplaySettings::plain();
        assert_eq!(plain.name("Filter"), "Filter");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let settings: DisplaySettings =
            serde_json::from_str(r#"{"open_bracket": "<", "close_bracket": ">"}"#).unwrap();
        assert_eq!(settings.name("N"), "<N>");
        assert!(settings.print_counter_examples);
        assert_eq!(settings.real_precision, None);
    }
}
