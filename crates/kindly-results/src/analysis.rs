//! A single verification pass over a component.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{AnalysisId, ComponentId};
use crate::property::{Answer, Property, PropertySource};

/// The abstraction context an analysis was started under, as announced by
/// the engine before any property result of that analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisContext {
    /// Subcomponents analyzed through their full definition.
    pub concrete: Vec<String>,
    /// Subcomponents replaced by their contract.
    pub abstracted: Vec<String>,
    /// How many assumptions of each component were used, by component name.
    pub assumptions: Vec<(String, u64)>,
}

impl AnalysisContext {
    /// Context in which every listed subcomponent is abstract.
    pub fn abstracting<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            abstracted: names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Context in which every listed subcomponent is concrete.
    pub fn concretizing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            concrete: names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// A group of model elements reported by a post-analysis (for example an
/// inductive validity core).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelElementSet {
    pub class: String,
    pub elements: Vec<ModelElement>,
}

/// One element of a [`ModelElementSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelElement {
    /// The component the element belongs to.
    pub component: String,
    /// Element category (`guarantee`, `equation`, `assumption`, ...).
    pub category: String,
    pub name: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// Results of a post-analysis run after an analysis stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostAnalysis {
    pub name: String,
    pub element_sets: Vec<ModelElementSet>,
}

impl PostAnalysis {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            element_sets: Vec::new(),
        }
    }
}

/// One verification pass over a component.
///
/// Properties are kept in decode order. The same logical property may be
/// decoded several times at increasing depth; every attempt is retained and
/// the last one is authoritative.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub id: AnalysisId,
    pub component: ComponentId,
    pub concrete: Vec<ComponentId>,
    pub abstracted: Vec<ComponentId>,
    pub assumptions: Vec<(String, u64)>,
    properties: Vec<Property>,
    #[serde(skip)]
    names: Vec<String>,
    #[serde(skip)]
    attempts: HashMap<String, Vec<usize>>,
    pub post_analyses: Vec<PostAnalysis>,
}

impl Analysis {
    pub(crate) fn new(
        id: AnalysisId,
        component: ComponentId,
        concrete: Vec<ComponentId>,
        abstracted: Vec<ComponentId>,
        assumptions: Vec<(String, u64)>,
    ) -> Self {
        Self {
            id,
            component,
            concrete,
            abstracted,
            assumptions,
            properties: Vec::new(),
            names: Vec::new(),
            attempts: HashMap::new(),
            post_analyses: Vec::new(),
        }
    }

    pub(crate) fn push_property(&mut self, property: Property) -> usize {
        let index = self.properties.len();
        let key = property.display_name().to_string();
        match self.attempts.get_mut(&key) {
            Some(indices) => indices.push(index),
            None => {
                self.names.push(key.clone());
                self.attempts.insert(key, vec![index]);
            }
        }
        self.properties.push(property);
        index
    }

    pub(crate) fn push_post_analysis(&mut self, post: PostAnalysis) {
        self.post_analyses.push(post);
    }

    /// Every decoded property, including superseded attempts.
    pub fn decoded(&self) -> &[Property] {
        &self.properties
    }

    /// Property at a decode index.
    pub fn property(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    /// Logical property names in first-decoded order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// All decoded attempts of one logical property, oldest first.
    pub fn attempts(&self, name: &str) -> Vec<&Property> {
        self.attempts
            .get(name)
            .map(|indices| indices.iter().map(|&i| &self.properties[i]).collect())
            .unwrap_or_default()
    }

    /// The authoritative (last decoded) attempt of one logical property.
    pub fn latest(&self, name: &str) -> Option<&Property> {
        self.attempts
            .get(name)
            .and_then(|indices| indices.last())
            .map(|&i| &self.properties[i])
    }

    /// Decode indices of the authoritative attempt of each logical property.
    pub(crate) fn authoritative_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.names
            .iter()
            .filter_map(|name| self.attempts.get(name).and_then(|v| v.last().copied()))
    }

    /// The authoritative attempt of every logical property.
    pub fn authoritative(&self) -> impl Iterator<Item = &Property> {
        self.authoritative_indices().map(|i| &self.properties[i])
    }

    /// Authoritative properties with the given verdict.
    pub fn with_answer(&self, answer: Answer) -> Vec<&Property> {
        self.authoritative().filter(|p| p.answer == answer).collect()
    }

    pub fn falsified(&self) -> Vec<&Property> {
        self.with_answer(Answer::Falsifiable)
    }

    pub fn unknown(&self) -> Vec<&Property> {
        self.with_answer(Answer::Unknown)
    }

    pub fn valid(&self) -> Vec<&Property> {
        self.with_answer(Answer::Valid)
    }

    /// Whether any authoritative property is falsified or unknown.
    pub fn has_unresolved(&self) -> bool {
        self.authoritative().any(Property::is_unresolved)
    }

    /// Whether this pass checked mode exhaustiveness.
    pub fn is_mode_exhaustiveness(&self) -> bool {
        self.properties
            .iter()
            .any(|p| p.source == PropertySource::OneModeActive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis() -> Analysis {
        Analysis::new(AnalysisId(0), ComponentId(0), vec![], vec![], vec![])
    }

    #[test]
    fn last_attempt_is_authoritative() {
        let mut a = analysis();
        a.push_property(Property::new(
            "ok[1]",
            "N",
            PropertySource::Guarantee,
            Answer::Unknown,
        ));
        a.push_property(Property::new(
            "other",
            "N",
            PropertySource::Guarantee,
            Answer::Valid,
        ));
        a.push_property(Property::new(
            "ok[2]",
            "N",
            PropertySource::Guarantee,
            Answer::Falsifiable,
        ));

        assert_eq!(a.decoded().len(), 3);
        assert_eq!(a.attempts("ok").len(), 2);
        assert_eq!(a.latest("ok").map(|p| p.answer), Some(Answer::Falsifiable));
        let names: Vec<_> = a.property_names().collect();
        assert_eq!(names, vec!["ok", "other"]);
        assert_eq!(a.falsified().len(), 1);
        assert!(a.unknown().is_empty());
        assert!(a.has_unresolved());
    }

    #[test]
    fn mode_exhaustiveness_detected() {
        let mut a = analysis();
        assert!(!a.is_mode_exhaustiveness());
        a.push_property(Property::new(
            "M.one_mode_active",
            "M",
            PropertySource::OneModeActive,
            Answer::Valid,
        ));
        assert!(a.is_mode_exhaustiveness());
    }
}
