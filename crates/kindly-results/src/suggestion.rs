//! Diagnostic suggestion synthesis.
//!
//! After a compositional run has finished, every analyzed component gets one
//! primary suggestion explaining why its verification succeeded or failed and
//! what to do next. Components are processed bottom-up: all children of a
//! component are diagnosed before the component itself, and a component
//! shared by several parents is diagnosed exactly once per run.
//!
//! Independently of the primary suggestion, a component with unknown
//! properties also receives an [`SuggestionKind::IncreaseTimeout`] addendum.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::analysis::Analysis;
use crate::model::{ComponentId, FrozenModel};
use crate::property::{Answer, Property, PropertySource};
use crate::settings::DisplaySettings;

/// The fixed taxonomy of recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SuggestionKind {
    /// Every property holds.
    NoActionRequired,
    /// The contract modes do not cover every reachable state.
    FixOneModeActive,
    /// The component only verifies once a subcomponent is inlined.
    StrengthenSubComponentContract,
    /// Only assumptions of subcomponents fail.
    CompleteSpecificationOrRemoveSubNodes,
    /// Both subcomponent assumptions and own properties fail.
    MakeWeakerOrFixDefinition,
    /// Own properties fail while every subcomponent is sound.
    MakeAssumptionStrongerOrFixDefinition,
    /// Own properties fail and some subcomponent has unresolved properties.
    FixSubComponentIssues,
    /// Some properties were left undecided.
    IncreaseTimeout,
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SuggestionKind::NoActionRequired => "no action required",
            SuggestionKind::FixOneModeActive => "fix one-mode-active",
            SuggestionKind::StrengthenSubComponentContract => "strengthen subcomponent contract",
            SuggestionKind::CompleteSpecificationOrRemoveSubNodes => {
                "complete specification or remove subcomponents"
            }
            SuggestionKind::MakeWeakerOrFixDefinition => "make weaker or fix definition",
            SuggestionKind::MakeAssumptionStrongerOrFixDefinition => {
                "make assumption stronger or fix definition"
            }
            SuggestionKind::FixSubComponentIssues => "fix subcomponent issues",
            SuggestionKind::IncreaseTimeout => "increase timeout",
        };
        f.write_str(text)
    }
}

/// One typed diagnostic for a component.
///
/// The evidence (`explanations`) and the action (`label`) are kept apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub component: String,
    pub kind: SuggestionKind,
    /// Ordered evidence trail.
    pub explanations: Vec<String>,
    /// One-line recommended action.
    pub label: String,
    /// Components or properties the suggestion is about.
    pub subjects: Vec<String>,
    /// For [`SuggestionKind::CompleteSpecificationOrRemoveSubNodes`]: whether
    /// the component's own contract holds apart from the failing assumptions.
    pub own_contract_satisfied: Option<bool>,
}

impl Suggestion {
    fn new(component: &str, kind: SuggestionKind) -> Self {
        Self {
            component: component.to_string(),
            kind,
            explanations: Vec::new(),
            label: String::new(),
            subjects: Vec::new(),
            own_contract_satisfied: None,
        }
    }

    fn explain(&mut self, text: impl Into<String>) {
        self.explanations.push(text.into());
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}): {}", self.component, self.kind, self.label)?;
        for explanation in &self.explanations {
            writeln!(f, "  - {explanation}")?;
        }
        Ok(())
    }
}

/// Diagnose every analyzed component of a finished run.
pub fn synthesize(model: &FrozenModel, settings: &DisplaySettings) -> Vec<Suggestion> {
    SuggestionEngine::new(model, settings).run()
}

/// Per-run state of the bottom-up decision procedure.
///
/// The visited set belongs to the run, not to the model, so synthesizing
/// twice over the same model yields the same suggestions.
pub struct SuggestionEngine<'a> {
    model: &'a FrozenModel,
    settings: &'a DisplaySettings,
    visited: HashSet<ComponentId>,
    suggestions: Vec<Suggestion>,
}

impl<'a> SuggestionEngine<'a> {
    pub fn new(model: &'a FrozenModel, settings: &'a DisplaySettings) -> Self {
        Self {
            model,
            settings,
            visited: HashSet::new(),
            suggestions: Vec::new(),
        }
    }

    /// Visit every component, roots first, and return the suggestions in the
    /// order components were diagnosed (children before parents).
    pub fn run(mut self) -> Vec<Suggestion> {
        let mut order: Vec<ComponentId> = self.model.roots().map(|c| c.id).collect();
        order.extend(self.model.components().map(|c| c.id));
        for id in order {
            self.visit(id);
        }
        self.suggestions
    }

    fn visit(&mut self, id: ComponentId) {
        if !self.visited.insert(id) {
            return;
        }
        let children = self
            .model
            .component(id)
            .map(|c| c.children().to_vec())
            .unwrap_or_default();
        for child in children {
            self.visit(child);
        }
        self.diagnose(id);
    }

    fn component_name(&self, id: ComponentId) -> &'a str {
        let model: &'a FrozenModel = self.model;
        model
            .component(id)
            .map(|c| c.name.as_str())
            .unwrap_or("?")
    }

    fn diagnose(&mut self, id: ComponentId) {
        let model = self.model;
        let name = self.component_name(id);
        let Ok(last) = model.last_analysis(id) else {
            debug!(component = name, "never analyzed, no suggestion");
            return;
        };
        let analyses = model.analyses_of(id).unwrap_or_default();

        let falsified = last.falsified();
        let unknown = last.unknown();
        let falsified_assumptions: Vec<&Property> = falsified
            .iter()
            .copied()
            .filter(|p| p.source == PropertySource::Assumption)
            .collect();
        let mode_falsified = model
            .mode_analysis(id)
            .map(|m| m.falsified())
            .unwrap_or_default();

        let primary = if falsified.is_empty() {
            if analyses.len() == 1 {
                unknown
                    .is_empty()
                    .then(|| self.no_action_required(name, false))
            } else if !mode_falsified.is_empty() {
                Some(self.fix_one_mode_active(name, &mode_falsified))
            } else if analyses.len() == 2 && unknown.is_empty() {
                Some(self.no_action_required(name, model.mode_analysis(id).is_some()))
            } else if unknown.is_empty() {
                let refined = self.refined_subcomponents(&analyses);
                Some(self.strengthen_sub_component_contract(name, &refined))
            } else {
                None
            }
        } else if falsified_assumptions.len() == falsified.len() {
            Some(self.complete_specification(name, last, &falsified_assumptions))
        } else if !falsified_assumptions.is_empty() {
            Some(self.make_weaker_or_fix_definition(name, &falsified, &falsified_assumptions))
        } else {
            let implicated = self.unresolved_children(id);
            if implicated.is_empty() {
                Some(self.make_assumption_stronger(name, &falsified))
            } else {
                Some(self.fix_sub_component_issues(name, &falsified, &implicated))
            }
        };

        match &primary {
            Some(s) => debug!(component = name, kind = %s.kind, "diagnosed"),
            None => debug!(component = name, "no primary suggestion"),
        }
        self.suggestions.extend(primary);

        if !unknown.is_empty() {
            let addendum = self.increase_timeout(name, last, &unknown);
            self.suggestions.push(addendum);
        }
    }

    /// Subcomponents abstracted in one analysis and concrete in the next,
    /// scanning consecutive pairs from the most recent backwards.
    fn refined_subcomponents(&self, analyses: &[&Analysis]) -> Vec<String> {
        let mut refined: Vec<String> = Vec::new();
        for pair in analyses.windows(2).rev() {
            let (earlier, later) = (pair[0], pair[1]);
            for sub in &earlier.abstracted {
                if later.concrete.contains(sub) {
                    let sub_name = self.component_name(*sub).to_string();
                    if !refined.contains(&sub_name) {
                        refined.push(sub_name);
                    }
                }
            }
        }
        refined
    }

    /// Children whose own last analysis has falsified or unknown properties.
    fn unresolved_children(&self, id: ComponentId) -> Vec<(&'a str, Vec<&'a Property>)> {
        let model = self.model;
        let Some(component) = model.component(id) else {
            return Vec::new();
        };
        component
            .children()
            .iter()
            .filter_map(|&child| {
                let last = model.last_analysis(child).ok()?;
                let unresolved: Vec<&Property> =
                    last.authoritative().filter(|p| p.is_unresolved()).collect();
                (!unresolved.is_empty()).then(|| (self.component_name(child), unresolved))
            })
            .collect()
    }

    fn describe(&self, props: &[&Property]) -> String {
        props
            .iter()
            .map(|p| format!("{} ({})", self.settings.name(p.display_name()), p.answer))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn no_action_required(&self, name: &str, mode_checked: bool) -> Suggestion {
        let n = self.settings.name(name);
        let mut s = Suggestion::new(name, SuggestionKind::NoActionRequired);
        s.explain(format!("All properties of {n} are valid."));
        if mode_checked {
            s.explain(format!("The modes of {n} are exhaustive."));
        }
        s.label = "No action required.".into();
        s
    }

    fn fix_one_mode_active(&self, name: &str, mode_falsified: &[&Property]) -> Suggestion {
        let n = self.settings.name(name);
        let mut s = Suggestion::new(name, SuggestionKind::FixOneModeActive);
        for p in mode_falsified {
            let mut text = format!(
                "The modes of {n} are not exhaustive: {} is falsifiable",
                self.settings.name(p.display_name())
            );
            if let Some(cex) = &p.counter_example {
                text.push_str(&format!(
                    " (no mode is active after {} step(s))",
                    cex.length()
                ));
            }
            text.push('.');
            s.explain(text);
            s.subjects.push(p.display_name().to_string());
        }
        s.label =
            format!("Make the modes of {n} exhaustive, so that some mode is active in every reachable state.");
        s
    }

    fn strengthen_sub_component_contract(&self, name: &str, refined: &[String]) -> Suggestion {
        let n = self.settings.name(name);
        let mut s = Suggestion::new(name, SuggestionKind::StrengthenSubComponentContract);
        if refined.is_empty() {
            s.explain(format!(
                "{n} could only be proven after refining its abstraction."
            ));
            s.label = format!(
                "Strengthen the contracts of the subcomponents of {n} so that {n} can be proven compositionally."
            );
        } else {
            let subs = self.settings.names(refined.iter().map(String::as_str));
            s.explain(format!(
                "The properties of {n} could not be proven while {subs} was abstracted by its contract."
            ));
            s.explain(format!(
                "They are valid once {subs} is analyzed through its definition."
            ));
            s.label = format!(
                "Strengthen the contract of {subs} so that it is sufficient to prove {n}."
            );
            s.subjects = refined.to_vec();
        }
        s
    }

    fn complete_specification(
        &self,
        name: &str,
        last: &Analysis,
        assumptions: &[&Property],
    ) -> Suggestion {
        let n = self.settings.name(name);
        let mut s = Suggestion::new(name, SuggestionKind::CompleteSpecificationOrRemoveSubNodes);
        for (scope, props) in group_by_scope(assumptions) {
            s.explain(format!(
                "The assumptions of {} are not satisfied by {n}: {}.",
                self.settings.name(scope),
                self.describe(&props)
            ));
            s.subjects.push(scope.to_string());
        }

        let satisfied = last
            .authoritative()
            .filter(|p| p.scope == name && p.source != PropertySource::Assumption)
            .all(|p| p.answer == Answer::Valid);
        if satisfied {
            s.explain(format!("Otherwise, the contract of {n} is satisfied."));
        } else {
            s.explain(format!(
                "In addition, the contract of {n} could not be fully proven."
            ));
        }
        s.own_contract_satisfied = Some(satisfied);

        let subs = self.settings.names(s.subjects.iter().map(String::as_str));
        s.label = format!(
            "Complete the specification of {n} so that the assumptions of {subs} hold, or remove the calls to {subs}."
        );
        s
    }

    fn make_weaker_or_fix_definition(
        &self,
        name: &str,
        falsified: &[&Property],
        assumptions: &[&Property],
    ) -> Suggestion {
        let n = self.settings.name(name);
        let mut s = Suggestion::new(name, SuggestionKind::MakeWeakerOrFixDefinition);
        for (scope, props) in group_by_scope(assumptions) {
            s.explain(format!(
                "The assumptions of {} are violated in {n}: {}.",
                self.settings.name(scope),
                self.describe(&props)
            ));
            s.subjects.push(scope.to_string());
        }
        let own: Vec<&Property> = falsified
            .iter()
            .copied()
            .filter(|p| p.source != PropertySource::Assumption)
            .collect();
        if !own.is_empty() {
            s.explain(format!(
                "{n} also violates its own properties: {}.",
                self.describe(&own)
            ));
        }
        let subs = self.settings.names(s.subjects.iter().map(String::as_str));
        s.label = format!("Weaken the assumptions of {subs} or fix the definition of {n}.");
        s
    }

    fn make_assumption_stronger(&self, name: &str, falsified: &[&Property]) -> Suggestion {
        let n = self.settings.name(name);
        let mut s = Suggestion::new(name, SuggestionKind::MakeAssumptionStrongerOrFixDefinition);
        s.explain(format!("{n} violates: {}.", self.describe(falsified)));
        s.explain(format!("Every subcomponent of {n} satisfies its contract."));
        s.subjects = falsified
            .iter()
            .map(|p| p.display_name().to_string())
            .collect();
        s.label = format!("Strengthen the assumptions of {n} or fix its definition.");
        s
    }

    fn fix_sub_component_issues(
        &self,
        name: &str,
        falsified: &[&Property],
        implicated: &[(&str, Vec<&Property>)],
    ) -> Suggestion {
        let n = self.settings.name(name);
        let mut s = Suggestion::new(name, SuggestionKind::FixSubComponentIssues);
        s.explain(format!("{n} violates: {}.", self.describe(falsified)));
        for (child, props) in implicated {
            s.explain(format!(
                "{} has unresolved properties: {}.",
                self.settings.name(child),
                self.describe(props)
            ));
            s.subjects.push(child.to_string());
        }
        let children = self.settings.names(s.subjects.iter().map(String::as_str));
        s.label = format!("Fix the issues reported for {children} first, then re-check {n}.");
        s
    }

    fn increase_timeout(&self, name: &str, last: &Analysis, unknown: &[&Property]) -> Suggestion {
        let n = self.settings.name(name);
        let mut s = Suggestion::new(name, SuggestionKind::IncreaseTimeout);
        for p in unknown {
            let pn = self.settings.name(p.display_name());
            let mut text = format!("The engine could not decide {pn}");
            if let Some(runtime) = p.runtime.as_ref().filter(|r| r.timed_out) {
                text.push_str(&format!(" before timing out after {:.1}s", runtime.seconds));
            }
            text.push('.');
            s.explain(text);

            if let Some(hint) = timeout_hint(last, p, &pn) {
                s.explain(hint);
            }
            s.subjects.push(p.display_name().to_string());
        }
        s.label = format!(
            "Increase the engine timeout for {n}, or add auxiliary invariants to help the proof."
        );
        s
    }
}

/// A hint drawn from the attempt preceding the authoritative one, when that
/// attempt failed an inductive step.
fn timeout_hint(analysis: &Analysis, property: &Property, display: &str) -> Option<String> {
    let attempts = analysis.attempts(property.display_name());
    if attempts.len() < 2 {
        return None;
    }
    let previous = attempts[attempts.len() - 2];
    let cex = previous
        .counter_example
        .as_ref()
        .filter(|_| previous.has_inductive_counter_example())?;
    let depth = previous
        .k
        .map(|k| format!("{k}-inductive"))
        .unwrap_or_else(|| "inductive".to_string());
    Some(format!(
        "Hint: {display} is not {depth}; the inductive step fails on a trace of {} step(s). \
         Strengthening it with auxiliary invariants may let induction succeed.",
        cex.length()
    ))
}

/// Group properties by declaring scope, keeping first-seen order.
fn group_by_scope<'p>(props: &[&'p Property]) -> Vec<(&'p str, Vec<&'p Property>)> {
    let mut groups: Vec<(&str, Vec<&Property>)> = Vec::new();
    for &p in props {
        match groups.iter_mut().find(|(scope, _)| *scope == p.scope) {
            Some((_, members)) => members.push(p),
            None => groups.push((p.scope.as_str(), vec![p])),
        }
    }
    groups
}
