//! The hierarchical result store.
//!
//! Components form a DAG: a shared subcomponent has several parents. The
//! model keeps components, analyses and their properties in arenas indexed
//! by copyable handles, and component names are the only join key between
//! decoded records.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;

use serde::Serialize;
use tracing::debug;

use crate::analysis::{Analysis, AnalysisContext, PostAnalysis};
use crate::error::{ModelError, Result};
use crate::property::{Answer, Property};

/// Handle of a component inside a [`ResultModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ComponentId(pub(crate) usize);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Handle of an analysis inside a [`ResultModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AnalysisId(pub(crate) usize);

impl fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Address of one decoded property attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PropertyRef {
    pub analysis: AnalysisId,
    pub index: usize,
}

/// A named verifiable unit.
#[derive(Debug, Clone, Serialize)]
pub struct Component {
    pub id: ComponentId,
    pub name: String,
    analyses: Vec<AnalysisId>,
    children: Vec<ComponentId>,
    parents: Vec<ComponentId>,
}

impl Component {
    /// Analyses of this component in the order they were started.
    pub fn analyses(&self) -> &[AnalysisId] {
        &self.analyses
    }

    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }

    pub fn parents(&self) -> &[ComponentId] {
        &self.parents
    }
}

/// Append-only store of components, analyses and properties.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultModel {
    components: Vec<Component>,
    #[serde(skip)]
    index: HashMap<String, ComponentId>,
    analyses: Vec<Analysis>,
}

impl ResultModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, name: &str) -> ComponentId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = ComponentId(self.components.len());
        debug!(component = name, %id, "new component");
        self.components.push(Component {
            id,
            name: name.to_string(),
            analyses: Vec::new(),
            children: Vec::new(),
            parents: Vec::new(),
        });
        self.index.insert(name.to_string(), id);
        id
    }

    // --- Mutators ---

    /// Start a new analysis of `component` under the given abstraction context.
    ///
    /// The component and every subcomponent named in the context are created
    /// on first reference.
    pub fn add_analysis(&mut self, component: &str, context: AnalysisContext) -> AnalysisId {
        let owner = self.intern(component);
        let concrete = context.concrete.iter().map(|n| self.intern(n)).collect();
        let abstracted = context.abstracted.iter().map(|n| self.intern(n)).collect();

        let id = AnalysisId(self.analyses.len());
        self.analyses.push(Analysis::new(
            id,
            owner,
            concrete,
            abstracted,
            context.assumptions,
        ));
        self.components[owner.0].analyses.push(id);
        id
    }

    /// Record a decoded property result for an analysis.
    pub fn add_property(&mut self, analysis: AnalysisId, property: Property) -> Result<PropertyRef> {
        let target = self
            .analyses
            .get_mut(analysis.0)
            .ok_or(ModelError::UnknownAnalysis(analysis))?;
        let index = target.push_property(property);
        Ok(PropertyRef { analysis, index })
    }

    /// Record that `parent` calls `child`. Repeated edges are ignored.
    pub fn add_child(&mut self, parent: &str, child: &str) -> Result<()> {
        if parent == child {
            return Err(ModelError::SelfEdge(parent.to_string()));
        }
        let p = self.intern(parent);
        let c = self.intern(child);
        if !self.components[p.0].children.contains(&c) {
            self.components[p.0].children.push(c);
            self.components[c.0].parents.push(p);
        }
        Ok(())
    }

    /// Attach the results of a post-analysis to the analysis it followed.
    pub fn attach_post_analysis(&mut self, analysis: AnalysisId, post: PostAnalysis) -> Result<()> {
        let target = self
            .analyses
            .get_mut(analysis.0)
            .ok_or(ModelError::UnknownAnalysis(analysis))?;
        target.push_post_analysis(post);
        Ok(())
    }

    // --- Lookup ---

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.index.get(name).copied()
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.0)
    }

    /// Look up a component by name.
    pub fn component_named(&self, name: &str) -> Result<&Component> {
        self.component_id(name)
            .and_then(|id| self.component(id))
            .ok_or_else(|| ModelError::UnknownComponent(name.to_string()))
    }

    /// All components in creation order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Components nobody calls, in creation order.
    pub fn roots(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.parents.is_empty())
    }

    pub fn analysis(&self, id: AnalysisId) -> Option<&Analysis> {
        self.analyses.get(id.0)
    }

    pub fn analysis_count(&self) -> usize {
        self.analyses.len()
    }

    pub fn property(&self, r: PropertyRef) -> Option<&Property> {
        self.analysis(r.analysis).and_then(|a| a.property(r.index))
    }

    fn checked(&self, id: ComponentId) -> Result<&Component> {
        self.component(id).ok_or(ModelError::InvalidComponent(id))
    }

    /// Analyses of a component in the order they were started.
    pub fn analyses_of(&self, id: ComponentId) -> Result<Vec<&Analysis>> {
        let component = self.checked(id)?;
        Ok(component
            .analyses
            .iter()
            .filter_map(|&a| self.analysis(a))
            .collect())
    }

    /// The authoritative analysis of a component.
    pub fn last_analysis(&self, id: ComponentId) -> Result<&Analysis> {
        let component = self.checked(id)?;
        component
            .analyses
            .last()
            .and_then(|&a| self.analysis(a))
            .ok_or_else(|| ModelError::NoAnalyses {
                component: component.name.clone(),
            })
    }

    /// The mode-exhaustiveness analysis of a component, if one ran.
    ///
    /// It is always the second-to-last analysis and never the authoritative one.
    pub fn mode_analysis(&self, id: ComponentId) -> Option<&Analysis> {
        let component = self.component(id)?;
        let n = component.analyses.len();
        if n < 2 {
            return None;
        }
        self.analysis(component.analyses[n - 2])
            .filter(|a| a.is_mode_exhaustiveness())
    }

    /// Children of a component.
    pub fn children(&self, id: ComponentId) -> Vec<&Component> {
        self.component(id)
            .map(|c| {
                c.children
                    .iter()
                    .filter_map(|&child| self.component(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    // --- Projections ---

    fn collect_refs(&self, id: ComponentId, answer: Answer) -> Vec<PropertyRef> {
        let mut refs = Vec::new();
        let mut visited = HashSet::new();
        self.collect_into(id, answer, &mut visited, &mut refs);
        refs
    }

    fn collect_into(
        &self,
        id: ComponentId,
        answer: Answer,
        visited: &mut HashSet<ComponentId>,
        out: &mut Vec<PropertyRef>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let Some(component) = self.component(id) else {
            return;
        };

        let mut sources = Vec::new();
        if answer == Answer::Falsifiable {
            if let Some(mode) = self.mode_analysis(id) {
                sources.push(mode);
            }
        }
        if let Some(last) = component.analyses.last().and_then(|&a| self.analysis(a)) {
            sources.push(last);
        }
        for analysis in sources {
            for index in analysis.authoritative_indices() {
                if analysis.property(index).map(|p| p.answer) == Some(answer) {
                    out.push(PropertyRef {
                        analysis: analysis.id,
                        index,
                    });
                }
            }
        }

        for &child in &component.children {
            self.collect_into(child, answer, visited, out);
        }
    }

    fn resolve(&self, refs: &[PropertyRef]) -> Vec<&Property> {
        refs.iter().filter_map(|&r| self.property(r)).collect()
    }

    /// Properties of a component and all its descendants with the given verdict.
    ///
    /// Only the last analysis of each component contributes, except for
    /// falsified properties, where a mode-exhaustiveness analysis is also
    /// included.
    pub fn with_answer(&self, id: ComponentId, answer: Answer) -> Vec<&Property> {
        self.resolve(&self.collect_refs(id, answer))
    }

    pub fn falsified(&self, id: ComponentId) -> Vec<&Property> {
        self.with_answer(id, Answer::Falsifiable)
    }

    pub fn valid(&self, id: ComponentId) -> Vec<&Property> {
        self.with_answer(id, Answer::Valid)
    }

    pub fn unknown(&self, id: ComponentId) -> Vec<&Property> {
        self.with_answer(id, Answer::Unknown)
    }

    pub fn reachable(&self, id: ComponentId) -> Vec<&Property> {
        self.with_answer(id, Answer::Reachable)
    }

    pub fn unreachable(&self, id: ComponentId) -> Vec<&Property> {
        self.with_answer(id, Answer::Unreachable)
    }

    /// `(component, property, verdict)` for the authoritative properties of
    /// every analyzed component's last analysis, in component creation order.
    pub fn final_verdicts(&self) -> Vec<(String, String, Answer)> {
        let mut out = Vec::new();
        for component in &self.components {
            let Ok(last) = self.last_analysis(component.id) else {
                continue;
            };
            for p in last.authoritative() {
                out.push((
                    component.name.clone(),
                    p.display_name().to_string(),
                    p.answer,
                ));
            }
        }
        out
    }

    /// Freeze the model, precomputing every projection.
    pub fn freeze(self) -> FrozenModel {
        let mut cache = HashMap::new();
        for component in &self.components {
            for answer in Answer::ALL {
                cache.insert(
                    (component.id, answer),
                    self.collect_refs(component.id, answer),
                );
            }
        }
        FrozenModel { model: self, cache }
    }
}

/// A result model that no longer changes.
///
/// Projections are computed once at freeze time. All read accessors of
/// [`ResultModel`] are available through `Deref`.
#[derive(Debug, Clone)]
pub struct FrozenModel {
    model: ResultModel,
    cache: HashMap<(ComponentId, Answer), Vec<PropertyRef>>,
}

impl FrozenModel {
    pub fn with_answer(&self, id: ComponentId, answer: Answer) -> Vec<&Property> {
        match self.cache.get(&(id, answer)) {
            Some(refs) => self.model.resolve(refs),
            None => Vec::new(),
        }
    }

    pub fn falsified(&self, id: ComponentId) -> Vec<&Property> {
        self.with_answer(id, Answer::Falsifiable)
    }

    pub fn valid(&self, id: ComponentId) -> Vec<&Property> {
        self.with_answer(id, Answer::Valid)
    }

    pub fn unknown(&self, id: ComponentId) -> Vec<&Property> {
        self.with_answer(id, Answer::Unknown)
    }

    pub fn reachable(&self, id: ComponentId) -> Vec<&Property> {
        self.with_answer(id, Answer::Reachable)
    }

    pub fn unreachable(&self, id: ComponentId) -> Vec<&Property> {
        self.with_answer(id, Answer::Unreachable)
    }

    /// Give back the underlying model.
    pub fn into_inner(self) -> ResultModel {
        self.model
    }
}

impl Deref for FrozenModel {
    type Target = ResultModel;

    fn deref(&self) -> &ResultModel {
        &self.model
    }
}
