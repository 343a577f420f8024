//! Verification results for compositional (assume/guarantee) model checking.
//!
//! The [`ResultModel`] is an append-only store of the components a run
//! analyzed, the analyses performed on each one, and the properties each
//! analysis decided. Once a run has finished the model is frozen and handed
//! to the [`SuggestionEngine`], which explains per component why
//! verification succeeded or failed and what to do next.

pub mod analysis;
pub mod counterexample;
pub mod error;
pub mod model;
pub mod property;
pub mod render;
pub mod settings;
pub mod suggestion;

pub use analysis::{Analysis, AnalysisContext, ModelElement, ModelElementSet, PostAnalysis};
pub use counterexample::{CexKind, CexNode, CounterExample, Stream, StreamValue};
pub use error::ModelError;
pub use model::{AnalysisId, Component, ComponentId, FrozenModel, PropertyRef, ResultModel};
pub use property::{strip_depth_suffix, Answer, Location, Property, PropertySource, Runtime};
pub use render::{format_value, render_component, render_counter_example, render_suggestions};
pub use settings::DisplaySettings;
pub use suggestion::{synthesize, Suggestion, SuggestionEngine, SuggestionKind};
