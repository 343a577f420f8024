//! Errors raised by the result model.

use thiserror::Error;

use crate::model::{AnalysisId, ComponentId};

/// Convenience alias for results within the results crate.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while building or reading a result model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("component '{component}' has no analyses")]
    NoAnalyses { component: String },

    #[error("unknown component: '{0}'")]
    UnknownComponent(String),

    #[error("component id {0} is not part of this model")]
    InvalidComponent(ComponentId),

    #[error("analysis id {0} is not part of this model")]
    UnknownAnalysis(AnalysisId),

    #[error("component '{0}' cannot be its own child")]
    SelfEdge(String),
}
