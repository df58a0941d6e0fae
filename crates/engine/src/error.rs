use thiserror::Error;

use crate::adapter::DriverError;
use crate::context::MAX_DEPTH;

/// Errors surfaced by compilation, execution, and shaping.
///
/// The core never recovers locally; every failure travels to the caller.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query references a model, field, or relation the catalog does not
    /// know.
    #[error("unknown {kind} `{name}` on `{scope}`")]
    SchemaMismatch {
        kind: &'static str,
        name: String,
        scope: String,
    },

    /// The query tree itself is ill-formed.
    #[error("invalid query: {0}")]
    InvalidArgument(String),

    /// The dialect cannot express the requested shape.
    #[error("unsupported on this dialect: {0}")]
    Unsupported(String),

    #[error("relation nesting exceeds {MAX_DEPTH} levels")]
    DepthExceeded,

    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A returned row does not fit the plan. Carries the slot name when the
    /// row came out of a batch.
    #[error(
        "result does not fit the plan{}: {detail}",
        .slot.as_ref().map(|s| format!(" (slot `{s}`)")).unwrap_or_default()
    )]
    ShapeMismatch {
        slot: Option<String>,
        detail: String,
    },
}

impl QueryError {
    pub(crate) fn unknown_field(model: &str, name: &str) -> QueryError {
        QueryError::SchemaMismatch {
            kind: "field",
            name: name.to_string(),
            scope: model.to_string(),
        }
    }

    pub(crate) fn unknown_model(name: &str) -> QueryError {
        QueryError::SchemaMismatch {
            kind: "model",
            name: name.to_string(),
            scope: "catalog".to_string(),
        }
    }

    pub(crate) fn shape(detail: impl Into<String>) -> QueryError {
        QueryError::ShapeMismatch {
            slot: None,
            detail: detail.into(),
        }
    }

    /// Attaches a batch slot name to shape errors raised while demultiplexing.
    pub(crate) fn in_slot(self, slot: &str) -> QueryError {
        match self {
            QueryError::ShapeMismatch { slot: None, detail } => QueryError::ShapeMismatch {
                slot: Some(slot.to_string()),
                detail,
            },
            other => other,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, QueryError>;
