use thiserror::Error;

/// Failures while linking a catalog document into the runtime graph.
///
/// Every invariant violation is reported here at build time; the compiler can
/// then navigate the graph without re-checking.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse catalog document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate model `{0}`")]
    DuplicateModel(String),

    #[error("duplicate field or relation name `{name}` on model `{model}`")]
    DuplicateMember { model: String, name: String },

    #[error("relation `{relation}` on `{model}` targets unknown model `{target}`")]
    UnknownTargetModel {
        model: String,
        relation: String,
        target: String,
    },

    #[error("unknown column `{column}` referenced by relation `{relation}` on `{model}`")]
    UnknownColumn {
        model: String,
        relation: String,
        column: String,
    },

    #[error("unknown field `{field}` in key set of model `{model}`")]
    UnknownKeyField { model: String, field: String },

    #[error("relation `{relation}` on `{model}` is missing keying info for its kind")]
    IncompleteKeys { model: String, relation: String },

    #[error("relation `{relation}` on `{model}` has no inverse on `{target}`")]
    MissingInverse {
        model: String,
        relation: String,
        target: String,
    },

    #[error(
        "relation `{relation}` on `{model}` has more than one candidate inverse on `{target}`; \
         set backReference on both edges"
    )]
    AmbiguousInverse {
        model: String,
        relation: String,
        target: String,
    },

    #[error(
        "relation `{relation}` on `{model}` disagrees with its inverse `{inverse}` on kind or keys"
    )]
    InverseMismatch {
        model: String,
        relation: String,
        inverse: String,
    },
}
