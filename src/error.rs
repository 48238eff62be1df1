//! Error types for reconciliation.
//!
//! Any error aborts the render pass it occurred in. The half-built
//! work-in-progress tree is discarded and the committed output tree is left
//! exactly as it was.

use thiserror::Error;

use crate::types::WorkTag;

/// Errors raised while building or committing a work tree.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A description whose kind has no fiber mapping (root/text markers,
    /// empty host tags).
    #[error("unrecognized element kind: {0}")]
    UnrecognizedKind(String),

    /// A fiber tag the engine does not process, with the strict policy on.
    #[error("unsupported work tag {tag:?} for component `{name}`")]
    UnsupportedTag { tag: WorkTag, name: String },

    /// A fiber id no longer resolves in the arena.
    #[error("fiber missing from arena during {0}")]
    MissingFiber(&'static str),

    /// A host fiber reached commit without an output instance.
    #[error("host fiber has no instance during {0}")]
    MissingInstance(&'static str),

    /// The root is already rendering.
    #[error("root is busy with another render pass")]
    RootBusy,
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
