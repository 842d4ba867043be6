//! Error types for graph construction.
//!
//! [`GraphError`] is returned by [`MemoryGraphBuilder`](crate::MemoryGraphBuilder)
//! operations. It uses rich enum variants so callers can match on specific
//! failure modes (duplicate action, dangling edge, cycle) without parsing
//! error messages. Query-side trait methods never fail — absence is an
//! explicit `None`/empty result, not an error.

use thiserror::Error;

use crate::types::ActionId;

/// Errors returned while assembling a dependency graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An action id was registered twice.
    #[error("duplicate action {id}")]
    DuplicateAction {
        /// The id that was registered twice.
        id: ActionId,
    },

    /// An edge or query referenced an id the graph does not contain.
    #[error("unknown action {id}")]
    UnknownAction {
        /// The unknown id.
        id: ActionId,
    },

    /// An action was declared to depend on itself.
    #[error("self dependency on {id}")]
    SelfDependency {
        /// The offending id.
        id: ActionId,
    },

    /// The declared edges form a cycle; no valid execution order exists.
    #[error("dependency cycle through {id}")]
    CycleDetected {
        /// One action on the cycle.
        id: ActionId,
    },

    /// An undeclared-read scope pattern failed to compile.
    #[error("invalid scope pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The raw pattern.
        pattern: String,
        /// Why compilation failed.
        reason: String,
    },
}
