//! Analyzer error types.
//!
//! The classifier has exactly one failure mode of its own: being handed an
//! action the graph cannot hydrate, which is a caller contract violation.
//! Everything else — unparseable accesses, missing producers, failed content
//! lookups — is data, classified and reported, never an error return.

use std::fmt;

use tripwire_graph::ActionId;

/// Errors returned by analyzer entry points.
#[derive(Debug)]
pub enum AnalyzeError {
    /// The dependency graph could not hydrate the given action id.
    UnknownAction {
        /// The id that failed to hydrate.
        action: ActionId,
    },
}

impl fmt::Display for AnalyzeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAction { action } => {
                write!(f, "unknown action {action}: the graph cannot hydrate it")
            }
        }
    }
}

impl std::error::Error for AnalyzeError {}
