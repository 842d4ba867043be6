//! Content-equivalence policy for undeclared rewrites.
//!
//! Decides whether a write onto a path previously read without declaration
//! may be treated as safe instead of a
//! [`WriteInUndeclaredSourceRead`](crate::model::ViolationKind::WriteInUndeclaredSourceRead)
//! violation. The decision is pure given the reader snapshot, the ordering
//! oracle, and the resolved pre-write content:
//!
//! 1. No prior readers — the rewrite is unobservable, always safe.
//! 2. Every reader ordered after the writer — no reader can have seen the
//!    old bytes, safe with no content claim needed.
//! 3. The pre-write content hash equals the written hash — every reader,
//!    ordered or not, observes identical bytes, safe.
//!
//! Anything else is disallowed with a reason; a disallowed verdict always
//! carries one, and the diagnostic names the first reader the ordering
//! argument fails for. The content lookup completes before the verdict is
//! returned — callers never observe a partially-decided rewrite.

use std::fmt;
use std::path::Path;

use tripwire_graph::{ActionId, ContentHash, ContentResolver, RewritePolicy};

use crate::oracle::OrderingOracle;
use crate::registry::AccessRegistries;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Why a rewrite was disallowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteDisallowedReason {
    /// The writer's policy does not opt into safe source rewrites.
    SafeRewritesNotAllowed,
    /// An unordered (or ordered-before) reader exists and content equality
    /// could not be proven.
    SameContentCannotBeGuaranteed,
}

impl fmt::Display for RewriteDisallowedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SafeRewritesNotAllowed => write!(f, "safe source rewrites not allowed"),
            Self::SameContentCannotBeGuaranteed => {
                write!(f, "same content cannot be guaranteed")
            }
        }
    }
}

/// Outcome of a rewrite evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewriteVerdict {
    /// Whether the rewrite is safe.
    pub allowed: bool,
    /// Present exactly when disallowed.
    pub reason: Option<RewriteDisallowedReason>,
    /// The first reader the ordering argument failed for, for diagnostics.
    pub blocking_reader: Option<ActionId>,
}

impl RewriteVerdict {
    const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            blocking_reader: None,
        }
    }

    const fn deny(reason: RewriteDisallowedReason, blocking_reader: Option<ActionId>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            blocking_reader,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate whether `writer` rewriting `path` with `written` content is safe
/// given the undeclared readers recorded so far.
#[must_use]
pub fn evaluate_undeclared_rewrite(
    oracle: &OrderingOracle<'_>,
    registries: &AccessRegistries,
    resolver: &dyn ContentResolver,
    writer: ActionId,
    writer_policy: RewritePolicy,
    path: &Path,
    written: Option<ContentHash>,
) -> RewriteVerdict {
    if !writer_policy.safe_source_rewrites_allowed {
        return RewriteVerdict::deny(RewriteDisallowedReason::SafeRewritesNotAllowed, None);
    }

    let readers: Vec<ActionId> = registries
        .undeclared_readers
        .snapshot(path)
        .into_iter()
        .filter(|&reader| reader != writer)
        .collect();
    if readers.is_empty() {
        return RewriteVerdict::allow();
    }

    let unproven = readers
        .iter()
        .copied()
        .find(|&reader| !oracle.is_ordered_before(writer, reader));
    let Some(blocking) = unproven else {
        // Every reader runs strictly after the write.
        return RewriteVerdict::allow();
    };

    let pre_write = resolver.try_get_content_hash(path);
    if written.is_some() && pre_write == written {
        return RewriteVerdict::allow();
    }

    tracing::debug!(
        path = %path.display(),
        writer = %writer,
        reader = %blocking,
        "rewrite disallowed: reader not ordered after writer and content equality unproven"
    );
    RewriteVerdict::deny(
        RewriteDisallowedReason::SameContentCannotBeGuaranteed,
        Some(blocking),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
