//! The [`DependencyGraph`] and [`ContentResolver`] traits.
//!
//! Everything the conflict analyzer needs from the outside world comes
//! through these two traits. Both are query-only: implementations surface
//! absence as `None`/empty results, never as panics, and must be callable
//! concurrently from many analysis threads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::action::{ActionInfo, RewritePolicy};
use crate::types::{ActionId, ContentHash, Producer};

/// Query interface over the build's declared dependency structure.
///
/// Implementations may traverse persistent structures or perform I/O; callers
/// treat every method as potentially expensive and batch queries where they
/// can. Reachability is strict: an action is not reachable from itself.
pub trait DependencyGraph: Sync {
    /// `true` if a declared transitive dependency path exists from `from` to
    /// `to` — that is, `from` must have completed before `to` starts.
    fn is_reachable(&self, from: ActionId, to: ActionId) -> bool;

    /// All declared producers of `path`, in no particular order.
    ///
    /// Includes source-hash nodes for source files and one entry per declared
    /// rewrite version for built outputs. Empty when nothing declares `path`.
    fn producers_of(&self, path: &Path) -> Vec<Producer>;

    /// The root of the sealed source directory containing `path`, if any.
    fn sealed_source_ancestor(&self, path: &Path) -> Option<PathBuf>;

    /// The root and owner of the exclusive opaque directory containing
    /// `path`, if any.
    fn exclusive_opaque_ancestor(&self, path: &Path) -> Option<(PathBuf, ActionId)>;

    /// The root of the declared temp directory containing `path`, if any.
    fn temp_directory_ancestor(&self, path: &Path) -> Option<PathBuf>;

    /// The rewrite policy of `action` (default policy for unknown ids).
    fn rewrite_policy_of(&self, action: ActionId) -> RewritePolicy;

    /// The full description of `action`, or `None` for ids the graph does
    /// not know (source-hash nodes hydrate to `None`).
    fn hydrate(&self, action: ActionId) -> Option<Arc<ActionInfo>>;
}

/// Resolves the current content of a path to a hash.
///
/// Used when a rewrite verdict depends on proving that a write reproduces the
/// bytes a reader already observed. Lookups are synchronous; a verdict is
/// never returned before the lookup completes.
pub trait ContentResolver: Sync {
    /// The hash of the path's current content, or `None` when the path is
    /// absent or unreadable.
    fn try_get_content_hash(&self, path: &Path) -> Option<ContentHash>;
}

/// A resolver over a fixed in-memory table, for embedders and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticContentResolver {
    contents: std::collections::HashMap<PathBuf, ContentHash>,
}

impl StaticContentResolver {
    /// Create an empty resolver (every lookup misses).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the content hash for a path.
    pub fn insert(&mut self, path: impl Into<PathBuf>, hash: ContentHash) {
        self.contents.insert(path.into(), hash);
    }
}

impl ContentResolver for StaticContentResolver {
    fn try_get_content_hash(&self, path: &Path) -> Option<ContentHash> {
        self.contents.get(path).copied()
    }
}
