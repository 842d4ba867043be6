//! Concurrent per-path access registries.
//!
//! One [`AccessRegistries`] instance is created per build invocation and
//! handed by reference to every concurrent analysis — never a process-wide
//! singleton. Four stores share the same discipline: every operation is a
//! single fixed-size critical section (lock, mutate, snapshot, unlock), so
//! no analysis ever blocks on another analysis completing, and racing
//! registrations converge on exactly one winner.
//!
//! # First-registration-wins
//!
//! [`PathAccessRegistry::register_or_get`] is the ordering tiebreaker for
//! dynamic accesses: whichever analysis inserts first owns the path's entry,
//! every later analysis observes that same entry unchanged, and entries are
//! never mutated after insertion. A write superseding a prior reader or
//! probe classification happens in the classifier, never by overwriting the
//! registry entry.
//!
//! # Commutative side maps
//!
//! The undeclared-accessor map must give the same final state whether a
//! path's readers are discovered before or after its writer; both
//! [`record_writer`](UndeclaredAccessors::record_writer) and
//! [`record_reader`](UndeclaredAccessors::record_reader) therefore return
//! the counterpart snapshot taken inside the same critical section, letting
//! the caller report retroactively without a read-then-write race.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tripwire_graph::{ActionId, ContentHash};

// ---------------------------------------------------------------------------
// PathEntry
// ---------------------------------------------------------------------------

/// What the winning registration for a path recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisteredAccess {
    /// The path was written dynamically.
    Writer {
        /// Hash of the written content, when captured.
        content: Option<ContentHash>,
        /// Whether the write was flagged as a declared temporary.
        temporary: bool,
    },
    /// The path was read without a declaration.
    UndeclaredReader,
    /// The path was probed and observed absent.
    AbsentProbe,
}

/// The immutable first-registration record for one path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathEntry {
    /// How the path was first touched.
    pub access: RegisteredAccess,
    /// The action whose registration won.
    pub owner: ActionId,
}

impl PathEntry {
    /// A writer entry.
    #[must_use]
    pub const fn writer(owner: ActionId, content: Option<ContentHash>, temporary: bool) -> Self {
        Self {
            access: RegisteredAccess::Writer { content, temporary },
            owner,
        }
    }

    /// An undeclared-reader entry.
    #[must_use]
    pub const fn reader(owner: ActionId) -> Self {
        Self {
            access: RegisteredAccess::UndeclaredReader,
            owner,
        }
    }

    /// An absent-probe entry.
    #[must_use]
    pub const fn probe(owner: ActionId) -> Self {
        Self {
            access: RegisteredAccess::AbsentProbe,
            owner,
        }
    }

    /// `true` if the winning access was a write.
    #[must_use]
    pub const fn is_writer(&self) -> bool {
        matches!(self.access, RegisteredAccess::Writer { .. })
    }
}

// ---------------------------------------------------------------------------
// PathAccessRegistry
// ---------------------------------------------------------------------------

/// Linearizable first-registration-wins store keyed by path.
#[derive(Debug, Default)]
pub struct PathAccessRegistry {
    entries: RwLock<HashMap<PathBuf, Arc<PathEntry>>>,
}

impl PathAccessRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically insert `entry` for `path` unless an entry already exists.
    ///
    /// Returns `(existing, winner)`: `existing` is `false` when this call's
    /// entry won, `true` when a prior registration (possibly from a racing
    /// thread) did. The builder closure runs only on the insert path.
    pub fn register_or_get(
        &self,
        path: &Path,
        entry: impl FnOnce() -> PathEntry,
    ) -> (bool, Arc<PathEntry>) {
        if let Some(found) = self.get(path) {
            return (true, found);
        }
        let mut entries = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        match entries.entry(path.to_path_buf()) {
            std::collections::hash_map::Entry::Occupied(occupied) => {
                (true, Arc::clone(occupied.get()))
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                let inserted = Arc::new(entry());
                vacant.insert(Arc::clone(&inserted));
                (false, inserted)
            }
        }
    }

    /// The current entry for `path`, if any.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Arc<PathEntry>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// UndeclaredAccessors
// ---------------------------------------------------------------------------

/// Per-path record of undeclared writer and readers, discovery-order free.
#[derive(Debug, Default)]
pub struct UndeclaredAccessors {
    inner: Mutex<HashMap<PathBuf, AccessorsEntry>>,
}

#[derive(Debug, Default)]
struct AccessorsEntry {
    writer: Option<ActionId>,
    readers: Vec<ActionId>,
}

impl UndeclaredAccessors {
    /// Record `action` as the path's undeclared writer (first writer is
    /// kept) and return the readers recorded so far, for retroactive
    /// reporting.
    pub fn record_writer(&self, path: &Path, action: ActionId) -> Vec<ActionId> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = inner.entry(path.to_path_buf()).or_default();
        if entry.writer.is_none() {
            entry.writer = Some(action);
        }
        entry.readers.clone()
    }

    /// Record `action` as an undeclared reader of the path and return the
    /// writer recorded so far, if any.
    pub fn record_reader(&self, path: &Path, action: ActionId) -> Option<ActionId> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = inner.entry(path.to_path_buf()).or_default();
        if !entry.readers.contains(&action) {
            entry.readers.push(action);
        }
        entry.writer
    }

    /// The recorded writer for `path`, if any.
    #[must_use]
    pub fn writer_of(&self, path: &Path) -> Option<ActionId> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .and_then(|entry| entry.writer)
    }
}

// ---------------------------------------------------------------------------
// TempFileProducers
// ---------------------------------------------------------------------------

/// Ordered list of actions that produced each path as a declared temp file.
#[derive(Debug, Default)]
pub struct TempFileProducers {
    inner: Mutex<HashMap<PathBuf, Vec<ActionId>>>,
}

impl TempFileProducers {
    /// Append `action` as a temp producer of `path` and return the producers
    /// recorded before it.
    pub fn append(&self, path: &Path, action: ActionId) -> Vec<ActionId> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let producers = inner.entry(path.to_path_buf()).or_default();
        let prior = producers.clone();
        if !producers.contains(&action) {
            producers.push(action);
        }
        prior
    }
}

// ---------------------------------------------------------------------------
// UndeclaredReaders
// ---------------------------------------------------------------------------

/// Ordered list of undeclared readers per path, retained to validate
/// same-content rewrites.
#[derive(Debug, Default)]
pub struct UndeclaredReaders {
    inner: Mutex<HashMap<PathBuf, Vec<ActionId>>>,
}

impl UndeclaredReaders {
    /// Record `action` as an undeclared reader of `path`.
    pub fn append(&self, path: &Path, action: ActionId) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let readers = inner.entry(path.to_path_buf()).or_default();
        if !readers.contains(&action) {
            readers.push(action);
        }
    }

    /// All recorded readers of `path`, in discovery order.
    #[must_use]
    pub fn snapshot(&self, path: &Path) -> Vec<ActionId> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .cloned()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// AccessRegistries
// ---------------------------------------------------------------------------

/// The full registry set for one build invocation.
#[derive(Debug, Default)]
pub struct AccessRegistries {
    /// First-registration-wins dynamic access store.
    pub paths: PathAccessRegistry,
    /// Undeclared writer/readers per path.
    pub undeclared_accessors: UndeclaredAccessors,
    /// Temp-file producers per path.
    pub temp_producers: TempFileProducers,
    /// Undeclared readers retained for rewrite validation.
    pub undeclared_readers: UndeclaredReaders,
}

impl AccessRegistries {
    /// Fresh registries for a new build invocation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
