//! Hydrated action model.
//!
//! An [`ActionInfo`] is the analyzer-facing view of one build action: its
//! declared inputs and outputs, the directories it may populate dynamically,
//! and the rewrite policy governing how leniently its conflicting accesses
//! are treated. Actions are immutable for the duration of an analysis; the
//! graph owns them and hands out shared references via
//! [`DependencyGraph::hydrate`](crate::DependencyGraph::hydrate).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::GraphError;
use crate::types::{ActionId, DirectoryKind};

// ---------------------------------------------------------------------------
// FileOutput
// ---------------------------------------------------------------------------

/// One declared file output of an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileOutput {
    /// Absolute, normalized path of the output.
    pub path: PathBuf,
    /// How many times the path is produced along the dependency chain up to
    /// and including this declaration (1 = first write).
    pub rewrite_count: u32,
    /// Whether the file must exist after the action runs.
    pub required: bool,
    /// Whether the file is a declared temporary (exists only while the
    /// producing chain runs, not part of the final output set).
    pub temporary: bool,
}

impl FileOutput {
    /// A plain required, non-temporary, first-version output.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rewrite_count: 1,
            required: true,
            temporary: false,
        }
    }
}

// ---------------------------------------------------------------------------
// DirectoryOutput
// ---------------------------------------------------------------------------

/// One declared output directory of an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryOutput {
    /// Absolute, normalized root of the directory.
    pub root: PathBuf,
    /// Whether the directory is shared between writers or exclusively owned.
    pub kind: DirectoryKind,
}

// ---------------------------------------------------------------------------
// RewritePolicy
// ---------------------------------------------------------------------------

/// How double writes involving this action are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DoubleWritePolicy {
    /// Unordered double writes are hard errors.
    #[default]
    Forbid,
    /// Unordered double writes are reported as warnings and do not block
    /// caching; the first writer wins.
    WarnOnly,
    /// Double writes producing byte-identical content are tolerated, pending
    /// re-validation when cached content replaces the observed content.
    AllowSameContent,
}

/// Per-action relaxations of the default conflict rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewritePolicy {
    /// Treatment of double writes this action participates in.
    pub double_writes: DoubleWritePolicy,
    /// Whether this action may rewrite a path other actions read without
    /// declaring, provided content equality can be proven.
    pub safe_source_rewrites_allowed: bool,
}

impl RewritePolicy {
    /// `true` if this action tolerates same-content double writes.
    #[must_use]
    pub const fn allows_same_content_double_writes(&self) -> bool {
        matches!(self.double_writes, DoubleWritePolicy::AllowSameContent)
    }

    /// `true` if double writes involving this action are warnings only.
    #[must_use]
    pub const fn double_writes_warn_only(&self) -> bool {
        matches!(self.double_writes, DoubleWritePolicy::WarnOnly)
    }
}

// ---------------------------------------------------------------------------
// UndeclaredReadScopes
// ---------------------------------------------------------------------------

/// Allow-list restricting where an action may perform undeclared reads.
///
/// When any of the three lists is non-empty the action runs in restricted
/// mode: every undeclared read must fall under one of the prefixes, match an
/// exact path, or match one of the glob patterns. An empty scope set means
/// undeclared reads are unrestricted (subject to the usual race checks).
#[derive(Clone, Debug, Default)]
pub struct UndeclaredReadScopes {
    prefixes: Vec<PathBuf>,
    exact_paths: BTreeSet<PathBuf>,
    patterns: Vec<glob::Pattern>,
}

impl UndeclaredReadScopes {
    /// Build a scope set, compiling the glob patterns.
    ///
    /// # Errors
    /// Returns [`GraphError::InvalidPattern`] if any glob pattern fails to
    /// compile.
    pub fn new(
        prefixes: Vec<PathBuf>,
        exact_paths: Vec<PathBuf>,
        patterns: &[String],
    ) -> Result<Self, GraphError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let pattern = glob::Pattern::new(raw).map_err(|e| GraphError::InvalidPattern {
                pattern: raw.clone(),
                reason: e.to_string(),
            })?;
            compiled.push(pattern);
        }
        Ok(Self {
            prefixes,
            exact_paths: exact_paths.into_iter().collect(),
            patterns: compiled,
        })
    }

    /// `true` if any restriction is present.
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        !self.prefixes.is_empty() || !self.exact_paths.is_empty() || !self.patterns.is_empty()
    }

    /// `true` if `path` falls under one of the allowed scopes.
    #[must_use]
    pub fn permits(&self, path: &Path) -> bool {
        if self.exact_paths.contains(path) {
            return true;
        }
        if self.prefixes.iter().any(|prefix| path.starts_with(prefix)) {
            return true;
        }
        self.patterns.iter().any(|pattern| pattern.matches_path(path))
    }
}

// ---------------------------------------------------------------------------
// ActionInfo
// ---------------------------------------------------------------------------

/// The analyzer-facing description of one build action.
#[derive(Clone, Debug, Default)]
pub struct ActionInfo {
    /// Short human-readable description used in diagnostics.
    pub description: String,
    /// Declared input file paths.
    pub dependencies: BTreeSet<PathBuf>,
    /// Declared output files with attributes.
    pub outputs: Vec<FileOutput>,
    /// Declared input directory roots (sealed directories, consumed opaques).
    pub directory_dependencies: Vec<PathBuf>,
    /// Declared output directories.
    pub directory_outputs: Vec<DirectoryOutput>,
    /// Conflict-relaxation policy.
    pub rewrite_policy: RewritePolicy,
    /// Optional undeclared-read allow-list; `None` means unrestricted.
    pub read_scopes: Option<UndeclaredReadScopes>,
}

impl ActionInfo {
    /// Create an action with a description and no declarations.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// `true` if `path` is among the declared input files.
    #[must_use]
    pub fn declares_input(&self, path: &Path) -> bool {
        self.dependencies.contains(path)
    }

    /// The declared output record for `path`, if any.
    #[must_use]
    pub fn declared_output(&self, path: &Path) -> Option<&FileOutput> {
        self.outputs.iter().find(|output| output.path == path)
    }

    /// `true` if `path` falls under one of the declared input directories.
    #[must_use]
    pub fn covered_by_directory_dependency(&self, path: &Path) -> bool {
        self.directory_dependencies
            .iter()
            .any(|root| path.starts_with(root))
    }

    /// The declared output directory containing `path`, if any.
    #[must_use]
    pub fn containing_directory_output(&self, path: &Path) -> Option<&DirectoryOutput> {
        self.directory_outputs
            .iter()
            .find(|dir| path.starts_with(&dir.root))
    }
}

/// Pairing of an id and its hydrated info, as stored by graph implementations.
#[derive(Clone, Debug)]
pub struct ActionRecord {
    /// The graph-assigned id.
    pub id: ActionId,
    /// The hydrated description.
    pub info: ActionInfo,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
