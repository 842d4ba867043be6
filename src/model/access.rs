//! Access events as the analyzer receives them.
//!
//! Two families arrive per analyzed action:
//!
//! - **Static accesses** ([`ReportedAccess`]): raw accesses the sandbox
//!   rejected against the action's manifest, plus (under distribution
//!   validation) allow-listed accesses that still need checking. They carry a
//!   requested level and the reporting method, and their paths may fail to
//!   normalize — those are routed to the unanalyzable bucket rather than
//!   dropped.
//! - **Dynamic observations** ([`DynamicObservations`]): accesses that
//!   succeeded at run time — writes under opaque directories, undeclared
//!   reads the manifest tolerated, and absent-path probes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use tripwire_graph::ContentHash;

// ---------------------------------------------------------------------------
// AccessLevel
// ---------------------------------------------------------------------------

/// Requested level of a static access.
///
/// When the same `(path, process)` pair is reported more than once, levels
/// combine by maximum: `Write` dominates `Read` dominates `None`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// No concrete level was requested (e.g. a bare handle open). Not
    /// classifiable; routed to the unanalyzable bucket.
    #[default]
    None,
    /// Read-level access.
    Read,
    /// Write-level access (includes read-write).
    Write,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

// ---------------------------------------------------------------------------
// ReportingMethod
// ---------------------------------------------------------------------------

/// How the sandbox decided to report a static access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingMethod {
    /// Rejected by manifest policy evaluation.
    #[default]
    ManifestPolicy,
    /// Reported because of an unexpected file-existence observation.
    FileExistence,
}

// ---------------------------------------------------------------------------
// ReportedAccess
// ---------------------------------------------------------------------------

/// One raw static access, exactly as the sandbox reported it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportedAccess {
    /// The path string as reported. Kept verbatim for diagnostics even when
    /// it cannot be normalized.
    pub raw_path: String,
    /// Requested access level.
    #[serde(default)]
    pub level: AccessLevel,
    /// Reporting method.
    #[serde(default)]
    pub method: ReportingMethod,
    /// The process image that performed the access, when known.
    #[serde(default)]
    pub process: Option<PathBuf>,
    /// Whether a configured allow-list matched this access.
    #[serde(default)]
    pub allowlisted: bool,
}

impl ReportedAccess {
    /// A plain non-allowlisted access.
    #[must_use]
    pub fn new(raw_path: impl Into<String>, level: AccessLevel) -> Self {
        Self {
            raw_path: raw_path.into(),
            level,
            method: ReportingMethod::ManifestPolicy,
            process: None,
            allowlisted: false,
        }
    }

    /// Normalize the raw path. Only absolute paths are analyzable; anything
    /// else (empty strings, relative fragments, device names) returns `None`
    /// and the access goes to the unanalyzable bucket.
    #[must_use]
    pub fn parsed_path(&self) -> Option<PathBuf> {
        let path = PathBuf::from(&self.raw_path);
        if !self.raw_path.is_empty() && path.is_absolute() {
            Some(path)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// ObservedWrite
// ---------------------------------------------------------------------------

/// One dynamically observed write under an opaque directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObservedWrite {
    /// Absolute path that was written.
    pub path: PathBuf,
    /// Hash of the written content, when the sandbox captured it.
    #[serde(default)]
    pub content: Option<ContentHash>,
    /// Whether the write was flagged as a declared temporary file.
    #[serde(default)]
    pub temporary: bool,
}

impl ObservedWrite {
    /// A plain non-temporary write with no captured content.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content: None,
            temporary: false,
        }
    }

    /// Attach the written content hash.
    #[must_use]
    pub fn with_content(mut self, hash: ContentHash) -> Self {
        self.content = Some(hash);
        self
    }
}

// ---------------------------------------------------------------------------
// DynamicObservations
// ---------------------------------------------------------------------------

/// Everything one action was observed doing at run time.
///
/// All collections default to empty so cache-replay paths can supply only
/// the passes they have data for.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DynamicObservations {
    /// Writes under shared opaque directory roots.
    #[serde(default)]
    pub shared_opaque_writes: Vec<ObservedWrite>,
    /// Writes under the action's own exclusive opaque roots.
    #[serde(default)]
    pub exclusive_opaque_writes: Vec<ObservedWrite>,
    /// Reads of paths not declared as dependencies but tolerated by the
    /// manifest.
    #[serde(default)]
    pub allowed_undeclared_reads: Vec<PathBuf>,
    /// Existence probes that observed the path absent, under output
    /// directories.
    #[serde(default)]
    pub absent_probes: Vec<PathBuf>,
    /// Directories the action freshly created while populating opaques.
    #[serde(default)]
    pub created_directories: Vec<PathBuf>,
    /// Final observed content hash per produced path, used for convergence
    /// checking and same-content verdicts.
    #[serde(default)]
    pub output_contents: BTreeMap<PathBuf, ContentHash>,
}

impl DynamicObservations {
    /// No observations at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
