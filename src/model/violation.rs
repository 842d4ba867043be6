//! Structured violation model — the taxonomy of access-conflict defects.
//!
//! Each violation is a small immutable record tying a kind to the affected
//! path, the violating action, and (where a second party exists) the related
//! action. Severity and cacheability are not hardwired into the variants:
//! every kind carries a [`KindTraits`] row consulted by the report
//! aggregator, so policy decisions (allow-listing, distribution validation,
//! probe strictness) stay in one place instead of a long branch.
//!
//! # Serialization
//!
//! Violations serialize as tagged JSON for agent- and telemetry-friendly
//! output:
//!
//! ```json
//! {
//!   "kind": "double_write",
//!   "path": "/out/shared/a.txt",
//!   "violator": 12,
//!   "related": 7,
//!   "is_error": true,
//!   "makes_uncacheable": true,
//!   "detail": "also produced by a#7"
//! }
//! ```

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use tripwire_graph::ActionId;

// ---------------------------------------------------------------------------
// ViolationKind
// ---------------------------------------------------------------------------

/// Every way an observed access can contradict the declared graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Two actions produced the same path without a provable order.
    DoubleWrite,
    /// A read raced with an unordered producer of the same path.
    ReadRace,
    /// A read of a path produced by an action ordered before the reader, but
    /// never declared as a dependency.
    UndeclaredOrderedRead,
    /// A read of a path nothing produces; the source file was simply never
    /// declared.
    MissingSourceDependency,
    /// A read of a path produced by an action ordered *after* the reader —
    /// honoring it would require a dependency cycle.
    UndeclaredReadCycle,
    /// A write to a path no manifest declares as anyone's output.
    UndeclaredOutput,
    /// A read of a path some action wrote without declaring it.
    ReadUndeclaredOutput,
    /// A write under a sealed source directory.
    WriteInSourceSealDirectory,
    /// A write under an exclusive opaque directory owned by another action.
    WriteInExclusiveOpaque,
    /// A write to a path declared as a source file.
    WriteInStaticallyDeclaredSourceFile,
    /// A write to a path other actions read as an undeclared source, where
    /// content equality could not be proven.
    WriteInUndeclaredSourceRead,
    /// The same temp file was produced by actions with no order between them.
    TempFileProducedByIndependentActions,
    /// An undeclared read outside the action's allowed scopes.
    DisallowedUndeclaredSourceRead,
    /// A write to a path another action had probed and found absent, without
    /// an order between prober and writer.
    WriteOnAbsentPathProbe,
    /// An absent-path probe under an output directory the prober does not
    /// depend on.
    AbsentPathProbeUnderUndeclaredOpaque,
    /// The access could not be normalized for classification; severity comes
    /// solely from global policy.
    UnanalyzableAccess,
}

/// Default severity and cacheability behavior of one violation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KindTraits {
    /// Reported as an error when the access was not allow-listed.
    pub error_by_default: bool,
    /// Upgraded to an error under distribution validation even when
    /// allow-listed.
    pub escalates_under_distribution_validation: bool,
    /// Makes the producing action ineligible for caching.
    pub makes_uncacheable: bool,
}

impl ViolationKind {
    /// The traits row for this kind.
    ///
    /// Exceptions applied downstream by the aggregator: a `DoubleWrite`
    /// where both parties share a warn-only rewrite policy stays cacheable,
    /// and `AbsentPathProbeUnderUndeclaredOpaque` severity follows the probe
    /// handling mode.
    #[must_use]
    pub const fn traits(self) -> KindTraits {
        match self {
            Self::DoubleWrite
            | Self::ReadRace
            | Self::UndeclaredOrderedRead
            | Self::ReadUndeclaredOutput
            | Self::TempFileProducedByIndependentActions => KindTraits {
                error_by_default: true,
                escalates_under_distribution_validation: true,
                makes_uncacheable: true,
            },
            Self::AbsentPathProbeUnderUndeclaredOpaque | Self::UnanalyzableAccess => KindTraits {
                error_by_default: false,
                escalates_under_distribution_validation: false,
                makes_uncacheable: true,
            },
            Self::MissingSourceDependency
            | Self::UndeclaredReadCycle
            | Self::UndeclaredOutput
            | Self::WriteInSourceSealDirectory
            | Self::WriteInExclusiveOpaque
            | Self::WriteInStaticallyDeclaredSourceFile
            | Self::WriteInUndeclaredSourceRead
            | Self::DisallowedUndeclaredSourceRead
            | Self::WriteOnAbsentPathProbe => KindTraits {
                error_by_default: true,
                escalates_under_distribution_validation: false,
                makes_uncacheable: true,
            },
        }
    }

    /// Short human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::DoubleWrite => "double write",
            Self::ReadRace => "read race",
            Self::UndeclaredOrderedRead => "undeclared ordered read",
            Self::MissingSourceDependency => "missing source dependency",
            Self::UndeclaredReadCycle => "undeclared read cycle",
            Self::UndeclaredOutput => "undeclared output",
            Self::ReadUndeclaredOutput => "read of undeclared output",
            Self::WriteInSourceSealDirectory => "write in sealed source directory",
            Self::WriteInExclusiveOpaque => "write in exclusive opaque directory",
            Self::WriteInStaticallyDeclaredSourceFile => "write in declared source file",
            Self::WriteInUndeclaredSourceRead => "write in undeclared source read",
            Self::TempFileProducedByIndependentActions => {
                "temp file produced by independent actions"
            }
            Self::DisallowedUndeclaredSourceRead => "disallowed undeclared source read",
            Self::WriteOnAbsentPathProbe => "write on absent-path probe",
            Self::AbsentPathProbeUnderUndeclaredOpaque => {
                "absent-path probe under undeclared opaque"
            }
            Self::UnanalyzableAccess => "unanalyzable access",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Violation
// ---------------------------------------------------------------------------

/// One classified violation, final severity and cacheability assigned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// The violation kind.
    pub kind: ViolationKind,
    /// The affected path (the raw string for unanalyzable accesses).
    pub path: PathBuf,
    /// The action held responsible.
    pub violator: ActionId,
    /// The other party, when the kind involves one (the prior writer, the
    /// racing reader, the probing action).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub related: Option<ActionId>,
    /// The process image that performed the access, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub process: Option<PathBuf>,
    /// Final severity after allow-listing and distribution rules.
    pub is_error: bool,
    /// Whether this violation blocks caching of the violator's result.
    pub makes_uncacheable: bool,
    /// Freeform diagnostic text bound to the path and parties.
    pub detail: String,
}

// ---------------------------------------------------------------------------
// AnalysisResult
// ---------------------------------------------------------------------------

/// The contract-level outcome of one full analysis pass for one action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// No violations of any severity were produced.
    pub is_clean: bool,
    /// The action's outputs may be stored to and served from the cache.
    pub is_safe_to_cache: bool,
}

impl AnalysisResult {
    /// The result of an analysis that found nothing.
    #[must_use]
    pub const fn clean() -> Self {
        Self {
            is_clean: true,
            is_safe_to_cache: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
