//! Report aggregation — severity, cacheability, and emission.
//!
//! Raw classifier findings carry no severity. This module assigns it from
//! the per-kind [`KindTraits`](crate::model::KindTraits) table plus the
//! build-wide options, merges findings into per-path worst-access summaries,
//! forwards every merged violation to the external sink, and condenses the
//! whole pass into the `(is_clean, is_safe_to_cache)` contract result.
//!
//! Severity rules:
//! - not allow-listed ⇒ error when the kind defaults to error;
//! - allow-listed ⇒ error only when the kind escalates under distribution
//!   validation and that mode is on;
//! - unanalyzable accesses and undeclared-opaque probes take their severity
//!   from the corresponding global option instead.
//!
//! Cacheability follows the kind table, except a double write whose two
//! parties both opted into the warn-only rewrite policy stays cacheable and
//! is downgraded to a warning.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use tripwire_graph::ActionId;

use crate::classifier::{AnalyzerOptions, ProbeMode, RawViolation};
use crate::model::{AnalysisResult, Violation, ViolationKind};

// ---------------------------------------------------------------------------
// ViolationSink
// ---------------------------------------------------------------------------

/// Fire-and-forget, order-independent violation emission.
///
/// For diagnostics and telemetry only — not part of the correctness
/// contract. Implementations must tolerate concurrent calls.
pub trait ViolationSink: Sync {
    /// Receive one merged violation.
    fn report(&self, violation: &Violation);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ViolationSink for NullSink {
    fn report(&self, _violation: &Violation) {}
}

/// Collects violations in memory, for tests and the trace replay binary.
#[derive(Debug, Default)]
pub struct CollectingSink {
    collected: Mutex<Vec<Violation>>,
}

impl CollectingSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far.
    #[must_use]
    pub fn drain(&self) -> Vec<Violation> {
        std::mem::take(
            &mut self
                .collected
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }
}

impl ViolationSink for CollectingSink {
    fn report(&self, violation: &Violation) {
        self.collected
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(violation.clone());
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn severity(raw: &RawViolation, options: AnalyzerOptions) -> bool {
    let traits = raw.kind.traits();
    match raw.kind {
        ViolationKind::DoubleWrite if raw.warn_only_double_write => false,
        ViolationKind::UnanalyzableAccess => options.unexpected_access_is_error,
        ViolationKind::AbsentPathProbeUnderUndeclaredOpaque => {
            options.probe_mode == ProbeMode::Strict
        }
        _ if raw.allowlisted => {
            traits.escalates_under_distribution_validation && options.distribution_validation
        }
        _ => traits.error_by_default,
    }
}

fn cacheability(raw: &RawViolation) -> bool {
    let traits = raw.kind.traits();
    if raw.kind == ViolationKind::DoubleWrite && raw.warn_only_double_write {
        return false;
    }
    traits.makes_uncacheable
}

/// Assign severity to every finding, merge per `(path, violator)` keeping
/// the worst, emit to the sink, and summarize.
pub(crate) fn aggregate(
    action: ActionId,
    raw: Vec<RawViolation>,
    options: AnalyzerOptions,
    sink: &dyn ViolationSink,
) -> (AnalysisResult, Vec<Violation>) {
    let is_clean = raw.is_empty();

    let mut worst: BTreeMap<(PathBuf, ActionId), Violation> = BTreeMap::new();
    for finding in raw {
        let violation = Violation {
            kind: finding.kind,
            path: finding.path.clone(),
            violator: finding.violator,
            related: finding.related,
            process: finding.process.clone(),
            is_error: severity(&finding, options),
            makes_uncacheable: cacheability(&finding),
            detail: finding.detail,
        };
        let key = (finding.path, finding.violator);
        match worst.get_mut(&key) {
            None => {
                worst.insert(key, violation);
            }
            Some(current) => {
                if outranks(&violation, current) {
                    *current = violation;
                }
            }
        }
    }

    let merged: Vec<Violation> = worst.into_values().collect();
    for violation in &merged {
        sink.report(violation);
        if violation.is_error {
            tracing::warn!(
                kind = %violation.kind,
                path = %violation.path.display(),
                violator = %violation.violator,
                "{}",
                violation.detail
            );
        } else {
            tracing::debug!(
                kind = %violation.kind,
                path = %violation.path.display(),
                violator = %violation.violator,
                "{}",
                violation.detail
            );
        }
    }

    let is_safe_to_cache = !merged
        .iter()
        .any(|violation| violation.violator == action && violation.makes_uncacheable);
    (
        AnalysisResult {
            is_clean,
            is_safe_to_cache,
        },
        merged,
    )
}

/// Worst-access ordering: errors beat warnings, uncacheable beats cacheable,
/// earlier findings win ties (deterministic for identical inputs).
fn outranks(candidate: &Violation, current: &Violation) -> bool {
    (candidate.is_error, candidate.makes_uncacheable)
        > (current.is_error, current.makes_uncacheable)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
