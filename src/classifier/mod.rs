//! The violation classifier — entry points for per-action analysis.
//!
//! One [`ConflictAnalyzer`] is shared by every worker thread of a build;
//! each call to [`analyze`](ConflictAnalyzer::analyze) processes one
//! action's complete access set. The work splits into phases, each a
//! separate module:
//!
//! - [`static_access`] — accesses the sandbox rejected against the manifest
//!   (plus allow-listed accesses under distribution validation).
//! - [`dynamic`] — accesses that succeeded at run time: opaque-directory
//!   writes, tolerated undeclared reads, absent-path probes.
//!
//! Classification produces raw, severity-free findings; the report
//! aggregator assigns severity and cacheability and forwards them to the
//! sink. Content-contingent findings that were provisionally allowed are
//! returned separately so the convergence step can re-check them when cached
//! content replaces what was observed.

pub mod dynamic;
pub mod static_access;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tripwire_graph::{ActionId, ActionInfo, ContentHash, ContentResolver, DependencyGraph};

use crate::error::AnalyzeError;
use crate::model::{AnalysisResult, DynamicObservations, ReportedAccess, Violation, ViolationKind};
use crate::oracle::OrderingOracle;
use crate::registry::AccessRegistries;
use crate::report::{self, ViolationSink};
use crate::{convergence, policy};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How strictly absent-path probes under undeclared opaques are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProbeMode {
    /// Such probes are warnings.
    #[default]
    Relaxed,
    /// Such probes are errors.
    Strict,
}

/// Build-wide analyzer configuration.
#[derive(Clone, Copy, Debug)]
pub struct AnalyzerOptions {
    /// Validate allow-listed accesses for distributed-build safety and
    /// escalate racy kinds to errors.
    pub distribution_validation: bool,
    /// Severity of accesses that could not be normalized for classification.
    pub unexpected_access_is_error: bool,
    /// Severity of absent-path probes under undeclared opaques.
    pub probe_mode: ProbeMode,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            distribution_validation: false,
            unexpected_access_is_error: true,
            probe_mode: ProbeMode::Relaxed,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A violation that was provisionally allowed on content grounds, retained
/// for re-validation when cache convergence may change the content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowedRewrite {
    /// The kind that would have been reported.
    pub kind: ViolationKind,
    /// The content hash the allowance was based on.
    pub content: Option<ContentHash>,
    /// The other party of the suppressed violation.
    pub related: Option<ActionId>,
}

/// Everything one analysis pass produced.
#[derive(Clone, Debug)]
pub struct AnalysisReport {
    /// The contract-level summary.
    pub result: AnalysisResult,
    /// Merged per-path violations, severity assigned.
    pub violations: Vec<Violation>,
    /// Content-contingent allowances keyed by path, for convergence checks.
    pub allowed: BTreeMap<PathBuf, AllowedRewrite>,
}

// ---------------------------------------------------------------------------
// RawViolation — classifier-internal finding, severity not yet assigned
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub(crate) struct RawViolation {
    pub kind: ViolationKind,
    pub path: PathBuf,
    pub violator: ActionId,
    pub related: Option<ActionId>,
    pub process: Option<PathBuf>,
    pub detail: String,
    pub allowlisted: bool,
    /// Both parties of a double write share the warn-only policy.
    pub warn_only_double_write: bool,
}

// ---------------------------------------------------------------------------
// ConflictAnalyzer
// ---------------------------------------------------------------------------

/// The access-conflict analyzer for one build invocation.
///
/// Holds shared handles only; all per-action state lives on the call stack,
/// so one instance serves any number of concurrent analyses.
pub struct ConflictAnalyzer<'a> {
    pub(crate) graph: &'a dyn DependencyGraph,
    pub(crate) resolver: &'a dyn ContentResolver,
    pub(crate) sink: &'a dyn ViolationSink,
    pub(crate) registries: &'a AccessRegistries,
    pub(crate) options: AnalyzerOptions,
}

impl<'a> ConflictAnalyzer<'a> {
    /// Assemble an analyzer from its collaborators.
    #[must_use]
    pub fn new(
        graph: &'a dyn DependencyGraph,
        resolver: &'a dyn ContentResolver,
        sink: &'a dyn ViolationSink,
        registries: &'a AccessRegistries,
        options: AnalyzerOptions,
    ) -> Self {
        Self {
            graph,
            resolver,
            sink,
            registries,
            options,
        }
    }

    /// Analyze one action's complete access set: static accesses first, then
    /// the dynamic passes.
    ///
    /// `rejected` are accesses the sandbox refused; `allowlisted` are
    /// accesses a configured allow-list tolerated, validated only under
    /// distribution validation.
    ///
    /// # Errors
    /// [`AnalyzeError::UnknownAction`] when the graph cannot hydrate
    /// `action` — a caller contract violation, not an analysis outcome.
    pub fn analyze(
        &self,
        action: ActionId,
        rejected: &[ReportedAccess],
        allowlisted: &[ReportedAccess],
        observations: &DynamicObservations,
    ) -> Result<AnalysisReport, AnalyzeError> {
        let mut cx = self.context(action)?;
        static_access::classify(&mut cx, rejected, allowlisted);
        dynamic::classify(&mut cx, observations);
        Ok(self.finish(cx))
    }

    /// The dynamic passes only — used on cache-replay paths where no static
    /// violations exist.
    ///
    /// # Errors
    /// [`AnalyzeError::UnknownAction`] when the graph cannot hydrate
    /// `action`.
    pub fn analyze_dynamic_only(
        &self,
        action: ActionId,
        observations: &DynamicObservations,
    ) -> Result<AnalysisReport, AnalyzeError> {
        let mut cx = self.context(action)?;
        dynamic::classify(&mut cx, observations);
        Ok(self.finish(cx))
    }

    /// Re-validate previously allowed content-contingent violations after
    /// cache convergence replaced observed output content.
    ///
    /// # Errors
    /// [`AnalyzeError::UnknownAction`] when the graph cannot hydrate
    /// `action`.
    pub fn revalidate_on_convergence(
        &self,
        action: ActionId,
        converged_contents: &BTreeMap<PathBuf, ContentHash>,
        previously_allowed: &BTreeMap<PathBuf, AllowedRewrite>,
    ) -> Result<AnalysisResult, AnalyzeError> {
        let cx = self.context(action)?;
        Ok(convergence::revalidate(
            cx,
            converged_contents,
            previously_allowed,
        ))
    }

    fn context(&self, action: ActionId) -> Result<AnalysisCx<'a, '_>, AnalyzeError> {
        let info = self
            .graph
            .hydrate(action)
            .ok_or(AnalyzeError::UnknownAction { action })?;
        Ok(AnalysisCx {
            analyzer: self,
            action,
            info,
            oracle: OrderingOracle::new(self.graph),
            raw: Vec::new(),
            allowed: BTreeMap::new(),
        })
    }

    fn finish(&self, cx: AnalysisCx<'_, '_>) -> AnalysisReport {
        let (result, violations) =
            report::aggregate(cx.action, cx.raw, self.options, self.sink);
        AnalysisReport {
            result,
            violations,
            allowed: cx.allowed,
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisCx — per-action working state shared by the phases
// ---------------------------------------------------------------------------

pub(crate) struct AnalysisCx<'g, 'a> {
    pub analyzer: &'a ConflictAnalyzer<'g>,
    pub action: ActionId,
    pub info: Arc<ActionInfo>,
    pub oracle: OrderingOracle<'g>,
    pub raw: Vec<RawViolation>,
    pub allowed: BTreeMap<PathBuf, AllowedRewrite>,
}

impl AnalysisCx<'_, '_> {
    /// Record a finding with the analyzed action as violator.
    pub fn push(
        &mut self,
        kind: ViolationKind,
        path: impl Into<PathBuf>,
        related: Option<ActionId>,
        detail: impl Into<String>,
    ) {
        self.push_for(self.action, kind, path, related, detail);
    }

    /// Record a finding blaming an arbitrary action (retroactive findings
    /// name the other party as violator).
    pub fn push_for(
        &mut self,
        violator: ActionId,
        kind: ViolationKind,
        path: impl Into<PathBuf>,
        related: Option<ActionId>,
        detail: impl Into<String>,
    ) {
        self.raw.push(RawViolation {
            kind,
            path: path.into(),
            violator,
            related,
            process: None,
            detail: detail.into(),
            allowlisted: false,
            warn_only_double_write: false,
        });
    }

    /// Evaluate the content-equivalence policy for a rewrite by this action.
    pub fn rewrite_verdict(
        &self,
        path: &std::path::Path,
        written: Option<ContentHash>,
    ) -> policy::RewriteVerdict {
        policy::evaluate_undeclared_rewrite(
            &self.oracle,
            self.analyzer.registries,
            self.analyzer.resolver,
            self.action,
            self.info.rewrite_policy,
            path,
            written,
        )
    }
}
