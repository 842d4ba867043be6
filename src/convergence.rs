//! Re-validation of content-contingent allowances after cache convergence.
//!
//! A same-content allowance is justified
//! by the bytes observed during execution. When a cache hit later replaces
//! an output with previously stored content, that justification can lapse:
//! every allowed path whose converged hash differs from the observed one is
//! re-checked. Undeclared-source rewrites get a fresh policy evaluation with
//! the new hash; every other allowance (same-content double writes) is
//! re-reported unconditionally as a hard violation, because the equality
//! that excused it no longer holds.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tripwire_graph::ContentHash;

use crate::classifier::{AllowedRewrite, AnalysisCx};
use crate::model::{AnalysisResult, ViolationKind};
use crate::report;

pub(crate) fn revalidate(
    mut cx: AnalysisCx<'_, '_>,
    converged_contents: &BTreeMap<PathBuf, ContentHash>,
    previously_allowed: &BTreeMap<PathBuf, AllowedRewrite>,
) -> AnalysisResult {
    if previously_allowed.is_empty() {
        return AnalysisResult::clean();
    }

    for (path, allowance) in previously_allowed {
        let converged = converged_contents.get(path).copied();
        if converged == allowance.content {
            continue;
        }

        match allowance.kind {
            ViolationKind::WriteInUndeclaredSourceRead => {
                let verdict = cx.rewrite_verdict(path, converged);
                if verdict.allowed {
                    continue;
                }
                let reason = verdict
                    .reason
                    .map_or_else(String::new, |reason| reason.to_string());
                cx.push(
                    ViolationKind::WriteInUndeclaredSourceRead,
                    path.clone(),
                    allowance.related,
                    format!("converged content no longer safe: {reason}"),
                );
            }
            kind => {
                // The leniency assumed content equality; the converged bytes
                // broke it.
                cx.push(
                    kind,
                    path.clone(),
                    allowance.related,
                    "converged content differs from the observed write",
                );
            }
        }
        tracing::warn!(
            path = %path.display(),
            action = %cx.action,
            "previously allowed violation re-validated after convergence"
        );
    }

    let (result, _violations) = report::aggregate(
        cx.action,
        cx.raw,
        cx.analyzer.options,
        cx.analyzer.sink,
    );
    result
}
