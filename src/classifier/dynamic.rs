//! Classification of dynamically observed accesses.
//!
//! Four independent passes, each registering into the shared path registry
//! so that concurrently analyzed actions resolve conflicts through the
//! first-registration-wins protocol rather than ad hoc locking:
//!
//! 1. writes under shared opaque directories (full conflict, ancestor,
//!    static-producer, and temp checks),
//! 2. writes under the action's own exclusive opaques (conflict resolution
//!    only — the remaining checks are structurally impossible there),
//! 3. tolerated undeclared reads,
//! 4. absent-path probes under output directories.
//!
//! Freshly created directories are registered like writes so a racing
//! action that probed the directory while absent is still detected.

use std::path::Path;

use tripwire_graph::{ActionId, ContentHash};

use crate::model::{DynamicObservations, ObservedWrite, ViolationKind};
use crate::oracle::{OrderingFilter, VersionDisposition};
use crate::registry::{PathEntry, RegisteredAccess};

use super::{AllowedRewrite, AnalysisCx};

pub(crate) fn classify(cx: &mut AnalysisCx<'_, '_>, observations: &DynamicObservations) {
    for write in &observations.shared_opaque_writes {
        classify_opaque_write(cx, write, observations, true);
    }
    for write in &observations.exclusive_opaque_writes {
        classify_opaque_write(cx, write, observations, false);
    }
    for path in &observations.allowed_undeclared_reads {
        classify_undeclared_read(cx, path);
    }
    for path in &observations.absent_probes {
        classify_absent_probe(cx, path);
    }
    for path in &observations.created_directories {
        classify_created_directory(cx, path);
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

fn written_content(write: &ObservedWrite, observations: &DynamicObservations) -> Option<ContentHash> {
    write
        .content
        .or_else(|| observations.output_contents.get(&write.path).copied())
}

fn classify_opaque_write(
    cx: &mut AnalysisCx<'_, '_>,
    write: &ObservedWrite,
    observations: &DynamicObservations,
    shared: bool,
) {
    let action = cx.action;
    let path = write.path.as_path();
    let content = written_content(write, observations);
    // Writes under a declared temp root are temp-flagged whether or not the
    // sandbox reported them so.
    let temporary =
        write.temporary || cx.analyzer.graph.temp_directory_ancestor(path).is_some();

    let (existing, entry) = cx.analyzer.registries.paths.register_or_get(path, || {
        PathEntry::writer(action, content, temporary)
    });
    if existing && entry.owner != action {
        resolve_write_conflict(cx, write, content, temporary, &entry);
    }

    if shared {
        check_ancestors(cx, path);
        check_static_producer(cx, path);
    }

    if temporary {
        check_temp_producers(cx, path);
    }
}

/// The registry already holds an entry owned by another action; decide what
/// this write means against it.
fn resolve_write_conflict(
    cx: &mut AnalysisCx<'_, '_>,
    write: &ObservedWrite,
    content: Option<ContentHash>,
    temporary: bool,
    entry: &PathEntry,
) {
    let action = cx.action;
    let other = entry.owner;
    let path = write.path.as_path();

    match &entry.access {
        RegisteredAccess::Writer {
            content: prior_content,
            temporary: prior_temporary,
        } => {
            if !cx.oracle.unordered(other, action) {
                // A declared order exists between the writers; the result is
                // equivalent to the sequential execution along that order.
                return;
            }
            if temporary && *prior_temporary {
                cx.push(
                    ViolationKind::TempFileProducedByIndependentActions,
                    path,
                    Some(other),
                    format!("temp file also produced by independent action {other}"),
                );
                return;
            }
            let self_policy = cx.info.rewrite_policy;
            let other_policy = cx.analyzer.graph.rewrite_policy_of(other);
            let jointly_same_content = self_policy.allows_same_content_double_writes()
                && other_policy.allows_same_content_double_writes();
            if jointly_same_content
                && let (Some(mine), Some(theirs)) = (content, *prior_content)
                && mine == theirs
            {
                // Identical bytes under a joint same-content policy: allowed
                // for now, but only as long as the content stands.
                cx.allowed.insert(
                    write.path.clone(),
                    AllowedRewrite {
                        kind: ViolationKind::DoubleWrite,
                        content,
                        related: Some(other),
                    },
                );
                tracing::debug!(
                    path = %path.display(),
                    writer = %action,
                    other = %other,
                    "same-content double write allowed pending convergence"
                );
                return;
            }
            let warn_only = self_policy.double_writes_warn_only()
                && other_policy.double_writes_warn_only();
            cx.push(
                ViolationKind::DoubleWrite,
                path,
                Some(other),
                format!("also written by unordered action {other}"),
            );
            if let Some(raw) = cx.raw.last_mut() {
                raw.warn_only_double_write = warn_only;
            }
        }
        RegisteredAccess::UndeclaredReader => {
            let verdict = cx.rewrite_verdict(path, content);
            if verdict.allowed {
                cx.allowed.insert(
                    write.path.clone(),
                    AllowedRewrite {
                        kind: ViolationKind::WriteInUndeclaredSourceRead,
                        content,
                        related: Some(other),
                    },
                );
            } else {
                let blocking = verdict.blocking_reader.unwrap_or(other);
                let reason = verdict
                    .reason
                    .map_or_else(String::new, |reason| reason.to_string());
                cx.push(
                    ViolationKind::WriteInUndeclaredSourceRead,
                    path,
                    Some(blocking),
                    format!("path was read undeclared by {blocking}: {reason}"),
                );
            }
        }
        RegisteredAccess::AbsentProbe => {
            if cx.oracle.unordered(other, action) {
                cx.push(
                    ViolationKind::WriteOnAbsentPathProbe,
                    path,
                    Some(other),
                    format!("{other} probed this path absent with no order to the writer"),
                );
            }
        }
    }
}

fn check_ancestors(cx: &mut AnalysisCx<'_, '_>, path: &Path) {
    if let Some(root) = cx.analyzer.graph.sealed_source_ancestor(path) {
        cx.push(
            ViolationKind::WriteInSourceSealDirectory,
            path,
            None,
            format!("write under sealed source directory {}", root.display()),
        );
    }
    if let Some((root, owner)) = cx.analyzer.graph.exclusive_opaque_ancestor(path)
        && owner != cx.action
    {
        cx.push(
            ViolationKind::WriteInExclusiveOpaque,
            path,
            Some(owner),
            format!(
                "write under exclusive opaque {} owned by {owner}",
                root.display()
            ),
        );
    }
}

fn check_static_producer(cx: &mut AnalysisCx<'_, '_>, path: &Path) {
    let action = cx.action;
    if let Some(producer) = cx.oracle.find_materialized_producer(
        path,
        VersionDisposition::Latest,
        OrderingFilter::Any,
    ) && producer.action != action
    {
        if producer.is_source() {
            cx.push(
                ViolationKind::WriteInStaticallyDeclaredSourceFile,
                path,
                Some(producer.action),
                "dynamic write to a declared source file",
            );
        } else {
            cx.push(
                ViolationKind::DoubleWrite,
                path,
                Some(producer.action),
                format!("path is a declared output of {}", producer.action),
            );
        }
    }
}

fn check_temp_producers(cx: &mut AnalysisCx<'_, '_>, path: &Path) {
    let action = cx.action;
    let prior: Vec<ActionId> = cx.analyzer.registries.temp_producers.append(path, action);
    for producer in prior {
        if cx.oracle.unordered(producer, action) {
            cx.push(
                ViolationKind::TempFileProducedByIndependentActions,
                path,
                Some(producer),
                format!("temp file also produced by independent action {producer}"),
            );
        }
    }

    // A sanctioned temp write traces back to a declaration: either this
    // action declared the path itself, or some action declares it as a
    // regular output the temp write shadows. A temp write with neither is an
    // unsanctioned second producer.
    if cx.info.declared_output(path).is_none()
        && cx
            .oracle
            .find_materialized_producer(path, VersionDisposition::Earliest, OrderingFilter::Any)
            .is_none()
    {
        cx.push(
            ViolationKind::DoubleWrite,
            path,
            None,
            "temp write to a path with no declared original producer",
        );
    }
}

// ---------------------------------------------------------------------------
// Undeclared reads
// ---------------------------------------------------------------------------

fn classify_undeclared_read(cx: &mut AnalysisCx<'_, '_>, path: &Path) {
    let action = cx.action;

    if let Some(producer) = cx.oracle.find_declared_producer(
        path,
        VersionDisposition::Latest,
        OrderingFilter::Any,
    ) && !producer.is_source()
        && producer.action != action
    {
        cx.push_for(
            producer.action,
            ViolationKind::WriteInUndeclaredSourceRead,
            path,
            Some(action),
            format!("{action} reads this declared output as an undeclared source"),
        );
    }

    cx.analyzer
        .registries
        .paths
        .register_or_get(path, || PathEntry::reader(action));
    cx.analyzer.registries.undeclared_readers.append(path, action);
    let writer = cx
        .analyzer
        .registries
        .undeclared_accessors
        .record_reader(path, action);
    if let Some(writer) = writer
        && writer != action
    {
        cx.push(
            ViolationKind::ReadUndeclaredOutput,
            path,
            Some(writer),
            format!("read a path {writer} writes without declaring it"),
        );
    }

    if let Some(scopes) = &cx.info.read_scopes
        && scopes.is_restricted()
        && !cx.info.declares_input(path)
        && !scopes.permits(path)
    {
        cx.push(
            ViolationKind::DisallowedUndeclaredSourceRead,
            path,
            None,
            "undeclared read outside every allowed scope",
        );
    }
}

// ---------------------------------------------------------------------------
// Absent probes
// ---------------------------------------------------------------------------

fn classify_absent_probe(cx: &mut AnalysisCx<'_, '_>, path: &Path) {
    let action = cx.action;

    let (existing, entry) = cx
        .analyzer
        .registries
        .paths
        .register_or_get(path, || PathEntry::probe(action));
    if existing && entry.is_writer() && entry.owner != action {
        if cx.oracle.unordered(entry.owner, action) {
            // The writer is the violator: it materialized a path another
            // action had already observed absent.
            cx.push_for(
                entry.owner,
                ViolationKind::WriteOnAbsentPathProbe,
                path,
                Some(action),
                format!("{action} probed this path absent with no order to the writer"),
            );
        }
        return;
    }

    if !cx.info.covered_by_directory_dependency(path)
        && cx.info.containing_directory_output(path).is_none()
    {
        cx.push(
            ViolationKind::AbsentPathProbeUnderUndeclaredOpaque,
            path,
            None,
            "absent-path probe under a directory this action does not depend on",
        );
    }
}

fn classify_created_directory(cx: &mut AnalysisCx<'_, '_>, path: &Path) {
    let action = cx.action;

    let (existing, entry) = cx
        .analyzer
        .registries
        .paths
        .register_or_get(path, || PathEntry::writer(action, None, false));
    if existing
        && entry.access == RegisteredAccess::AbsentProbe
        && entry.owner != action
        && cx.oracle.unordered(entry.owner, action)
    {
        cx.push(
            ViolationKind::WriteOnAbsentPathProbe,
            path,
            Some(entry.owner),
            format!(
                "{} probed this directory absent before it was created",
                entry.owner
            ),
        );
    }
}
