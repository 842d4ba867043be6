//! Classification of sandbox-rejected static accesses.
//!
//! Raw accesses are first aggregated by `(path, process)` with the access
//! level combined by maximum (write dominates read), then each aggregate is
//! classified against the declared producers of its path and the dynamic
//! registries. Accesses whose path cannot be normalized, or that carry no
//! concrete level, bypass classification entirely: they land in the
//! unanalyzable bucket and take their severity from global policy alone.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tripwire_graph::ActionId;

use crate::model::{AccessLevel, ReportedAccess, ViolationKind};
use crate::oracle::{OrderingFilter, VersionDisposition};

use super::{AnalysisCx, RawViolation};

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Aggregate {
    level: AccessLevel,
    allowlisted: bool,
}

/// Classify one action's static accesses.
///
/// `allowlisted` accesses join the analyzable set only under distribution
/// validation; otherwise an allow-list match is final.
pub(crate) fn classify(
    cx: &mut AnalysisCx<'_, '_>,
    rejected: &[ReportedAccess],
    allowlisted: &[ReportedAccess],
) {
    let validate_allowlisted = cx.analyzer.options.distribution_validation;

    let mut aggregates: BTreeMap<(PathBuf, Option<PathBuf>), Aggregate> = BTreeMap::new();
    let mut unanalyzable: Vec<(&ReportedAccess, bool)> = Vec::new();

    let considered = rejected
        .iter()
        .map(|access| (access, access.allowlisted))
        .chain(
            allowlisted
                .iter()
                .filter(|_| validate_allowlisted)
                .map(|access| (access, true)),
        );

    for (access, is_allowlisted) in considered {
        match access.parsed_path() {
            Some(path) if access.level != AccessLevel::None => {
                let aggregate = aggregates
                    .entry((path, access.process.clone()))
                    .or_insert(Aggregate {
                        level: AccessLevel::None,
                        allowlisted: true,
                    });
                aggregate.level = aggregate.level.max(access.level);
                // A pair counts as allowlisted only if every constituent
                // access was.
                aggregate.allowlisted &= is_allowlisted;
            }
            _ => unanalyzable.push((access, is_allowlisted)),
        }
    }

    for ((path, process), aggregate) in &aggregates {
        let before = cx.raw.len();
        match aggregate.level {
            AccessLevel::Write => classify_write(cx, path),
            AccessLevel::Read => classify_read(cx, path),
            AccessLevel::None => {}
        }
        // Stamp process and allow-list state onto everything this aggregate
        // produced.
        for raw in &mut cx.raw[before..] {
            raw.process.clone_from(process);
            raw.allowlisted = aggregate.allowlisted;
        }
    }

    for (access, is_allowlisted) in unanalyzable {
        cx.raw.push(RawViolation {
            kind: ViolationKind::UnanalyzableAccess,
            path: PathBuf::from(&access.raw_path),
            violator: cx.action,
            related: None,
            process: access.process.clone(),
            detail: format!(
                "access `{}` (level {}) could not be normalized for classification",
                access.raw_path, access.level
            ),
            allowlisted: is_allowlisted,
            warn_only_double_write: false,
        });
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

fn classify_write(cx: &mut AnalysisCx<'_, '_>, path: &Path) {
    let action = cx.action;

    if let Some(producer) = cx.oracle.find_declared_producer(
        path,
        VersionDisposition::Latest,
        OrderingFilter::PossiblyPrecedingInWallTime(action),
    ) {
        if producer.is_source() {
            cx.push(
                ViolationKind::WriteInStaticallyDeclaredSourceFile,
                path,
                Some(producer.action),
                format!("path is a declared source file (hashed by {})", producer.action),
            );
        } else {
            cx.push(
                ViolationKind::DoubleWrite,
                path,
                Some(producer.action),
                format!("also declared as output of {}", producer.action),
            );
        }
        return;
    }

    if let Some(entry) = cx.analyzer.registries.paths.get(path)
        && entry.is_writer()
        && entry.owner != action
    {
        cx.push(
            ViolationKind::DoubleWrite,
            path,
            Some(entry.owner),
            format!("also written dynamically by {}", entry.owner),
        );
        return;
    }

    // Nothing declares the path: an undeclared output. Record the writer and
    // retroactively flag every reader that already slipped through.
    let readers: Vec<ActionId> = cx
        .analyzer
        .registries
        .undeclared_accessors
        .record_writer(path, action);
    cx.push(
        ViolationKind::UndeclaredOutput,
        path,
        None,
        "no manifest declares this path as an output",
    );
    for reader in readers {
        if reader != action {
            cx.push_for(
                reader,
                ViolationKind::ReadUndeclaredOutput,
                path,
                Some(action),
                format!("read a path {action} writes without declaring it"),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

fn classify_read(cx: &mut AnalysisCx<'_, '_>, path: &Path) {
    let action = cx.action;

    // Register the read first so a later-discovered undeclared writer can
    // report retroactively; if the writer is already known, report here.
    let undeclared_writer = cx
        .analyzer
        .registries
        .undeclared_accessors
        .record_reader(path, action);
    if let Some(writer) = undeclared_writer
        && writer != action
    {
        cx.push(
            ViolationKind::ReadUndeclaredOutput,
            path,
            Some(writer),
            format!("read a path {writer} writes without declaring it"),
        );
    }

    // Producer search order is the contract: concurrent first, then
    // ordered-before, then any, then the dynamic registry.
    if let Some(producer) = cx.oracle.find_declared_producer(
        path,
        VersionDisposition::Latest,
        OrderingFilter::Concurrent(action),
    ) {
        if producer.is_source() {
            cx.push(
                ViolationKind::MissingSourceDependency,
                path,
                Some(producer.action),
                "source file read without a declared dependency",
            );
        } else {
            cx.push(
                ViolationKind::ReadRace,
                path,
                Some(producer.action),
                format!("produced by concurrent action {}", producer.action),
            );
        }
        return;
    }

    if let Some(producer) = cx.oracle.find_declared_producer(
        path,
        VersionDisposition::Latest,
        OrderingFilter::OrderedBefore(action),
    ) {
        if producer.is_source() {
            cx.push(
                ViolationKind::MissingSourceDependency,
                path,
                Some(producer.action),
                "source file read without a declared dependency",
            );
        } else {
            cx.push(
                ViolationKind::UndeclaredOrderedRead,
                path,
                Some(producer.action),
                format!(
                    "producer {} is ordered before this action but was never declared",
                    producer.action
                ),
            );
        }
        return;
    }

    if let Some(producer) = cx.oracle.find_declared_producer(
        path,
        VersionDisposition::Latest,
        OrderingFilter::Any,
    ) {
        cx.push(
            ViolationKind::UndeclaredReadCycle,
            path,
            Some(producer.action),
            format!(
                "producer {} is ordered after this action; honoring the read needs a cycle",
                producer.action
            ),
        );
        return;
    }

    if let Some(entry) = cx.analyzer.registries.paths.get(path)
        && entry.is_writer()
        && entry.owner != action
    {
        cx.push(
            ViolationKind::ReadRace,
            path,
            Some(entry.owner),
            format!("written dynamically by {}", entry.owner),
        );
        return;
    }

    cx.push(
        ViolationKind::MissingSourceDependency,
        path,
        None,
        "path read without any declared dependency",
    );
}
