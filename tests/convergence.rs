//! Integration tests for convergence re-validation.
//!
//! # What is verified
//!
//! - A same-content double-write allowance survives convergence when the
//!   cached content matches what was observed, and is re-reported as a hard
//!   violation when it does not.
//! - An undeclared-source-rewrite allowance gets a fresh policy evaluation
//!   with the converged hash: ordering-based allowances survive any content,
//!   content-based allowances flip when the bytes change.
//! - Re-validated violations reach the sink like first-run ones.

#![allow(clippy::all, clippy::pedantic, clippy::nursery)]

mod common;

use std::collections::BTreeMap;

use common::*;
use tripwire::model::ViolationKind;
use tripwire::{CollectingSink, ConflictAnalyzer};
use tripwire_graph::DoubleWritePolicy;

fn same_content_pair() -> Harness {
    HarnessBuilder::new()
        .action(
            ActionSpec::new(a(1))
                .shared_opaque("/so")
                .double_writes(DoubleWritePolicy::AllowSameContent),
        )
        .action(
            ActionSpec::new(a(2))
                .shared_opaque("/so")
                .double_writes(DoubleWritePolicy::AllowSameContent),
        )
        .build()
}

#[test]
fn matching_converged_content_keeps_the_allowance() {
    let harness = same_content_pair();
    let analyzer = harness.analyzer();

    analyzer
        .analyze_dynamic_only(a(1), &shared_write_with_content("/so/out.txt", b"bytes"))
        .unwrap();
    let report = analyzer
        .analyze_dynamic_only(a(2), &shared_write_with_content("/so/out.txt", b"bytes"))
        .unwrap();
    assert!(report.violations.is_empty());

    let converged = output_contents(&[("/so/out.txt", b"bytes")]);
    let result = analyzer
        .revalidate_on_convergence(a(2), &converged, &report.allowed)
        .unwrap();
    assert!(result.is_clean);
    assert!(result.is_safe_to_cache);
}

#[test]
fn diverging_converged_content_reinstates_the_double_write() {
    let harness = same_content_pair();
    let analyzer = harness.analyzer();

    analyzer
        .analyze_dynamic_only(a(1), &shared_write_with_content("/so/out.txt", b"bytes"))
        .unwrap();
    let report = analyzer
        .analyze_dynamic_only(a(2), &shared_write_with_content("/so/out.txt", b"bytes"))
        .unwrap();
    assert!(report.violations.is_empty(), "allowed while content matches");

    let converged = output_contents(&[("/so/out.txt", b"cached bytes differ")]);
    let result = analyzer
        .revalidate_on_convergence(a(2), &converged, &report.allowed)
        .unwrap();
    assert!(!result.is_clean);
    assert!(!result.is_safe_to_cache);
}

#[test]
fn reinstated_violation_reaches_the_sink() {
    let harness = same_content_pair();
    let sink = CollectingSink::new();
    let analyzer = ConflictAnalyzer::new(
        &harness.graph,
        &harness.resolver,
        &sink,
        &harness.registries,
        harness.options,
    );

    analyzer
        .analyze_dynamic_only(a(1), &shared_write_with_content("/so/out.txt", b"bytes"))
        .unwrap();
    let report = analyzer
        .analyze_dynamic_only(a(2), &shared_write_with_content("/so/out.txt", b"bytes"))
        .unwrap();
    sink.drain();

    let converged = output_contents(&[("/so/out.txt", b"other")]);
    analyzer
        .revalidate_on_convergence(a(2), &converged, &report.allowed)
        .unwrap();
    let reported = sink.drain();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].kind, ViolationKind::DoubleWrite);
    assert_eq!(reported[0].related, Some(a(1)));
}

#[test]
fn rewrite_allowance_gets_a_fresh_policy_evaluation() {
    // Detached reader a1; writer a2 opts into safe rewrites. The original
    // write matched the pre-write content, so the rewrite was allowed; the
    // converged content breaks that equality.
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)))
        .action(ActionSpec::new(a(2)).shared_opaque("/src/gen").safe_rewrites())
        .content("/src/gen/header.h", b"original")
        .build();
    let analyzer = harness.analyzer();

    analyzer
        .analyze_dynamic_only(a(1), &undeclared_read("/src/gen/header.h"))
        .unwrap();
    let report = analyzer
        .analyze_dynamic_only(
            a(2),
            &shared_write_with_content("/src/gen/header.h", b"original"),
        )
        .unwrap();
    assert!(
        report.violations.is_empty(),
        "identical bytes: rewrite invisible to the reader"
    );
    assert_eq!(
        report.allowed.values().next().map(|allowance| allowance.kind),
        Some(ViolationKind::WriteInUndeclaredSourceRead)
    );

    let converged = output_contents(&[("/src/gen/header.h", b"rewritten")]);
    let result = analyzer
        .revalidate_on_convergence(a(2), &converged, &report.allowed)
        .unwrap();
    assert!(!result.is_safe_to_cache);
}

#[test]
fn rewrite_allowance_by_ordering_survives_any_content() {
    // The only reader runs strictly after the writer, so the allowance does
    // not depend on content at all.
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)))
        .action(ActionSpec::new(a(2)).shared_opaque("/src/gen").safe_rewrites())
        .edge(a(2), a(1))
        .build();
    let analyzer = harness.analyzer();

    analyzer
        .analyze_dynamic_only(a(1), &undeclared_read("/src/gen/header.h"))
        .unwrap();
    let report = analyzer
        .analyze_dynamic_only(
            a(2),
            &shared_write_with_content("/src/gen/header.h", b"anything"),
        )
        .unwrap();
    assert!(report.violations.is_empty());

    let converged = output_contents(&[("/src/gen/header.h", b"something else")]);
    let result = analyzer
        .revalidate_on_convergence(a(2), &converged, &report.allowed)
        .unwrap();
    assert!(result.is_clean, "ordering argument is content-independent");
    assert!(result.is_safe_to_cache);
}

#[test]
fn empty_allowances_revalidate_clean() {
    let harness = same_content_pair();
    let analyzer = harness.analyzer();
    let result = analyzer
        .revalidate_on_convergence(a(1), &BTreeMap::new(), &BTreeMap::new())
        .unwrap();
    assert!(result.is_clean);
    assert!(result.is_safe_to_cache);
}
