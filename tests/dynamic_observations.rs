//! Integration tests for dynamically observed accesses.
//!
//! # What is verified
//!
//! - Opaque-directory write conflicts resolve through the shared path
//!   registry: ordered writers are fine, unordered ones are double writes,
//!   with the same-content and warn-only policy escapes.
//! - Shared-opaque writes are additionally checked against sealed source
//!   trees, foreign exclusive opaques, and statically declared producers.
//! - Temp-file collisions between independent actions are reported, a temp
//!   write needs a declared original producer, and declared temp roots
//!   temp-flag the writes under them.
//! - Undeclared reads respect per-action scopes and pair up with undeclared
//!   writers in either arrival order.
//! - Absent-path probes conflict with unordered writes symmetrically, and
//!   the writer is always the violator.

#![allow(clippy::all, clippy::pedantic, clippy::nursery)]

mod common;

use std::path::PathBuf;

use common::*;
use tripwire::AnalyzerOptions;
use tripwire::classifier::ProbeMode;
use tripwire::model::{DynamicObservations, ObservedWrite, ViolationKind};
use tripwire_graph::DoubleWritePolicy;

// ---------------------------------------------------------------------------
// Opaque write conflicts
// ---------------------------------------------------------------------------

#[test]
fn unordered_writers_of_one_path_is_double_write() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).shared_opaque("/so"))
        .action(ActionSpec::new(a(2)).shared_opaque("/so"))
        .build();
    let analyzer = harness.analyzer();

    let first = analyzer
        .analyze_dynamic_only(a(1), &shared_write("/so/out.txt"))
        .unwrap();
    assert!(first.result.is_clean, "first writer registers cleanly");

    let second = analyzer
        .analyze_dynamic_only(a(2), &shared_write("/so/out.txt"))
        .unwrap();
    let violation = assert_single_kind(&second.violations, ViolationKind::DoubleWrite);
    assert_eq!(violation.related, Some(a(1)));
    assert!(violation.is_error);
    assert!(!second.result.is_safe_to_cache);
}

#[test]
fn ordered_writers_are_not_a_conflict() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).shared_opaque("/so"))
        .action(ActionSpec::new(a(2)).shared_opaque("/so"))
        .edge(a(1), a(2))
        .build();
    let analyzer = harness.analyzer();

    analyzer
        .analyze_dynamic_only(a(1), &shared_write("/so/out.txt"))
        .unwrap();
    let second = analyzer
        .analyze_dynamic_only(a(2), &shared_write("/so/out.txt"))
        .unwrap();
    assert!(second.result.is_clean, "declared order sequentializes the writes");
}

#[test]
fn same_content_double_write_is_allowed_when_both_opt_in() {
    let harness = HarnessBuilder::new()
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
        .build();
    let analyzer = harness.analyzer();

    analyzer
        .analyze_dynamic_only(a(1), &shared_write_with_content("/so/out.txt", b"bytes"))
        .unwrap();
    let second = analyzer
        .analyze_dynamic_only(a(2), &shared_write_with_content("/so/out.txt", b"bytes"))
        .unwrap();
    assert!(second.violations.is_empty());
    let allowance = second.allowed.get(&PathBuf::from("/so/out.txt")).unwrap();
    assert_eq!(allowance.kind, ViolationKind::DoubleWrite);
    assert_eq!(allowance.related, Some(a(1)));
}

#[test]
fn same_content_escape_needs_both_policies() {
    let harness = HarnessBuilder::new()
        .action(
            ActionSpec::new(a(1))
                .shared_opaque("/so")
                .double_writes(DoubleWritePolicy::AllowSameContent),
        )
        .action(ActionSpec::new(a(2)).shared_opaque("/so"))
        .build();
    let analyzer = harness.analyzer();

    analyzer
        .analyze_dynamic_only(a(1), &shared_write_with_content("/so/out.txt", b"bytes"))
        .unwrap();
    let second = analyzer
        .analyze_dynamic_only(a(2), &shared_write_with_content("/so/out.txt", b"bytes"))
        .unwrap();
    assert_single_kind(&second.violations, ViolationKind::DoubleWrite);
}

#[test]
fn warn_only_pair_downgrades_the_double_write() {
    let harness = HarnessBuilder::new()
        .action(
            ActionSpec::new(a(1))
                .shared_opaque("/so")
                .double_writes(DoubleWritePolicy::WarnOnly),
        )
        .action(
            ActionSpec::new(a(2))
                .shared_opaque("/so")
                .double_writes(DoubleWritePolicy::WarnOnly),
        )
        .build();
    let analyzer = harness.analyzer();

    analyzer
        .analyze_dynamic_only(a(1), &shared_write("/so/out.txt"))
        .unwrap();
    let second = analyzer
        .analyze_dynamic_only(a(2), &shared_write("/so/out.txt"))
        .unwrap();
    let violation = assert_single_kind(&second.violations, ViolationKind::DoubleWrite);
    assert!(!violation.is_error);
    assert!(!violation.makes_uncacheable);
    assert!(second.result.is_safe_to_cache);
}

#[test]
fn content_falls_back_to_output_contents_map() {
    let harness = HarnessBuilder::new()
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
        .build();
    let analyzer = harness.analyzer();

    // Neither write carries inline content; both supply it via the
    // final-contents map.
    let observations = |bytes: &[u8]| DynamicObservations {
        shared_opaque_writes: vec![ObservedWrite::new("/so/out.txt")],
        output_contents: output_contents(&[("/so/out.txt", bytes)]),
        ..DynamicObservations::default()
    };
    analyzer.analyze_dynamic_only(a(1), &observations(b"same")).unwrap();
    let second = analyzer.analyze_dynamic_only(a(2), &observations(b"same")).unwrap();
    assert!(second.violations.is_empty());
}

// ---------------------------------------------------------------------------
// Ancestor and static-producer checks
// ---------------------------------------------------------------------------

#[test]
fn write_under_sealed_source_tree() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).shared_opaque("/so"))
        .sealed_source_directory("/src/vendored")
        .build();
    let report = harness
        .analyzer()
        .analyze_dynamic_only(a(1), &shared_write("/src/vendored/patch.h"))
        .unwrap();
    assert_single_kind(&report.violations, ViolationKind::WriteInSourceSealDirectory);
}

#[test]
fn write_under_foreign_exclusive_opaque() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).exclusive_opaque("/eo"))
        .action(ActionSpec::new(a(2)).shared_opaque("/so"))
        .build();
    let report = harness
        .analyzer()
        .analyze_dynamic_only(a(2), &shared_write("/eo/intruder.bin"))
        .unwrap();
    let violation =
        assert_single_kind(&report.violations, ViolationKind::WriteInExclusiveOpaque);
    assert_eq!(violation.related, Some(a(1)));
}

#[test]
fn own_exclusive_opaque_writes_skip_ancestor_checks() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).exclusive_opaque("/eo"))
        .build();
    let observations = DynamicObservations {
        exclusive_opaque_writes: vec![ObservedWrite::new("/eo/own.bin")],
        ..DynamicObservations::default()
    };
    let report = harness
        .analyzer()
        .analyze_dynamic_only(a(1), &observations)
        .unwrap();
    assert!(report.result.is_clean);
}

#[test]
fn dynamic_write_to_declared_output_of_another_action() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).output("/out/a.o"))
        .action(ActionSpec::new(a(2)).shared_opaque("/so"))
        .build();
    let report = harness
        .analyzer()
        .analyze_dynamic_only(a(2), &shared_write("/out/a.o"))
        .unwrap();
    let violation = assert_single_kind(&report.violations, ViolationKind::DoubleWrite);
    assert_eq!(violation.related, Some(a(1)));
}

#[test]
fn dynamic_write_to_declared_source_file() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).shared_opaque("/so"))
        .source("/src/lib.c", a(100))
        .build();
    let report = harness
        .analyzer()
        .analyze_dynamic_only(a(1), &shared_write("/src/lib.c"))
        .unwrap();
    assert_single_kind(
        &report.violations,
        ViolationKind::WriteInStaticallyDeclaredSourceFile,
    );
}

// ---------------------------------------------------------------------------
// Temp files
// ---------------------------------------------------------------------------

#[test]
fn temp_file_produced_by_independent_actions() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).shared_opaque("/so").temp_output("/so/scratch.tmp"))
        .action(ActionSpec::new(a(2)).shared_opaque("/so").temp_output("/so/scratch.tmp"))
        .build();
    let analyzer = harness.analyzer();

    let temp_write = || DynamicObservations {
        shared_opaque_writes: vec![ObservedWrite {
            path: PathBuf::from("/so/scratch.tmp"),
            content: None,
            temporary: true,
        }],
        ..DynamicObservations::default()
    };
    analyzer.analyze_dynamic_only(a(1), &temp_write()).unwrap();
    let second = analyzer.analyze_dynamic_only(a(2), &temp_write()).unwrap();
    let violation = assert_single_kind(
        &second.violations,
        ViolationKind::TempFileProducedByIndependentActions,
    );
    assert_eq!(violation.related, Some(a(1)));
}

#[test]
fn ordered_temp_producers_are_fine() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).shared_opaque("/so").temp_output("/so/scratch.tmp"))
        .action(ActionSpec::new(a(2)).shared_opaque("/so").temp_output("/so/scratch.tmp"))
        .edge(a(1), a(2))
        .build();
    let analyzer = harness.analyzer();

    let temp_write = || DynamicObservations {
        shared_opaque_writes: vec![ObservedWrite {
            path: PathBuf::from("/so/scratch.tmp"),
            content: None,
            temporary: true,
        }],
        ..DynamicObservations::default()
    };
    analyzer.analyze_dynamic_only(a(1), &temp_write()).unwrap();
    let second = analyzer.analyze_dynamic_only(a(2), &temp_write()).unwrap();
    assert!(second.result.is_clean);
}

#[test]
fn temp_write_without_declared_original_producer_is_double_write() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).shared_opaque("/so"))
        .build();

    let temp_write = DynamicObservations {
        shared_opaque_writes: vec![ObservedWrite {
            path: PathBuf::from("/so/scratch.tmp"),
            content: None,
            temporary: true,
        }],
        ..DynamicObservations::default()
    };
    let report = harness
        .analyzer()
        .analyze_dynamic_only(a(1), &temp_write)
        .unwrap();
    let violation = assert_single_kind(&report.violations, ViolationKind::DoubleWrite);
    assert_eq!(violation.related, None, "no counterpart exists");
    assert!(!report.result.is_safe_to_cache);
}

#[test]
fn writes_under_a_declared_temp_root_are_temp_flagged() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).shared_opaque("/so").temp_output("/so/cache/obj"))
        .action(ActionSpec::new(a(2)).shared_opaque("/so").temp_output("/so/cache/obj"))
        .temp_directory("/so/cache")
        .build();
    let analyzer = harness.analyzer();

    // The sandbox reported plain writes; the declared temp root flags them.
    analyzer
        .analyze_dynamic_only(a(1), &shared_write("/so/cache/obj"))
        .unwrap();
    let second = analyzer
        .analyze_dynamic_only(a(2), &shared_write("/so/cache/obj"))
        .unwrap();
    let violation = assert_single_kind(
        &second.violations,
        ViolationKind::TempFileProducedByIndependentActions,
    );
    assert_eq!(violation.related, Some(a(1)));
}

#[test]
fn undeclared_scratch_under_a_temp_root_is_still_a_double_write() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).shared_opaque("/so"))
        .temp_directory("/so/cache")
        .build();
    let report = harness
        .analyzer()
        .analyze_dynamic_only(a(1), &shared_write("/so/cache/stray"))
        .unwrap();
    assert_single_kind(&report.violations, ViolationKind::DoubleWrite);
}

// ---------------------------------------------------------------------------
// Undeclared reads
// ---------------------------------------------------------------------------

#[test]
fn undeclared_read_of_foreign_output_blames_the_producer() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).output("/out/a.o"))
        .action(ActionSpec::new(a(2)))
        .build();
    let report = harness
        .analyzer()
        .analyze_dynamic_only(a(2), &undeclared_read("/out/a.o"))
        .unwrap();
    let violation =
        assert_single_kind(&report.violations, ViolationKind::WriteInUndeclaredSourceRead);
    assert_eq!(violation.violator, a(1), "the producer is the violator");
    assert_eq!(violation.related, Some(a(2)));
    assert!(report.result.is_safe_to_cache, "the reader stays cacheable");
}

#[test]
fn restricted_scopes_reject_out_of_scope_reads() {
    let mut spec = ActionSpec::new(a(1));
    spec.info.read_scopes = Some(
        tripwire_graph::UndeclaredReadScopes::new(
            vec![PathBuf::from("/usr/include")],
            vec![PathBuf::from("/etc/passwd")],
            &["/opt/toolchain/**/*.h".to_owned()],
        )
        .unwrap(),
    );
    let harness = HarnessBuilder::new().action(spec).build();
    let analyzer = harness.analyzer();

    let ok = analyzer
        .analyze_dynamic_only(a(1), &undeclared_read("/usr/include/stdio.h"))
        .unwrap();
    assert!(ok.result.is_clean, "prefix scope permits the read");

    let exact = analyzer
        .analyze_dynamic_only(a(1), &undeclared_read("/etc/passwd"))
        .unwrap();
    assert!(exact.result.is_clean, "exact scope permits the read");

    let glob = analyzer
        .analyze_dynamic_only(a(1), &undeclared_read("/opt/toolchain/v2/sse.h"))
        .unwrap();
    assert!(glob.result.is_clean, "pattern scope permits the read");

    let outside = analyzer
        .analyze_dynamic_only(a(1), &undeclared_read("/home/user/.netrc"))
        .unwrap();
    assert_single_kind(
        &outside.violations,
        ViolationKind::DisallowedUndeclaredSourceRead,
    );
}

#[test]
fn declared_inputs_bypass_scope_restrictions() {
    let mut spec = ActionSpec::new(a(1)).dependency("/data/seed.bin");
    spec.info.read_scopes = Some(
        tripwire_graph::UndeclaredReadScopes::new(
            vec![PathBuf::from("/usr/include")],
            vec![],
            &[],
        )
        .unwrap(),
    );
    let harness = HarnessBuilder::new().action(spec).build();
    let report = harness
        .analyzer()
        .analyze_dynamic_only(a(1), &undeclared_read("/data/seed.bin"))
        .unwrap();
    assert!(report.result.is_clean);
}

#[test]
fn undeclared_read_then_undeclared_write_pairs_up() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)))
        .action(ActionSpec::new(a(2)))
        .build();
    let analyzer = harness.analyzer();

    let read_first = analyzer
        .analyze_dynamic_only(a(1), &undeclared_read("/gen/config.json"))
        .unwrap();
    assert!(read_first.result.is_clean, "no writer known yet");

    let write_report = analyzer
        .analyze(a(2), &[write("/gen/config.json")], &[], &no_observations())
        .unwrap();
    let retro = write_report
        .violations
        .iter()
        .find(|violation| violation.kind == ViolationKind::ReadUndeclaredOutput)
        .expect("earlier read should surface on the writer's analysis");
    assert_eq!(retro.violator, a(1));
    assert_eq!(retro.related, Some(a(2)));
}

#[test]
fn undeclared_write_then_undeclared_read_pairs_up() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)))
        .action(ActionSpec::new(a(2)))
        .build();
    let analyzer = harness.analyzer();

    analyzer
        .analyze(a(2), &[write("/gen/config.json")], &[], &no_observations())
        .unwrap();
    let read_report = analyzer
        .analyze_dynamic_only(a(1), &undeclared_read("/gen/config.json"))
        .unwrap();
    let violation =
        assert_single_kind(&read_report.violations, ViolationKind::ReadUndeclaredOutput);
    assert_eq!(violation.violator, a(1));
    assert_eq!(violation.related, Some(a(2)));
}

// ---------------------------------------------------------------------------
// Absent probes
// ---------------------------------------------------------------------------

#[test]
fn probe_then_unordered_write_blames_the_writer() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).directory_dependency("/out/stage"))
        .action(ActionSpec::new(a(2)).shared_opaque("/out/stage"))
        .build();
    let analyzer = harness.analyzer();

    let probe_report = analyzer
        .analyze_dynamic_only(a(1), &absent_probe("/out/stage/marker"))
        .unwrap();
    assert!(probe_report.result.is_clean);

    let write_report = analyzer
        .analyze_dynamic_only(a(2), &shared_write("/out/stage/marker"))
        .unwrap();
    let violation =
        assert_single_kind(&write_report.violations, ViolationKind::WriteOnAbsentPathProbe);
    assert_eq!(violation.violator, a(2), "the writer is the violator");
    assert_eq!(violation.related, Some(a(1)));
}

#[test]
fn write_then_unordered_probe_still_blames_the_writer() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).directory_dependency("/out/stage"))
        .action(ActionSpec::new(a(2)).shared_opaque("/out/stage"))
        .build();
    let analyzer = harness.analyzer();

    analyzer
        .analyze_dynamic_only(a(2), &shared_write("/out/stage/marker"))
        .unwrap();
    let probe_report = analyzer
        .analyze_dynamic_only(a(1), &absent_probe("/out/stage/marker"))
        .unwrap();
    let violation =
        assert_single_kind(&probe_report.violations, ViolationKind::WriteOnAbsentPathProbe);
    assert_eq!(violation.violator, a(2));
    assert_eq!(violation.related, Some(a(1)));
}

#[test]
fn ordered_probe_and_write_are_fine_both_ways() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).directory_dependency("/out/stage"))
        .action(ActionSpec::new(a(2)).shared_opaque("/out/stage"))
        .edge(a(1), a(2))
        .build();
    let analyzer = harness.analyzer();

    analyzer
        .analyze_dynamic_only(a(1), &absent_probe("/out/stage/marker"))
        .unwrap();
    let report = analyzer
        .analyze_dynamic_only(a(2), &shared_write("/out/stage/marker"))
        .unwrap();
    assert!(report.result.is_clean, "probe ordered before the write");
}

#[test]
fn probe_under_undeclared_directory_is_mode_dependent() {
    let harness = HarnessBuilder::new().action(ActionSpec::new(a(1))).build();
    let report = harness
        .analyzer()
        .analyze_dynamic_only(a(1), &absent_probe("/out/unknown/marker"))
        .unwrap();
    let violation = assert_single_kind(
        &report.violations,
        ViolationKind::AbsentPathProbeUnderUndeclaredOpaque,
    );
    assert!(!violation.is_error, "relaxed mode: warning");

    let strict = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)))
        .options(AnalyzerOptions {
            probe_mode: ProbeMode::Strict,
            ..AnalyzerOptions::default()
        })
        .build();
    let report = strict
        .analyzer()
        .analyze_dynamic_only(a(1), &absent_probe("/out/unknown/marker"))
        .unwrap();
    assert!(report.violations[0].is_error, "strict mode: error");
}

#[test]
fn created_directory_conflicts_with_earlier_probe() {
    let harness = HarnessBuilder::new()
        .action(ActionSpec::new(a(1)).directory_dependency("/out/stage"))
        .action(ActionSpec::new(a(2)).shared_opaque("/out/stage"))
        .build();
    let analyzer = harness.analyzer();

    analyzer
        .analyze_dynamic_only(a(1), &absent_probe("/out/stage/subdir"))
        .unwrap();
    let observations = DynamicObservations {
        created_directories: vec![PathBuf::from("/out/stage/subdir")],
        ..DynamicObservations::default()
    };
    let report = analyzer.analyze_dynamic_only(a(2), &observations).unwrap();
    let violation =
        assert_single_kind(&report.violations, ViolationKind::WriteOnAbsentPathProbe);
    assert_eq!(violation.violator, a(2));
    assert_eq!(violation.related, Some(a(1)));
}
