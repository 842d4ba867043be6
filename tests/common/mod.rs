//! Shared test helpers for analyzer integration tests.
//!
//! Scenarios run against an in-memory graph and fresh registries — no real
//! build, no filesystem. `Harness` owns everything an analyzer borrows so
//! tests can construct one per scenario.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use tripwire::model::{
    AccessLevel, DynamicObservations, ObservedWrite, ReportedAccess, Violation, ViolationKind,
};
use tripwire::{AccessRegistries, AnalyzerOptions, ConflictAnalyzer, NullSink};
use tripwire_graph::{
    ActionId, ActionInfo, ContentHash, DirectoryKind, DirectoryOutput, DoubleWritePolicy,
    FileOutput, MemoryGraph, MemoryGraphBuilder, RewritePolicy, StaticContentResolver,
};

pub fn a(n: u32) -> ActionId {
    ActionId::new(n)
}

/// Builder-style action declaration.
pub struct ActionSpec {
    pub id: ActionId,
    pub info: ActionInfo,
}

impl ActionSpec {
    pub fn new(id: ActionId) -> Self {
        Self {
            id,
            info: ActionInfo::new(format!("test-action-{id}")),
        }
    }

    pub fn output(mut self, path: &str) -> Self {
        self.info.outputs.push(FileOutput::new(path));
        self
    }

    pub fn rewrite(mut self, path: &str, version: u32) -> Self {
        let mut output = FileOutput::new(path);
        output.rewrite_count = version;
        self.info.outputs.push(output);
        self
    }

    pub fn temp_output(mut self, path: &str) -> Self {
        let mut output = FileOutput::new(path);
        output.temporary = true;
        self.info.outputs.push(output);
        self
    }

    pub fn dependency(mut self, path: &str) -> Self {
        self.info.dependencies.insert(PathBuf::from(path));
        self
    }

    pub fn directory_dependency(mut self, root: &str) -> Self {
        self.info.directory_dependencies.push(PathBuf::from(root));
        self
    }

    pub fn shared_opaque(mut self, root: &str) -> Self {
        self.info.directory_outputs.push(DirectoryOutput {
            root: PathBuf::from(root),
            kind: DirectoryKind::SharedOpaque,
        });
        self
    }

    pub fn exclusive_opaque(mut self, root: &str) -> Self {
        self.info.directory_outputs.push(DirectoryOutput {
            root: PathBuf::from(root),
            kind: DirectoryKind::ExclusiveOpaque,
        });
        self
    }

    pub fn double_writes(mut self, policy: DoubleWritePolicy) -> Self {
        self.info.rewrite_policy.double_writes = policy;
        self
    }

    pub fn safe_rewrites(mut self) -> Self {
        self.info.rewrite_policy = RewritePolicy {
            safe_source_rewrites_allowed: true,
            ..self.info.rewrite_policy
        };
        self
    }
}

/// Everything an analyzer borrows, owned in one place.
pub struct Harness {
    pub graph: MemoryGraph,
    pub resolver: StaticContentResolver,
    pub registries: AccessRegistries,
    pub sink: NullSink,
    pub options: AnalyzerOptions,
}

/// Builds a `Harness` from declarative parts.
#[derive(Default)]
pub struct HarnessBuilder {
    actions: Vec<ActionSpec>,
    sources: Vec<(PathBuf, ActionId)>,
    edges: Vec<(ActionId, ActionId)>,
    sealed: Vec<PathBuf>,
    temp: Vec<PathBuf>,
    contents: Vec<(PathBuf, ContentHash)>,
    options: AnalyzerOptions,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(mut self, spec: ActionSpec) -> Self {
        self.actions.push(spec);
        self
    }

    pub fn source(mut self, path: &str, id: ActionId) -> Self {
        self.sources.push((PathBuf::from(path), id));
        self
    }

    /// `dependency` runs before `dependent`.
    pub fn edge(mut self, dependency: ActionId, dependent: ActionId) -> Self {
        self.edges.push((dependency, dependent));
        self
    }

    pub fn sealed_source_directory(mut self, root: &str) -> Self {
        self.sealed.push(PathBuf::from(root));
        self
    }

    pub fn temp_directory(mut self, root: &str) -> Self {
        self.temp.push(PathBuf::from(root));
        self
    }

    pub fn content(mut self, path: &str, bytes: &[u8]) -> Self {
        self.contents
            .push((PathBuf::from(path), ContentHash::of_bytes(bytes)));
        self
    }

    pub fn options(mut self, options: AnalyzerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Harness {
        let mut builder = MemoryGraphBuilder::new();
        for spec in self.actions {
            builder.add_action(spec.id, spec.info).expect("duplicate action id");
        }
        for (path, id) in self.sources {
            builder.add_source_file(path, id).expect("duplicate source id");
        }
        for (dependency, dependent) in self.edges {
            builder.add_edge(dependency, dependent).expect("bad edge");
        }
        for root in self.sealed {
            builder.add_sealed_source_directory(root);
        }
        for root in self.temp {
            builder.add_temp_directory(root);
        }
        let graph = builder.build().expect("graph should validate");

        let mut resolver = StaticContentResolver::new();
        for (path, hash) in self.contents {
            resolver.insert(path, hash);
        }

        Harness {
            graph,
            resolver,
            registries: AccessRegistries::new(),
            sink: NullSink,
            options: self.options,
        }
    }
}

impl Harness {
    pub fn analyzer(&self) -> ConflictAnalyzer<'_> {
        ConflictAnalyzer::new(
            &self.graph,
            &self.resolver,
            &self.sink,
            &self.registries,
            self.options,
        )
    }
}

// ---------------------------------------------------------------------------
// Access shorthands
// ---------------------------------------------------------------------------

pub fn read(path: &str) -> ReportedAccess {
    ReportedAccess::new(path, AccessLevel::Read)
}

pub fn write(path: &str) -> ReportedAccess {
    ReportedAccess::new(path, AccessLevel::Write)
}

pub fn no_observations() -> DynamicObservations {
    DynamicObservations::empty()
}

pub fn shared_write(path: &str) -> DynamicObservations {
    DynamicObservations {
        shared_opaque_writes: vec![ObservedWrite::new(path)],
        ..DynamicObservations::default()
    }
}

pub fn shared_write_with_content(path: &str, bytes: &[u8]) -> DynamicObservations {
    DynamicObservations {
        shared_opaque_writes: vec![
            ObservedWrite::new(path).with_content(ContentHash::of_bytes(bytes)),
        ],
        ..DynamicObservations::default()
    }
}

pub fn undeclared_read(path: &str) -> DynamicObservations {
    DynamicObservations {
        allowed_undeclared_reads: vec![PathBuf::from(path)],
        ..DynamicObservations::default()
    }
}

pub fn absent_probe(path: &str) -> DynamicObservations {
    DynamicObservations {
        absent_probes: vec![PathBuf::from(path)],
        ..DynamicObservations::default()
    }
}

pub fn output_contents(pairs: &[(&str, &[u8])]) -> BTreeMap<PathBuf, ContentHash> {
    pairs
        .iter()
        .map(|(path, bytes)| (PathBuf::from(path), ContentHash::of_bytes(bytes)))
        .collect()
}

// ---------------------------------------------------------------------------
// Assertions
// ---------------------------------------------------------------------------

pub fn kinds(violations: &[Violation]) -> Vec<ViolationKind> {
    violations.iter().map(|violation| violation.kind).collect()
}

pub fn assert_single_kind(violations: &[Violation], kind: ViolationKind) -> &Violation {
    assert_eq!(
        violations.len(),
        1,
        "expected exactly one violation, got {violations:?}"
    );
    assert_eq!(violations[0].kind, kind, "unexpected kind: {violations:?}");
    &violations[0]
}
