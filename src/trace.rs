//! Recorded build traces — the replay input format.
//!
//! A trace is a JSON document capturing everything the analyzer would have
//! seen live during a build: the declared graph (actions, sources, edges,
//! sealed/temp directories), the resolvable file contents, and one access
//! bundle per analyzed action. The `tripwire` binary replays a trace
//! through a fresh [`AccessRegistries`] and reports what the build's own
//! analysis would have reported.
//!
//! ```json
//! {
//!   "options": { "distribution_validation": false },
//!   "actions": [
//!     { "id": 1, "description": "compile a.c",
//!       "outputs": [ { "path": "/out/a.o" } ] }
//!   ],
//!   "sources": [ { "id": 100, "path": "/src/a.c" } ],
//!   "edges": [ [1, 2] ],
//!   "contents": [ { "path": "/src/a.c", "text": "int main;" } ],
//!   "analyses": [
//!     { "action": 2,
//!       "rejected": [ { "raw_path": "/out/a.o", "level": "read" } ] }
//!   ]
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tripwire_graph::{
    ActionId, ActionInfo, ContentHash, DirectoryKind, DirectoryOutput, DoubleWritePolicy,
    FileOutput, MemoryGraph, MemoryGraphBuilder, RewritePolicy, StaticContentResolver,
    UndeclaredReadScopes,
};

use crate::classifier::{AnalyzerOptions, ConflictAnalyzer, ProbeMode};
use crate::model::{AnalysisResult, DynamicObservations, ReportedAccess, Violation};
use crate::registry::AccessRegistries;
use crate::report::CollectingSink;

// ---------------------------------------------------------------------------
// Trace document
// ---------------------------------------------------------------------------

/// Analyzer options as they appear in a trace header.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct TraceOptions {
    /// See [`AnalyzerOptions::distribution_validation`].
    #[serde(default)]
    pub distribution_validation: bool,
    /// Inverted default: traces opt *out* of treating unexpected accesses
    /// as errors.
    #[serde(default)]
    pub unexpected_access_is_warning: bool,
    /// See [`ProbeMode::Strict`].
    #[serde(default)]
    pub strict_probes: bool,
}

impl From<TraceOptions> for AnalyzerOptions {
    fn from(options: TraceOptions) -> Self {
        Self {
            distribution_validation: options.distribution_validation,
            unexpected_access_is_error: !options.unexpected_access_is_warning,
            probe_mode: if options.strict_probes {
                ProbeMode::Strict
            } else {
                ProbeMode::Relaxed
            },
        }
    }
}

/// One action declaration in a trace.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TraceAction {
    /// Graph id.
    pub id: ActionId,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Declared input files.
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,
    /// Declared outputs.
    #[serde(default)]
    pub outputs: Vec<TraceOutput>,
    /// Declared input directory roots.
    #[serde(default)]
    pub directory_dependencies: Vec<PathBuf>,
    /// Declared output directories.
    #[serde(default)]
    pub directory_outputs: Vec<TraceDirectoryOutput>,
    /// Double-write treatment.
    #[serde(default)]
    pub double_writes: TraceDoubleWritePolicy,
    /// Whether safe source rewrites are allowed.
    #[serde(default)]
    pub safe_source_rewrites: bool,
    /// Undeclared-read allow-list, restricted mode when present.
    #[serde(default)]
    pub read_scopes: Option<TraceReadScopes>,
}

/// One declared output in a trace.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TraceOutput {
    /// Output path.
    pub path: PathBuf,
    /// Declaration version.
    #[serde(default = "default_rewrite_count")]
    pub rewrite_count: u32,
    /// Must exist after the action runs.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Declared temporary.
    #[serde(default)]
    pub temporary: bool,
}

const fn default_rewrite_count() -> u32 {
    1
}

const fn default_true() -> bool {
    true
}

/// One declared output directory in a trace.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TraceDirectoryOutput {
    /// Directory root.
    pub root: PathBuf,
    /// Shared or exclusive.
    pub kind: DirectoryKind,
}

/// Double-write policy spelling used in traces.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceDoubleWritePolicy {
    /// Hard errors.
    #[default]
    Forbid,
    /// Warnings, first writer wins.
    WarnOnly,
    /// Tolerated when content matches.
    AllowSameContent,
}

impl From<TraceDoubleWritePolicy> for DoubleWritePolicy {
    fn from(policy: TraceDoubleWritePolicy) -> Self {
        match policy {
            TraceDoubleWritePolicy::Forbid => Self::Forbid,
            TraceDoubleWritePolicy::WarnOnly => Self::WarnOnly,
            TraceDoubleWritePolicy::AllowSameContent => Self::AllowSameContent,
        }
    }
}

/// Undeclared-read scopes as listed in a trace.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TraceReadScopes {
    /// Allowed path prefixes.
    #[serde(default)]
    pub prefixes: Vec<PathBuf>,
    /// Allowed exact paths.
    #[serde(default)]
    pub exact_paths: Vec<PathBuf>,
    /// Allowed glob patterns.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// One source-file declaration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TraceSource {
    /// Source-hash node id.
    pub id: ActionId,
    /// Source path.
    pub path: PathBuf,
}

/// Resolvable content for one path, given as literal text or a hash.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TraceContent {
    /// The path.
    pub path: PathBuf,
    /// Literal content, hashed on load.
    #[serde(default)]
    pub text: Option<String>,
    /// Pre-computed hash; wins over `text` when both appear.
    #[serde(default)]
    pub hash: Option<ContentHash>,
}

/// One per-action access bundle.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TraceAnalysis {
    /// The analyzed action.
    pub action: ActionId,
    /// Sandbox-rejected static accesses.
    #[serde(default)]
    pub rejected: Vec<ReportedAccess>,
    /// Allow-listed accesses to validate under distribution validation.
    #[serde(default)]
    pub allowlisted: Vec<ReportedAccess>,
    /// Dynamic observations.
    #[serde(default)]
    pub observations: DynamicObservations,
}

/// A complete recorded build trace.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct BuildTrace {
    /// Analyzer configuration.
    #[serde(default)]
    pub options: TraceOptions,
    /// Build actions.
    #[serde(default)]
    pub actions: Vec<TraceAction>,
    /// Source files.
    #[serde(default)]
    pub sources: Vec<TraceSource>,
    /// Edges as `[dependency, dependent]` pairs.
    #[serde(default)]
    pub edges: Vec<(ActionId, ActionId)>,
    /// Sealed source directory roots.
    #[serde(default)]
    pub sealed_source_directories: Vec<PathBuf>,
    /// Temp directory roots.
    #[serde(default)]
    pub temp_directories: Vec<PathBuf>,
    /// Resolvable contents.
    #[serde(default)]
    pub contents: Vec<TraceContent>,
    /// Access bundles to replay, in order.
    #[serde(default)]
    pub analyses: Vec<TraceAnalysis>,
}

impl BuildTrace {
    /// Load a trace from a JSON file.
    ///
    /// # Errors
    /// I/O or JSON errors, with the file path attached.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading trace {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing trace {}", path.display()))
    }

    /// Compile the declarations into a graph and resolver.
    ///
    /// # Errors
    /// Graph validation errors (duplicate ids, dangling edges, cycles) and
    /// scope-pattern compile errors.
    pub fn compile(&self) -> Result<ReplaySetup> {
        let mut builder = MemoryGraphBuilder::new();
        for action in &self.actions {
            builder
                .add_action(action.id, hydrate_action(action)?)
                .with_context(|| format!("action {}", action.id))?;
        }
        for source in &self.sources {
            builder
                .add_source_file(&source.path, source.id)
                .with_context(|| format!("source {}", source.path.display()))?;
        }
        for &(dependency, dependent) in &self.edges {
            builder
                .add_edge(dependency, dependent)
                .with_context(|| format!("edge {dependency} -> {dependent}"))?;
        }
        for root in &self.sealed_source_directories {
            builder.add_sealed_source_directory(root);
        }
        for root in &self.temp_directories {
            builder.add_temp_directory(root);
        }
        let graph = builder.build().context("validating trace graph")?;

        let mut resolver = StaticContentResolver::new();
        for content in &self.contents {
            let hash = match (content.hash, &content.text) {
                (Some(hash), _) => hash,
                (None, Some(text)) => ContentHash::of_bytes(text.as_bytes()),
                (None, None) => anyhow::bail!(
                    "content entry for {} has neither text nor hash",
                    content.path.display()
                ),
            };
            resolver.insert(&content.path, hash);
        }

        Ok(ReplaySetup {
            graph,
            resolver,
            options: self.options.into(),
        })
    }
}

fn hydrate_action(action: &TraceAction) -> Result<ActionInfo> {
    let mut info = ActionInfo::new(if action.description.is_empty() {
        format!("{}", action.id)
    } else {
        action.description.clone()
    });
    info.dependencies = action.dependencies.iter().cloned().collect();
    info.outputs = action
        .outputs
        .iter()
        .map(|output| FileOutput {
            path: output.path.clone(),
            rewrite_count: output.rewrite_count,
            required: output.required,
            temporary: output.temporary,
        })
        .collect();
    info.directory_dependencies = action.directory_dependencies.clone();
    info.directory_outputs = action
        .directory_outputs
        .iter()
        .map(|dir| DirectoryOutput {
            root: dir.root.clone(),
            kind: dir.kind,
        })
        .collect();
    info.rewrite_policy = RewritePolicy {
        double_writes: action.double_writes.into(),
        safe_source_rewrites_allowed: action.safe_source_rewrites,
    };
    if let Some(scopes) = &action.read_scopes {
        info.read_scopes = Some(
            UndeclaredReadScopes::new(
                scopes.prefixes.clone(),
                scopes.exact_paths.clone(),
                &scopes.patterns,
            )
            .with_context(|| format!("read scopes of action {}", action.id))?,
        );
    }
    Ok(info)
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// A compiled trace, ready to replay.
pub struct ReplaySetup {
    /// The validated graph.
    pub graph: MemoryGraph,
    /// Contents resolvable during replay.
    pub resolver: StaticContentResolver,
    /// Analyzer configuration.
    pub options: AnalyzerOptions,
}

/// Result of replaying one access bundle.
#[derive(Clone, Debug, Serialize)]
pub struct ReplayedAnalysis {
    /// The analyzed action.
    pub action: ActionId,
    /// The contract-level summary.
    pub result: AnalysisResult,
    /// Merged violations.
    pub violations: Vec<Violation>,
}

/// Result of a whole replay.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReplayOutcome {
    /// Per-bundle results, in trace order.
    pub analyses: Vec<ReplayedAnalysis>,
    /// Total error-severity violations.
    pub error_count: usize,
    /// Total warning-severity violations.
    pub warning_count: usize,
}

/// Replay every access bundle of `trace` through fresh registries.
///
/// # Errors
/// Trace compilation errors, and contract violations for bundles naming
/// unknown actions.
pub fn replay(trace: &BuildTrace) -> Result<ReplayOutcome> {
    let setup = trace.compile()?;
    let registries = AccessRegistries::new();
    let sink = CollectingSink::new();
    let analyzer = ConflictAnalyzer::new(
        &setup.graph,
        &setup.resolver,
        &sink,
        &registries,
        setup.options,
    );

    let mut outcome = ReplayOutcome::default();
    for bundle in &trace.analyses {
        let report = analyzer
            .analyze(
                bundle.action,
                &bundle.rejected,
                &bundle.allowlisted,
                &bundle.observations,
            )
            .with_context(|| format!("analyzing {}", bundle.action))?;
        outcome.error_count += report
            .violations
            .iter()
            .filter(|violation| violation.is_error)
            .count();
        outcome.warning_count += report
            .violations
            .iter()
            .filter(|violation| !violation.is_error)
            .count();
        outcome.analyses.push(ReplayedAnalysis {
            action: bundle.action,
            result: report.result,
            violations: report.violations,
        });
    }
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
