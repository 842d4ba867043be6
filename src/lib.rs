//! tripwire library crate — file-access conflict analysis for build graphs.
//!
//! The primary interface is the `tripwire` binary, which replays recorded
//! build traces. This lib.rs exposes the analyzer pipeline so integration
//! tests and embedders can drive it directly: build a
//! [`tripwire_graph::DependencyGraph`], create [`AccessRegistries`] for the
//! build invocation, and feed each action's accesses through a
//! [`ConflictAnalyzer`].

pub mod classifier;
mod convergence;
pub mod error;
pub mod model;
pub mod oracle;
pub mod policy;
pub mod registry;
pub mod report;
pub mod trace;

pub use classifier::{
    AllowedRewrite, AnalysisReport, AnalyzerOptions, ConflictAnalyzer, ProbeMode,
};
pub use error::AnalyzeError;
pub use oracle::{OrderingFilter, OrderingOracle, VersionDisposition};
pub use policy::{RewriteDisallowedReason, RewriteVerdict};
pub use registry::AccessRegistries;
pub use report::{CollectingSink, NullSink, ViolationSink};
pub use tripwire_graph::{
    ActionId, ActionInfo, ContentHash, ContentResolver, DependencyGraph, Producer, ProducerKind,
};
