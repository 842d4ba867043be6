//! Data model for the conflict analyzer.
//!
//! - [`access`] — normalized access events: sandbox-rejected static accesses
//!   and dynamically observed writes/reads/probes.
//! - [`violation`] — the violation taxonomy with per-kind severity and
//!   cacheability traits, and the per-analysis result summary.
//!
//! Graph-side vocabulary ([`ActionId`](tripwire_graph::ActionId),
//! [`ContentHash`](tripwire_graph::ContentHash),
//! [`ActionInfo`](tripwire_graph::ActionInfo)) lives in `tripwire-graph` and
//! is re-exported from the crate root.

pub mod access;
pub mod violation;

pub use access::{
    AccessLevel, DynamicObservations, ObservedWrite, ReportedAccess, ReportingMethod,
};
pub use violation::{AnalysisResult, KindTraits, Violation, ViolationKind};
