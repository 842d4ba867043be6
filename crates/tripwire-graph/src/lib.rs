//! Dependency-graph abstraction layer for tripwire.
//!
//! This crate defines the [`DependencyGraph`] trait — the single interface
//! through which the conflict analyzer queries the build's declared dependency
//! structure. The analyzer never imports a concrete scheduler or graph engine
//! directly; it depends on `tripwire-graph` and programs against the trait.
//!
//! # Crate layout
//!
//! - [`graph`] — the [`DependencyGraph`] and [`ContentResolver`] trait
//!   definitions.
//! - [`action`] — the hydrated action model ([`ActionInfo`], [`FileOutput`],
//!   [`RewritePolicy`], [`UndeclaredReadScopes`]).
//! - [`types`] — value types used in trait signatures ([`ActionId`],
//!   [`ContentHash`], [`Producer`], [`DirectoryKind`]).
//! - [`error`] — the [`GraphError`] enum returned by graph construction.
//! - [`memory`] — [`MemoryGraph`], a validated in-memory implementation used
//!   by embedders without their own graph engine and by tests.

pub mod action;
pub mod error;
pub mod graph;
pub mod memory;
pub mod types;

// Re-export the main trait and commonly used types at the crate root for
// ergonomic imports: `use tripwire_graph::{DependencyGraph, ActionId};`
pub use action::{
    ActionInfo, DirectoryOutput, DoubleWritePolicy, FileOutput, RewritePolicy,
    UndeclaredReadScopes,
};
pub use error::GraphError;
pub use graph::{ContentResolver, DependencyGraph, StaticContentResolver};
pub use memory::{MemoryGraph, MemoryGraphBuilder};
pub use types::{
    ActionId, ContentHash, DirectoryKind, HashParseError, Producer, ProducerKind,
};
