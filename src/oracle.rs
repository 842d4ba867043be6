//! Ordering oracle — graph reachability as an ordering relation.
//!
//! A thin query layer over [`DependencyGraph`]. Reachability answers "must
//! `a` have completed before `b` started"; the filtered producer search
//! answers "which action statically declares this path as output, among
//! those standing in a given ordering relation to a reference action."
//! Queries are pure and may be expensive — callers batch where they can and
//! never cache on the oracle's behalf.

use std::path::Path;

use tripwire_graph::{ActionId, DependencyGraph, Producer};

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Which declaration version to select when a path has several producers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionDisposition {
    /// The lowest rewrite count (the original producer).
    Earliest,
    /// The highest rewrite count (the final producer).
    Latest,
}

/// Ordering relation a candidate producer must satisfy relative to a
/// reference action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderingFilter {
    /// Any producer qualifies.
    Any,
    /// The producer is not strictly ordered after the reference, so it could
    /// have executed earlier in wall time.
    PossiblyPrecedingInWallTime(ActionId),
    /// No order exists between producer and reference in either direction.
    Concurrent(ActionId),
    /// The producer is ordered before the reference.
    OrderedBefore(ActionId),
}

// ---------------------------------------------------------------------------
// OrderingOracle
// ---------------------------------------------------------------------------

/// Ordering queries for one analysis pass.
#[derive(Clone, Copy)]
pub struct OrderingOracle<'g> {
    graph: &'g dyn DependencyGraph,
}

impl<'g> OrderingOracle<'g> {
    /// Wrap a graph.
    #[must_use]
    pub const fn new(graph: &'g dyn DependencyGraph) -> Self {
        Self { graph }
    }

    /// `true` if `first` must have completed before `second` started.
    #[must_use]
    pub fn is_ordered_before(&self, first: ActionId, second: ActionId) -> bool {
        self.graph.is_reachable(first, second)
    }

    /// `true` if no order exists between the two actions in either direction.
    #[must_use]
    pub fn unordered(&self, a: ActionId, b: ActionId) -> bool {
        a != b && !self.is_ordered_before(a, b) && !self.is_ordered_before(b, a)
    }

    /// Find a declared producer of `path` satisfying `filter`, selecting by
    /// `disposition` when several qualify. `None` when nothing qualifies.
    #[must_use]
    pub fn find_declared_producer(
        &self,
        path: &Path,
        disposition: VersionDisposition,
        filter: OrderingFilter,
    ) -> Option<Producer> {
        self.search(path, disposition, filter, false)
    }

    /// Like [`find_declared_producer`](Self::find_declared_producer), but
    /// restricted to declarations that materialize: temp-flagged outputs are
    /// invisible here. Used wherever "the original producer" of a path is
    /// meant.
    #[must_use]
    pub fn find_materialized_producer(
        &self,
        path: &Path,
        disposition: VersionDisposition,
        filter: OrderingFilter,
    ) -> Option<Producer> {
        self.search(path, disposition, filter, true)
    }

    fn search(
        &self,
        path: &Path,
        disposition: VersionDisposition,
        filter: OrderingFilter,
        skip_temporary: bool,
    ) -> Option<Producer> {
        let mut candidates: Vec<Producer> = self
            .graph
            .producers_of(path)
            .into_iter()
            .filter(|producer| !(skip_temporary && producer.temporary))
            .filter(|producer| self.satisfies(producer.action, filter))
            .collect();
        // Deterministic selection: order by declared version, then id.
        candidates.sort_by_key(|producer| (producer.rewrite_count, producer.action));
        match disposition {
            VersionDisposition::Earliest => candidates.first().copied(),
            VersionDisposition::Latest => candidates.last().copied(),
        }
    }

    fn satisfies(&self, producer: ActionId, filter: OrderingFilter) -> bool {
        match filter {
            OrderingFilter::Any => true,
            OrderingFilter::PossiblyPrecedingInWallTime(reference) => {
                producer != reference && !self.is_ordered_before(reference, producer)
            }
            OrderingFilter::Concurrent(reference) => self.unordered(producer, reference),
            OrderingFilter::OrderedBefore(reference) => {
                self.is_ordered_before(producer, reference)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
