//! In-memory [`DependencyGraph`] implementation.
//!
//! [`MemoryGraph`] is a validated, immutable graph built through
//! [`MemoryGraphBuilder`]. The builder checks ids and edges as they arrive
//! and rejects cycles at [`build`](MemoryGraphBuilder::build) time;
//! reachability is answered from a transitive closure computed once, so
//! queries are lock-free and O(1) amortized.
//!
//! Intended for embedders without their own graph engine, for the trace
//! replay binary, and for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::action::{ActionInfo, RewritePolicy};
use crate::error::GraphError;
use crate::graph::DependencyGraph;
use crate::types::{ActionId, DirectoryKind, Producer, ProducerKind};

// ---------------------------------------------------------------------------
// MemoryGraphBuilder
// ---------------------------------------------------------------------------

/// Incremental builder for a [`MemoryGraph`].
#[derive(Debug, Default)]
pub struct MemoryGraphBuilder {
    infos: HashMap<ActionId, Arc<ActionInfo>>,
    sources: HashMap<PathBuf, ActionId>,
    /// Edges as `dependent -> set of dependencies` (dependency runs first).
    depends_on: HashMap<ActionId, HashSet<ActionId>>,
    sealed_source_dirs: Vec<PathBuf>,
    temp_dirs: Vec<PathBuf>,
}

impl MemoryGraphBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a build action.
    ///
    /// # Errors
    /// Returns [`GraphError::DuplicateAction`] if `id` is already taken.
    pub fn add_action(&mut self, id: ActionId, info: ActionInfo) -> Result<(), GraphError> {
        if self.infos.contains_key(&id) || self.sources.values().any(|&s| s == id) {
            return Err(GraphError::DuplicateAction { id });
        }
        self.infos.insert(id, Arc::new(info));
        Ok(())
    }

    /// Register a source file with its source-hash node id.
    ///
    /// # Errors
    /// Returns [`GraphError::DuplicateAction`] if `id` is already taken.
    pub fn add_source_file(
        &mut self,
        path: impl Into<PathBuf>,
        id: ActionId,
    ) -> Result<(), GraphError> {
        if self.infos.contains_key(&id) || self.sources.values().any(|&s| s == id) {
            return Err(GraphError::DuplicateAction { id });
        }
        self.sources.insert(path.into(), id);
        Ok(())
    }

    /// Declare that `dependent` depends on (runs after) `dependency`.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownAction`] for ids the builder has not
    /// seen, or [`GraphError::SelfDependency`] when both sides are equal.
    pub fn add_edge(
        &mut self,
        dependency: ActionId,
        dependent: ActionId,
    ) -> Result<(), GraphError> {
        if dependency == dependent {
            return Err(GraphError::SelfDependency { id: dependency });
        }
        for id in [dependency, dependent] {
            if !self.infos.contains_key(&id) && !self.sources.values().any(|&s| s == id) {
                return Err(GraphError::UnknownAction { id });
            }
        }
        self.depends_on.entry(dependent).or_default().insert(dependency);
        Ok(())
    }

    /// Declare a sealed source directory root.
    pub fn add_sealed_source_directory(&mut self, root: impl Into<PathBuf>) {
        self.sealed_source_dirs.push(root.into());
    }

    /// Declare a temp directory root.
    pub fn add_temp_directory(&mut self, root: impl Into<PathBuf>) {
        self.temp_dirs.push(root.into());
    }

    /// Validate the edge set and freeze the graph.
    ///
    /// # Errors
    /// Returns [`GraphError::CycleDetected`] if the declared edges admit no
    /// valid execution order.
    pub fn build(self) -> Result<MemoryGraph, GraphError> {
        let closure = transitive_closure(&self.depends_on)?;

        // Producer index: declared outputs (per rewrite version) plus
        // source-hash nodes.
        let mut producers: HashMap<PathBuf, Vec<Producer>> = HashMap::new();
        for (&id, info) in &self.infos {
            for output in &info.outputs {
                producers.entry(output.path.clone()).or_default().push(Producer {
                    action: id,
                    kind: ProducerKind::Output,
                    rewrite_count: output.rewrite_count,
                    temporary: output.temporary,
                });
            }
        }
        for (path, &id) in &self.sources {
            producers.entry(path.clone()).or_default().push(Producer {
                action: id,
                kind: ProducerKind::Source,
                rewrite_count: 0,
                temporary: false,
            });
        }

        let mut exclusive_opaques = Vec::new();
        for (&id, info) in &self.infos {
            for dir in &info.directory_outputs {
                if dir.kind == DirectoryKind::ExclusiveOpaque {
                    exclusive_opaques.push((dir.root.clone(), id));
                }
            }
        }

        tracing::debug!(
            actions = self.infos.len(),
            sources = self.sources.len(),
            paths = producers.len(),
            "dependency graph validated"
        );

        Ok(MemoryGraph {
            infos: self.infos,
            producers,
            closure,
            sealed_source_dirs: self.sealed_source_dirs,
            temp_dirs: self.temp_dirs,
            exclusive_opaques,
        })
    }
}

/// Compute `closure[a] = all actions reachable from a along dependent edges`
/// (everything that must run after `a`), rejecting cycles.
fn transitive_closure(
    depends_on: &HashMap<ActionId, HashSet<ActionId>>,
) -> Result<HashMap<ActionId, HashSet<ActionId>>, GraphError> {
    // Invert to "dependency -> dependents" so closure[a] answers
    // is_reachable(a, b) directly.
    let mut dependents: HashMap<ActionId, Vec<ActionId>> = HashMap::new();
    for (&dependent, deps) in depends_on {
        for &dep in deps {
            dependents.entry(dep).or_default().push(dependent);
        }
    }

    let mut closure: HashMap<ActionId, HashSet<ActionId>> = HashMap::new();
    let nodes: Vec<ActionId> = dependents
        .keys()
        .chain(depends_on.keys())
        .copied()
        .collect();

    for &start in &nodes {
        if closure.contains_key(&start) {
            continue;
        }
        let mut reached = HashSet::new();
        let mut stack: Vec<ActionId> = dependents.get(&start).cloned().unwrap_or_default();
        while let Some(node) = stack.pop() {
            if node == start {
                return Err(GraphError::CycleDetected { id: start });
            }
            if reached.insert(node) {
                if let Some(next) = dependents.get(&node) {
                    stack.extend(next.iter().copied());
                }
            }
        }
        closure.insert(start, reached);
    }
    Ok(closure)
}

// ---------------------------------------------------------------------------
// MemoryGraph
// ---------------------------------------------------------------------------

/// Immutable in-memory dependency graph. See the module docs.
#[derive(Debug)]
pub struct MemoryGraph {
    infos: HashMap<ActionId, Arc<ActionInfo>>,
    producers: HashMap<PathBuf, Vec<Producer>>,
    closure: HashMap<ActionId, HashSet<ActionId>>,
    sealed_source_dirs: Vec<PathBuf>,
    temp_dirs: Vec<PathBuf>,
    exclusive_opaques: Vec<(PathBuf, ActionId)>,
}

impl DependencyGraph for MemoryGraph {
    fn is_reachable(&self, from: ActionId, to: ActionId) -> bool {
        self.closure
            .get(&from)
            .is_some_and(|reached| reached.contains(&to))
    }

    fn producers_of(&self, path: &Path) -> Vec<Producer> {
        self.producers.get(path).cloned().unwrap_or_default()
    }

    fn sealed_source_ancestor(&self, path: &Path) -> Option<PathBuf> {
        self.sealed_source_dirs
            .iter()
            .find(|root| path.starts_with(root))
            .cloned()
    }

    fn exclusive_opaque_ancestor(&self, path: &Path) -> Option<(PathBuf, ActionId)> {
        self.exclusive_opaques
            .iter()
            .find(|(root, _)| path.starts_with(root))
            .cloned()
    }

    fn temp_directory_ancestor(&self, path: &Path) -> Option<PathBuf> {
        self.temp_dirs
            .iter()
            .find(|root| path.starts_with(root))
            .cloned()
    }

    fn rewrite_policy_of(&self, action: ActionId) -> RewritePolicy {
        self.infos
            .get(&action)
            .map_or_else(RewritePolicy::default, |info| info.rewrite_policy)
    }

    fn hydrate(&self, action: ActionId) -> Option<Arc<ActionInfo>> {
        self.infos.get(&action).cloned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
