//! Dependency graph over operations.
//!
//! `depends_on(from, to)` facts are read from both worlds:
//! - in the desired world, the target is created or updated before the
//!   dependent is created or updated;
//! - in the existing world, the dependent is updated or deleted before the
//!   target is deleted.
//!
//! Dependencies name resources, not `(type, name)` keys: a name shared by
//! several resource types links every operation carrying that name.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::error::{PlanError, Result};
use crate::facts::{Atom, DEPENDS_ON, FactStore, ResourceKey, Term};

use super::plan::{Operation, OperationKind, PlanEdge};

/// Builds dependency graphs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyGraphBuilder;

/// An acyclic graph whose nodes are operations.
///
/// Nodes are indexed in `(type, name)` order; every index-based result is
/// sorted, so batching and search are deterministic.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Operations, sorted by key.
    operations: Vec<Operation>,
    /// Operations that must run after each node.
    successors: Vec<BTreeSet<usize>>,
    /// Operations that must run before each node.
    predecessors: Vec<BTreeSet<usize>>,
}

impl DependencyGraphBuilder {
    /// Creates a new graph builder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds the graph for `operations` from the dependency facts of both
    /// derived worlds.
    ///
    /// A cycle among the `depends_on` facts of either world is an error even
    /// when no resource on it changes. A resource depending on itself is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns `CyclicDependency` if the dependency facts of either world
    /// are cyclic.
    pub fn build(
        &self,
        mut operations: Vec<Operation>,
        existing: &FactStore,
        desired: &FactStore,
    ) -> Result<DependencyGraph> {
        operations.sort_by_key(Operation::key);

        let desired_pairs = dependency_pairs(desired);
        let existing_pairs = dependency_pairs(existing);

        let mut cyclic = cyclic_names(&desired_pairs);
        cyclic.extend(cyclic_names(&existing_pairs));
        if !cyclic.is_empty() {
            let involved = operations
                .iter()
                .filter(|op| cyclic.contains(&op.name))
                .map(ToString::to_string)
                .collect();
            return Err(PlanError::CyclicDependency {
                resources: cyclic.into_iter().collect(),
                operations: involved,
            }
            .into());
        }

        // Edges out of a delete only reach deletes and come from existing
        // facts; edges into a create or update come from desired facts. Acyclic
        // facts in each world therefore give acyclic edges.
        let mut graph = DependencyGraph {
            successors: vec![BTreeSet::new(); operations.len()],
            predecessors: vec![BTreeSet::new(); operations.len()],
            operations,
        };

        let mut by_name: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, op) in graph.operations.iter().enumerate() {
            by_name.entry(op.name.as_str()).or_default().push(i);
        }

        let mut edges = Vec::new();
        for (from, to) in &desired_pairs {
            for &f in by_name.get(from.as_str()).into_iter().flatten() {
                for &t in by_name.get(to.as_str()).into_iter().flatten() {
                    if graph.operations[f].kind.is_expanding()
                        && graph.operations[t].kind.is_expanding()
                    {
                        edges.push((t, f));
                    }
                }
            }
        }
        for (from, to) in &existing_pairs {
            for &f in by_name.get(from.as_str()).into_iter().flatten() {
                for &t in by_name.get(to.as_str()).into_iter().flatten() {
                    if graph.operations[t].kind == OperationKind::Delete
                        && matches!(
                            graph.operations[f].kind,
                            OperationKind::Delete | OperationKind::Update
                        )
                    {
                        edges.push((f, t));
                    }
                }
            }
        }

        for (before, after) in edges {
            if before != after {
                graph.successors[before].insert(after);
                graph.predecessors[after].insert(before);
            }
        }

        debug!(
            "Dependency graph: {} operations, {} edges",
            graph.len(),
            graph.edge_count()
        );

        Ok(graph)
    }
}

/// Extracts `(from, to)` name pairs from `depends_on/2` facts, skipping
/// self-dependencies.
fn dependency_pairs(world: &FactStore) -> Vec<(String, String)> {
    world
        .with_predicate(DEPENDS_ON)
        .filter_map(|atom: &Atom| match atom.args.as_slice() {
            [Term::Str(from), Term::Str(to)] if from == to => {
                debug!("Ignoring self-dependency of {from}");
                None
            }
            [Term::Str(from), Term::Str(to)] => Some((from.clone(), to.clone())),
            _ => {
                warn!("Ignoring malformed dependency fact: {atom}");
                None
            }
        })
        .collect()
}

/// Returns the resource names lying on a cycle of dependency pairs.
fn cyclic_names(pairs: &[(String, String)]) -> BTreeSet<String> {
    let names: Vec<&str> = pairs
        .iter()
        .flat_map(|(from, to)| [from.as_str(), to.as_str()])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut successors = vec![BTreeSet::new(); names.len()];
    for (from, to) in pairs {
        if let (Ok(f), Ok(t)) = (
            names.binary_search(&from.as_str()),
            names.binary_search(&to.as_str()),
        ) {
            successors[t].insert(f);
        }
    }

    cyclic_nodes(&successors)
        .into_iter()
        .map(|i| names[i].to_string())
        .collect()
}

/// Returns the nodes lying on a cycle or between cycles.
///
/// Kahn's algorithm leaves behind the cyclic nodes and everything
/// downstream of them; repeatedly discarding leftovers without a leftover
/// successor keeps only the nodes on or between cycles.
fn cyclic_nodes(successors: &[BTreeSet<usize>]) -> BTreeSet<usize> {
    let mut in_degree = vec![0usize; successors.len()];
    for &next in successors.iter().flatten() {
        in_degree[next] += 1;
    }
    let mut queue: Vec<usize> = (0..successors.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut remaining: BTreeSet<usize> = (0..successors.len()).collect();

    while let Some(node) = queue.pop() {
        remaining.remove(&node);
        for &next in &successors[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push(next);
            }
        }
    }

    loop {
        let sinks: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| successors[i].is_disjoint(&remaining))
            .collect();
        if sinks.is_empty() {
            return remaining;
        }
        for sink in sinks {
            remaining.remove(&sink);
        }
    }
}

impl DependencyGraph {
    /// Returns the number of operations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the graph has no operations.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns all operations in node order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Returns the operation at `index`.
    #[must_use]
    pub fn operation(&self, index: usize) -> Option<&Operation> {
        self.operations.get(index)
    }

    /// Returns the node index of the operation on `key`.
    #[must_use]
    pub fn index_of(&self, key: &ResourceKey) -> Option<usize> {
        self.operations
            .binary_search_by(|op| op.key().cmp(key))
            .ok()
    }

    /// Returns the operations that must run before `index`.
    #[must_use]
    pub fn predecessors(&self, index: usize) -> Option<&BTreeSet<usize>> {
        self.predecessors.get(index)
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(BTreeSet::len).sum()
    }

    /// Returns every edge as `(before, after)` node indices, sorted.
    #[must_use]
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.successors
            .iter()
            .enumerate()
            .flat_map(|(before, afters)| afters.iter().map(move |&after| (before, after)))
            .collect()
    }

    /// Returns every edge keyed by resource.
    #[must_use]
    pub fn plan_edges(&self) -> Vec<PlanEdge> {
        self.edges()
            .into_iter()
            .map(|(before, after)| PlanEdge {
                before: self.operations[before].key(),
                after: self.operations[after].key(),
            })
            .collect()
    }

    /// Returns the operations not in `done` whose predecessors all are.
    #[must_use]
    pub fn ready(&self, done: &BTreeSet<usize>) -> Vec<usize> {
        (0..self.len())
            .filter(|i| !done.contains(i))
            .filter(|&i| self.predecessors[i].is_subset(done))
            .collect()
    }

    /// Groups the operations into Kahn levels.
    ///
    /// Every level holds the operations whose predecessors all belong to
    /// earlier levels. Node order breaks ties inside a level.
    #[must_use]
    pub fn topological_batches(&self) -> Vec<Vec<usize>> {
        let mut done = BTreeSet::new();
        let mut batches = Vec::new();
        loop {
            let level = self.ready(&done);
            if level.is_empty() {
                break;
            }
            done.extend(level.iter().copied());
            batches.push(level);
        }
        batches
    }
}
