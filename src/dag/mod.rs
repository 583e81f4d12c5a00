//! Directed acyclic graph of uniquely-valued nodes.
//!
//! Values are deduplicated (a [`Dag`] never stores the same value
//! twice) and every edge is symmetric: adding `a -> b` means `a` is in
//! `b`'s inputs and `b` is in `a`'s outputs. Cycle detection on insert
//! walks the graph so that a would-be cycle never gets wired in,
//! rather than being wired then rolled back.

mod resolver;
mod traversal;

pub use resolver::DependencyResolver;
pub use traversal::TraversalOrder;

use std::collections::HashSet;
use std::hash::Hash;

use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use crate::error::{EngineError, Result};

/// Opaque handle to a node. Stable for the lifetime of the [`Dag`]
/// (nodes are never renumbered, even after deletion): the backing
/// graph is a [`StableDiGraph`], whose `remove_node` leaves a hole
/// rather than swap-removing the last node into the freed slot.
pub type NodeId = NodeIndex;

/// A directed acyclic graph whose nodes carry a unique, hashable
/// value. `T` is typically a `CallSpec` (see [`crate::builder`]).
pub struct Dag<T> {
    graph: StableDiGraph<T, ()>,
    index_of: std::collections::HashMap<T, NodeIndex>,
    heads: HashSet<NodeIndex>,
    leaves: HashSet<NodeIndex>,
}

impl<T> Default for Dag<T>
where
    T: Eq + Hash + Clone + std::fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Dag<T>
where
    T: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            index_of: std::collections::HashMap::new(),
            heads: HashSet::new(),
            leaves: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, value: &T) -> bool {
        self.index_of.contains_key(value)
    }

    pub fn id_of(&self, value: &T) -> Option<NodeId> {
        self.index_of.get(value).copied()
    }

    pub fn value(&self, id: NodeId) -> Option<&T> {
        self.graph.node_weight(id)
    }

    fn id_or_err(&self, value: &T) -> Result<NodeId> {
        self.index_of
            .get(value)
            .copied()
            .ok_or_else(|| EngineError::NodeNotFound(format!("{value:?}")))
    }

    /// Add a new node. Fails with [`EngineError::Duplicate`] if
    /// `value` is already present, or [`EngineError::CycleError`] if
    /// the requested edges would close a cycle — in which case the
    /// graph is left completely unchanged (the cycle check happens
    /// before any edge is wired).
    pub fn add(&mut self, value: T, inputs: &[T], outputs: &[T]) -> Result<NodeId> {
        if self.index_of.contains_key(&value) {
            return Err(EngineError::Duplicate(format!("{value:?}")));
        }
        let input_ids = inputs.iter().map(|v| self.id_or_err(v)).collect::<Result<Vec<_>>>()?;
        let output_ids = outputs.iter().map(|v| self.id_or_err(v)).collect::<Result<Vec<_>>>()?;

        // A brand new node cannot yet be reached by anything, so a
        // cycle can only be formed through the requested `outputs`
        // edges if one of them can already reach one of the requested
        // `inputs` nodes (the future parents of this new node).
        for &out in &output_ids {
            for &inp in &input_ids {
                if out == inp || has_path_connecting(&self.graph, out, inp, None) {
                    return Err(EngineError::CycleError {
                        value: format!("{value:?}"),
                        path: vec![format!("{:?}", self.graph[out]), format!("{:?}", self.graph[inp])],
                    });
                }
            }
        }

        let id = self.graph.add_node(value.clone());
        self.index_of.insert(value, id);
        for &inp in &input_ids {
            self.graph.add_edge(inp, id, ());
        }
        for &out in &output_ids {
            self.graph.add_edge(id, out, ());
        }
        self.recompute_head_leaf(id);
        for &inp in &input_ids {
            self.recompute_head_leaf(inp);
        }
        for &out in &output_ids {
            self.recompute_head_leaf(out);
        }
        Ok(id)
    }

    /// Add a node if absent, otherwise merge `inputs`/`outputs` into
    /// the existing node's edge sets. Same cycle safety as [`Self::add`].
    pub fn add_or_update(&mut self, value: T, inputs: &[T], outputs: &[T]) -> Result<NodeId> {
        if !self.index_of.contains_key(&value) {
            return self.add(value, inputs, outputs);
        }
        let id = self.id_or_err(&value)?;
        let input_ids = inputs.iter().map(|v| self.id_or_err(v)).collect::<Result<Vec<_>>>()?;
        let output_ids = outputs.iter().map(|v| self.id_or_err(v)).collect::<Result<Vec<_>>>()?;

        let existing_inputs: HashSet<NodeIndex> = self.graph.neighbors_directed(id, Direction::Incoming).collect();
        let existing_outputs: HashSet<NodeIndex> = self.graph.neighbors_directed(id, Direction::Outgoing).collect();

        let new_inputs: Vec<NodeIndex> = input_ids.into_iter().filter(|i| !existing_inputs.contains(i)).collect();
        let new_outputs: Vec<NodeIndex> = output_ids.into_iter().filter(|o| !existing_outputs.contains(o)).collect();

        for &inp in &new_inputs {
            if inp == id || has_path_connecting(&self.graph, id, inp, None) {
                return Err(EngineError::CycleError {
                    value: format!("{value:?}"),
                    path: vec![format!("{:?}", self.graph[id]), format!("{:?}", self.graph[inp])],
                });
            }
        }
        for &out in &new_outputs {
            if out == id || has_path_connecting(&self.graph, out, id, None) {
                return Err(EngineError::CycleError {
                    value: format!("{value:?}"),
                    path: vec![format!("{:?}", self.graph[out]), format!("{:?}", self.graph[id])],
                });
            }
        }

        for &inp in &new_inputs {
            self.graph.add_edge(inp, id, ());
        }
        for &out in &new_outputs {
            self.graph.add_edge(id, out, ());
        }
        self.recompute_head_leaf(id);
        for &inp in new_inputs.iter().chain(new_outputs.iter()) {
            self.recompute_head_leaf(inp);
        }
        Ok(id)
    }

    /// Remove a node and all of its edges.
    pub fn delete(&mut self, value: &T) -> Result<()> {
        let id = self.id_or_err(value)?;
        let neighbors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(id, Direction::Incoming)
            .chain(self.graph.neighbors_directed(id, Direction::Outgoing))
            .collect();
        self.graph.remove_node(id);
        self.index_of.remove(value);
        self.heads.remove(&id);
        self.leaves.remove(&id);
        for n in neighbors {
            self.recompute_head_leaf(n);
        }
        Ok(())
    }

    fn recompute_head_leaf(&mut self, id: NodeIndex) {
        if self.graph.neighbors_directed(id, Direction::Incoming).next().is_none() {
            self.heads.insert(id);
        } else {
            self.heads.remove(&id);
        }
        if self.graph.neighbors_directed(id, Direction::Outgoing).next().is_none() {
            self.leaves.insert(id);
        } else {
            self.leaves.remove(&id);
        }
    }

    pub fn heads(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.heads.iter().copied()
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.leaves.iter().copied()
    }

    pub fn inputs_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.neighbors_directed(id, Direction::Incoming)
    }

    pub fn outputs_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.neighbors_directed(id, Direction::Outgoing)
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices()
    }

    /// Topological order via Kahn's algorithm, seeded from the head
    /// set. Every edge `u -> v` is emitted `u` before `v`.
    pub fn topological_iter(&self) -> Vec<NodeId> {
        let mut in_degree: std::collections::HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|id| (id, self.graph.neighbors_directed(id, Direction::Incoming).count()))
            .collect();
        let mut queue: std::collections::VecDeque<NodeIndex> = self.heads.iter().copied().collect();
        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for next in self.graph.neighbors_directed(id, Direction::Outgoing) {
                let deg = in_degree.get_mut(&next).expect("node present in in_degree map");
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(next);
                }
            }
        }
        order
    }

    pub fn dependency_resolver(&self) -> DependencyResolver {
        DependencyResolver::new(self)
    }

    pub fn depth_first_forward(&self, from: Option<NodeId>) -> Vec<NodeId> {
        traversal::walk(self, from, Direction::Outgoing, TraversalOrder::DepthFirst)
    }

    pub fn depth_first_backward(&self, from: Option<NodeId>) -> Vec<NodeId> {
        traversal::walk(self, from, Direction::Incoming, TraversalOrder::DepthFirst)
    }

    pub fn breadth_first_forward(&self, from: Option<NodeId>) -> Vec<NodeId> {
        traversal::walk(self, from, Direction::Outgoing, TraversalOrder::BreadthFirst)
    }

    pub fn breadth_first_backward(&self, from: Option<NodeId>) -> Vec<NodeId> {
        traversal::walk(self, from, Direction::Incoming, TraversalOrder::BreadthFirst)
    }

    pub(crate) fn graph(&self) -> &StableDiGraph<T, ()> {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_delete_restores_head_leaf_sets() {
        let mut dag: Dag<&str> = Dag::new();
        dag.add("a", &[], &[]).unwrap();
        dag.add("b", &["a"], &[]).unwrap();
        assert_eq!(dag.heads().count(), 1);
        assert_eq!(dag.leaves().count(), 1);
        dag.delete(&"b").unwrap();
        assert_eq!(dag.heads().count(), 1);
        assert_eq!(dag.leaves().count(), 1);
        assert!(dag.heads().all(|id| dag.value(id) == Some(&"a")));
    }

    #[test]
    fn deleting_a_non_last_node_does_not_renumber_survivors() {
        let mut dag: Dag<&str> = Dag::new();
        dag.add("a", &[], &[]).unwrap();
        dag.add("b", &[], &[]).unwrap();
        dag.add("c", &[], &[]).unwrap();
        let c_id = dag.id_of(&"c").unwrap();

        dag.delete(&"a").unwrap();

        assert_eq!(dag.value(c_id), Some(&"c"));
        assert_eq!(dag.id_of(&"c"), Some(c_id));
    }

    #[test]
    fn duplicate_value_rejected() {
        let mut dag: Dag<&str> = Dag::new();
        dag.add("a", &[], &[]).unwrap();
        let err = dag.add("a", &[], &[]).unwrap_err();
        assert!(matches!(err, EngineError::Duplicate(_)));
    }

    #[test]
    fn cycle_rejected_and_graph_unchanged() {
        let mut dag: Dag<&str> = Dag::new();
        dag.add("f", &[], &[]).unwrap();
        dag.add("g", &["f"], &[]).unwrap();
        dag.add("h", &["f"], &[]).unwrap();
        dag.add("m", &["g", "h"], &[]).unwrap();
        let before = dag.len();

        let err = dag.add_or_update("m", &["f"], &["f"]).unwrap_err();
        assert!(matches!(err, EngineError::CycleError { .. }));
        assert_eq!(dag.len(), before);
    }

    #[test]
    fn topological_iter_respects_edges() {
        let mut dag: Dag<&str> = Dag::new();
        dag.add("f", &[], &[]).unwrap();
        dag.add("g", &["f"], &[]).unwrap();
        dag.add("h", &["f"], &[]).unwrap();
        dag.add("m", &["g", "h"], &[]).unwrap();

        let order = dag.topological_iter();
        assert_eq!(order.len(), 4);
        let pos = |v: &str| order.iter().position(|&id| dag.value(id) == Some(&v)).unwrap();
        assert!(pos("f") < pos("g"));
        assert!(pos("f") < pos("h"));
        assert!(pos("g") < pos("m"));
        assert!(pos("h") < pos("m"));
    }
}
