//! Explicit state machine standing in for a generator-based scheduler:
//! call [`DependencyResolver::ready`] once to get the initial batch of
//! runnable nodes, then [`DependencyResolver::complete`] once per
//! finished node to discover what it unblocked.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use petgraph::Direction;

use super::{Dag, NodeId};

pub struct DependencyResolver {
    /// Remaining unmet input count per node.
    blocked: HashMap<NodeId, usize>,
    children: HashMap<NodeId, Vec<NodeId>>,
    done: HashSet<NodeId>,
}

impl DependencyResolver {
    pub(super) fn new<T>(dag: &Dag<T>) -> Self
    where
        T: Eq + Hash + Clone + std::fmt::Debug,
    {
        let mut blocked = HashMap::new();
        let mut children = HashMap::new();
        for id in dag.ids() {
            blocked.insert(id, dag.graph().neighbors_directed(id, Direction::Incoming).count());
            children.insert(id, dag.graph().neighbors_directed(id, Direction::Outgoing).collect());
        }
        Self { blocked, children, done: HashSet::new() }
    }

    /// Nodes with no unmet inputs, not yet marked complete.
    pub fn ready(&self) -> Vec<NodeId> {
        self.blocked
            .iter()
            .filter(|(id, &count)| count == 0 && !self.done.contains(*id))
            .map(|(&id, _)| id)
            .collect()
    }

    /// Mark `id` as finished and return the nodes it newly unblocked
    /// (empty if none become ready as a result).
    pub fn complete(&mut self, id: NodeId) -> Vec<NodeId> {
        self.done.insert(id);
        let mut newly_ready = Vec::new();
        if let Some(children) = self.children.get(&id).cloned() {
            for child in children {
                if let Some(count) = self.blocked.get_mut(&child) {
                    *count -= 1;
                    if *count == 0 {
                        newly_ready.push(child);
                    }
                }
            }
        }
        newly_ready
    }

    pub fn is_finished(&self) -> bool {
        self.done.len() == self.blocked.len()
    }

    pub fn remaining(&self) -> usize {
        self.blocked.len() - self.done.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::dag::Dag;

    #[test]
    fn diamond_unblocks_in_order() {
        let mut dag: Dag<&str> = Dag::new();
        dag.add("f", &[], &[]).unwrap();
        dag.add("g", &["f"], &[]).unwrap();
        dag.add("h", &["f"], &[]).unwrap();
        dag.add("m", &["g", "h"], &[]).unwrap();

        let mut resolver = dag.dependency_resolver();
        let first = resolver.ready();
        assert_eq!(first.len(), 1);
        let f = first[0];
        assert_eq!(dag.value(f), Some(&"f"));

        let unblocked = resolver.complete(f);
        let mut names: Vec<&str> = unblocked.iter().map(|&id| *dag.value(id).unwrap()).collect();
        names.sort();
        assert_eq!(names, vec!["g", "h"]);

        let g = unblocked.iter().find(|&&id| dag.value(id) == Some(&"g")).copied().unwrap();
        let h = unblocked.iter().find(|&&id| dag.value(id) == Some(&"h")).copied().unwrap();
        assert!(resolver.complete(g).is_empty());
        let final_batch = resolver.complete(h);
        assert_eq!(final_batch.len(), 1);
        assert_eq!(dag.value(final_batch[0]), Some(&"m"));
        assert!(!resolver.is_finished());
        resolver.complete(final_batch[0]);
        assert!(resolver.is_finished());
    }
}
