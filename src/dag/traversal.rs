//! Forward/backward depth-first and breadth-first walks over a [`Dag`].

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

use petgraph::Direction;

use super::{Dag, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    DepthFirst,
    BreadthFirst,
}

/// Walk `dag` starting from `from` (or every head/leaf of the graph,
/// depending on `direction`, when `from` is `None`), following edges
/// in `direction`, visiting each reachable node exactly once.
pub(super) fn walk<T>(dag: &Dag<T>, from: Option<NodeId>, direction: Direction, order: TraversalOrder) -> Vec<NodeId>
where
    T: Eq + Hash + Clone + std::fmt::Debug,
{
    let starts: Vec<NodeId> = match from {
        Some(id) => vec![id],
        None => match direction {
            Direction::Outgoing => dag.heads().collect(),
            Direction::Incoming => dag.leaves().collect(),
        },
    };

    let mut visited = HashSet::new();
    let mut out = Vec::new();

    match order {
        TraversalOrder::DepthFirst => {
            let mut stack: Vec<NodeId> = starts.into_iter().rev().collect();
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }
                out.push(id);
                let mut neighbors: Vec<NodeId> = dag.graph().neighbors_directed(id, direction).collect();
                neighbors.reverse();
                stack.extend(neighbors);
            }
        }
        TraversalOrder::BreadthFirst => {
            let mut queue: VecDeque<NodeId> = starts.into_iter().collect();
            for &id in &queue {
                visited.insert(id);
            }
            while let Some(id) = queue.pop_front() {
                out.push(id);
                for next in dag.graph().neighbors_directed(id, direction) {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::dag::Dag;

    #[test]
    fn breadth_first_forward_visits_every_descendant_once() {
        let mut dag: Dag<&str> = Dag::new();
        dag.add("f", &[], &[]).unwrap();
        dag.add("g", &["f"], &[]).unwrap();
        dag.add("h", &["f"], &[]).unwrap();
        dag.add("m", &["g", "h"], &[]).unwrap();

        let order = dag.breadth_first_forward(None);
        assert_eq!(order.len(), 4);
        let names: HashSetNames = order.iter().map(|&id| *dag.value(id).unwrap()).collect();
        assert_eq!(names.len(), 4);
    }

    type HashSetNames = std::collections::HashSet<&'static str>;
}
