//! Deterministic topological ordering.
//!
//! Kahn's algorithm with an ordered ready set: whenever several actions
//! have no remaining prerequisites, the one inserted earliest runs next.
//! Two runs over equal inputs therefore produce byte-identical plans,
//! which keeps logs comparable and tests stable.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::{stable_graph::NodeIndex, visit::EdgeRef, Direction};

use crate::error::PlanError;

use super::ActionDiGraph;

pub(crate) fn sort(graph: &ActionDiGraph) -> Result<Vec<NodeIndex>, PlanError> {
    let mut in_degree: BTreeMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|idx| (idx, graph.edges_directed(idx, Direction::Incoming).count()))
        .collect();

    let mut ready: BTreeSet<NodeIndex> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&idx, _)| idx)
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());

    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        order.push(next);

        for edge in graph.edges_directed(next, Direction::Outgoing) {
            let target = edge.target();

            if let Some(degree) = in_degree.get_mut(&target) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(target);
                }
            }
        }
    }

    if order.len() != graph.node_count() {
        return Err(PlanError::NotADag {
            unordered: graph.node_count() - order.len(),
            total: graph.node_count(),
        });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use crate::{
        actiongraph::{Action, ActionOp},
        sid::Sid,
    };

    use super::*;

    fn action(sid: u64) -> Action {
        Action::new_device(Sid(sid), ActionOp::Create)
    }

    #[test]
    fn test_sort_respects_edges_and_insertion_order() {
        let mut graph = ActionDiGraph::default();

        let a = graph.add_node(action(1));
        let b = graph.add_node(action(2));
        let c = graph.add_node(action(3));
        graph.add_edge(c, a, ());

        // b and c are both ready; b was inserted earlier and wins the
        // tie, a has to wait for c.
        assert_eq!(sort(&graph).unwrap(), vec![b, c, a]);
    }

    #[test]
    fn test_sort_detects_cycle() {
        let mut graph = ActionDiGraph::default();

        let a = graph.add_node(action(1));
        let b = graph.add_node(action(2));
        let c = graph.add_node(action(3));
        graph.add_edge(a, b, ());
        graph.add_edge(b, a, ());
        graph.add_edge(a, c, ());

        assert_eq!(
            sort(&graph).unwrap_err(),
            PlanError::NotADag {
                unordered: 3,
                total: 3
            }
        );
    }

    #[test]
    fn test_sort_empty_graph() {
        assert!(sort(&ActionDiGraph::default()).unwrap().is_empty());
    }
}
