//! Actiongraph.
//!
//! Diffs two devicegraphs into a dependency-ordered list of commit
//! actions. [`Actiongraph::plan`] runs the whole pipeline:
//!
//! 1. Check both input graphs.
//! 2. Diff devices and holders by identity into action chains
//!    ([`collect`]).
//! 3. Merge duplicate mount actions produced by independent chains.
//! 4. Synthesize dependency edges: structural parent/child rules,
//!    reallot ordering, per-table partition serialization, mount path
//!    nesting and serialized-hardware fences ([`dependencies`],
//!    [`dependency_manager`]).
//! 5. Splice out synchronization-only anchor actions.
//! 6. Order deterministically, failing with [`PlanError::NotADag`] when
//!    the synthesized constraints contradict each other ([`order`]).
//!
//! The planned graph borrows both devicegraphs and is immutable once
//! built.

use std::collections::BTreeSet;
use std::fmt;

use log::debug;
use petgraph::{
    stable_graph::{NodeIndex, StableDiGraph},
    Direction,
};

use crate::{
    devicegraph::Devicegraph,
    error::PlanError,
    features::UsedFeatures,
    sid::{Sid, SidPair},
};

mod action;
mod collect;
mod dependencies;
mod dependency_manager;
mod graphviz;
mod order;


pub use action::{Action, ActionCategory, ActionOp, ActionTarget, ReallotMode, SidFilter};

pub(crate) type ActionDiGraph = StableDiGraph<Action, ()>;

/// The planned transition from one devicegraph to another.
pub struct Actiongraph<'a> {
    lhs: &'a Devicegraph,
    rhs: &'a Devicegraph,

    graph: ActionDiGraph,

    /// Device sids present only in the RHS resp. only in the LHS,
    /// captured during the diff and consulted by the dependency rules.
    created_sids: BTreeSet<Sid>,
    deleted_sids: BTreeSet<Sid>,

    /// Holder pairs present only in the RHS resp. only in the LHS.
    created_pairs: BTreeSet<SidPair>,
    deleted_pairs: BTreeSet<SidPair>,

    /// Topological order of `graph`, filled as the last pipeline step.
    order: Vec<NodeIndex>,
}

impl<'a> Actiongraph<'a> {
    /// Plans the transition from `lhs` (the current state) to `rhs` (the
    /// desired state).
    pub fn plan(lhs: &'a Devicegraph, rhs: &'a Devicegraph) -> Result<Self, PlanError> {
        lhs.check()?;
        rhs.check()?;

        let mut actiongraph = Self {
            lhs,
            rhs,
            graph: ActionDiGraph::default(),
            created_sids: BTreeSet::new(),
            deleted_sids: BTreeSet::new(),
            created_pairs: BTreeSet::new(),
            deleted_pairs: BTreeSet::new(),
            order: Vec::new(),
        };

        actiongraph.collect_actions()?;
        actiongraph.remove_duplicate_mounts();
        actiongraph.add_dependencies()?;
        actiongraph.remove_only_syncs();
        actiongraph.order = order::sort(&actiongraph.graph)?;

        debug!(
            "Planned {} actions from {} created, {} deleted devices",
            actiongraph.order.len(),
            actiongraph.created_sids.len(),
            actiongraph.deleted_sids.len()
        );

        Ok(actiongraph)
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn num_actions(&self) -> usize {
        self.graph.node_count()
    }

    /// The actions in commit order.
    pub fn commit_actions(&self) -> Vec<&Action> {
        self.order.iter().map(|&idx| &self.graph[idx]).collect()
    }

    /// The commit order as human readable one-liners.
    pub fn text(&self) -> Vec<String> {
        self.commit_actions()
            .into_iter()
            .map(|action| action.text(self.lhs, self.rhs))
            .collect()
    }

    /// The actions targeting a device, optionally narrowed to one end of
    /// the device's chain. Returned in insertion order.
    pub fn actions_with_sid(&self, sid: Sid, filter: SidFilter) -> Vec<&Action> {
        self.vertices_with_sid(sid, filter)
            .into_iter()
            .map(|idx| &self.graph[idx])
            .collect()
    }

    /// Features touched when committing the whole plan.
    pub fn used_features(&self) -> UsedFeatures {
        self.graph
            .node_weights()
            .map(|action| action.used_features(self.lhs, self.rhs))
            .fold(UsedFeatures::empty(), |acc, features| acc | features)
    }

    pub(crate) fn vertices_with_sid(&self, sid: Sid, filter: SidFilter) -> Vec<NodeIndex> {
        self.sorted_vertices()
            .into_iter()
            .filter(|&idx| {
                let action = &self.graph[idx];

                action.device_sid() == Some(sid)
                    && match filter {
                        SidFilter::All => true,
                        SidFilter::OnlyFirst => action.first,
                        SidFilter::OnlyLast => action.last,
                    }
            })
            .collect()
    }

    /// All action vertices, in insertion order. Insertion order is the
    /// deterministic fallback wherever the dependency rules leave slack.
    pub(crate) fn sorted_vertices(&self) -> Vec<NodeIndex> {
        let mut vertices: Vec<_> = self.graph.node_indices().collect();
        vertices.sort();
        vertices
    }

    pub(crate) fn add_vertex(&mut self, action: Action) -> NodeIndex {
        self.graph.add_node(action)
    }

    pub(crate) fn add_edge(&mut self, source: NodeIndex, target: NodeIndex) {
        if source != target && !self.graph.contains_edge(source, target) {
            self.graph.add_edge(source, target, ());
        }
    }

    /// Inserts a chain of actions with sequential edges, marking the
    /// first and last action of the chain.
    pub(crate) fn add_chain(&mut self, actions: Vec<Action>) -> Vec<NodeIndex> {
        let vertices: Vec<NodeIndex> = actions
            .into_iter()
            .map(|action| self.add_vertex(action))
            .collect();

        for (i, &idx) in vertices.iter().enumerate() {
            let action = &mut self.graph[idx];
            action.first = i == 0;
            action.last = i == vertices.len() - 1;
        }

        for window in vertices.windows(2) {
            self.add_edge(window[0], window[1]);
        }

        vertices
    }

    /// Merges actions mounting or unmounting the same device. Independent
    /// chains can each request the mount; executing it twice would fail,
    /// so later duplicates are folded into the earliest one and their
    /// edges redirected.
    pub(crate) fn remove_duplicate_mounts(&mut self) {
        let vertices = self.sorted_vertices();

        for (i, &kept) in vertices.iter().enumerate() {
            for &duplicate in &vertices[i + 1..] {
                if !self.graph.contains_node(kept) || !self.graph.contains_node(duplicate) {
                    continue;
                }

                let a = &self.graph[kept];
                let b = &self.graph[duplicate];
                let same_target = a.target == b.target;
                let same_mount = (a.is_mount() && b.is_mount())
                    || (a.is_unmount() && b.is_unmount());

                if same_target && same_mount {
                    debug!(
                        "Merging duplicate action '{}'",
                        b.text(self.lhs, self.rhs)
                    );
                    self.splice_into(duplicate, kept);
                }
            }
        }
    }

    /// Splices out synchronization-only actions, connecting each of their
    /// parents to each of their children so the ordering they anchored
    /// survives their removal.
    pub(crate) fn remove_only_syncs(&mut self) {
        for idx in self.sorted_vertices() {
            if self.graph[idx].only_sync {
                self.splice_out(idx);
            }
        }
    }

    /// Removes `duplicate`, redirecting its edges onto `kept`.
    fn splice_into(&mut self, duplicate: NodeIndex, kept: NodeIndex) {
        let parents: Vec<_> = self
            .graph
            .neighbors_directed(duplicate, Direction::Incoming)
            .collect();
        let children: Vec<_> = self
            .graph
            .neighbors_directed(duplicate, Direction::Outgoing)
            .collect();

        for parent in parents {
            self.add_edge(parent, kept);
        }
        for child in children {
            self.add_edge(kept, child);
        }

        self.graph.remove_node(duplicate);
    }

    /// Removes a vertex, connecting all of its parents to all of its
    /// children.
    fn splice_out(&mut self, idx: NodeIndex) {
        let parents: Vec<_> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        let children: Vec<_> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();

        for &parent in &parents {
            for &child in &children {
                self.add_edge(parent, child);
            }
        }

        self.graph.remove_node(idx);
    }
}

impl fmt::Debug for Actiongraph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actiongraph")
            .field("actions", &self.num_actions())
            .field("created_sids", &self.created_sids)
            .field("deleted_sids", &self.deleted_sids)
            .finish()
    }
}

impl fmt::Display for Actiongraph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Actions: {}", self.num_actions())?;
        for line in self.text() {
            writeln!(f, "  {}", line)?;
        }
        Ok(())
    }
}
