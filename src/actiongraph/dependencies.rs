//! Dependency synthesis.
//!
//! After the diff produced bare action chains, this pass wires them into
//! a DAG. The rules:
//!
//! - Structural: a device is created after its parents and deleted
//!   before them. When a created device takes the place of a deleted
//!   sibling, the sibling's removal comes first (unless a dedicated pass
//!   orders that device kind).
//! - Holders: a new holder waits for both endpoints to exist; a removed
//!   holder is gone before either endpoint is deleted.
//! - Reallot: a partner leaves its old owner before joining a new one,
//!   and exists before it is claimed.
//! - Mount order: mounts happen parent path before child path, unmounts
//!   in reverse. Swap has no path in the hierarchy and stays unordered.
//! - Serialized hardware: everything mounted from a DASD waits for the
//!   last structural change of the DASD's partition table.

use std::collections::BTreeMap;

use log::trace;
use petgraph::stable_graph::NodeIndex;

use crate::{
    device::DeviceKind,
    devicegraph::Devicegraph,
    error::PlanError,
    sid::{Sid, SidPair},
    view::View,
};

use super::{ActionCategory, ActionOp, ActionTarget, Actiongraph, ReallotMode, SidFilter};

impl Actiongraph<'_> {
    pub(crate) fn add_dependencies(&mut self) -> Result<(), PlanError> {
        for idx in self.sorted_vertices() {
            let action = self.graph[idx].clone();

            match action.target {
                ActionTarget::Device(sid) if self.created_sids.contains(&sid) => {
                    self.add_create_dependencies(idx, sid)?;
                }
                ActionTarget::Device(sid) if self.deleted_sids.contains(&sid) => {
                    self.add_delete_dependencies(idx, sid)?;
                }
                ActionTarget::Device(_) => (),
                ActionTarget::Holder(pair) => {
                    self.add_holder_dependencies(idx, pair);
                }
            }

            if let ActionOp::Reallot { mode, partner } = action.op {
                self.add_reallot_dependencies(idx, mode, partner);
            }
        }

        let table_fences = self.add_partition_table_dependencies()?;
        self.add_mount_order_dependencies();
        self.add_serialized_table_dependencies(&table_fences)?;

        Ok(())
    }

    /// Every action on a created device runs after the last action of
    /// every parent that is itself being created. When the parent existed
    /// before, deleted siblings sharing that parent are removed first so
    /// the new device can take their place.
    fn add_create_dependencies(&mut self, idx: NodeIndex, sid: Sid) -> Result<(), PlanError> {
        for parent in self.rhs.parents(sid, View::All)? {
            if !self.lhs.device_exists(parent) {
                let last = self.vertices_with_sid(parent, SidFilter::OnlyLast);
                let Some(&anchor) = last.first() else {
                    return Err(PlanError::MissingParentCreateAction { child: sid, parent });
                };

                trace!("Action for {} waits for creation of parent {}", sid, parent);
                self.add_edge(anchor, idx);
            } else if !self.rhs.device(sid)?.has_dependency_manager() {
                for sibling in self.lhs.children(parent, View::Remove)? {
                    if !self.deleted_sids.contains(&sibling) {
                        continue;
                    }

                    for anchor in self.vertices_with_sid(sibling, SidFilter::OnlyLast) {
                        if self.graph[anchor].category() == ActionCategory::Delete {
                            trace!(
                                "Action for {} waits for removal of sibling {}",
                                sid,
                                sibling
                            );
                            self.add_edge(anchor, idx);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Every action on a deleted device runs before the first action of
    /// each of its parents.
    fn add_delete_dependencies(&mut self, idx: NodeIndex, sid: Sid) -> Result<(), PlanError> {
        for parent in self.lhs.parents(sid, View::Remove)? {
            for anchor in self.vertices_with_sid(parent, SidFilter::OnlyFirst) {
                trace!("Action for {} precedes actions of parent {}", sid, parent);
                self.add_edge(idx, anchor);
            }
        }

        Ok(())
    }

    /// A new holder sits between its endpoints' chains: the parent's
    /// chain finishes before anything runs on the child that now sits on
    /// it. For a removed holder the direction flips, the child's chain
    /// finishes before the parent's starts. The sync vertex is spliced
    /// out later, leaving a direct endpoint-to-endpoint edge.
    fn add_holder_dependencies(&mut self, idx: NodeIndex, pair: SidPair) {
        let (before, after) = if self.created_pairs.contains(&pair) {
            (pair.source, pair.target)
        } else {
            (pair.target, pair.source)
        };

        for anchor in self.vertices_with_sid(before, SidFilter::OnlyLast) {
            self.add_edge(anchor, idx);
        }
        for anchor in self.vertices_with_sid(after, SidFilter::OnlyFirst) {
            self.add_edge(idx, anchor);
        }
    }

    /// A reduce happens before the partner's own chain (the partner must
    /// still exist to be released), an extend after it (the partner must
    /// exist to be claimed). A partner moving between two owners is
    /// reduced away before it is extended into the new owner.
    fn add_reallot_dependencies(&mut self, idx: NodeIndex, mode: ReallotMode, partner: Sid) {
        match mode {
            ReallotMode::Reduce => {
                for anchor in self.vertices_with_sid(partner, SidFilter::OnlyFirst) {
                    self.add_edge(idx, anchor);
                }
            }
            ReallotMode::Extend => {
                for anchor in self.vertices_with_sid(partner, SidFilter::OnlyLast) {
                    self.add_edge(anchor, idx);
                }

                for other in self.sorted_vertices() {
                    if other == idx {
                        continue;
                    }

                    if let ActionOp::Reallot {
                        mode: ReallotMode::Reduce,
                        partner: other_partner,
                    } = self.graph[other].op
                    {
                        if other_partner == partner {
                            self.add_edge(other, idx);
                        }
                    }
                }
            }
        }
    }

    /// Mounts are ordered by path nesting: a mount waits for the nearest
    /// mounted ancestor path, an unmount for the unmounts below it. The
    /// swap pseudo path takes no part in the hierarchy.
    fn add_mount_order_dependencies(&mut self) {
        let mut mounts: BTreeMap<String, NodeIndex> = BTreeMap::new();
        let mut unmounts: BTreeMap<String, NodeIndex> = BTreeMap::new();

        for idx in self.sorted_vertices() {
            let action = &self.graph[idx];
            if let Some(path) = action.mount_path() {
                if path == "swap" {
                    continue;
                }
                if action.is_mount() {
                    mounts.insert(path.to_string(), idx);
                } else {
                    unmounts.insert(path.to_string(), idx);
                }
            }
        }

        let mount_edges = nesting_edges(&mounts);
        for (ancestor, descendant) in mount_edges {
            self.add_edge(ancestor, descendant);
        }

        let unmount_edges = nesting_edges(&unmounts);
        for (ancestor, descendant) in unmount_edges {
            self.add_edge(descendant, ancestor);
        }
    }

    /// Everything mounted from below a serialized partition table waits
    /// for the table's last structural change, as recorded by the table
    /// pass. Without the fence a mount could race a partition change on
    /// hardware that only accepts one change at a time.
    fn add_serialized_table_dependencies(
        &mut self,
        table_fences: &BTreeMap<Sid, NodeIndex>,
    ) -> Result<(), PlanError> {
        for idx in self.sorted_vertices() {
            let action = &self.graph[idx];
            if !action.is_mount() {
                continue;
            }
            let Some(sid) = action.device_sid() else {
                continue;
            };

            for ancestor in self.rhs.ancestors(sid, false, View::All)? {
                let device = self.rhs.device(ancestor)?;
                let serialized = matches!(
                    &device.payload,
                    crate::device::DevicePayload::PartitionTable { pt_type }
                        if pt_type.requires_serialized_access()
                );

                if serialized {
                    if let Some(&anchor) = table_fences.get(&ancestor) {
                        if anchor != idx {
                            trace!(
                                "Mount of {} fenced behind serialized table {}",
                                sid,
                                ancestor
                            );
                            self.add_edge(anchor, idx);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// The partition table an action on `sid` structurally belongs to: the
/// table itself, or the table owning a partition.
pub(super) fn partition_table_of(graph: &Devicegraph, sid: Sid) -> Result<Option<Sid>, PlanError> {
    let device = graph.device(sid)?;

    match device.kind() {
        DeviceKind::PartitionTable => Ok(Some(sid)),
        DeviceKind::Partition => {
            for parent in graph.parents(sid, View::All)? {
                if graph.device(parent)?.kind() == DeviceKind::PartitionTable {
                    return Ok(Some(parent));
                }
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

/// For each path, the edge from its nearest present ancestor path. `/a/b`
/// nests under `/a` if `/a` is present, otherwise under `/`, and so on.
fn nesting_edges(by_path: &BTreeMap<String, NodeIndex>) -> Vec<(NodeIndex, NodeIndex)> {
    let mut edges = Vec::new();

    for (path, &idx) in by_path {
        let mut current = path.clone();
        while let Some(parent) = parent_path(&current) {
            if let Some(&ancestor) = by_path.get(&parent) {
                edges.push((ancestor, idx));
                break;
            }
            current = parent;
        }
    }

    edges
}

/// The parent of an absolute path, `None` for the root.
fn parent_path(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }

    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(pos) => Some(path[..pos].to_string()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/a/b/c"), Some("/a/b".to_string()));
        assert_eq!(parent_path("/a"), Some("/".to_string()));
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn test_nesting_skips_missing_intermediate() {
        let mut by_path = BTreeMap::new();
        by_path.insert("/".to_string(), NodeIndex::new(0));
        by_path.insert("/a/b".to_string(), NodeIndex::new(1));

        // "/a" is not mounted, so "/a/b" nests directly under "/".
        assert_eq!(
            nesting_edges(&by_path),
            vec![(NodeIndex::new(0), NodeIndex::new(1))]
        );
    }
}
