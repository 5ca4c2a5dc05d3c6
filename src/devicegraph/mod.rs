//! # Devicegraph
//!
//! The devicegraph is the owning container for devices and holders: a
//! directed multigraph where vertices are storage entities (disks,
//! partitions, filesystems, ...) and edges are the relationships between
//! them. Devices are addressed by their stable sid through an index map,
//! so lookups never depend on graph positions.
//!
//! Structural invariants, validated by [`Devicegraph::check`]:
//!
//! - every device is held by the graph exactly once and the sid index
//!   points at its actual position,
//! - between one ordered pair of devices there is at most one holder of
//!   each kind,
//! - the classic view is acyclic. Other views may contain cycles for
//!   snapshot relationships.
//!
//! All traversals take a [`View`] selecting which holders they follow.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::trace;
use petgraph::{
    stable_graph::{NodeIndex, StableDiGraph},
    visit::{EdgeFiltered, EdgeRef, IntoEdgeReferences},
    Direction,
};

use crate::{
    device::{Device, DevicePayload},
    error::DevicegraphError,
    holder::{Holder, HolderKind},
    sid::{Sid, SidPair},
    view::View,
};

mod graphviz;

/// The inner graph type.
pub(crate) type DeviceDiGraph = StableDiGraph<Device, Holder>;

/// One snapshot of a storage configuration.
#[derive(Debug, Clone, Default)]
pub struct Devicegraph {
    graph: DeviceDiGraph,
    sid_index: BTreeMap<Sid, NodeIndex>,
}

impl Devicegraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn num_devices(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_holders(&self) -> usize {
        self.graph.edge_count()
    }

    /// Adds a device. The sid must be unused within this graph.
    pub fn add_device(
        &mut self,
        sid: Sid,
        payload: DevicePayload,
    ) -> Result<Sid, DevicegraphError> {
        if self.sid_index.contains_key(&sid) {
            return Err(DevicegraphError::DuplicateSid(sid));
        }

        let device = Device::new(sid, payload);
        trace!("Adding device: {}", device.describe());

        let idx = self.graph.add_node(device);
        self.sid_index.insert(sid, idx);
        Ok(sid)
    }

    /// Adds a holder between two existing devices. Fails if a holder of
    /// the same kind already exists between the ordered pair.
    pub fn add_holder(
        &mut self,
        source: Sid,
        target: Sid,
        kind: HolderKind,
    ) -> Result<(), DevicegraphError> {
        let source_idx = self.node_index(source)?;
        let target_idx = self.node_index(target)?;

        let pair = SidPair::new(source, target);

        if self
            .graph
            .edges_connecting(source_idx, target_idx)
            .any(|edge| edge.weight().kind == kind)
        {
            return Err(DevicegraphError::HolderAlreadyExists { pair, kind });
        }

        trace!("Adding holder {} of kind '{}'", pair, kind);
        self.graph.add_edge(source_idx, target_idx, Holder::new(kind));
        Ok(())
    }

    /// Looks up a device by sid.
    pub fn device(&self, sid: Sid) -> Result<&Device, DevicegraphError> {
        let idx = self.node_index(sid)?;
        Ok(&self.graph[idx])
    }

    /// Query-style existence check, without an error path.
    pub fn device_exists(&self, sid: Sid) -> bool {
        self.sid_index.contains_key(&sid)
    }

    /// Looks up the single holder between an ordered pair. Fails if zero
    /// or more than one holder exists between the pair.
    pub fn find_holder(&self, pair: SidPair) -> Result<&Holder, DevicegraphError> {
        let holders = self.find_holders(pair)?;

        match holders.len() {
            0 => Err(DevicegraphError::HolderNotFound(pair)),
            1 => Ok(holders[0]),
            count => Err(DevicegraphError::AmbiguousHolder { pair, count }),
        }
    }

    /// Returns all holders between an ordered pair.
    pub fn find_holders(&self, pair: SidPair) -> Result<Vec<&Holder>, DevicegraphError> {
        let source_idx = self.node_index(pair.source)?;
        let target_idx = self.node_index(pair.target)?;

        Ok(self
            .graph
            .edges_connecting(source_idx, target_idx)
            .map(|edge| edge.weight())
            .collect())
    }

    /// Removes a device and all its incident holders. Descendants stay in
    /// the graph; use [`Devicegraph::remove_descendants`] when they have
    /// to go as well.
    pub fn remove_device(&mut self, sid: Sid) -> Result<(), DevicegraphError> {
        let idx = self.node_index(sid)?;

        trace!("Removing device: {}", self.graph[idx].describe());
        self.graph.remove_node(idx);
        self.sid_index.remove(&sid);
        Ok(())
    }

    /// Removes the holder of the given kind between an ordered pair.
    pub fn remove_holder(
        &mut self,
        pair: SidPair,
        kind: HolderKind,
    ) -> Result<(), DevicegraphError> {
        let source_idx = self.node_index(pair.source)?;
        let target_idx = self.node_index(pair.target)?;

        let edge = self
            .graph
            .edges_connecting(source_idx, target_idx)
            .find(|edge| edge.weight().kind == kind)
            .map(|edge| edge.id())
            .ok_or(DevicegraphError::HolderNotFound(pair))?;

        trace!("Removing holder {} of kind '{}'", pair, kind);
        self.graph.remove_edge(edge);
        Ok(())
    }

    /// Removes all descendants of a device in the given view. The device
    /// itself stays.
    pub fn remove_descendants(&mut self, sid: Sid, view: View) -> Result<(), DevicegraphError> {
        for descendant in self.descendants(sid, false, view)? {
            self.remove_device(descendant)?;
        }

        Ok(())
    }

    /// All device sids, ordered.
    pub fn device_sids(&self) -> BTreeSet<Sid> {
        self.sid_index.keys().copied().collect()
    }

    /// All holder sid pairs, ordered. Parallel holders collapse to one
    /// pair; the diff classifies edges by endpoint identities.
    pub fn holder_sid_pairs(&self) -> BTreeSet<SidPair> {
        self.graph
            .edge_references()
            .map(|edge| {
                SidPair::new(
                    self.graph[edge.source()].sid,
                    self.graph[edge.target()].sid,
                )
            })
            .collect()
    }

    /// Direct children of a device in the given view, ordered by sid.
    pub fn children(&self, sid: Sid, view: View) -> Result<Vec<Sid>, DevicegraphError> {
        let idx = self.node_index(sid)?;
        Ok(self.sorted_sids(self.view_neighbors(idx, Direction::Outgoing, view)))
    }

    /// Direct parents of a device in the given view, ordered by sid.
    pub fn parents(&self, sid: Sid, view: View) -> Result<Vec<Sid>, DevicegraphError> {
        let idx = self.node_index(sid)?;
        Ok(self.sorted_sids(self.view_neighbors(idx, Direction::Incoming, view)))
    }

    /// Devices sharing a parent with the device, ordered by sid.
    pub fn siblings(
        &self,
        sid: Sid,
        include_self: bool,
        view: View,
    ) -> Result<Vec<Sid>, DevicegraphError> {
        let idx = self.node_index(sid)?;

        let mut result = BTreeSet::new();
        for parent in self.view_neighbors(idx, Direction::Incoming, view) {
            for child in self.view_neighbors(parent, Direction::Outgoing, view) {
                result.insert(self.graph[child].sid);
            }
        }

        if !include_self {
            result.remove(&sid);
        }

        Ok(result.into_iter().collect())
    }

    /// Transitive children (forward BFS), ordered by sid.
    pub fn descendants(
        &self,
        sid: Sid,
        include_self: bool,
        view: View,
    ) -> Result<Vec<Sid>, DevicegraphError> {
        self.bfs(sid, include_self, view, Direction::Outgoing, false)
    }

    /// Transitive parents (reverse BFS), ordered by sid.
    pub fn ancestors(
        &self,
        sid: Sid,
        include_self: bool,
        view: View,
    ) -> Result<Vec<Sid>, DevicegraphError> {
        self.bfs(sid, include_self, view, Direction::Incoming, false)
    }

    /// Reachable devices without further children, ordered by sid.
    pub fn leaves(
        &self,
        sid: Sid,
        include_self: bool,
        view: View,
    ) -> Result<Vec<Sid>, DevicegraphError> {
        self.bfs(sid, include_self, view, Direction::Outgoing, true)
    }

    /// Reachable devices without further parents, ordered by sid.
    pub fn roots(
        &self,
        sid: Sid,
        include_self: bool,
        view: View,
    ) -> Result<Vec<Sid>, DevicegraphError> {
        self.bfs(sid, include_self, view, Direction::Incoming, true)
    }

    /// Deep copy. Payloads are cloned and the sid index is rebuilt from
    /// the clone, so the copy is fully independent of the original.
    pub fn copy(&self) -> Self {
        let graph = self.graph.clone();

        let sid_index = graph
            .node_indices()
            .map(|idx| (graph[idx].sid, idx))
            .collect();

        Self { graph, sid_index }
    }

    /// Validates the structural invariants. A failure indicates a bug in
    /// whatever built or mutated the graph.
    pub fn check(&self) -> Result<(), DevicegraphError> {
        // The sid index and the graph must describe the same set of
        // devices, position by position.
        if self.sid_index.len() != self.graph.node_count() {
            return Err(DevicegraphError::UnindexedDevice);
        }

        for (sid, idx) in &self.sid_index {
            match self.graph.node_weight(*idx) {
                Some(device) if device.sid == *sid => {}
                _ => return Err(DevicegraphError::BrokenSidIndex(*sid)),
            }
        }

        // At most one holder of each kind between one ordered pair.
        let mut seen: BTreeSet<(SidPair, HolderKind)> = BTreeSet::new();
        for edge in self.graph.edge_references() {
            let pair = SidPair::new(
                self.graph[edge.source()].sid,
                self.graph[edge.target()].sid,
            );

            if !seen.insert((pair, edge.weight().kind)) {
                return Err(DevicegraphError::HolderAlreadyExists {
                    pair,
                    kind: edge.weight().kind,
                });
            }
        }

        // The classic view must be a DAG.
        let classic =
            EdgeFiltered::from_fn(&self.graph, |edge| edge.weight().is_in_view(View::Classic));
        if petgraph::algo::is_cyclic_directed(&classic) {
            return Err(DevicegraphError::CycleInClassicView);
        }

        Ok(())
    }

    pub(crate) fn node_index(&self, sid: Sid) -> Result<NodeIndex, DevicegraphError> {
        self.sid_index
            .get(&sid)
            .copied()
            .ok_or(DevicegraphError::DeviceNotFound(sid))
    }

    /// Maps graph positions to their sids, deduplicated (parallel holders
    /// reach the same neighbor twice) and ordered.
    fn sorted_sids(&self, indices: Vec<NodeIndex>) -> Vec<Sid> {
        let sids: BTreeSet<Sid> = indices
            .into_iter()
            .map(|idx| self.graph[idx].sid)
            .collect();

        sids.into_iter().collect()
    }

    /// Neighbors in one direction, filtered by holder and device
    /// visibility in the view.
    fn view_neighbors(&self, idx: NodeIndex, direction: Direction, view: View) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(idx, direction)
            .filter(|edge| edge.weight().is_in_view(view))
            .map(|edge| match direction {
                Direction::Outgoing => edge.target(),
                Direction::Incoming => edge.source(),
            })
            .filter(|other| self.graph[*other].is_in_view(view))
            .collect()
    }

    /// BFS over the view-filtered graph. With `ends_only` set, collects
    /// only visited devices with no further neighbors in `direction`
    /// (roots/leaves); otherwise collects everything reachable.
    fn bfs(
        &self,
        sid: Sid,
        include_self: bool,
        view: View,
        direction: Direction,
        ends_only: bool,
    ) -> Result<Vec<Sid>, DevicegraphError> {
        let start = self.node_index(sid)?;

        let mut visited: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut result: BTreeSet<Sid> = BTreeSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();

        visited.insert(start);
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            let neighbors = self.view_neighbors(idx, direction, view);

            if !ends_only || neighbors.is_empty() {
                result.insert(self.graph[idx].sid);
            }

            for neighbor in neighbors {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }

        if !include_self {
            result.remove(&sid);
        }

        Ok(result.into_iter().collect())
    }

    pub(crate) fn inner(&self) -> &DeviceDiGraph {
        &self.graph
    }
}

/// Structural equality: same sids, same payloads per sid, same holders by
/// (pair, kind). Graph positions are irrelevant.
impl PartialEq for Devicegraph {
    fn eq(&self, other: &Self) -> bool {
        if self.device_sids() != other.device_sids() {
            return false;
        }

        for (sid, idx) in &self.sid_index {
            let Ok(other_device) = other.device(*sid) else {
                return false;
            };

            if self.graph[*idx] != *other_device {
                return false;
            }
        }

        self.holder_set() == other.holder_set()
    }
}

impl Eq for Devicegraph {}

impl Devicegraph {
    fn holder_set(&self) -> BTreeSet<(SidPair, HolderKind)> {
        self.graph
            .edge_references()
            .map(|edge| {
                (
                    SidPair::new(
                        self.graph[edge.source()].sid,
                        self.graph[edge.target()].sid,
                    ),
                    edge.weight().kind,
                )
            })
            .collect()
    }
}

impl std::fmt::Display for Devicegraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Iterate by sid order so the dump is stable.
        for idx in self.sid_index.values() {
            let device = &self.graph[*idx];

            let children: Vec<String> = self
                .view_neighbors(*idx, Direction::Outgoing, View::All)
                .into_iter()
                .map(|child| self.graph[child].sid.to_string())
                .collect();

            writeln!(f, "{} --> [{}]", device.describe(), children.join(", "))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreeset;

    use super::*;
    use crate::sid::SidGenerator;

    /// disk -> pt -> {part1, part2}, part1 -> fs -> mp
    struct Fixture {
        graph: Devicegraph,
        disk: Sid,
        pt: Sid,
        part1: Sid,
        part2: Sid,
        fs: Sid,
        mp: Sid,
    }

    fn fixture() -> Fixture {
        let mut generator = SidGenerator::new();
        let mut graph = Devicegraph::new();

        let disk = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::Disk {
                    name: "sda".into(),
                },
            )
            .unwrap();
        let pt = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::PartitionTable {
                    pt_type: crate::device::PtType::Gpt,
                },
            )
            .unwrap();
        let part1 = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::Partition {
                    name: "sda1".into(),
                    number: 1,
                },
            )
            .unwrap();
        let part2 = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::Partition {
                    name: "sda2".into(),
                    number: 2,
                },
            )
            .unwrap();
        let fs = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::Filesystem {
                    fs_type: crate::device::FsType::Ext4,
                    label: "".into(),
                },
            )
            .unwrap();
        let mp = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::MountPoint { path: "/".into() },
            )
            .unwrap();

        graph.add_holder(disk, pt, HolderKind::Subdevice).unwrap();
        graph.add_holder(pt, part1, HolderKind::Subdevice).unwrap();
        graph.add_holder(pt, part2, HolderKind::Subdevice).unwrap();
        graph.add_holder(part1, fs, HolderKind::Subdevice).unwrap();
        graph.add_holder(fs, mp, HolderKind::Subdevice).unwrap();

        Fixture {
            graph,
            disk,
            pt,
            part1,
            part2,
            fs,
            mp,
        }
    }

    #[test]
    fn test_lookup() {
        let f = fixture();

        assert!(f.graph.device_exists(f.disk));
        assert!(!f.graph.device_exists(Sid(999)));

        assert_eq!(
            f.graph.device(Sid(999)).unwrap_err(),
            DevicegraphError::DeviceNotFound(Sid(999))
        );

        let pair = SidPair::new(f.disk, f.pt);
        assert_eq!(f.graph.find_holder(pair).unwrap().kind, HolderKind::Subdevice);

        let missing = SidPair::new(f.disk, f.part1);
        assert_eq!(
            f.graph.find_holder(missing).unwrap_err(),
            DevicegraphError::HolderNotFound(missing)
        );
    }

    #[test]
    fn test_duplicate_sid_rejected() {
        let mut f = fixture();

        assert_eq!(
            f.graph
                .add_device(
                    f.disk,
                    DevicePayload::Disk {
                        name: "sdb".into()
                    }
                )
                .unwrap_err(),
            DevicegraphError::DuplicateSid(f.disk)
        );
    }

    #[test]
    fn test_duplicate_holder_kind_rejected() {
        let mut f = fixture();

        // Same pair, same kind: rejected.
        assert_eq!(
            f.graph
                .add_holder(f.disk, f.pt, HolderKind::Subdevice)
                .unwrap_err(),
            DevicegraphError::HolderAlreadyExists {
                pair: SidPair::new(f.disk, f.pt),
                kind: HolderKind::Subdevice,
            }
        );

        // Same pair, different kind: a parallel holder is fine.
        f.graph.add_holder(f.disk, f.pt, HolderKind::User).unwrap();
        assert_eq!(
            f.graph
                .find_holders(SidPair::new(f.disk, f.pt))
                .unwrap()
                .len(),
            2
        );

        // find_holder now has wrong cardinality.
        assert_eq!(
            f.graph.find_holder(SidPair::new(f.disk, f.pt)).unwrap_err(),
            DevicegraphError::AmbiguousHolder {
                pair: SidPair::new(f.disk, f.pt),
                count: 2,
            }
        );
    }

    #[test]
    fn test_traversals() {
        let f = fixture();
        let g = &f.graph;

        assert_eq!(g.children(f.pt, View::Classic).unwrap(), vec![f.part1, f.part2]);
        assert_eq!(g.parents(f.fs, View::Classic).unwrap(), vec![f.part1]);
        assert_eq!(
            g.siblings(f.part1, false, View::Classic).unwrap(),
            vec![f.part2]
        );
        assert_eq!(
            g.siblings(f.part1, true, View::Classic).unwrap(),
            vec![f.part1, f.part2]
        );

        assert_eq!(
            g.descendants(f.pt, false, View::Classic).unwrap(),
            vec![f.part1, f.part2, f.fs, f.mp]
        );
        assert_eq!(
            g.ancestors(f.fs, true, View::Classic).unwrap(),
            vec![f.disk, f.pt, f.part1, f.fs]
        );

        assert_eq!(g.leaves(f.disk, false, View::Classic).unwrap(), vec![f.part2, f.mp]);
        assert_eq!(g.roots(f.mp, false, View::Classic).unwrap(), vec![f.disk]);
    }

    #[test]
    fn test_parallel_holders_list_each_neighbor_once() {
        let mut generator = SidGenerator::new();
        let mut graph = Devicegraph::new();

        let disk = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::Disk {
                    name: "sda".into(),
                },
            )
            .unwrap();
        let pv = graph
            .add_device(generator.next_sid(), DevicePayload::LvmPv)
            .unwrap();
        graph.add_holder(disk, pv, HolderKind::Subdevice).unwrap();
        graph.add_holder(disk, pv, HolderKind::User).unwrap();

        assert_eq!(graph.children(disk, View::All).unwrap(), vec![pv]);
        assert_eq!(graph.parents(pv, View::All).unwrap(), vec![disk]);
    }

    #[test]
    fn test_remove_device_cascades_holders() {
        let mut f = fixture();

        f.graph.remove_device(f.part1).unwrap();

        assert!(!f.graph.device_exists(f.part1));
        // Incident holders are gone; the filesystem is now a root.
        assert!(f.graph.parents(f.fs, View::All).unwrap().is_empty());
        f.graph.check().unwrap();
    }

    #[test]
    fn test_remove_descendants() {
        let mut f = fixture();

        f.graph.remove_descendants(f.part1, View::Remove).unwrap();

        assert!(f.graph.device_exists(f.part1));
        assert!(!f.graph.device_exists(f.fs));
        assert!(!f.graph.device_exists(f.mp));
        assert!(f.graph.device_exists(f.part2));
        f.graph.check().unwrap();
    }

    #[test]
    fn test_copy_roundtrip() {
        let f = fixture();

        let copy = f.graph.copy();

        assert_eq!(f.graph, copy);
        copy.check().unwrap();

        // Mutating the copy does not affect the original.
        let mut copy = copy;
        copy.remove_device(f.mp).unwrap();
        assert_ne!(f.graph, copy);
        assert!(f.graph.device_exists(f.mp));
    }

    #[test]
    fn test_check_detects_classic_cycle() {
        let mut generator = SidGenerator::new();
        let mut graph = Devicegraph::new();

        let a = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::Disk {
                    name: "a".into(),
                },
            )
            .unwrap();
        let b = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::Disk {
                    name: "b".into(),
                },
            )
            .unwrap();

        graph.add_holder(a, b, HolderKind::Subdevice).unwrap();
        graph.add_holder(b, a, HolderKind::Subdevice).unwrap();

        assert_eq!(
            graph.check().unwrap_err(),
            DevicegraphError::CycleInClassicView
        );
    }

    #[test]
    fn test_snapshot_cycle_allowed_outside_classic_view() {
        let mut generator = SidGenerator::new();
        let mut graph = Devicegraph::new();

        let origin = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::LvmLv {
                    lv_name: "origin".into(),
                },
            )
            .unwrap();
        let snapshot = graph
            .add_device(
                generator.next_sid(),
                DevicePayload::LvmLv {
                    lv_name: "snapshot".into(),
                },
            )
            .unwrap();

        graph
            .add_holder(origin, snapshot, HolderKind::Subdevice)
            .unwrap();
        // Back-reference closing a cycle, visible only outside classic.
        graph
            .add_holder(snapshot, origin, HolderKind::Snapshot)
            .unwrap();

        graph.check().unwrap();

        assert_eq!(
            graph.children(snapshot, View::Classic).unwrap(),
            Vec::<Sid>::new()
        );
        assert_eq!(graph.children(snapshot, View::All).unwrap(), vec![origin]);

        assert_eq!(
            graph.device_sids(),
            btreeset! { origin, snapshot }
        );
    }
}
