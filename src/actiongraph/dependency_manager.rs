//! Partition table serialization.
//!
//! Creating or deleting a partition renumbers its siblings on some table
//! types, and the kernel re-reads the whole table on every change, so
//! all structural actions of one table must run one after another. This
//! pass collects them per table and chains them: deletions first, by
//! descending partition number, then creations by ascending number, so
//! no intermediate state refers to a number that is still occupied.

use std::collections::BTreeMap;

use log::trace;
use petgraph::stable_graph::NodeIndex;

use crate::{error::PlanError, sid::Sid};

use super::{dependencies::partition_table_of, ActionCategory, Actiongraph};

/// A structural action of one partition table: the vertex plus the sort
/// key (partition number; the table itself sorts before its partitions).
struct TableAction {
    vertex: NodeIndex,
    number: u32,
    category: ActionCategory,
}

impl Actiongraph<'_> {
    /// Chains the structural actions of each partition table. Returns,
    /// per table, the final vertex of the chain; mounts below serialized
    /// hardware are fenced behind it.
    pub(crate) fn add_partition_table_dependencies(
        &mut self,
    ) -> Result<BTreeMap<Sid, NodeIndex>, PlanError> {
        let mut per_table: BTreeMap<Sid, Vec<TableAction>> = BTreeMap::new();

        for vertex in self.sorted_vertices() {
            let action = &self.graph[vertex];
            let Some(sid) = action.device_sid() else {
                continue;
            };

            let side = if self.created_sids.contains(&sid) {
                self.rhs
            } else if self.deleted_sids.contains(&sid) {
                self.lhs
            } else {
                continue;
            };

            let Some(table) = partition_table_of(side, sid)? else {
                continue;
            };

            let number = match &side.device(sid)?.payload {
                crate::device::DevicePayload::Partition { number, .. } => *number,
                // The table itself sorts before all partitions.
                _ => 0,
            };

            per_table.entry(table).or_default().push(TableAction {
                vertex,
                number,
                category: action.category(),
            });
        }

        let mut fences = BTreeMap::new();

        for (table, actions) in per_table {
            let chain = serialize(&actions);

            trace!(
                "Serializing {} structural actions of partition table {}",
                chain.len(),
                table
            );

            for window in chain.windows(2) {
                self.add_edge(window[0], window[1]);
            }

            if let Some(&last) = chain.last() {
                fences.insert(table, last);
            }
        }

        Ok(fences)
    }
}

/// Orders one table's actions: deletions by descending number, then
/// creations (and the table's own actions) by ascending number.
fn serialize(actions: &[TableAction]) -> Vec<NodeIndex> {
    let (mut deletes, mut creates): (Vec<&TableAction>, Vec<&TableAction>) = actions
        .iter()
        .partition(|action| action.category == ActionCategory::Delete);

    deletes.sort_by(|a, b| b.number.cmp(&a.number).then(a.vertex.cmp(&b.vertex)));
    creates.sort_by(|a, b| a.number.cmp(&b.number).then(a.vertex.cmp(&b.vertex)));

    deletes
        .into_iter()
        .chain(creates)
        .map(|action| action.vertex)
        .collect()
}
