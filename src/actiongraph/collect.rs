//! Action collection.
//!
//! Diffs the two devicegraphs by identity and emits action chains. A
//! device present only in the RHS yields its create chain, one present
//! only in the LHS yields its delete chain, and a device present in both
//! yields modify actions for every supported attribute difference.
//! Unsupported differences (renames, kind changes, table or filesystem
//! type changes, moved mount points) fail the whole plan with a typed
//! error instead of silently producing a wrong plan.
//!
//! Holders are diffed the same way but their actions only anchor
//! ordering; they are spliced out before the plan is exposed.

use std::collections::BTreeSet;

use log::trace;

use crate::{
    device::{Device, DeviceKind, DevicePayload},
    devicegraph::Devicegraph,
    error::PlanError,
    sid::Sid,
    view::View,
};

use super::{Action, ActionOp, Actiongraph, ReallotMode};

impl Actiongraph<'_> {
    pub(crate) fn collect_actions(&mut self) -> Result<(), PlanError> {
        let lhs_sids = self.lhs.device_sids();
        let rhs_sids = self.rhs.device_sids();

        self.created_sids = rhs_sids.difference(&lhs_sids).copied().collect();
        self.deleted_sids = lhs_sids.difference(&rhs_sids).copied().collect();
        let common_sids: BTreeSet<Sid> = lhs_sids.intersection(&rhs_sids).copied().collect();

        let nop_deletes = self.nop_delete_sids()?;

        for &sid in &self.created_sids.clone() {
            let chain = create_actions(self.rhs.device(sid)?)?;
            trace!("Device {} created, {} actions", sid, chain.len());
            self.add_chain(chain);
        }

        for &sid in &common_sids {
            let chain = self.modify_actions(sid)?;
            if !chain.is_empty() {
                trace!("Device {} modified, {} actions", sid, chain.len());
                self.add_chain(chain);
            }
        }

        for &sid in &self.deleted_sids.clone() {
            let chain = delete_actions(self.lhs.device(sid)?, nop_deletes.contains(&sid))?;
            trace!("Device {} deleted, {} actions", sid, chain.len());
            self.add_chain(chain);
        }

        self.collect_holder_actions();

        Ok(())
    }

    /// Deleted devices whose removal is already covered by the removal of
    /// a lower layer: deleting a volume group takes its logical volumes
    /// with it, so their delete actions are reported but perform nothing.
    fn nop_delete_sids(&self) -> Result<BTreeSet<Sid>, PlanError> {
        let mut nops = BTreeSet::new();

        for &sid in &self.deleted_sids {
            if self.lhs.device(sid)?.kind() != DeviceKind::LvmVg {
                continue;
            }

            for child in self.lhs.children(sid, View::Classic)? {
                if self.deleted_sids.contains(&child)
                    && self.lhs.device(child)?.kind() == DeviceKind::LvmLv
                {
                    nops.insert(child);
                }
            }
        }

        Ok(nops)
    }

    /// Modify actions for a device present in both graphs. Label changes
    /// and parent set changes are supported; everything else that differs
    /// is an error.
    fn modify_actions(&self, sid: Sid) -> Result<Vec<Action>, PlanError> {
        let before = self.lhs.device(sid)?;
        let after = self.rhs.device(sid)?;

        let mut chain = Vec::new();

        if before.kind() != after.kind() {
            return Err(PlanError::CannotChangeKind {
                sid,
                from: before.kind(),
                to: after.kind(),
            });
        }

        if let (Some(from), Some(to)) = (before.payload.name(), after.payload.name()) {
            if from != to {
                return Err(PlanError::CannotRename {
                    sid,
                    kind: before.kind(),
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }

        match (&before.payload, &after.payload) {
            (
                DevicePayload::Partition { number: from, .. },
                DevicePayload::Partition { number: to, .. },
            ) if from != to => {
                return Err(PlanError::CannotRenumberPartition {
                    sid,
                    from: *from,
                    to: *to,
                });
            }
            (
                DevicePayload::PartitionTable { pt_type: from },
                DevicePayload::PartitionTable { pt_type: to },
            ) if from != to => {
                return Err(PlanError::CannotChangePartitionTableType {
                    sid,
                    from: <&str>::from(from).to_string(),
                    to: <&str>::from(to).to_string(),
                });
            }
            (
                DevicePayload::Filesystem {
                    fs_type: from,
                    label: from_label,
                },
                DevicePayload::Filesystem {
                    fs_type: to,
                    label: to_label,
                },
            ) => {
                if from != to {
                    return Err(PlanError::CannotChangeFilesystemType {
                        sid,
                        from: <&str>::from(from).to_string(),
                        to: <&str>::from(to).to_string(),
                    });
                }
                if from_label != to_label {
                    chain.push(Action::new_device(
                        sid,
                        ActionOp::SetLabel {
                            label: to_label.clone(),
                        },
                    ));
                }
            }
            (
                DevicePayload::MountPoint { path: from },
                DevicePayload::MountPoint { path: to },
            ) if from != to => {
                return Err(PlanError::CannotMoveMountPoint {
                    sid,
                    from: from.clone(),
                    to: to.clone(),
                });
            }
            _ => (),
        }

        chain.extend(self.reallot_actions(sid)?);

        Ok(chain)
    }

    /// Reallot actions for parent set changes of a surviving device,
    /// e.g. physical volumes joining or leaving a volume group. Reduces
    /// come first so a partner moving between two parents is released
    /// before it is claimed.
    fn reallot_actions(&self, sid: Sid) -> Result<Vec<Action>, PlanError> {
        let before: BTreeSet<Sid> = self.lhs.parents(sid, View::All)?.into_iter().collect();
        let after: BTreeSet<Sid> = self.rhs.parents(sid, View::All)?.into_iter().collect();

        let mut chain = Vec::new();

        for &partner in before.difference(&after) {
            chain.push(Action::new_device(
                sid,
                ActionOp::Reallot {
                    mode: ReallotMode::Reduce,
                    partner,
                },
            ));
        }

        for &partner in after.difference(&before) {
            chain.push(Action::new_device(
                sid,
                ActionOp::Reallot {
                    mode: ReallotMode::Extend,
                    partner,
                },
            ));
        }

        Ok(chain)
    }

    /// One synchronization-only action per created or deleted holder.
    /// They carry no operation but give the dependency rules a vertex to
    /// anchor ordering between the holder's endpoints.
    fn collect_holder_actions(&mut self) {
        let lhs_pairs = self.lhs.holder_sid_pairs();
        let rhs_pairs = self.rhs.holder_sid_pairs();

        self.created_pairs = rhs_pairs.difference(&lhs_pairs).copied().collect();
        self.deleted_pairs = lhs_pairs.difference(&rhs_pairs).copied().collect();

        for &pair in &self.created_pairs.clone() {
            self.add_vertex(Action::new_holder(pair, ActionOp::Create).with_only_sync());
        }

        for &pair in &self.deleted_pairs.clone() {
            self.add_vertex(Action::new_holder(pair, ActionOp::Delete).with_only_sync());
        }
    }
}

/// The create chain for a device only present in the RHS.
fn create_actions(device: &Device) -> Result<Vec<Action>, PlanError> {
    let sid = device.sid;

    let chain = match &device.payload {
        DevicePayload::Disk { .. } | DevicePayload::Dasd { .. } => {
            return Err(PlanError::CannotCreate {
                sid,
                kind: device.kind(),
            });
        }
        DevicePayload::Encryption { .. } => vec![
            Action::new_device(sid, ActionOp::Create),
            Action::new_device(sid, ActionOp::OpenEncryption),
        ],
        DevicePayload::Filesystem { label, .. } => {
            let mut chain = vec![Action::new_device(sid, ActionOp::Format)];
            if !label.is_empty() {
                chain.push(Action::new_device(
                    sid,
                    ActionOp::SetLabel {
                        label: label.clone(),
                    },
                ));
            }
            chain
        }
        DevicePayload::MountPoint { path } => vec![
            Action::new_device(sid, ActionOp::Mount { path: path.clone() }),
            Action::new_device(sid, ActionOp::AddToFstab { path: path.clone() }),
        ],
        DevicePayload::PartitionTable { .. }
        | DevicePayload::Partition { .. }
        | DevicePayload::LvmPv
        | DevicePayload::LvmVg { .. }
        | DevicePayload::LvmLv { .. } => vec![Action::new_device(sid, ActionOp::Create)],
    };

    Ok(chain)
}

/// The delete chain for a device only present in the LHS.
fn delete_actions(device: &Device, nop: bool) -> Result<Vec<Action>, PlanError> {
    let sid = device.sid;

    let mut chain = match &device.payload {
        DevicePayload::Disk { .. } | DevicePayload::Dasd { .. } => {
            return Err(PlanError::CannotDelete {
                sid,
                kind: device.kind(),
            });
        }
        DevicePayload::MountPoint { path } => vec![
            Action::new_device(
                sid,
                ActionOp::RemoveFromFstab { path: path.clone() },
            ),
            Action::new_device(sid, ActionOp::Unmount { path: path.clone() }),
        ],
        _ => vec![Action::new_device(sid, ActionOp::Delete)],
    };

    if nop {
        chain = chain.into_iter().map(Action::with_nop).collect();
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use crate::{device::FsType, sid::SidGenerator};

    use super::*;

    fn filesystem(label: &str) -> DevicePayload {
        DevicePayload::Filesystem {
            fs_type: FsType::Ext4,
            label: label.to_string(),
        }
    }

    #[test]
    fn test_create_chain_for_filesystem_with_label() {
        let device = Device::new(Sid(1), filesystem("root"));
        let chain = create_actions(&device).unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].op, ActionOp::Format);
        assert_eq!(
            chain[1].op,
            ActionOp::SetLabel {
                label: "root".into()
            }
        );
    }

    #[test]
    fn test_create_chain_for_disk_fails() {
        let device = Device::new(
            Sid(1),
            DevicePayload::Disk {
                name: "sda".into(),
            },
        );

        assert_eq!(
            create_actions(&device),
            Err(PlanError::CannotCreate {
                sid: Sid(1),
                kind: DeviceKind::Disk
            })
        );
    }

    #[test]
    fn test_delete_chain_for_mount_point() {
        let device = Device::new(
            Sid(1),
            DevicePayload::MountPoint {
                path: "/home".into(),
            },
        );
        let chain = delete_actions(&device, false).unwrap();

        assert_eq!(chain.len(), 2);
        assert!(matches!(chain[0].op, ActionOp::RemoveFromFstab { .. }));
        assert!(matches!(chain[1].op, ActionOp::Unmount { .. }));
    }

    #[test]
    fn test_label_change_yields_set_label() {
        let mut generator = SidGenerator::default();
        let mut lhs = Devicegraph::new();
        let mut rhs = Devicegraph::new();

        let fs = generator.next_sid();
        lhs.add_device(fs, filesystem("old")).unwrap();
        rhs.add_device(fs, filesystem("new")).unwrap();

        let actiongraph = Actiongraph::plan(&lhs, &rhs).unwrap();
        let actions = actiongraph.commit_actions();

        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].op,
            ActionOp::SetLabel {
                label: "new".into()
            }
        );
    }

    #[test]
    fn test_filesystem_type_change_fails() {
        let mut generator = SidGenerator::default();
        let mut lhs = Devicegraph::new();
        let mut rhs = Devicegraph::new();

        let fs = generator.next_sid();
        lhs.add_device(fs, filesystem("")).unwrap();
        rhs.add_device(
            fs,
            DevicePayload::Filesystem {
                fs_type: FsType::Xfs,
                label: String::new(),
            },
        )
        .unwrap();

        assert_eq!(
            Actiongraph::plan(&lhs, &rhs).unwrap_err(),
            PlanError::CannotChangeFilesystemType {
                sid: fs,
                from: "ext4".into(),
                to: "xfs".into()
            }
        );
    }

    #[test]
    fn test_vg_rename_fails() {
        let mut generator = SidGenerator::default();
        let mut lhs = Devicegraph::new();
        let mut rhs = Devicegraph::new();

        let vg = generator.next_sid();
        lhs.add_device(
            vg,
            DevicePayload::LvmVg {
                vg_name: "system".into(),
            },
        )
        .unwrap();
        rhs.add_device(
            vg,
            DevicePayload::LvmVg {
                vg_name: "data".into(),
            },
        )
        .unwrap();

        assert_eq!(
            Actiongraph::plan(&lhs, &rhs).unwrap_err(),
            PlanError::CannotRename {
                sid: vg,
                kind: DeviceKind::LvmVg,
                from: "system".into(),
                to: "data".into()
            }
        );
    }
}
