//! Actions.
//!
//! An action is one atomic step of the commit plan: create, modify or
//! delete one device or holder. A single device's lifecycle is a chain of
//! several actions (e.g. format, then mount, then add to fstab), marked
//! with `first`/`last` flags at the chain ends so dependency rules can
//! attach to the correct end.

use serde::{Deserialize, Serialize};

use crate::{
    device::{Device, DeviceKind},
    devicegraph::Devicegraph,
    features::UsedFeatures,
    sid::{Sid, SidPair},
};

/// What an action affects: one device or one holder.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    Device(Sid),
    Holder(SidPair),
}

/// Direction of a reallot.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReallotMode {
    /// The partner device is added to the device's parents (e.g. a
    /// physical volume joining a volume group).
    Extend,

    /// The partner device is removed from the device's parents.
    Reduce,
}

/// The operation an action performs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ActionOp {
    Create,
    Format,
    OpenEncryption,
    SetLabel { label: String },
    Mount { path: String },
    AddToFstab { path: String },
    Reallot { mode: ReallotMode, partner: Sid },
    Delete,
    Unmount { path: String },
    RemoveFromFstab { path: String },
}

/// Coarse classification of operations.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ActionCategory {
    Create,
    Modify,
    Delete,
}

impl ActionOp {
    pub fn category(&self) -> ActionCategory {
        match self {
            Self::Create | Self::Format => ActionCategory::Create,
            Self::OpenEncryption
            | Self::SetLabel { .. }
            | Self::Mount { .. }
            | Self::AddToFstab { .. }
            | Self::Reallot { .. } => ActionCategory::Modify,
            Self::Delete | Self::Unmount { .. } | Self::RemoveFromFstab { .. } => {
                ActionCategory::Delete
            }
        }
    }
}

/// Filter for [`crate::actiongraph::Actiongraph::actions_with_sid`],
/// selecting a specific end of a device's action chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SidFilter {
    All,
    OnlyFirst,
    OnlyLast,
}

/// One atomic step of the commit plan. Immutable once the plan is built.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub target: ActionTarget,
    pub op: ActionOp,

    /// Chain position flags, set when the chain is inserted.
    pub first: bool,
    pub last: bool,

    /// The action only anchors dependency edges and is spliced out before
    /// the plan is exposed.
    pub only_sync: bool,

    /// The action is reported but performs no operation, e.g. when a
    /// lower layer already cascades the deletion.
    pub nop: bool,
}

impl Action {
    pub fn new_device(sid: Sid, op: ActionOp) -> Self {
        Self {
            target: ActionTarget::Device(sid),
            op,
            first: true,
            last: true,
            only_sync: false,
            nop: false,
        }
    }

    pub fn new_holder(pair: SidPair, op: ActionOp) -> Self {
        Self {
            target: ActionTarget::Holder(pair),
            op,
            first: true,
            last: true,
            only_sync: false,
            nop: false,
        }
    }

    pub fn with_only_sync(mut self) -> Self {
        self.only_sync = true;
        self
    }

    pub fn with_nop(mut self) -> Self {
        self.nop = true;
        self
    }

    /// The device sid, for device actions.
    pub fn device_sid(&self) -> Option<Sid> {
        match self.target {
            ActionTarget::Device(sid) => Some(sid),
            ActionTarget::Holder(_) => None,
        }
    }

    pub fn category(&self) -> ActionCategory {
        self.op.category()
    }

    pub fn is_mount(&self) -> bool {
        matches!(self.op, ActionOp::Mount { .. })
    }

    pub fn is_unmount(&self) -> bool {
        matches!(self.op, ActionOp::Unmount { .. })
    }

    /// The mount path, for mount/unmount actions.
    pub fn mount_path(&self) -> Option<&str> {
        match &self.op {
            ActionOp::Mount { path } | ActionOp::Unmount { path } => Some(path),
            _ => None,
        }
    }

    /// The graph holding the device the action operates on: deletions
    /// refer to the current (LHS) instance, everything else to the
    /// desired (RHS) instance.
    fn side<'a>(&self, lhs: &'a Devicegraph, rhs: &'a Devicegraph) -> &'a Devicegraph {
        match self.category() {
            ActionCategory::Delete => lhs,
            ActionCategory::Create | ActionCategory::Modify => rhs,
        }
    }

    fn device<'a>(&self, lhs: &'a Devicegraph, rhs: &'a Devicegraph) -> Option<&'a Device> {
        let sid = self.device_sid()?;
        self.side(lhs, rhs).device(sid).ok()
    }

    /// Renders a one-line human readable description of the action.
    pub fn text(&self, lhs: &Devicegraph, rhs: &Devicegraph) -> String {
        let subject = match self.target {
            ActionTarget::Device(sid) => self
                .device(lhs, rhs)
                .map(|device| device.describe())
                .unwrap_or_else(|| sid.to_string()),
            ActionTarget::Holder(pair) => pair.to_string(),
        };

        let text = match &self.op {
            ActionOp::Create => format!("Create {}", subject),
            ActionOp::Format => format!("Format {}", subject),
            ActionOp::OpenEncryption => format!("Open {}", subject),
            ActionOp::SetLabel { label } => format!("Set label of {} to '{}'", subject, label),
            ActionOp::Mount { path } => format!("Mount {} at '{}'", self.filesystem_text(lhs, rhs), path),
            ActionOp::AddToFstab { path } => format!("Add mount point '{}' to /etc/fstab", path),
            ActionOp::Reallot { mode, partner } => {
                let partner_text = rhs
                    .device(*partner)
                    .or_else(|_| lhs.device(*partner))
                    .map(|device| device.describe())
                    .unwrap_or_else(|_| partner.to_string());

                match mode {
                    ReallotMode::Extend => format!("Add {} to {}", partner_text, subject),
                    ReallotMode::Reduce => format!("Remove {} from {}", partner_text, subject),
                }
            }
            ActionOp::Delete => format!("Delete {}", subject),
            ActionOp::Unmount { path } => {
                format!("Unmount {} at '{}'", self.filesystem_text(lhs, rhs), path)
            }
            ActionOp::RemoveFromFstab { path } => {
                format!("Remove mount point '{}' from /etc/fstab", path)
            }
        };

        if self.nop {
            format!("{} (nothing to do)", text)
        } else {
            text
        }
    }

    /// Description of the filesystem a mount point belongs to, falling
    /// back to the mount point itself when the parent is not available.
    fn filesystem_text(&self, lhs: &Devicegraph, rhs: &Devicegraph) -> String {
        let side = self.side(lhs, rhs);

        if let Some(sid) = self.device_sid() {
            if let Ok(parents) = side.parents(sid, crate::view::View::All) {
                for parent in parents {
                    if let Ok(device) = side.device(parent) {
                        if device.kind() == DeviceKind::Filesystem {
                            return device.describe();
                        }
                    }
                }
            }
        }

        self.device(lhs, rhs)
            .map(|device| device.describe())
            .unwrap_or_else(|| "unknown filesystem".to_string())
    }

    /// Features touched when committing this action.
    pub fn used_features(&self, lhs: &Devicegraph, rhs: &Devicegraph) -> UsedFeatures {
        let device_features = self
            .device(lhs, rhs)
            .map(|device| device.payload.used_features())
            .unwrap_or_default();

        let op_features = match &self.op {
            ActionOp::Mount { .. } | ActionOp::Unmount { .. } => UsedFeatures::MOUNT,
            ActionOp::AddToFstab { .. } | ActionOp::RemoveFromFstab { .. } => UsedFeatures::FSTAB,
            _ => UsedFeatures::empty(),
        };

        device_features | op_features
    }
}
