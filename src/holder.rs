//! Holders.
//!
//! A holder is one directed edge of the devicegraph: the relationship
//! between a parent device and a child device. Holders carry no identity
//! of their own; they are addressed by the ordered pair of sids they
//! connect plus their kind. Between one ordered pair, at most one holder
//! of each kind may exist.

use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;

use crate::view::View;

/// Kinds of relationship between devices.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HolderKind {
    /// The child is carved out of or stacked directly on the parent,
    /// e.g. disk to partition table, partition to filesystem.
    Subdevice,

    /// The child uses the parent without subdividing it, e.g. physical
    /// volume to volume group.
    User,

    /// The child is a snapshot of the parent. Snapshot back-references may
    /// form cycles and are invisible in the classic view.
    Snapshot,
}

impl HolderKind {
    /// Whether a holder of this kind is followed by traversals in the
    /// given view.
    pub fn is_in_view(&self, view: View) -> bool {
        match self {
            Self::Subdevice | Self::User => true,
            Self::Snapshot => match view {
                View::Classic => false,
                View::All | View::Remove => true,
            },
        }
    }
}

/// One edge of the devicegraph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Holder {
    pub kind: HolderKind,
}

impl Holder {
    pub fn new(kind: HolderKind) -> Self {
        Self { kind }
    }

    pub fn is_in_view(&self, view: View) -> bool {
        self.kind.is_in_view(view)
    }
}
