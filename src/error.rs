//! Error types.
//!
//! Two kinds of failure are kept apart:
//!
//! - [`DevicegraphError`]: structural problems in a devicegraph (missing
//!   devices, duplicate holders, broken index, a cycle in the classic
//!   view). These indicate a caller bug; there is no recovery beyond
//!   fixing the graph.
//! - [`PlanError`]: the diff engine was asked for a transformation it does
//!   not support, or synthesized a contradictory ordering. The caller can
//!   recover by not requesting that transformation.

use serde::{Deserialize, Serialize};

use crate::{
    device::DeviceKind,
    holder::HolderKind,
    sid::{Sid, SidPair},
};

#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DevicegraphError {
    #[error("device {0} not found")]
    DeviceNotFound(Sid),

    #[error("holder {0} not found")]
    HolderNotFound(SidPair),

    #[error("holder {pair} is ambiguous: {count} holders exist between the pair")]
    AmbiguousHolder { pair: SidPair, count: usize },

    #[error("device {0} already exists in the graph")]
    DuplicateSid(Sid),

    #[error("holder {pair} of kind '{kind}' already exists")]
    HolderAlreadyExists { pair: SidPair, kind: HolderKind },

    #[error("sid index is broken: {0} maps to a vacant or mismatched graph position")]
    BrokenSidIndex(Sid),

    #[error("device at a graph position is missing from the sid index")]
    UnindexedDevice,

    #[error("classic view of the devicegraph contains a cycle")]
    CycleInClassicView,
}

#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PlanError {
    #[error(transparent)]
    Devicegraph(#[from] DevicegraphError),

    #[error("cannot create a device of kind '{kind}' ({sid})")]
    CannotCreate { sid: Sid, kind: DeviceKind },

    #[error("cannot delete a device of kind '{kind}' ({sid})")]
    CannotDelete { sid: Sid, kind: DeviceKind },

    #[error("cannot rename device of kind '{kind}' ({sid}) from '{from}' to '{to}'")]
    CannotRename {
        sid: Sid,
        kind: DeviceKind,
        from: String,
        to: String,
    },

    #[error("cannot renumber partition {sid} from {from} to {to}")]
    CannotRenumberPartition { sid: Sid, from: u32, to: u32 },

    #[error("cannot change device {sid} from kind '{from}' to kind '{to}'")]
    CannotChangeKind {
        sid: Sid,
        from: DeviceKind,
        to: DeviceKind,
    },

    #[error("cannot change partition table {sid} from '{from}' to '{to}'")]
    CannotChangePartitionTableType {
        sid: Sid,
        from: String,
        to: String,
    },

    #[error("cannot change filesystem {sid} from '{from}' to '{to}'")]
    CannotChangeFilesystemType {
        sid: Sid,
        from: String,
        to: String,
    },

    #[error("cannot move mount point {sid} from '{from}' to '{to}'")]
    CannotMoveMountPoint {
        sid: Sid,
        from: String,
        to: String,
    },

    #[error("created device {child} has parent {parent} without a create action")]
    MissingParentCreateAction { child: Sid, parent: Sid },

    #[error("action graph is not a DAG: {unordered} of {total} actions could not be ordered")]
    NotADag { unordered: usize, total: usize },
}
