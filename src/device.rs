//! Devices.
//!
//! A device is one node of the devicegraph: a stable [`Sid`] plus a closed
//! payload enum. The payload catalog is deliberately compact; it carries
//! exactly the attributes the planning rules need (names for rename
//! detection, partition numbers for table serialization, mount paths for
//! nesting order) and nothing the commit layer would need on top.

use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;

use crate::{features::UsedFeatures, sid::Sid, view::View};

/// Partition table types.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, IntoStaticStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PtType {
    Gpt,
    Msdos,
    /// DASD partition tables live on s390 DASDs, which only accept one
    /// structural change at a time.
    Dasd,
}

impl PtType {
    /// Whether the underlying hardware serializes structural changes, so
    /// every action touching the table must be strictly ordered.
    pub fn requires_serialized_access(&self) -> bool {
        matches!(self, Self::Dasd)
    }
}

/// Filesystem types.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, IntoStaticStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FsType {
    Ext4,
    Btrfs,
    Xfs,
    Swap,
}

/// Kind discriminant for [`DevicePayload`].
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
#[cfg_attr(test, derive(strum_macros::EnumIter))]
pub enum DeviceKind {
    Disk,
    Dasd,
    PartitionTable,
    Partition,
    Encryption,
    LvmPv,
    LvmVg,
    LvmLv,
    Filesystem,
    MountPoint,
}

/// Payload of one device node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DevicePayload {
    /// A whole disk. Disks exist or they don't; the engine can neither
    /// create nor delete one.
    Disk { name: String },

    /// An s390 DASD. Like a disk, but its partition table serializes all
    /// structural changes.
    Dasd { name: String },

    /// A partition table on a disk or DASD.
    PartitionTable { pt_type: PtType },

    /// A partition of a partition table.
    Partition { name: String, number: u32 },

    /// A LUKS layer on top of a block device.
    Encryption { dm_name: String },

    /// An LVM physical volume on top of a block device.
    LvmPv,

    /// An LVM volume group. Its parents are its physical volumes.
    LvmVg { vg_name: String },

    /// An LVM logical volume inside a volume group.
    LvmLv { lv_name: String },

    /// A filesystem on a block device.
    Filesystem { fs_type: FsType, label: String },

    /// A mount point of a filesystem. Swap uses the pseudo path `"swap"`.
    MountPoint { path: String },
}

/// One node of the devicegraph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub sid: Sid,
    pub payload: DevicePayload,
}

impl Device {
    pub fn new(sid: Sid, payload: DevicePayload) -> Self {
        Self { sid, payload }
    }

    pub fn kind(&self) -> DeviceKind {
        self.payload.kind()
    }

    /// Returns a user friendly description of the device suitable for
    /// logging, e.g. `partition 'sda1' (sid:44)`.
    pub fn describe(&self) -> String {
        format!("{} ({})", self.payload.describe(), self.sid)
    }

    /// Whether the device is visible in the given view. Devices are
    /// currently visible everywhere; the per-node predicate exists so
    /// traversals have a single filtering seam for nodes and holders.
    pub fn is_in_view(&self, _view: View) -> bool {
        true
    }

    /// Whether a dedicated global pass orders the actions of this device,
    /// overriding the generic delete-before-create sibling rule.
    ///
    /// Partitions are ordered by their table's serialization pass, since
    /// the system call renumbers siblings.
    pub fn has_dependency_manager(&self) -> bool {
        matches!(self.payload, DevicePayload::Partition { .. })
    }
}

impl DevicePayload {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Disk { .. } => DeviceKind::Disk,
            Self::Dasd { .. } => DeviceKind::Dasd,
            Self::PartitionTable { .. } => DeviceKind::PartitionTable,
            Self::Partition { .. } => DeviceKind::Partition,
            Self::Encryption { .. } => DeviceKind::Encryption,
            Self::LvmPv => DeviceKind::LvmPv,
            Self::LvmVg { .. } => DeviceKind::LvmVg,
            Self::LvmLv { .. } => DeviceKind::LvmLv,
            Self::Filesystem { .. } => DeviceKind::Filesystem,
            Self::MountPoint { .. } => DeviceKind::MountPoint,
        }
    }

    /// Returns a user friendly description of the payload, e.g.
    /// `volume group 'system'`.
    pub fn describe(&self) -> String {
        match self {
            Self::Disk { name } => format!("disk '{}'", name),
            Self::Dasd { name } => format!("DASD '{}'", name),
            Self::PartitionTable { pt_type } => {
                format!("partition table '{}'", <&str>::from(pt_type))
            }
            Self::Partition { name, .. } => format!("partition '{}'", name),
            Self::Encryption { dm_name } => format!("encryption '{}'", dm_name),
            Self::LvmPv => "physical volume".to_string(),
            Self::LvmVg { vg_name } => format!("volume group '{}'", vg_name),
            Self::LvmLv { lv_name } => format!("logical volume '{}'", lv_name),
            Self::Filesystem { fs_type, .. } => format!("filesystem '{}'", <&str>::from(fs_type)),
            Self::MountPoint { path } => format!("mount point '{}'", path),
        }
    }

    /// Returns the name-like attribute used for rename detection, when the
    /// payload has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Disk { name } | Self::Dasd { name } | Self::Partition { name, .. } => Some(name),
            Self::Encryption { dm_name } => Some(dm_name),
            Self::LvmVg { vg_name } => Some(vg_name),
            Self::LvmLv { lv_name } => Some(lv_name),
            Self::PartitionTable { .. }
            | Self::LvmPv
            | Self::Filesystem { .. }
            | Self::MountPoint { .. } => None,
        }
    }

    /// Features touched when operating on this device.
    pub fn used_features(&self) -> UsedFeatures {
        match self {
            Self::Disk { .. } | Self::PartitionTable { .. } | Self::Partition { .. } => {
                UsedFeatures::empty()
            }
            Self::Dasd { .. } => UsedFeatures::DASD,
            Self::Encryption { .. } => UsedFeatures::LUKS,
            Self::LvmPv | Self::LvmVg { .. } | Self::LvmLv { .. } => UsedFeatures::LVM,
            Self::Filesystem { fs_type, .. } => match fs_type {
                FsType::Ext4 => UsedFeatures::EXT4,
                FsType::Btrfs => UsedFeatures::BTRFS,
                FsType::Xfs => UsedFeatures::XFS,
                FsType::Swap => UsedFeatures::SWAP,
            },
            Self::MountPoint { .. } => UsedFeatures::MOUNT,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_describe() {
        let device = Device::new(
            Sid(44),
            DevicePayload::Partition {
                name: "sda1".into(),
                number: 1,
            },
        );

        assert_eq!(device.describe(), "partition 'sda1' (sid:44)");
    }

    #[test]
    fn test_kind_names_are_kebab_case() {
        // Kind names appear in error messages; keep them lowercase.
        for kind in DeviceKind::iter() {
            let name: &str = kind.into();
            assert_eq!(name, name.to_lowercase());
        }
    }

    #[test]
    fn test_dependency_manager_flag() {
        let partition = Device::new(
            Sid(1),
            DevicePayload::Partition {
                name: "dasda1".into(),
                number: 1,
            },
        );
        let disk = Device::new(
            Sid(2),
            DevicePayload::Disk {
                name: "sda".into(),
            },
        );

        assert!(partition.has_dependency_manager());
        assert!(!disk.has_dependency_manager());
    }

    #[test]
    fn test_serialized_access() {
        assert!(PtType::Dasd.requires_serialized_access());
        assert!(!PtType::Gpt.requires_serialized_access());
        assert!(!PtType::Msdos.requires_serialized_access());
    }
}
