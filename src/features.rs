//! Storage feature reporting.
//!
//! Every action reports the features (subsystems, filesystem types) its
//! execution would touch. Callers use the union over the whole plan to
//! decide which tooling has to be present before committing.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Bitmask of storage features used by an action or a whole plan.
    #[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UsedFeatures: u32 {
        const LVM = 1;
        const LUKS = 1 << 1;
        const EXT4 = 1 << 2;
        const BTRFS = 1 << 3;
        const XFS = 1 << 4;
        const SWAP = 1 << 5;
        const DASD = 1 << 6;
        const MOUNT = 1 << 7;
        const FSTAB = 1 << 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union() {
        let features = UsedFeatures::LVM | UsedFeatures::EXT4;

        assert!(features.contains(UsedFeatures::LVM));
        assert!(!features.contains(UsedFeatures::LUKS));
    }
}
