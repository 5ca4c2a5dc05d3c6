//! Traversal views.
//!
//! Some relationships (e.g. snapshot origins) may form cycles and must not
//! be visible to the acyclicity check or to ordinary traversals. Instead of
//! maintaining parallel graphs, every traversal takes a [`View`] and each
//! holder decides whether it is visible in that view.

use serde::{Deserialize, Serialize};

/// Filter determining which holders a traversal follows.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    /// The default view. Must be acyclic; snapshot relationships are
    /// invisible here.
    Classic,

    /// Everything, including relationships that may form cycles.
    All,

    /// The view used when computing what has to go together with a
    /// device. Includes snapshot relationships so snapshots are removed
    /// with their origin.
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::HolderKind;

    #[test]
    fn test_snapshot_visibility() {
        assert!(!HolderKind::Snapshot.is_in_view(View::Classic));
        assert!(HolderKind::Snapshot.is_in_view(View::All));
        assert!(HolderKind::Snapshot.is_in_view(View::Remove));

        assert!(HolderKind::Subdevice.is_in_view(View::Classic));
        assert!(HolderKind::User.is_in_view(View::Classic));
    }
}
