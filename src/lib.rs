//! Storage planning on devicegraphs.
//!
//! A [`devicegraph::Devicegraph`] models the storage stack of a system as
//! a DAG of devices (disks, partitions, volume groups, filesystems, mount
//! points) connected by holders. Planning a change means building two
//! graphs, the probed current state and the desired target state, and
//! handing both to [`actiongraph::Actiongraph::plan`], which diffs them
//! into a dependency-ordered list of commit actions.
//!
//! Devices keep their identity across graphs through sids allocated by a
//! shared [`sid::SidGenerator`].

pub mod actiongraph;
pub mod device;
pub mod devicegraph;
pub mod display;
pub mod error;
pub mod features;
pub mod holder;
pub mod sid;
pub mod view;

pub use actiongraph::Actiongraph;
pub use devicegraph::Devicegraph;
pub use sid::{Sid, SidGenerator, SidPair};
pub use view::View;
