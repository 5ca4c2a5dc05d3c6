//! Storage identities.
//!
//! Every device carries a `Sid` that stays stable across snapshots of the
//! devicegraph, so the same logical entity can be tracked between the
//! "current" and "desired" graphs of a planning session. Holders have no
//! identity of their own; they are addressed by the ordered pair of the
//! sids they connect.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Stable identity of a device, unique across all graphs created from the
/// same [`SidGenerator`].
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Sid(pub u64);

impl Display for Sid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sid:{}", self.0)
    }
}

/// Ordered pair of sids addressing a holder.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SidPair {
    pub source: Sid,
    pub target: Sid,
}

impl SidPair {
    pub fn new(source: Sid, target: Sid) -> Self {
        Self { source, target }
    }
}

impl Display for SidPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sid-pair:{}->{}", self.source.0, self.target.0)
    }
}

/// Allocator for sids.
///
/// Owned by the caller and shared between the graphs of one planning
/// session, instead of living in a hidden process-global. Tests create a
/// fresh generator per scenario so sids are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidGenerator {
    next: u64,
}

impl SidGenerator {
    /// The first sid handed out. Starting above zero keeps accidental
    /// zero-initialized sids distinguishable in logs.
    const FIRST_SID: u64 = 42;

    pub fn new() -> Self {
        Self {
            next: Self::FIRST_SID,
        }
    }

    /// Allocates the next sid.
    pub fn next_sid(&mut self) -> Sid {
        let sid = Sid(self.next);
        self.next += 1;
        sid
    }
}

impl Default for SidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_monotonic() {
        let mut generator = SidGenerator::new();

        let a = generator.next_sid();
        let b = generator.next_sid();
        let c = generator.next_sid();

        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_display() {
        assert_eq!(Sid(7).to_string(), "sid:7");
        assert_eq!(SidPair::new(Sid(1), Sid(2)).to_string(), "sid-pair:1->2");
    }
}
