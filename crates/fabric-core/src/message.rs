//! Node identities, simulated time, and messages.

use serde::Serialize;
use std::fmt;

/// Simulated time, counted in ticks from the start of the run.
pub type Tick = u64;

/// Stable identity of a node, assigned monotonically by the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Normally assigned by the network; exposed so harnesses and benches
    /// can synthesize port sets without building a full network.
    pub fn from_index(index: usize) -> Self {
        NodeId(index as u32)
    }

    /// Position of this node in the network's node arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// An immutable unit of traffic.
///
/// Carries no payload; the simulator only cares about where a message is
/// going and how old it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Message {
    pub source: NodeId,
    pub destination: NodeId,
    pub created_at: Tick,
}

impl Message {
    pub fn new(source: NodeId, destination: NodeId, created_at: Tick) -> Self {
        Message {
            source,
            destination,
            created_at,
        }
    }

    /// Ticks elapsed since creation.
    pub fn age(&self, now: Tick) -> Tick {
        now.saturating_sub(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId::from_index(7).to_string(), "n7");
    }

    #[test]
    fn message_age_saturates() {
        let m = Message::new(NodeId::from_index(0), NodeId::from_index(1), 10);
        assert_eq!(m.age(25), 15);
        assert_eq!(m.age(5), 0);
    }
}
