//! Simulator error domain.
//!
//! Every variant is fatal at the point of occurrence: the simulator is
//! internally consistent or it is broken. There is no local recovery; errors
//! propagate out of [`crate::network::Network::run`] and halt the run.

use crate::message::{NodeId, Tick};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Invalid network or flow construction (empty path, zero capacity,
    /// non-dividing transmission rate, duplicate endpoints, ...).
    #[error("construction: {0}")]
    Construction(String),

    /// A message reached a node that has no forwarding decision for it, or a
    /// node kind that cannot handle it.
    #[error("routing: no route at {node} for {from_node} -> {destination}")]
    NoRoute {
        node: NodeId,
        from_node: NodeId,
        destination: NodeId,
    },

    /// `transmit` was called while the link still carries a message.
    #[error("contention: link {from_node} -> {sink} busy until tick {until}")]
    LinkBusy {
        from_node: NodeId,
        sink: NodeId,
        until: Tick,
    },

    /// `transmit_to_node` was called for an output port that is not idle.
    #[error("contention: output port {sink} at {node} is not idle")]
    PortNotIdle { node: NodeId, sink: NodeId },

    /// A policy returned a matching that reuses an input or output port.
    #[error("scheduling violation at {switch}: {detail}")]
    SchedulingViolation { switch: NodeId, detail: String },

    /// A structural invariant was broken (pop from an empty VOQ, negative
    /// weight, reserved capacity driven below zero, ...).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
