//! Switch scheduling.
//!
//! A switch defers its per-tick forwarding decision to a scheduler, a policy
//! object shared by every switch registered with it. The scheduler owns the
//! per-switch queue state (the "tag"); switches carry only their identity.
//! Three policies are provided:
//! - [`fifo::FifoScheduler`] - head-of-line, one uniform grant round
//! - [`pim::ParallelScheduler`] - iterative request/grant/accept rounds
//! - [`statistical::StatisticalScheduler`] - reserved-capacity-weighted
//!   grants with PIM cleanup

pub mod fifo;
pub mod pim;
pub mod statistical;
pub mod voq;

use crate::decision::DecisionTable;
use crate::error::SimError;
use crate::message::{Message, NodeId, Tick};
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Index of a scheduler instance in the network's scheduler arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchedulerId(pub(crate) usize);

/// One edge of a crossbar matching: the upstream neighbor a message arrived
/// from, and the output port it will leave on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PortPair {
    pub input: NodeId,
    pub output: NodeId,
}

impl PortPair {
    pub fn new(input: NodeId, output: NodeId) -> Self {
        PortPair { input, output }
    }
}

impl fmt::Display for PortPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} -> {})", self.input, self.output)
    }
}

/// The capability interface a switch needs from its scheduler.
///
/// `plan` proposes a matching; the network then calls `take` for each edge
/// and transmits the dequeued message. Policies must draw randomness only
/// from the injected RNG so that a seeded run is reproducible.
pub trait Scheduler {
    fn name(&self) -> &'static str;

    /// Registers a switch, creating its tag state.
    fn attach(&mut self, switch: NodeId);

    /// Stores a message that arrived at `switch` from neighbor `from`.
    fn enqueue(
        &mut self,
        from: NodeId,
        switch: NodeId,
        message: Message,
        table: &DecisionTable,
    ) -> Result<(), SimError>;

    /// Computes the set of edges to schedule this tick. Every returned
    /// output must be in `idle`, and inputs and outputs must be pairwise
    /// distinct. The network verifies all three conditions against the
    /// idle set it passed in and treats any breach as fatal.
    fn plan(
        &mut self,
        now: Tick,
        switch: NodeId,
        idle: &BTreeSet<NodeId>,
        table: &DecisionTable,
        rng: &mut StdRng,
    ) -> Result<Vec<PortPair>, SimError>;

    /// Dequeues the head message behind a planned edge.
    fn take(&mut self, switch: NodeId, edge: PortPair) -> Result<Message, SimError>;

    /// Messages currently queued at `switch`.
    fn pending(&self, switch: NodeId) -> usize;
}

/// Rejects matchings that reuse an input or output port, or that schedule
/// an output which was not idle when the send phase began.
pub(crate) fn check_matching(
    switch: NodeId,
    plan: &[PortPair],
    idle: &BTreeSet<NodeId>,
) -> Result<(), SimError> {
    let mut inputs = BTreeSet::new();
    let mut outputs = BTreeSet::new();
    for edge in plan {
        if !idle.contains(&edge.output) {
            return Err(SimError::SchedulingViolation {
                switch,
                detail: format!("output port {} was not idle", edge.output),
            });
        }
        if !inputs.insert(edge.input) {
            return Err(SimError::SchedulingViolation {
                switch,
                detail: format!("input port {} matched twice", edge.input),
            });
        }
        if !outputs.insert(edge.output) {
            return Err(SimError::SchedulingViolation {
                switch,
                detail: format!("output port {} matched twice", edge.output),
            });
        }
    }
    Ok(())
}
