//! Per-switch forwarding decisions.
//!
//! Two tables per switch: the next-hop table, keyed by a message's
//! `(source, destination)` pair, and the reserved capacities, keyed by
//! `(input port, output port)`. Reserved capacity is the sum of the
//! required capacities of all flows routed through that port pair and is
//! the weighting used by statistical matching.

use crate::error::SimError;
use crate::message::{Message, NodeId};
use crate::weighted::WeightedSet;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionTable {
    next_hops: BTreeMap<(NodeId, NodeId), NodeId>,
    /// Reserved capacity per output port: input -> integral weight.
    /// The weighted sets double as the sampling structure for
    /// [`DecisionTable::pick_input`]; zero entries are deleted, and an
    /// output whose last input disappears is removed outright.
    reserved: BTreeMap<NodeId, WeightedSet<NodeId>>,
}

impl DecisionTable {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Next hops ──────────────────────────────────────────────────────

    pub fn put_decision(&mut self, source: NodeId, destination: NodeId, hop: NodeId) {
        self.next_hops.insert((source, destination), hop);
    }

    pub fn remove_decision(&mut self, source: NodeId, destination: NodeId) -> Option<NodeId> {
        self.next_hops.remove(&(source, destination))
    }

    /// The next node to forward `message` to from `switch`. An undefined
    /// lookup is a routing misconfiguration and always fatal.
    pub fn next_hop(&self, switch: NodeId, message: &Message) -> Result<NodeId, SimError> {
        self.next_hops
            .get(&(message.source, message.destination))
            .copied()
            .ok_or(SimError::NoRoute {
                node: switch,
                from_node: message.source,
                destination: message.destination,
            })
    }

    // ─── Reserved capacity ──────────────────────────────────────────────

    /// Shifts the reserved capacity of `(input, output)` by `delta`.
    /// Reaching zero deletes the entry; going below zero is an invariant
    /// violation.
    pub fn translate_reserved(
        &mut self,
        input: NodeId,
        output: NodeId,
        delta: i64,
    ) -> Result<(), SimError> {
        let current = self.reserved_capacity(input, output) as i64;
        let next = current + delta;
        if next < 0 {
            return Err(SimError::InvariantViolation(format!(
                "reserved capacity for ({input}, {output}) driven to {next}"
            )));
        }
        self.set_reserved(input, output, next as u64)
    }

    /// Sets the reserved capacity of `(input, output)`. Zero removes the
    /// entry (and the output's set, if emptied).
    pub fn set_reserved(&mut self, input: NodeId, output: NodeId, n: u64) -> Result<(), SimError> {
        if n == 0 {
            if let Some(inputs) = self.reserved.get_mut(&output) {
                inputs.remove(&input);
                if inputs.is_empty() {
                    self.reserved.remove(&output);
                }
            }
            return Ok(());
        }
        let inputs = self.reserved.entry(output).or_default();
        inputs.remove(&input);
        inputs.add(input, n as f64)
    }

    pub fn reserved_capacity(&self, input: NodeId, output: NodeId) -> u64 {
        self.reserved
            .get(&output)
            .map(|inputs| inputs.weight(&input).round() as u64)
            .unwrap_or(0)
    }

    /// True when no decisions and no reserved capacity remain.
    pub fn is_empty(&self) -> bool {
        self.next_hops.is_empty() && self.reserved.is_empty()
    }

    // ─── Weighted input selection (statistical matching) ────────────────

    /// Picks an input terminal for `output` with probability proportional to
    /// reserved capacity, or `None` if no flow uses `output`.
    pub fn pick_input(&self, output: NodeId, rng: &mut impl Rng) -> Option<NodeId> {
        self.reserved.get(&output)?.pick(rng)
    }

    /// Same draw, but restricted to the supplied candidate inputs (those
    /// with messages currently waiting). `None` when the intersection is
    /// empty.
    pub fn pick_input_among(
        &self,
        output: NodeId,
        rng: &mut impl Rng,
        candidates: &BTreeSet<NodeId>,
    ) -> Option<NodeId> {
        self.reserved
            .get(&output)?
            .pick_where(rng, |input| candidates.contains(input))
    }
}
