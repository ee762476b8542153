//! Per-node substrate: registered links, idle output ports, and the arrival
//! and completion queues that model in-flight transmissions.
//!
//! The four-phase tick order (idle refresh, arrival drain, update hook,
//! send) is driven by the network; this module owns the data structures and
//! their ordering guarantees. Arrivals are delivered in non-decreasing
//! completion-tick order, ties broken by insertion order.

use crate::link::LinkId;
use crate::message::{Message, NodeId, Tick};
use crate::network::FlowId;
use crate::sched::SchedulerId;
use crate::stats::ReceiverStats;
use crate::weighted::WeightedSet;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};

/// An in-flight incoming message, visible to the node once the current tick
/// reaches `ready_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ArrivalEntry {
    ready_at: Tick,
    seq: u64,
    from: NodeId,
    message: Message,
}

/// An in-flight outbound transmission; the output port toward `sink` becomes
/// idle again once the current tick reaches `ready_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct CompletionEntry {
    ready_at: Tick,
    sink: NodeId,
}

/// Link registrations, port state, and in-flight queues shared by all node
/// kinds.
#[derive(Debug, Default)]
pub struct NodeCore {
    /// Input links keyed by upstream neighbor.
    pub(crate) inputs: BTreeMap<NodeId, LinkId>,
    /// Output links keyed by downstream neighbor.
    pub(crate) outputs: BTreeMap<NodeId, LinkId>,
    /// Output ports currently able to begin a transmission.
    pub(crate) idle: BTreeSet<NodeId>,
    arrivals: BinaryHeap<Reverse<ArrivalEntry>>,
    completions: BinaryHeap<Reverse<CompletionEntry>>,
    /// Insertion counter giving arrivals a stable tie-break.
    arrival_seq: u64,
}

impl NodeCore {
    /// Phase 1: re-flag output ports whose transmissions have completed.
    pub(crate) fn refresh_idle(&mut self, now: Tick) {
        while let Some(&Reverse(entry)) = self.completions.peek() {
            if entry.ready_at > now {
                break;
            }
            self.completions.pop();
            self.idle.insert(entry.sink);
        }
    }

    /// Phase 2: pop every arrival whose transmission deadline has elapsed,
    /// in (completion tick, insertion) order.
    pub(crate) fn drain_arrivals(&mut self, now: Tick) -> Vec<(NodeId, Message)> {
        let mut ready = Vec::new();
        while let Some(&Reverse(entry)) = self.arrivals.peek() {
            if entry.ready_at > now {
                break;
            }
            self.arrivals.pop();
            ready.push((entry.from, entry.message));
        }
        ready
    }

    /// Queues an incoming message that becomes visible at `ready_at`.
    pub(crate) fn post_arrival(&mut self, ready_at: Tick, from: NodeId, message: Message) {
        let seq = self.arrival_seq;
        self.arrival_seq += 1;
        self.arrivals.push(Reverse(ArrivalEntry {
            ready_at,
            seq,
            from,
            message,
        }));
    }

    /// Records an outbound transmission toward `sink` completing at
    /// `ready_at`.
    pub(crate) fn post_completion(&mut self, ready_at: Tick, sink: NodeId) {
        self.completions.push(Reverse(CompletionEntry { ready_at, sink }));
    }

    /// Messages still queued as undelivered arrivals.
    pub(crate) fn arrivals_in_flight(&self) -> usize {
        self.arrivals.len()
    }

    pub fn is_idle(&self, sink: &NodeId) -> bool {
        self.idle.contains(sink)
    }
}

/// What a node does with the traffic that reaches it.
#[derive(Debug)]
pub enum NodeKind {
    Generator(GeneratorState),
    Switch { scheduler: SchedulerId },
    Receiver(ReceiverStats),
}

/// Traffic source state for a generator node.
///
/// Emitted messages pass through a FIFO outbox so a burst wider than the
/// output link rate drains one message per tick, preserving order.
#[derive(Debug, Default)]
pub struct GeneratorState {
    /// Flows originating here.
    pub(crate) flows: Vec<FlowId>,
    /// Remaining per-flow message counts for the current frame.
    pub(crate) bucket: WeightedSet<FlowId>,
    /// Emitted but not yet transmitted messages, with their first hop.
    pub(crate) outbox: VecDeque<(NodeId, Message)>,
    /// Fixed (tick, flow) emissions; when set, the probabilistic frame
    /// bucket is disabled.
    pub(crate) script: Option<Vec<(Tick, FlowId)>>,
    pub(crate) script_pos: usize,
}
