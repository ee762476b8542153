//! FIFO baseline policy.
//!
//! Queues are keyed by arriving neighbor only; matching is strictly
//! head-of-line. One round: every non-empty input requests the output its
//! head message needs, and each idle output grants one requesting input
//! uniformly at random. An input whose head needs a busy output stays
//! blocked even when messages further back could move (that head-of-line
//! blocking is what the other policies exist to avoid).

use crate::decision::DecisionTable;
use crate::error::SimError;
use crate::message::{Message, NodeId, Tick};
use crate::sched::{PortPair, Scheduler};
use crate::weighted::WeightedSet;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Default)]
pub struct FifoScheduler {
    /// Per-switch, per-input FIFO queues. Emptied queues are removed.
    queues: BTreeMap<NodeId, BTreeMap<NodeId, VecDeque<Message>>>,
}

impl FifoScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn tag(&self, switch: NodeId) -> Result<&BTreeMap<NodeId, VecDeque<Message>>, SimError> {
        self.queues.get(&switch).ok_or_else(|| {
            SimError::InvariantViolation(format!("switch {switch} not attached to FIFO scheduler"))
        })
    }
}

impl Scheduler for FifoScheduler {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn attach(&mut self, switch: NodeId) {
        self.queues.entry(switch).or_default();
    }

    fn enqueue(
        &mut self,
        from: NodeId,
        switch: NodeId,
        message: Message,
        table: &DecisionTable,
    ) -> Result<(), SimError> {
        // Fail fast on misrouted traffic; the hop itself is recomputed from
        // the head message at planning time.
        table.next_hop(switch, &message)?;
        let Some(tag) = self.queues.get_mut(&switch) else {
            return Err(SimError::InvariantViolation(format!(
                "switch {switch} not attached to FIFO scheduler"
            )));
        };
        tag.entry(from).or_default().push_back(message);
        Ok(())
    }

    fn plan(
        &mut self,
        _now: Tick,
        switch: NodeId,
        idle: &BTreeSet<NodeId>,
        table: &DecisionTable,
        rng: &mut StdRng,
    ) -> Result<Vec<PortPair>, SimError> {
        // Partition head-of-line requests by output port.
        let mut requests: BTreeMap<NodeId, WeightedSet<NodeId>> = BTreeMap::new();
        for (input, queue) in self.tag(switch)? {
            let Some(head) = queue.front() else { continue };
            let output = table.next_hop(switch, head)?;
            if idle.contains(&output) {
                requests.entry(output).or_default().add(*input, 1.0)?;
            }
        }

        // One uniform grant per contended output. Each input appears in at
        // most one request, so the result is a matching by construction.
        let mut plan = Vec::with_capacity(requests.len());
        for (output, inputs) in &requests {
            if let Some(input) = inputs.pick(rng) {
                plan.push(PortPair::new(input, *output));
            }
        }
        Ok(plan)
    }

    fn take(&mut self, switch: NodeId, edge: PortPair) -> Result<Message, SimError> {
        let Some(tag) = self.queues.get_mut(&switch) else {
            return Err(SimError::InvariantViolation(format!(
                "switch {switch} not attached to FIFO scheduler"
            )));
        };
        let Some(queue) = tag.get_mut(&edge.input) else {
            return Err(SimError::InvariantViolation(format!(
                "no FIFO queue for input {} at {switch}",
                edge.input
            )));
        };
        let message = queue.pop_front().ok_or_else(|| {
            SimError::InvariantViolation(format!("empty FIFO queue for input {}", edge.input))
        })?;
        if queue.is_empty() {
            tag.remove(&edge.input);
        }
        Ok(message)
    }

    fn pending(&self, switch: NodeId) -> usize {
        self.queues
            .get(&switch)
            .map(|tag| tag.values().map(|q| q.len()).sum())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::check_matching;
    use rand::SeedableRng;

    fn n(i: usize) -> NodeId {
        NodeId::from_index(i)
    }

    fn seeded_rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    /// Switch n(0); inputs n(1), n(2); outputs n(8), n(9). Routes are keyed
    /// by (generator, receiver) = (input, destination) for simplicity.
    fn table() -> DecisionTable {
        let mut table = DecisionTable::new();
        table.put_decision(n(1), n(18), n(8));
        table.put_decision(n(1), n(19), n(9));
        table.put_decision(n(2), n(18), n(8));
        table.put_decision(n(2), n(19), n(9));
        table
    }

    fn msg(source: usize, dest: usize, tick: Tick) -> Message {
        Message::new(n(source), n(dest), tick)
    }

    #[test]
    fn grants_one_input_per_output() {
        let mut sched = FifoScheduler::new();
        sched.attach(n(0));
        let table = table();
        // Both inputs contend for output n(8).
        sched.enqueue(n(1), n(0), msg(1, 18, 0), &table).unwrap();
        sched.enqueue(n(2), n(0), msg(2, 18, 1), &table).unwrap();

        let idle: BTreeSet<NodeId> = [n(8), n(9)].into_iter().collect();
        let mut rng = seeded_rng();
        let plan = sched.plan(0, n(0), &idle, &table, &mut rng).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].output, n(8));
        check_matching(n(0), &plan, &idle).unwrap();
    }

    #[test]
    fn head_of_line_blocks_behind_busy_output() {
        let mut sched = FifoScheduler::new();
        sched.attach(n(0));
        let table = table();
        // Head needs n(8) (busy); the next message could use idle n(9) but
        // FIFO never looks past the head.
        sched.enqueue(n(1), n(0), msg(1, 18, 0), &table).unwrap();
        sched.enqueue(n(1), n(0), msg(1, 19, 1), &table).unwrap();

        let idle: BTreeSet<NodeId> = [n(9)].into_iter().collect();
        let mut rng = seeded_rng();
        let plan = sched.plan(0, n(0), &idle, &table, &mut rng).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn take_preserves_fifo_order_and_drops_empty_queues() {
        let mut sched = FifoScheduler::new();
        sched.attach(n(0));
        let table = table();
        sched.enqueue(n(1), n(0), msg(1, 18, 0), &table).unwrap();
        sched.enqueue(n(1), n(0), msg(1, 18, 5), &table).unwrap();

        let edge = PortPair::new(n(1), n(8));
        assert_eq!(sched.take(n(0), edge).unwrap().created_at, 0);
        assert_eq!(sched.take(n(0), edge).unwrap().created_at, 5);
        assert_eq!(sched.pending(n(0)), 0);
        assert!(sched.take(n(0), edge).is_err());
    }

    #[test]
    fn enqueue_without_route_is_fatal() {
        let mut sched = FifoScheduler::new();
        sched.attach(n(0));
        let table = table();
        let err = sched
            .enqueue(n(3), n(0), msg(3, 99, 0), &table)
            .unwrap_err();
        assert!(matches!(err, SimError::NoRoute { .. }));
    }
}
