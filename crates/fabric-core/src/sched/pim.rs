//! Parallel-iterative matching.
//!
//! Per round, every live VOQ is a request from its input to its output;
//! each contended output grants one requester uniformly at random; each
//! granted input accepts one grant uniformly at random; matched ports are
//! invalidated. Any round over a non-empty edge set matches at least one
//! edge, so with unbounded rounds the loop reaches a maximal matching in at
//! most as many rounds as there are distinct inputs (empirically O(log N)
//! for a loaded N-by-N fabric).

use crate::decision::DecisionTable;
use crate::error::SimError;
use crate::message::{Message, NodeId, Tick};
use crate::sched::voq::VoqTable;
use crate::sched::{PortPair, Scheduler};
use crate::weighted::WeightedSet;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

/// Runs request/grant/accept rounds over `live` until `max_rounds` rounds
/// have run (0 = until the edge set is exhausted). Returns the matching and
/// the number of rounds used.
pub fn match_rounds(
    live: &BTreeSet<PortPair>,
    max_rounds: u32,
    rng: &mut impl Rng,
) -> (Vec<PortPair>, u32) {
    let mut live = live.clone();
    let mut matching = Vec::new();
    let mut rounds = 0;

    while !live.is_empty() && (max_rounds == 0 || rounds < max_rounds) {
        rounds += 1;

        // Request: every live VOQ asks for its output.
        let mut requests: BTreeMap<NodeId, WeightedSet<NodeId>> = BTreeMap::new();
        for pair in &live {
            let _ = requests.entry(pair.output).or_default().add(pair.input, 1.0);
        }

        // Grant: each output picks one requester uniformly.
        let mut grants: BTreeMap<NodeId, WeightedSet<NodeId>> = BTreeMap::new();
        for (output, inputs) in &requests {
            if let Some(input) = inputs.pick(rng) {
                let _ = grants.entry(input).or_default().add(*output, 1.0);
            }
        }

        // Accept: each granted input picks one output uniformly.
        let mut accepted = Vec::new();
        for (input, outputs) in &grants {
            if let Some(output) = outputs.pick(rng) {
                accepted.push(PortPair::new(*input, output));
            }
        }

        // Invalidate: matched ports cannot reappear in later rounds.
        for edge in &accepted {
            live.retain(|pair| pair.input != edge.input && pair.output != edge.output);
        }
        matching.extend(accepted);
    }

    (matching, rounds)
}

/// PIM policy over per-switch VOQ tables.
#[derive(Debug)]
pub struct ParallelScheduler {
    rounds: u32,
    tags: BTreeMap<NodeId, VoqTable>,
}

impl Default for ParallelScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ParallelScheduler {
    /// Default round budget ([`crate::consts::PIM_ROUNDS`]).
    pub fn new() -> Self {
        Self::with_rounds(crate::consts::PIM_ROUNDS)
    }

    /// `rounds == 0` runs every tick to a maximal matching.
    pub fn with_rounds(rounds: u32) -> Self {
        ParallelScheduler {
            rounds,
            tags: BTreeMap::new(),
        }
    }

    fn tag_mut(&mut self, switch: NodeId) -> Result<&mut VoqTable, SimError> {
        self.tags.get_mut(&switch).ok_or_else(|| {
            SimError::InvariantViolation(format!("switch {switch} not attached to PIM scheduler"))
        })
    }
}

impl Scheduler for ParallelScheduler {
    fn name(&self) -> &'static str {
        "pim"
    }

    fn attach(&mut self, switch: NodeId) {
        self.tags.entry(switch).or_default();
    }

    fn enqueue(
        &mut self,
        from: NodeId,
        switch: NodeId,
        message: Message,
        table: &DecisionTable,
    ) -> Result<(), SimError> {
        let hop = table.next_hop(switch, &message)?;
        self.tag_mut(switch)?.push(PortPair::new(from, hop), message);
        Ok(())
    }

    fn plan(
        &mut self,
        _now: Tick,
        switch: NodeId,
        idle: &BTreeSet<NodeId>,
        _table: &DecisionTable,
        rng: &mut StdRng,
    ) -> Result<Vec<PortPair>, SimError> {
        let live = self.tag_mut(switch)?.live_pairs(idle);
        let (matching, _) = match_rounds(&live, self.rounds, rng);
        Ok(matching)
    }

    fn take(&mut self, switch: NodeId, edge: PortPair) -> Result<Message, SimError> {
        self.tag_mut(switch)?.pop(edge)
    }

    fn pending(&self, switch: NodeId) -> usize {
        self.tags
            .get(&switch)
            .map(|tag| tag.total_len())
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
        StdRng::seed_from_u64(99)
    }

    /// Every (input, output) pair of an N-by-N fabric, inputs 0..n and
    /// outputs n..2n.
    fn full_fabric(ports: usize) -> BTreeSet<PortPair> {
        let mut live = BTreeSet::new();
        for input in 0..ports {
            for output in 0..ports {
                live.insert(PortPair::new(n(input), n(ports + output)));
            }
        }
        live
    }

    fn is_maximal(live: &BTreeSet<PortPair>, matching: &[PortPair]) -> bool {
        let ins: BTreeSet<NodeId> = matching.iter().map(|e| e.input).collect();
        let outs: BTreeSet<NodeId> = matching.iter().map(|e| e.output).collect();
        live.iter()
            .all(|pair| ins.contains(&pair.input) || outs.contains(&pair.output))
    }

    #[test]
    fn unbounded_rounds_reach_maximal_within_input_count() {
        let mut rng = seeded_rng();
        for ports in [2usize, 4, 8, 16] {
            let live = full_fabric(ports);
            let outputs: BTreeSet<NodeId> = live.iter().map(|p| p.output).collect();
            let (matching, rounds) = match_rounds(&live, 0, &mut rng);
            check_matching(n(0), &matching, &outputs).unwrap();
            assert!(is_maximal(&live, &matching), "ports={ports}");
            assert!(rounds <= ports as u32, "ports={ports}, rounds={rounds}");
            // A full fabric admits a perfect matching.
            assert_eq!(matching.len(), ports, "ports={ports}");
        }
    }

    #[test]
    fn bounded_rounds_stay_valid() {
        let mut rng = seeded_rng();
        let live = full_fabric(16);
        let outputs: BTreeSet<NodeId> = live.iter().map(|p| p.output).collect();
        let (matching, rounds) = match_rounds(&live, 2, &mut rng);
        assert!(rounds <= 2);
        check_matching(n(0), &matching, &outputs).unwrap();
        assert!(!matching.is_empty());
    }

    #[test]
    fn empty_edge_set_matches_nothing() {
        let mut rng = seeded_rng();
        let (matching, rounds) = match_rounds(&BTreeSet::new(), 0, &mut rng);
        assert!(matching.is_empty());
        assert_eq!(rounds, 0);
    }

    #[test]
    fn scheduler_plans_only_idle_outputs() {
        let mut sched = ParallelScheduler::new();
        sched.attach(n(0));
        let mut table = DecisionTable::new();
        table.put_decision(n(1), n(20), n(8));
        table.put_decision(n(2), n(21), n(9));

        let m1 = Message::new(n(1), n(20), 0);
        let m2 = Message::new(n(2), n(21), 0);
        sched.enqueue(n(1), n(0), m1, &table).unwrap();
        sched.enqueue(n(2), n(0), m2, &table).unwrap();

        // Only output n(9) is idle, so only the second VOQ may match.
        let idle: BTreeSet<NodeId> = [n(9)].into_iter().collect();
        let mut rng = seeded_rng();
        let plan = sched.plan(0, n(0), &idle, &table, &mut rng).unwrap();
        assert_eq!(plan, vec![PortPair::new(n(2), n(9))]);
        assert_eq!(sched.take(n(0), plan[0]).unwrap(), m2);
        assert_eq!(sched.pending(n(0)), 1);
    }
}
