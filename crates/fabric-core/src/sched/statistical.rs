//! Statistical matching.
//!
//! Grants are weighted by the reserved capacity of each (input, output)
//! pair, so flows with higher provisioned throughput are matched
//! preferentially and the stationary matching tracks the capacity
//! allocation. Statistical grants can collide or come up empty, so a short
//! PIM pass sweeps the residual edges afterwards.

use crate::decision::DecisionTable;
use crate::error::SimError;
use crate::message::{Message, NodeId, Tick};
use crate::sched::voq::VoqTable;
use crate::sched::{pim, PortPair, Scheduler};
use crate::weighted::WeightedSet;
use rand::rngs::StdRng;
use rand::{Rng, RngExt};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
pub struct StatisticalScheduler {
    rounds: u32,
    cleanup_rounds: u32,
    tags: BTreeMap<NodeId, VoqTable>,
}

impl Default for StatisticalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticalScheduler {
    /// Default round counts ([`crate::consts::STAT_ROUNDS`] statistical,
    /// [`crate::consts::STAT_PIM_ROUNDS`] cleanup).
    pub fn new() -> Self {
        Self::with_rounds(crate::consts::STAT_ROUNDS, crate::consts::STAT_PIM_ROUNDS)
    }

    pub fn with_rounds(rounds: u32, cleanup_rounds: u32) -> Self {
        StatisticalScheduler {
            rounds,
            cleanup_rounds,
            tags: BTreeMap::new(),
        }
    }

    fn tag_mut(&mut self, switch: NodeId) -> Result<&mut VoqTable, SimError> {
        self.tags.get_mut(&switch).ok_or_else(|| {
            SimError::InvariantViolation(format!(
                "switch {switch} not attached to statistical scheduler"
            ))
        })
    }
}

/// One statistical round over `live`, mutating `live` and `idle_outputs` to
/// drop invalidated ports. Returns the accepted edges.
fn statistical_round(
    live: &mut BTreeSet<PortPair>,
    idle_outputs: &mut BTreeSet<NodeId>,
    table: &DecisionTable,
    rng: &mut impl Rng,
) -> Result<Vec<PortPair>, SimError> {
    // Grant: each idle output with pending traffic draws one input weighted
    // by reserved capacity, then attaches a secondary uniform weight
    // m in {0, ..., X} to the grant.
    let mut grants: BTreeMap<NodeId, WeightedSet<NodeId>> = BTreeMap::new();
    for output in idle_outputs.iter() {
        let candidates: BTreeSet<NodeId> = live
            .iter()
            .filter(|pair| pair.output == *output)
            .map(|pair| pair.input)
            .collect();
        if candidates.is_empty() {
            continue;
        }
        let Some(input) = table.pick_input_among(*output, rng, &candidates) else {
            continue;
        };
        let x = table.reserved_capacity(input, *output);
        let m = rng.random_range(0..=x);
        grants.entry(input).or_default().add(*output, m as f64)?;
    }

    // Accept: each granted input picks one output weighted by m. A grant
    // set whose weights are all zero is skipped.
    let mut accepted = Vec::new();
    for (input, outputs) in &grants {
        let Some(output) = outputs.pick(rng) else {
            continue;
        };
        accepted.push(PortPair::new(*input, output));
    }

    for edge in &accepted {
        live.retain(|pair| pair.input != edge.input && pair.output != edge.output);
        idle_outputs.remove(&edge.output);
    }
    Ok(accepted)
}

impl Scheduler for StatisticalScheduler {
    fn name(&self) -> &'static str {
        "statistical"
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
        table: &DecisionTable,
        rng: &mut StdRng,
    ) -> Result<Vec<PortPair>, SimError> {
        let mut live = self.tag_mut(switch)?.live_pairs(idle);
        let mut idle_outputs = idle.clone();
        let mut matching = Vec::new();

        for _ in 0..self.rounds {
            let accepted = statistical_round(&mut live, &mut idle_outputs, table, rng)?;
            matching.extend(accepted);
        }

        // Residual edges get a PIM sweep so collisions do not waste slots.
        let (cleanup, _) = pim::match_rounds(&live, self.cleanup_rounds, rng);
        matching.extend(cleanup);
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
