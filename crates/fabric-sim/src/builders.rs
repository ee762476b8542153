//! Network constructors for the canonical traffic patterns.
//!
//! Both patterns wire N generators and N receivers through a single N-by-N
//! switch. Per-output load is provisioned at [`SAFE_CAPACITY`] messages per
//! frame; the patterns differ in how that budget is split across
//! generators.

use anyhow::{ensure, Result};
use fabric_core::consts::SAFE_CAPACITY;
use fabric_core::message::NodeId;
use fabric_core::network::{Flow, Network};

use crate::scenario::{Pattern, PolicyKind, ScenarioConfig};

/// A built single-switch fabric with handles to its nodes.
pub struct Fabric {
    pub network: Network,
    pub generators: Vec<NodeId>,
    pub switch: NodeId,
    pub receivers: Vec<NodeId>,
}

/// Uniform pattern: every generator-receiver pair gets
/// `SAFE_CAPACITY / ports` messages per frame.
pub fn uniform(cfg: &ScenarioConfig, policy: PolicyKind) -> Result<Fabric> {
    let capacity = SAFE_CAPACITY / cfg.ports as u64;
    ensure!(
        capacity > 0,
        "{} ports leave no per-flow capacity within {SAFE_CAPACITY}",
        cfg.ports
    );
    build(cfg, policy, |_generator| capacity)
}

/// Privileged pattern: generator `i` (1-indexed) gets `i * p` messages per
/// frame toward every receiver, with `p = 2 * SAFE_CAPACITY / (N * (N + 1))`
/// so each output port still sums to the safe capacity.
pub fn privileged(cfg: &ScenarioConfig, policy: PolicyKind) -> Result<Fabric> {
    let n = cfg.ports as u64;
    let smallest = 2 * SAFE_CAPACITY / (n * (n + 1));
    ensure!(
        smallest > 0,
        "{} ports leave no capacity for the lowest-privilege generator",
        cfg.ports
    );
    build(cfg, policy, |generator| {
        let i = generator as u64 + 1;
        2 * SAFE_CAPACITY * i / (n * (n + 1))
    })
}

fn build(
    cfg: &ScenarioConfig,
    policy: PolicyKind,
    capacity_of: impl Fn(usize) -> u64,
) -> Result<Fabric> {
    ensure!(cfg.ports > 0, "a fabric needs at least one port");
    let mut network = Network::new(cfg.seed);
    let scheduler = network.add_scheduler(policy.build());

    let generators: Vec<NodeId> = (0..cfg.ports).map(|_| network.add_generator()).collect();
    let switch = network.add_switch(scheduler)?;
    let receivers: Vec<NodeId> = (0..cfg.ports).map(|_| network.add_receiver()).collect();

    for &g in &generators {
        network.connect(g, switch, cfg.link_rate)?;
    }
    for &r in &receivers {
        network.connect(switch, r, cfg.link_rate)?;
    }
    for (i, &g) in generators.iter().enumerate() {
        for &r in &receivers {
            network.add_flow(Flow::new(vec![g, switch, r], capacity_of(i))?)?;
        }
    }

    Ok(Fabric {
        network,
        generators,
        switch,
        receivers,
    })
}

/// Builds the pattern named by `pattern`.
pub fn build_pattern(cfg: &ScenarioConfig, pattern: Pattern, policy: PolicyKind) -> Result<Fabric> {
    match pattern {
        Pattern::Uniform => uniform(cfg, policy),
        Pattern::Privileged => privileged(cfg, policy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cfg(ports: usize) -> ScenarioConfig {
        ScenarioConfig {
            seed: 1,
            frames: 1,
            ports,
            link_rate: 1,
        }
    }

    #[test]
    fn uniform_provisions_equal_reserved_capacity() {
        let fabric = uniform(&small_cfg(4), PolicyKind::Pim).unwrap();
        let table = fabric.network.decision_table(fabric.switch).unwrap();
        let expected = SAFE_CAPACITY / 4;
        for &g in &fabric.generators {
            for &r in &fabric.receivers {
                assert_eq!(table.reserved_capacity(g, r), expected);
            }
        }
    }

    #[test]
    fn privileged_scales_with_generator_index() {
        let fabric = privileged(&small_cfg(4), PolicyKind::Statistical).unwrap();
        let table = fabric.network.decision_table(fabric.switch).unwrap();
        let r = fabric.receivers[0];
        let caps: Vec<u64> = fabric
            .generators
            .iter()
            .map(|&g| table.reserved_capacity(g, r))
            .collect();
        for pair in caps.windows(2) {
            assert!(pair[0] < pair[1], "capacities must increase: {caps:?}");
        }
        // 1+2+3+4 shares of 2*SAFE/20 each.
        assert_eq!(caps[3], 4 * (2 * SAFE_CAPACITY) / 20);
    }

    #[test]
    fn too_many_ports_is_an_error() {
        assert!(uniform(&small_cfg(1000), PolicyKind::Fifo).is_err());
    }
}
