//! Experiment reports.

use anyhow::Result;
use fabric_core::stats::NetworkReport;
use serde::Serialize;
use tracing::info;

use crate::builders;
use crate::scenario::{Pattern, PolicyKind, ScenarioConfig};

/// One policy run over one traffic pattern, ready for JSON emission.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub policy: &'static str,
    pub pattern: &'static str,
    pub ports: usize,
    pub frames: u64,
    pub seed: u64,
    pub network: NetworkReport,
}

impl ScenarioReport {
    /// Mean message age observed across all receivers.
    pub fn mean_age(&self) -> f64 {
        self.network.mean_age
    }
}

/// Builds the pattern, runs it for the configured frame count, and collects
/// the report.
pub fn run_scenario(
    cfg: &ScenarioConfig,
    pattern: Pattern,
    policy: PolicyKind,
) -> Result<ScenarioReport> {
    let mut fabric = builders::build_pattern(cfg, pattern, policy)?;
    fabric.network.run(cfg.frames)?;
    let network = NetworkReport::collect(&fabric.network);
    info!(
        policy = policy.name(),
        pattern = pattern.name(),
        generated = network.generated,
        received = network.received,
        mean_age = network.mean_age,
        "scenario finished"
    );
    Ok(ScenarioReport {
        policy: policy.name(),
        pattern: pattern.name(),
        ports: cfg.ports,
        frames: cfg.frames,
        seed: cfg.seed,
        network,
    })
}
