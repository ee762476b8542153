//! Scenario configuration and policy selection.

use anyhow::{Context, Result};
use fabric_core::sched::fifo::FifoScheduler;
use fabric_core::sched::pim::ParallelScheduler;
use fabric_core::sched::statistical::StatisticalScheduler;
use fabric_core::sched::Scheduler;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which matching policy a scenario runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Fifo,
    Pim,
    Statistical,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [PolicyKind::Fifo, PolicyKind::Pim, PolicyKind::Statistical];

    pub fn build(self) -> Box<dyn Scheduler> {
        match self {
            PolicyKind::Fifo => Box::new(FifoScheduler::new()),
            PolicyKind::Pim => Box::new(ParallelScheduler::new()),
            PolicyKind::Statistical => Box::new(StatisticalScheduler::new()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Fifo => "fifo",
            PolicyKind::Pim => "pim",
            PolicyKind::Statistical => "statistical",
        }
    }
}

/// Which traffic pattern a scenario uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    /// Every generator carries the same capacity to every receiver.
    Uniform,
    /// Generator `i` (1-indexed) carries `i` shares of the safe capacity.
    Privileged,
}

impl Pattern {
    pub fn name(self) -> &'static str {
        match self {
            Pattern::Uniform => "uniform",
            Pattern::Privileged => "privileged",
        }
    }
}

/// Knobs for one experiment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub seed: u64,
    pub frames: u64,
    pub ports: usize,
    pub link_rate: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            seed: 42,
            frames: 250,
            ports: 16,
            link_rate: 1,
        }
    }
}

impl ScenarioConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing scenario config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_with_partial_fields() {
        let cfg: ScenarioConfig = toml::from_str("ports = 8\nframes = 10\n").unwrap();
        assert_eq!(cfg.ports, 8);
        assert_eq!(cfg.frames, 10);
        // Unset fields fall back to defaults.
        assert_eq!(cfg.link_rate, 1);
    }

    #[test]
    fn policy_names_are_stable() {
        for policy in PolicyKind::ALL {
            assert_eq!(policy.build().name(), policy.name());
        }
    }
}
