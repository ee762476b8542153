//! Scenario layer for the fabric simulator.
//!
//! Provides the canonical traffic patterns (uniform and privileged), a
//! TOML-loadable scenario configuration, and serializable reports for
//! experiment output. The `fabric_sweep` binary wires the three matching
//! policies against these patterns.

pub mod builders;
pub mod report;
pub mod scenario;
