//! Head-of-line blocking demo: the same uniform fabric under FIFO and PIM.
//!
//! FIFO schedules only the head of each input queue, so a blocked head
//! stalls everything behind it; PIM matches over the full VOQ set. Run with
//! `cargo run --example head_of_line` and compare the mean ages.

use anyhow::Result;
use fabric_sim::report::run_scenario;
use fabric_sim::scenario::{Pattern, PolicyKind, ScenarioConfig};

fn main() -> Result<()> {
    let cfg = ScenarioConfig {
        seed: 7,
        frames: 20,
        ports: 16,
        link_rate: 1,
    };

    println!("policy        received   mean-age");
    for policy in [PolicyKind::Fifo, PolicyKind::Pim] {
        let report = run_scenario(&cfg, Pattern::Uniform, policy)?;
        println!(
            "{:<12} {:>9} {:>10.1}",
            report.policy, report.network.received, report.network.mean_age
        );
    }
    Ok(())
}
