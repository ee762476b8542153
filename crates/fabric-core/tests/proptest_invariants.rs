//! Property-based tests for the weighted multiset and the matching
//! invariants of parallel-iterative matching.

use fabric_core::message::NodeId;
use fabric_core::sched::pim::match_rounds;
use fabric_core::sched::PortPair;
use fabric_core::weighted::WeightedSet;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;

// ─── Weighted Multiset ───────────────────────────────────────────────────────

/// A sequence of add operations over a small key space.
fn add_ops() -> impl Strategy<Value = Vec<(u8, f64)>> {
    prop::collection::vec((0u8..16, 0.0f64..100.0), 1..64)
}

proptest! {
    #[test]
    fn total_equals_sum_of_weights(ops in add_ops()) {
        let mut set = WeightedSet::new();
        let mut expected = 0.0f64;
        for (key, weight) in ops {
            set.add(key, weight).unwrap();
            expected += weight;
        }
        prop_assert!((set.total() - expected).abs() < 1e-6);
    }

    #[test]
    fn add_then_remove_is_a_no_op_on_total(ops in add_ops(), extra in 0.0f64..50.0) {
        let mut set = WeightedSet::new();
        for (key, weight) in ops {
            set.add(key, weight).unwrap();
        }
        let before = set.total();
        set.add(200, extra).unwrap();
        set.remove(&200);
        prop_assert!((set.total() - before).abs() < 1e-6);
    }

    #[test]
    fn pick_returns_a_positive_weight_member(ops in add_ops(), seed in any::<u64>()) {
        let mut set = WeightedSet::new();
        for (key, weight) in ops {
            set.add(key, weight).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        if let Some(key) = set.pick(&mut rng) {
            prop_assert!(set.weight(&key) > 0.0);
        } else {
            prop_assert!(set.total() <= 0.0);
        }
    }
}

// ─── PIM matching invariants ─────────────────────────────────────────────────

/// Random bipartite edge sets over up to 12 inputs and 12 outputs.
fn edge_set() -> impl Strategy<Value = BTreeSet<PortPair>> {
    prop::collection::btree_set((0usize..12, 0usize..12), 0..80).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(input, output)| {
                PortPair::new(NodeId::from_index(input), NodeId::from_index(100 + output))
            })
            .collect()
    })
}

fn is_valid_matching(matching: &[PortPair]) -> bool {
    let inputs: BTreeSet<NodeId> = matching.iter().map(|e| e.input).collect();
    let outputs: BTreeSet<NodeId> = matching.iter().map(|e| e.output).collect();
    inputs.len() == matching.len() && outputs.len() == matching.len()
}

fn is_maximal(live: &BTreeSet<PortPair>, matching: &[PortPair]) -> bool {
    let inputs: BTreeSet<NodeId> = matching.iter().map(|e| e.input).collect();
    let outputs: BTreeSet<NodeId> = matching.iter().map(|e| e.output).collect();
    live.iter()
        .all(|pair| inputs.contains(&pair.input) || outputs.contains(&pair.output))
}

proptest! {
    #[test]
    fn bounded_pim_produces_valid_matchings(
        live in edge_set(),
        rounds in 1u32..5,
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let (matching, used) = match_rounds(&live, rounds, &mut rng);
        prop_assert!(used <= rounds);
        prop_assert!(is_valid_matching(&matching));
        for edge in &matching {
            prop_assert!(live.contains(edge));
        }
    }

    #[test]
    fn unbounded_pim_is_maximal_within_input_count(
        live in edge_set(),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let distinct_inputs = live
            .iter()
            .map(|pair| pair.input)
            .collect::<BTreeSet<_>>()
            .len() as u32;
        let (matching, rounds) = match_rounds(&live, 0, &mut rng);
        prop_assert!(is_valid_matching(&matching));
        prop_assert!(is_maximal(&live, &matching));
        prop_assert!(rounds <= distinct_inputs.max(1));
    }
}
