//! # Weighted Multiset
//!
//! A keyed collection of non-negative floating-point weights supporting
//! weighted random selection in O(k). Used standalone (per-frame generation
//! buckets) and as the values of outer maps (reserved capacities, transient
//! request/grant bookkeeping inside matching rounds).
//!
//! Outer maps holding weighted sets observe the "no empty shells" rule:
//! removing the last inner element removes the outer entry as well.

use crate::error::SimError;
use rand::{Rng, RngExt};
use std::collections::BTreeMap;

/// Keyed weights with cached total and deterministic iteration order.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedSet<K: Ord> {
    items: BTreeMap<K, f64>,
    total: f64,
}

impl<K: Ord> Default for WeightedSet<K> {
    fn default() -> Self {
        WeightedSet {
            items: BTreeMap::new(),
            total: 0.0,
        }
    }
}

impl<K: Ord + Copy> WeightedSet<K> {
    pub fn new() -> Self {
        WeightedSet {
            items: BTreeMap::new(),
            total: 0.0,
        }
    }

    /// Adds `weight` to `key`, inserting it if absent. Zero weights are
    /// kept as entries (they count as members but are never picked).
    ///
    /// Rejects negative or non-finite weights.
    pub fn add(&mut self, key: K, weight: f64) -> Result<(), SimError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(SimError::InvariantViolation(format!(
                "weighted set rejects weight {weight}"
            )));
        }
        *self.items.entry(key).or_insert(0.0) += weight;
        self.total += weight;
        Ok(())
    }

    /// Removes `key` entirely, returning its weight if it was present.
    pub fn remove(&mut self, key: &K) -> Option<f64> {
        let weight = self.items.remove(key)?;
        self.total -= weight;
        if self.items.is_empty() || self.total < 1e-12 {
            self.total = self.recompute();
        }
        Some(weight)
    }

    /// Subtracts `weight` from `key`, removing the entry when it reaches
    /// zero. Driving a key below zero is an invariant violation.
    pub fn deduct(&mut self, key: &K, weight: f64) -> Result<(), SimError> {
        let Some(current) = self.items.get_mut(key) else {
            return Err(SimError::InvariantViolation(
                "deduct from absent weighted-set key".into(),
            ));
        };
        if weight > *current + 1e-9 {
            return Err(SimError::InvariantViolation(format!(
                "deduct {weight} exceeds weight {current}"
            )));
        }
        *current -= weight;
        self.total -= weight;
        if *current <= 1e-9 {
            self.items.remove(key);
        }
        if self.items.is_empty() || self.total < 1e-12 {
            self.total = self.recompute();
        }
        Ok(())
    }

    /// Keeps only keys satisfying the predicate.
    pub fn retain(&mut self, mut pred: impl FnMut(&K) -> bool) {
        self.items.retain(|k, _| pred(k));
        self.total = self.recompute();
    }

    /// Sum of all current weights.
    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }

    pub fn weight(&self, key: &K) -> f64 {
        self.items.get(key).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, f64)> {
        self.items.iter().map(|(k, &w)| (k, w))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.items.keys()
    }

    /// Weighted random pick over all keys.
    ///
    /// Draws `u = (1 - r) * total` with `r` in `[0, 1)`, so `u` lies in
    /// `(0, total]`, then walks keys accumulating weight until the running
    /// sum covers `u`. Returns `None` when the set is empty or the total
    /// weight is zero.
    pub fn pick(&self, rng: &mut impl Rng) -> Option<K> {
        self.pick_where(rng, |_| true)
    }

    /// Weighted random pick restricted to keys satisfying the predicate.
    ///
    /// The draw is taken over the filtered total, so excluded keys carry no
    /// probability mass. Returns `None` when no candidate has positive weight.
    pub fn pick_where(&self, rng: &mut impl Rng, mut pred: impl FnMut(&K) -> bool) -> Option<K> {
        let total: f64 = self
            .items
            .iter()
            .filter(|&(k, _)| pred(k))
            .map(|(_, &w)| w)
            .sum();
        if total <= 0.0 {
            return None;
        }
        let u = (1.0 - rng.random::<f64>()) * total;
        let mut acc = 0.0;
        let mut last = None;
        for (k, &w) in &self.items {
            if w <= 0.0 || !pred(k) {
                continue;
            }
            acc += w;
            last = Some(*k);
            if acc >= u {
                return last;
            }
        }
        // Float accumulation may land a hair short of the filtered total.
        last
    }

    fn recompute(&self) -> f64 {
        self.items.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded_rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn add_then_remove_restores_total() {
        let mut set = WeightedSet::new();
        set.add("a", 1.5).unwrap();
        set.add("b", 2.5).unwrap();
        let before = set.total();
        set.add("c", 7.0).unwrap();
        set.remove(&"c");
        assert!((set.total() - before).abs() < 1e-9);
    }

    #[test]
    fn negative_weight_rejected() {
        let mut set = WeightedSet::new();
        assert!(set.add("a", -0.5).is_err());
        assert!(set.add("a", f64::NAN).is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn empty_or_zero_total_picks_none() {
        let mut set: WeightedSet<u32> = WeightedSet::new();
        let mut rng = seeded_rng();
        assert_eq!(set.pick(&mut rng), None);
        set.add(1, 0.0).unwrap();
        assert!(set.contains(&1));
        assert_eq!(set.pick(&mut rng), None);
    }

    #[test]
    fn deduct_removes_at_zero() {
        let mut set = WeightedSet::new();
        set.add(5u32, 3.0).unwrap();
        set.deduct(&5, 1.0).unwrap();
        assert!((set.weight(&5) - 2.0).abs() < 1e-9);
        set.deduct(&5, 2.0).unwrap();
        assert!(!set.contains(&5));
        assert_eq!(set.total(), 0.0);
    }

    #[test]
    fn deduct_below_zero_is_an_error() {
        let mut set = WeightedSet::new();
        set.add(5u32, 1.0).unwrap();
        assert!(set.deduct(&5, 2.0).is_err());
    }

    #[test]
    fn retain_drops_excluded_weight() {
        let mut set = WeightedSet::new();
        set.add(1u32, 1.0).unwrap();
        set.add(2u32, 2.0).unwrap();
        set.add(3u32, 3.0).unwrap();
        set.retain(|k| *k != 2);
        assert_eq!(set.len(), 2);
        assert!((set.total() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn pick_where_excludes_mass() {
        let mut set = WeightedSet::new();
        set.add(1u32, 1.0).unwrap();
        set.add(2u32, 1000.0).unwrap();
        let mut rng = seeded_rng();
        for _ in 0..100 {
            assert_eq!(set.pick_where(&mut rng, |k| *k == 1), Some(1));
        }
        assert_eq!(set.pick_where(&mut rng, |k| *k == 99), None);
    }

    #[test]
    fn pick_frequencies_match_weights() {
        // Weights 1:2:3 over 60k draws should land within 2% of 1/6, 2/6, 3/6.
        let mut set = WeightedSet::new();
        set.add(0usize, 1.0).unwrap();
        set.add(1usize, 2.0).unwrap();
        set.add(2usize, 3.0).unwrap();

        let mut rng = seeded_rng();
        let mut counts = [0u32; 3];
        let draws = 60_000;
        for _ in 0..draws {
            let k = set.pick(&mut rng).expect("non-empty set");
            counts[k] += 1;
        }

        let expected = [1.0 / 6.0, 2.0 / 6.0, 3.0 / 6.0];
        for (i, &count) in counts.iter().enumerate() {
            let freq = count as f64 / draws as f64;
            assert!(
                (freq - expected[i]).abs() < 0.02,
                "key {i}: expected {:.3}, observed {freq:.3}",
                expected[i]
            );
        }
    }
}
