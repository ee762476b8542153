//! # Reception Statistics
//!
//! Per-receiver and network-wide statistics. All report types serialize to
//! JSON for experiment output.

use crate::message::{Message, NodeId, Tick};
use crate::network::Network;
use serde::Serialize;
use std::collections::BTreeMap;

// ─── Receiver Stats ─────────────────────────────────────────────────────────

/// Reception counters for one upstream source at one receiver.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SourceStats {
    /// Messages received from this source.
    pub received: u64,
    /// Sum of message ages at reception (reception tick minus creation tick).
    pub age_sum: u64,
    /// Tick of the most recent reception.
    pub last_arrival: Option<Tick>,
    /// Sum of gaps between consecutive receptions.
    pub gap_sum: u64,
    /// Number of gaps observed (receptions minus one).
    pub gap_count: u64,
}

impl SourceStats {
    pub fn mean_age(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.age_sum as f64 / self.received as f64
        }
    }

    pub fn mean_gap(&self) -> f64 {
        if self.gap_count == 0 {
            0.0
        } else {
            self.gap_sum as f64 / self.gap_count as f64
        }
    }
}

/// Aggregate reception statistics at one receiver node.
///
/// Live state, not a report; the serializable view is [`ReceiverReport`].
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    per_source: BTreeMap<NodeId, SourceStats>,
    /// Total messages received.
    pub received: u64,
    /// Sum of message ages at reception.
    pub age_sum: u64,
    last_arrival: Option<Tick>,
    gap_sum: u64,
    gap_count: u64,
    /// Full reception sequence; populated only when logging is enabled.
    log: Option<Vec<Message>>,
}

impl ReceiverStats {
    pub(crate) fn record(&mut self, now: Tick, message: &Message) {
        let age = message.age(now);
        self.received += 1;
        self.age_sum += age;
        if let Some(last) = self.last_arrival {
            self.gap_sum += now - last;
            self.gap_count += 1;
        }
        self.last_arrival = Some(now);

        let source = self.per_source.entry(message.source).or_default();
        source.received += 1;
        source.age_sum += age;
        if let Some(last) = source.last_arrival {
            source.gap_sum += now - last;
            source.gap_count += 1;
        }
        source.last_arrival = Some(now);

        if let Some(log) = &mut self.log {
            log.push(*message);
        }
    }

    pub(crate) fn enable_log(&mut self) {
        self.log.get_or_insert_with(Vec::new);
    }

    /// The reception sequence, if logging was enabled before the run.
    pub fn log(&self) -> Option<&[Message]> {
        self.log.as_deref()
    }

    pub fn source(&self, id: NodeId) -> Option<&SourceStats> {
        self.per_source.get(&id)
    }

    pub fn sources(&self) -> impl Iterator<Item = (NodeId, &SourceStats)> {
        self.per_source.iter().map(|(&id, stats)| (id, stats))
    }

    /// Mean age over every received message.
    pub fn mean_age(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.age_sum as f64 / self.received as f64
        }
    }

    /// Mean gap between consecutive receptions, over all sources.
    pub fn mean_gap(&self) -> f64 {
        if self.gap_count == 0 {
            0.0
        } else {
            self.gap_sum as f64 / self.gap_count as f64
        }
    }
}

// ─── Network Report ─────────────────────────────────────────────────────────

/// Per-flow conservation tallies.
#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub source: NodeId,
    pub sink: NodeId,
    pub required_capacity: u64,
    pub generated: u64,
    pub received: u64,
}

/// Per-receiver summary.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiverReport {
    pub node: NodeId,
    pub received: u64,
    pub mean_age: f64,
    pub mean_gap: f64,
}

/// Snapshot of a whole network at the end of (or during) a run.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    /// Ticks simulated so far.
    pub ticks: Tick,
    pub generated: u64,
    pub received: u64,
    /// Messages still in generator outboxes, switch queues, or on links.
    pub in_transit: u64,
    /// Mean message age over every reception in the run.
    pub mean_age: f64,
    pub flows: Vec<FlowReport>,
    pub receivers: Vec<ReceiverReport>,
}

impl NetworkReport {
    pub fn collect(net: &Network) -> Self {
        let flows = net
            .flows()
            .map(|(flow, tally)| FlowReport {
                source: flow.source(),
                sink: flow.sink(),
                required_capacity: flow.required_capacity(),
                generated: tally.generated,
                received: tally.received,
            })
            .collect();

        let receivers: Vec<ReceiverReport> = net
            .receivers()
            .map(|(node, stats)| ReceiverReport {
                node,
                received: stats.received,
                mean_age: stats.mean_age(),
                mean_gap: stats.mean_gap(),
            })
            .collect();

        let (age_sum, received) = net
            .receivers()
            .fold((0u64, 0u64), |(ages, count), (_, stats)| {
                (ages + stats.age_sum, count + stats.received)
            });
        let mean_age = if received == 0 {
            0.0
        } else {
            age_sum as f64 / received as f64
        };

        NetworkReport {
            ticks: net.now(),
            generated: net.generated_total(),
            received: net.received_total(),
            in_transit: net.in_transit(),
            mean_age,
            flows,
            receivers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(i: usize) -> NodeId {
        NodeId::from_index(i)
    }

    #[test]
    fn record_tracks_ages_and_gaps() {
        let mut stats = ReceiverStats::default();
        stats.record(5, &Message::new(n(1), n(9), 0));
        stats.record(8, &Message::new(n(1), n(9), 6));
        stats.record(9, &Message::new(n(2), n(9), 9));

        assert_eq!(stats.received, 3);
        // Ages 5, 2, 0.
        assert!((stats.mean_age() - 7.0 / 3.0).abs() < 1e-9);
        // Gaps 3, 1 across all sources.
        assert!((stats.mean_gap() - 2.0).abs() < 1e-9);
        // Per-source: n(1) saw one gap of 3.
        assert!((stats.source(n(1)).unwrap().mean_gap() - 3.0).abs() < 1e-9);
        assert_eq!(stats.source(n(2)).unwrap().received, 1);
    }

    #[test]
    fn reports_serialize_to_json() {
        let report = FlowReport {
            source: n(0),
            sink: n(3),
            required_capacity: 4,
            generated: 10,
            received: 9,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"generated\":10"));
        assert!(json.contains("\"received\":9"));
    }

    #[test]
    fn log_only_when_enabled() {
        let mut stats = ReceiverStats::default();
        stats.record(1, &Message::new(n(1), n(9), 0));
        assert!(stats.log().is_none());

        stats.enable_log();
        stats.record(2, &Message::new(n(1), n(9), 1));
        assert_eq!(stats.log().unwrap().len(), 1);
    }
}
