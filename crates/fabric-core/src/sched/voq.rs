//! Virtual output queues.
//!
//! A switch's incoming traffic is queued per `(arrived-from, next-hop)`
//! pair, so the matching policies operate on a bipartite graph whose edges
//! are exactly the non-empty queues. Queues are created lazily on first
//! insert and removed the moment they drain: the key set always equals the
//! set of non-empty queues.

use crate::error::SimError;
use crate::message::{Message, NodeId};
use crate::sched::PortPair;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct VoqTable {
    queues: BTreeMap<PortPair, VecDeque<Message>>,
}

impl VoqTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: PortPair, message: Message) {
        self.queues.entry(key).or_default().push_back(message);
    }

    /// Dequeues the head of the queue behind `key`, removing the queue when
    /// it empties. Popping a key with no queue is an invariant violation.
    pub fn pop(&mut self, key: PortPair) -> Result<Message, SimError> {
        let Some(queue) = self.queues.get_mut(&key) else {
            return Err(SimError::InvariantViolation(format!(
                "pop from empty VOQ {key}"
            )));
        };
        let message = queue.pop_front().ok_or_else(|| {
            SimError::InvariantViolation(format!("empty VOQ shell at {key}"))
        })?;
        if queue.is_empty() {
            self.queues.remove(&key);
        }
        Ok(message)
    }

    pub fn peek(&self, key: &PortPair) -> Option<&Message> {
        self.queues.get(key).and_then(|q| q.front())
    }

    pub fn len(&self, key: &PortPair) -> usize {
        self.queues.get(key).map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// All VOQ keys; by construction, exactly the non-empty queues.
    pub fn keys(&self) -> impl Iterator<Item = &PortPair> {
        self.queues.keys()
    }

    /// VOQ keys whose output port is currently idle, i.e. the edges a
    /// matching may use this tick.
    pub fn live_pairs(&self, idle: &BTreeSet<NodeId>) -> BTreeSet<PortPair> {
        self.queues
            .keys()
            .filter(|key| idle.contains(&key.output))
            .copied()
            .collect()
    }

    /// Total queued messages across all keys.
    pub fn total_len(&self) -> usize {
        self.queues.values().map(|q| q.len()).sum()
    }
}
