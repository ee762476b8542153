//! The network aggregate: nodes, links, flows, schedulers, and the
//! tick-driven run loop.
//!
//! The network owns every arena (nodes, links, scheduler instances,
//! per-switch decision tables) plus the single seeded RNG, so one run is
//! fully deterministic. Nodes are ticked in creation order; within a node
//! the phase order is idle-port refresh, arrival drain, update hook, send.

use crate::consts::FRAME_SIZE;
use crate::decision::DecisionTable;
use crate::error::SimError;
use crate::link::{Link, LinkId};
use crate::message::{Message, NodeId, Tick};
use crate::node::{GeneratorState, NodeCore, NodeKind};
use crate::sched::{check_matching, Scheduler, SchedulerId};
use crate::stats::ReceiverStats;
use crate::weighted::WeightedSet;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Identity of a flow within one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FlowId(u32);

/// A provisioned path from a generator to a receiver with a required
/// capacity in messages per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    source: NodeId,
    sink: NodeId,
    path: Vec<NodeId>,
    required_capacity: u64,
}

impl Flow {
    /// The path must contain at least two nodes (source first, sink last)
    /// and the capacity must be positive.
    pub fn new(path: Vec<NodeId>, required_capacity: u64) -> Result<Self, SimError> {
        if path.len() < 2 {
            return Err(SimError::Construction(
                "flow path needs at least two nodes".into(),
            ));
        }
        if required_capacity == 0 {
            return Err(SimError::Construction(
                "flow capacity must be positive".into(),
            ));
        }
        let source = path[0];
        let sink = path[path.len() - 1];
        if source == sink {
            return Err(SimError::Construction(
                "flow source and sink must differ".into(),
            ));
        }
        Ok(Flow {
            source,
            sink,
            path,
            required_capacity,
        })
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn sink(&self) -> NodeId {
        self.sink
    }

    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    pub fn required_capacity(&self) -> u64 {
        self.required_capacity
    }
}

/// Messages generated and received so far for one flow.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FlowTally {
    pub generated: u64,
    pub received: u64,
}

struct Node {
    id: NodeId,
    core: NodeCore,
    kind: NodeKind,
}

pub struct Network {
    nodes: Vec<Node>,
    links: Vec<Link>,
    schedulers: Vec<Box<dyn Scheduler>>,
    decisions: BTreeMap<NodeId, DecisionTable>,
    flows: BTreeMap<FlowId, Flow>,
    flow_ids: BTreeMap<(NodeId, NodeId), FlowId>,
    tallies: BTreeMap<FlowId, FlowTally>,
    rng: StdRng,
    next_flow: u32,
    now: Tick,
}

impl Network {
    pub fn new(seed: u64) -> Self {
        Network {
            nodes: Vec::new(),
            links: Vec::new(),
            schedulers: Vec::new(),
            decisions: BTreeMap::new(),
            flows: BTreeMap::new(),
            flow_ids: BTreeMap::new(),
            tallies: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
            next_flow: 0,
            now: 0,
        }
    }

    // ─── Construction ───────────────────────────────────────────────────

    /// Registers a scheduler instance. Multiple switches may share it.
    pub fn add_scheduler(&mut self, scheduler: Box<dyn Scheduler>) -> SchedulerId {
        self.schedulers.push(scheduler);
        SchedulerId(self.schedulers.len() - 1)
    }

    pub fn add_generator(&mut self) -> NodeId {
        self.push_node(NodeKind::Generator(GeneratorState::default()))
    }

    pub fn add_receiver(&mut self) -> NodeId {
        self.push_node(NodeKind::Receiver(ReceiverStats::default()))
    }

    pub fn add_switch(&mut self, scheduler: SchedulerId) -> Result<NodeId, SimError> {
        if scheduler.0 >= self.schedulers.len() {
            return Err(SimError::Construction(format!(
                "unknown scheduler {}",
                scheduler.0
            )));
        }
        let id = self.push_node(NodeKind::Switch { scheduler });
        self.schedulers[scheduler.0].attach(id);
        self.decisions.insert(id, DecisionTable::new());
        Ok(id)
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node {
            id,
            core: NodeCore::default(),
            kind,
        });
        id
    }

    /// Creates a directed link from `a` to `b` and registers it at both
    /// endpoints. The output port starts idle.
    pub fn connect(&mut self, a: NodeId, b: NodeId, rate: u64) -> Result<LinkId, SimError> {
        if a == b {
            return Err(SimError::Construction(format!("self-link at {a}")));
        }
        self.check_node(a)?;
        self.check_node(b)?;
        if self.nodes[a.index()].core.outputs.contains_key(&b) {
            return Err(SimError::Construction(format!("duplicate link {a} -> {b}")));
        }
        let link = Link::new(a, b, rate)?;
        let id = LinkId(self.links.len() as u32);
        self.links.push(link);
        self.nodes[a.index()].core.outputs.insert(b, id);
        self.nodes[a.index()].core.idle.insert(b);
        self.nodes[b.index()].core.inputs.insert(a, id);
        Ok(id)
    }

    fn check_node(&self, id: NodeId) -> Result<(), SimError> {
        if id.index() >= self.nodes.len() {
            return Err(SimError::Construction(format!("unknown node {id}")));
        }
        Ok(())
    }

    /// Provisions a flow: next-hop entries and reserved-capacity deltas are
    /// written at every intermediate switch, and the flow is registered
    /// with its generator. The `(source, sink)` pair must be unique.
    pub fn add_flow(&mut self, flow: Flow) -> Result<FlowId, SimError> {
        let key = (flow.source, flow.sink);
        if self.flow_ids.contains_key(&key) {
            return Err(SimError::Construction(format!(
                "duplicate flow {} -> {}",
                flow.source, flow.sink
            )));
        }
        for &node in &flow.path {
            self.check_node(node)?;
        }
        for window in flow.path.windows(2) {
            if !self.nodes[window[0].index()]
                .core
                .outputs
                .contains_key(&window[1])
            {
                return Err(SimError::Construction(format!(
                    "flow hop {} -> {} has no link",
                    window[0], window[1]
                )));
            }
        }
        if !matches!(self.nodes[flow.source.index()].kind, NodeKind::Generator(_)) {
            return Err(SimError::Construction(format!(
                "flow source {} is not a generator",
                flow.source
            )));
        }
        if !matches!(self.nodes[flow.sink.index()].kind, NodeKind::Receiver(_)) {
            return Err(SimError::Construction(format!(
                "flow sink {} is not a receiver",
                flow.sink
            )));
        }
        for &mid in &flow.path[1..flow.path.len() - 1] {
            if !matches!(self.nodes[mid.index()].kind, NodeKind::Switch { .. }) {
                return Err(SimError::Construction(format!(
                    "flow interior node {mid} is not a switch"
                )));
            }
        }

        for i in 1..flow.path.len() - 1 {
            let switch = flow.path[i];
            let table = self.decisions.get_mut(&switch).ok_or_else(|| {
                SimError::InvariantViolation(format!("switch {switch} has no decision table"))
            })?;
            table.put_decision(flow.source, flow.sink, flow.path[i + 1]);
            table.translate_reserved(
                flow.path[i - 1],
                flow.path[i + 1],
                flow.required_capacity as i64,
            )?;
        }

        let id = FlowId(self.next_flow);
        self.next_flow += 1;
        if let NodeKind::Generator(gen) = &mut self.nodes[flow.source.index()].kind {
            gen.flows.push(id);
        }
        debug!(source = %flow.source, sink = %flow.sink,
               capacity = flow.required_capacity, "flow added");
        self.flow_ids.insert(key, id);
        self.tallies.insert(id, FlowTally::default());
        self.flows.insert(id, flow);
        Ok(id)
    }

    /// Exact reversal of [`Network::add_flow`]: every next-hop entry and
    /// reserved-capacity delta is undone.
    pub fn remove_flow(&mut self, source: NodeId, sink: NodeId) -> Result<Flow, SimError> {
        let id = self
            .flow_ids
            .remove(&(source, sink))
            .ok_or_else(|| SimError::Construction(format!("unknown flow {source} -> {sink}")))?;
        let flow = self.flows.remove(&id).ok_or_else(|| {
            SimError::InvariantViolation(format!("flow {source} -> {sink} lost its record"))
        })?;

        for i in 1..flow.path.len() - 1 {
            let switch = flow.path[i];
            let table = self.decisions.get_mut(&switch).ok_or_else(|| {
                SimError::InvariantViolation(format!("switch {switch} has no decision table"))
            })?;
            table.remove_decision(flow.source, flow.sink);
            table.translate_reserved(
                flow.path[i - 1],
                flow.path[i + 1],
                -(flow.required_capacity as i64),
            )?;
        }
        if let NodeKind::Generator(gen) = &mut self.nodes[flow.source.index()].kind {
            gen.flows.retain(|f| *f != id);
        }
        self.tallies.remove(&id);
        debug!(source = %flow.source, sink = %flow.sink, "flow removed");
        Ok(flow)
    }

    /// Scripts `count` emissions for an existing flow at tick `at`,
    /// switching the flow's generator to scripted mode (its probabilistic
    /// frame bucket is disabled).
    pub fn schedule_burst(
        &mut self,
        source: NodeId,
        sink: NodeId,
        at: Tick,
        count: u64,
    ) -> Result<(), SimError> {
        let &id = self
            .flow_ids
            .get(&(source, sink))
            .ok_or_else(|| SimError::Construction(format!("unknown flow {source} -> {sink}")))?;
        let NodeKind::Generator(gen) = &mut self.nodes[source.index()].kind else {
            return Err(SimError::InvariantViolation(format!(
                "flow source {source} is not a generator"
            )));
        };
        let script = gen.script.get_or_insert_with(Vec::new);
        for _ in 0..count {
            script.push((at, id));
        }
        script.sort_by_key(|entry| entry.0);
        Ok(())
    }

    // ─── Run loop ───────────────────────────────────────────────────────

    /// Ticks the network for `frames` frames.
    pub fn run(&mut self, frames: u64) -> Result<(), SimError> {
        self.run_ticks(frames * FRAME_SIZE)
    }

    /// Ticks the network `ticks` times, continuing from the current tick.
    pub fn run_ticks(&mut self, ticks: Tick) -> Result<(), SimError> {
        let end = self.now + ticks;
        while self.now < end {
            let now = self.now;
            for idx in 0..self.nodes.len() {
                self.tick_node(now, idx)?;
            }
            self.now += 1;
        }
        Ok(())
    }

    fn tick_node(&mut self, now: Tick, idx: usize) -> Result<(), SimError> {
        // Phase 1: idle-port refresh.
        self.nodes[idx].core.refresh_idle(now);

        // Phase 2: arrival drain.
        let ready = self.nodes[idx].core.drain_arrivals(now);
        for (from, message) in ready {
            self.deliver(now, idx, from, message)?;
        }

        // Phase 3: update hook (generators emit here).
        if matches!(self.nodes[idx].kind, NodeKind::Generator(_)) {
            self.generator_emit(now, idx)?;
        }

        // Phase 4: outbound send.
        match self.nodes[idx].kind {
            NodeKind::Generator(_) => self.generator_send(now, idx),
            NodeKind::Switch { scheduler } => self.switch_send(now, idx, scheduler),
            NodeKind::Receiver(_) => Ok(()),
        }
    }

    fn deliver(
        &mut self,
        now: Tick,
        idx: usize,
        from: NodeId,
        message: Message,
    ) -> Result<(), SimError> {
        let id = self.nodes[idx].id;
        if message.destination == id {
            // Local delivery is only meaningful at a receiver; a switch or
            // generator named as a destination is a routing bug.
            match &mut self.nodes[idx].kind {
                NodeKind::Receiver(stats) => {
                    stats.record(now, &message);
                    if let Some(&flow) = self.flow_ids.get(&(message.source, id)) {
                        if let Some(tally) = self.tallies.get_mut(&flow) {
                            tally.received += 1;
                        }
                    }
                    Ok(())
                }
                _ => Err(SimError::NoRoute {
                    node: id,
                    from_node: message.source,
                    destination: message.destination,
                }),
            }
        } else {
            match self.nodes[idx].kind {
                NodeKind::Switch { scheduler } => {
                    if !self.nodes[idx].core.inputs.contains_key(&from) {
                        return Err(SimError::InvariantViolation(format!(
                            "arrival at {id} from unregistered neighbor {from}"
                        )));
                    }
                    let table = self.decisions.get(&id).ok_or_else(|| {
                        SimError::InvariantViolation(format!("switch {id} has no decision table"))
                    })?;
                    self.schedulers[scheduler.0].enqueue(from, id, message, table)
                }
                _ => Err(SimError::NoRoute {
                    node: id,
                    from_node: message.source,
                    destination: message.destination,
                }),
            }
        }
    }

    fn generator_emit(&mut self, now: Tick, idx: usize) -> Result<(), SimError> {
        let id = self.nodes[idx].id;
        let NodeKind::Generator(gen) = &mut self.nodes[idx].kind else {
            return Ok(());
        };

        if let Some(script) = &gen.script {
            while gen.script_pos < script.len() && script[gen.script_pos].0 <= now {
                let (_, flow_id) = script[gen.script_pos];
                gen.script_pos += 1;
                let Some(flow) = self.flows.get(&flow_id) else {
                    return Err(SimError::InvariantViolation(format!(
                        "scripted emission for removed flow at {id}"
                    )));
                };
                gen.outbox
                    .push_back((flow.path[1], Message::new(id, flow.sink, now)));
                if let Some(tally) = self.tallies.get_mut(&flow_id) {
                    tally.generated += 1;
                }
            }
            return Ok(());
        }

        // Probabilistic bucket rule: refill at each frame start, then emit
        // with probability msgs_left / time_left, picking the flow weighted
        // by its remaining count.
        if now % FRAME_SIZE == 0 {
            gen.bucket = WeightedSet::new();
            for &flow_id in &gen.flows {
                if let Some(flow) = self.flows.get(&flow_id) {
                    gen.bucket.add(flow_id, flow.required_capacity as f64)?;
                }
            }
        }
        let msgs_left = gen.bucket.total();
        if msgs_left <= 0.0 {
            return Ok(());
        }
        let time_left = FRAME_SIZE - now % FRAME_SIZE;
        let p = (msgs_left / time_left as f64).min(1.0);
        if self.rng.random::<f64>() < p {
            if let Some(flow_id) = gen.bucket.pick(&mut self.rng) {
                gen.bucket.deduct(&flow_id, 1.0)?;
                let Some(flow) = self.flows.get(&flow_id) else {
                    return Err(SimError::InvariantViolation(format!(
                        "bucket emission for removed flow at {id}"
                    )));
                };
                gen.outbox
                    .push_back((flow.path[1], Message::new(id, flow.sink, now)));
                if let Some(tally) = self.tallies.get_mut(&flow_id) {
                    tally.generated += 1;
                }
                trace!(generator = %id, sink = %flow.sink, "message emitted");
            }
        }
        Ok(())
    }

    fn generator_send(&mut self, now: Tick, idx: usize) -> Result<(), SimError> {
        loop {
            let head = match &self.nodes[idx].kind {
                NodeKind::Generator(gen) => gen.outbox.front().copied(),
                _ => None,
            };
            let Some((hop, message)) = head else {
                return Ok(());
            };
            // A busy first hop blocks the outbox; that is queueing, not an
            // error.
            if !self.nodes[idx].core.is_idle(&hop) {
                return Ok(());
            }
            let Some(&link) = self.nodes[idx].core.outputs.get(&hop) else {
                return Err(SimError::NoRoute {
                    node: self.nodes[idx].id,
                    from_node: message.source,
                    destination: message.destination,
                });
            };
            if !self.links[link.index()].can_transmit(now) {
                return Ok(());
            }
            self.transmit_to_node(now, idx, hop, message)?;
            if let NodeKind::Generator(gen) = &mut self.nodes[idx].kind {
                gen.outbox.pop_front();
            }
        }
    }

    fn switch_send(&mut self, now: Tick, idx: usize, sid: SchedulerId) -> Result<(), SimError> {
        let id = self.nodes[idx].id;
        let table = self.decisions.get(&id).ok_or_else(|| {
            SimError::InvariantViolation(format!("switch {id} has no decision table"))
        })?;
        let idle = self.nodes[idx].core.idle.clone();
        let plan = self.schedulers[sid.0].plan(now, id, &idle, table, &mut self.rng)?;
        if plan.is_empty() {
            return Ok(());
        }
        check_matching(id, &plan, &idle)?;
        trace!(switch = %id, edges = plan.len(), "matching scheduled");
        for edge in plan {
            let message = self.schedulers[sid.0].take(id, edge)?;
            self.transmit_to_node(now, idx, edge.output, message)?;
        }
        Ok(())
    }

    /// Begins transmitting `message` from node `from_idx` toward `sink`:
    /// the output port leaves the idle set, the link goes busy, and the
    /// sink sees the arrival once the transmission completes.
    fn transmit_to_node(
        &mut self,
        now: Tick,
        from_idx: usize,
        sink: NodeId,
        message: Message,
    ) -> Result<(), SimError> {
        let from = self.nodes[from_idx].id;
        let Some(&link) = self.nodes[from_idx].core.outputs.get(&sink) else {
            return Err(SimError::NoRoute {
                node: from,
                from_node: message.source,
                destination: message.destination,
            });
        };
        if !self.nodes[from_idx].core.idle.contains(&sink) {
            return Err(SimError::PortNotIdle { node: from, sink });
        }
        let done = self.links[link.index()].transmit(now)?;
        self.nodes[from_idx].core.idle.remove(&sink);
        self.nodes[from_idx].core.post_completion(done, sink);
        self.nodes[sink.index()].core.post_arrival(done, from, message);
        Ok(())
    }

    // ─── Queries ────────────────────────────────────────────────────────

    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn receiver_stats(&self, id: NodeId) -> Option<&ReceiverStats> {
        match &self.nodes.get(id.index())?.kind {
            NodeKind::Receiver(stats) => Some(stats),
            _ => None,
        }
    }

    /// Keeps the full reception sequence at a receiver (for ordering
    /// assertions; off by default).
    pub fn enable_receive_log(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            if let NodeKind::Receiver(stats) = &mut node.kind {
                stats.enable_log();
            }
        }
    }

    pub fn decision_table(&self, switch: NodeId) -> Option<&DecisionTable> {
        self.decisions.get(&switch)
    }

    pub fn flow_tally(&self, source: NodeId, sink: NodeId) -> Option<FlowTally> {
        let id = self.flow_ids.get(&(source, sink))?;
        self.tallies.get(id).copied()
    }

    pub fn flows(&self) -> impl Iterator<Item = (&Flow, FlowTally)> {
        self.flows.iter().map(|(id, flow)| {
            let tally = self.tallies.get(id).copied().unwrap_or_default();
            (flow, tally)
        })
    }

    pub fn receivers(&self) -> impl Iterator<Item = (NodeId, &ReceiverStats)> {
        self.nodes.iter().filter_map(|node| match &node.kind {
            NodeKind::Receiver(stats) => Some((node.id, stats)),
            _ => None,
        })
    }

    pub fn generated_total(&self) -> u64 {
        self.tallies.values().map(|t| t.generated).sum()
    }

    pub fn received_total(&self) -> u64 {
        self.tallies.values().map(|t| t.received).sum()
    }

    /// Messages emitted but not yet delivered: generator outboxes, switch
    /// queues, and in-flight arrivals.
    pub fn in_transit(&self) -> u64 {
        let mut count = 0u64;
        for node in &self.nodes {
            count += node.core.arrivals_in_flight() as u64;
            match &node.kind {
                NodeKind::Generator(gen) => count += gen.outbox.len() as u64,
                NodeKind::Switch { scheduler } => {
                    count += self.schedulers[scheduler.0].pending(node.id) as u64;
                }
                NodeKind::Receiver(_) => {}
            }
        }
        count
    }
}
