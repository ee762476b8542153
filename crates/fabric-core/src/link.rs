//! Point-to-point link transport.
//!
//! A link carries at most one message at a time. Transmission begun at tick
//! `t` completes at `t + rate`; until then the link refuses further traffic.
//! Arrival-side bookkeeping (when the message becomes visible to the sink)
//! lives in the node substrate, keyed by the same completion tick.

use crate::consts::FRAME_SIZE;
use crate::error::SimError;
use crate::message::{NodeId, Tick};

/// Index of a link in the network's link arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(pub(crate) u32);

impl LinkId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A directed link with a fixed transmission rate in ticks per message.
#[derive(Debug, Clone)]
pub struct Link {
    source: NodeId,
    sink: NodeId,
    rate: u64,
    busy_until: Option<Tick>,
}

impl Link {
    /// The rate must be positive and divide [`FRAME_SIZE`], so per-frame
    /// capacities map onto whole transmission slots.
    pub fn new(source: NodeId, sink: NodeId, rate: u64) -> Result<Self, SimError> {
        if rate == 0 || !FRAME_SIZE.is_multiple_of(rate) {
            return Err(SimError::Construction(format!(
                "link {source} -> {sink}: rate {rate} must divide the frame size {FRAME_SIZE}"
            )));
        }
        Ok(Link {
            source,
            sink,
            rate,
            busy_until: None,
        })
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn sink(&self) -> NodeId {
        self.sink
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// True iff no message currently occupies the link at tick `now`.
    pub fn can_transmit(&self, now: Tick) -> bool {
        self.busy_until.is_none_or(|until| now >= until)
    }

    /// Begins a transmission, returning the completion tick `now + rate`.
    pub fn transmit(&mut self, now: Tick) -> Result<Tick, SimError> {
        match self.busy_until {
            Some(until) if now < until => Err(SimError::LinkBusy {
                from_node: self.source,
                sink: self.sink,
                until,
            }),
            _ => {
                let done = now + self.rate;
                self.busy_until = Some(done);
                Ok(done)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(rate: u64) -> Link {
        Link::new(NodeId::from_index(0), NodeId::from_index(1), rate).unwrap()
    }

    #[test]
    fn rate_must_divide_frame_size() {
        assert!(Link::new(NodeId::from_index(0), NodeId::from_index(1), 0).is_err());
        assert!(Link::new(NodeId::from_index(0), NodeId::from_index(1), 3).is_err());
        assert!(Link::new(NodeId::from_index(0), NodeId::from_index(1), 8).is_ok());
    }

    #[test]
    fn exclusive_until_completion() {
        let mut l = link(4);
        assert!(l.can_transmit(10));
        let done = l.transmit(10).unwrap();
        assert_eq!(done, 14);
        for t in 10..14 {
            assert!(!l.can_transmit(t));
        }
        assert!(l.can_transmit(14));
        assert!(matches!(l.transmit(12), Err(SimError::LinkBusy { .. })));
    }

    #[test]
    fn back_to_back_transmissions() {
        let mut l = link(1);
        for t in 0..5 {
            assert_eq!(l.transmit(t).unwrap(), t + 1);
        }
    }
}
