//! Build-wide constants.
//!
//! Flow rates are averaged over frames of [`FRAME_SIZE`] contiguous ticks.
//! Every link transmission rate must divide the frame size, so per-frame
//! capacities translate into whole transmission slots.

use crate::message::Tick;

/// Number of ticks in one frame.
pub const FRAME_SIZE: Tick = 1000;

/// Largest per-output capacity (messages per frame) a constructor should
/// provision. Loading an output much beyond this drives FIFO head-of-line
/// queues into unbounded growth.
pub const SAFE_CAPACITY: u64 = FRAME_SIZE * 53 / 100;

/// Default request/grant/accept round count for parallel-iterative matching.
pub const PIM_ROUNDS: u32 = 4;

/// Default statistical-matching round count.
pub const STAT_ROUNDS: u32 = 1;

/// Default PIM cleanup rounds appended after the statistical rounds.
pub const STAT_PIM_ROUNDS: u32 = 3;
