//! `evsim` is a deterministic discrete-event simulator. A [`Simulator`](core::Simulator) advances
//! a virtual clock by running scheduled callbacks in timestamp order, breaking ties by the order
//! in which they were scheduled, so that the same program always produces the same trace.
//! Callbacks may schedule and cancel further events, and a run ends when no events remain or a
//! stop time is reached.
//!
//! On top of the scheduler, [`apps`] provides point-to-point links, packet senders and sinks,
//! and per-flow statistics, and [`utils`] reads scenario files.

#![warn(unreachable_pub, missing_docs)]

pub mod apps;
pub mod core;
pub mod utils;
