#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

//! The core `evsim` library: a deterministic discrete-event scheduler. A [`Simulator`] keeps a
//! virtual clock and runs scheduled callbacks in timestamp order, breaking ties by scheduling
//! order, with support for cancellation and stop times.
//!
//! ```
//! use evsim_core::{Simulator, Time};
//!
//! let mut sim = Simulator::new();
//! sim.schedule(Time::from_secs(2), |sim| println!("started at {}", sim.now()))?;
//! sim.stop(Time::from_secs(10))?;
//! let summary = sim.run()?;
//! assert_eq!(summary.end_time, Time::from_secs(10));
//! # Ok::<(), evsim_core::SimError>(())
//! ```

#[macro_use]
mod ident;

pub mod event;
pub mod opts;
pub mod scheduler;
pub mod testing;
pub mod units;

pub use event::{Callback, Context, EventId};
pub use opts::SimOpts;
pub use scheduler::{RunSummary, SimError, Simulator, State};
pub use units::{BitsPerSec, Bytes, Gbps, Mbps, Time};
