//! The scheduler, its event handles, and the time and data units. The main entry point is
//! [`Simulator`].

pub use evsim_core::*;
