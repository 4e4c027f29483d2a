//! Applications, channels and flow statistics. [`run()`] simulates a [`Scenario`] end to end.

pub use evsim_apps::*;
