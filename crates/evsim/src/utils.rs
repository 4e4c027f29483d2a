//! Scenario and report files.

pub use evsim_utils::*;
