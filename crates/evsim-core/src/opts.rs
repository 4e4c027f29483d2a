//! This module defines the [`SimOpts`] configuration which describes how a [`Simulator`] is
//! seeded and when it stops.
//!
//! [`Simulator`]: crate::scheduler::Simulator

use crate::units::Time;

/// Simulator options.
#[derive(Debug, Clone, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize)]
pub struct SimOpts {
    /// Seed of the simulator's random number generator.
    #[builder(default)]
    #[serde(default)]
    pub seed: u64,
    /// If set, a stop sentinel is installed at this time when the simulator is created.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub stop_time: Option<Time>,
}

impl Default for SimOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}
