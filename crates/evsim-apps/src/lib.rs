//! Traffic applications and point-to-point links built on the [`evsim_core`] scheduler.
//!
//! A [`Scenario`] names links and flows; [`run`] installs a [`PacketSender`] per flow and a
//! [`PacketSink`] per receiving node, simulates, and returns a [`Report`] of per-flow
//! throughput, delay and loss.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

pub mod app;
pub mod channel;
pub mod scenario;
pub mod sender;
pub mod sink;
pub mod stats;
mod types;

pub use app::{install, AppError, AppRef, Application, Installed};
pub use channel::{Channel, ChannelRef, Link, Transmit};
pub use scenario::{run, Error, FlowSpec, Report, Scenario, ScenarioError};
pub use sender::{Interval, PacketSender, SenderConfig};
pub use sink::{PacketSink, SinkRef};
pub use stats::{FlowMonitor, FlowStats, MonitorRef};
pub use types::{FlowId, NodeId, Packet};
