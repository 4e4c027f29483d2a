//! Packet sinks: the receiving end of every channel.

use std::{cell::RefCell, rc::Rc};

use evsim_core::Simulator;
use log::trace;

use crate::{
    stats::MonitorRef,
    types::{NodeId, Packet},
};

/// A [`PacketSink`] shared between the channels delivering into it.
pub type SinkRef = Rc<RefCell<PacketSink>>;

/// Consumes every packet delivered to a node.
#[derive(Debug, derive_new::new)]
pub struct PacketSink {
    node: NodeId,
    monitor: MonitorRef,
    #[new(default)]
    received: u64,
}

impl PacketSink {
    /// Wraps the sink for sharing.
    pub fn shared(self) -> SinkRef {
        Rc::new(RefCell::new(self))
    }

    /// The node this sink is installed on.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Packets received so far, across all flows.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub(crate) fn receive(&mut self, sim: &mut Simulator, packet: Packet) {
        trace!(
            "node {} received packet {} of flow {} at {} (context {})",
            self.node,
            packet.seq,
            packet.flow,
            sim.now(),
            sim.context()
        );
        self.received += 1;
        self.monitor.borrow_mut().record_rx(&packet, sim.now());
    }
}
