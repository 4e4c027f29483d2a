//! Per-flow traffic statistics.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use evsim_core::{Bytes, Time};

use crate::types::{FlowId, Packet};

/// Counters for one flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FlowStats {
    /// Packets handed to a channel.
    pub tx_packets: u64,
    /// Packets delivered to a sink.
    pub rx_packets: u64,
    /// Bytes handed to a channel.
    pub tx_bytes: Bytes,
    /// Bytes delivered to a sink.
    pub rx_bytes: Bytes,
    /// Packets dropped by a full channel queue.
    pub dropped: u64,
    /// Sum of one-way delays of delivered packets.
    pub delay_sum: Time,
    /// Time of the first transmission.
    pub first_tx: Option<Time>,
    /// Time of the last delivery.
    pub last_rx: Option<Time>,
}

impl FlowStats {
    /// Received bits per second between the first transmission and the last delivery.
    pub fn throughput(&self) -> f64 {
        match (self.first_tx, self.last_rx) {
            (Some(first), Some(last)) if last > first => {
                self.rx_bytes.into_f64() * 8.0 / (last - first).as_secs_f64()
            }
            _ => 0.0,
        }
    }

    /// Mean one-way delay of delivered packets.
    pub fn mean_delay(&self) -> Option<Time> {
        (self.rx_packets > 0)
            .then(|| Time::from_nanos(self.delay_sum.as_nanos() / self.rx_packets as i64))
    }

    /// Packets sent but never delivered. Packets still in flight when the simulation stopped
    /// count as lost.
    pub fn lost_packets(&self) -> u64 {
        self.tx_packets.saturating_sub(self.rx_packets)
    }

    /// Fraction of sent packets that were lost.
    pub fn loss_ratio(&self) -> f64 {
        if self.tx_packets == 0 {
            return 0.0;
        }
        self.lost_packets() as f64 / self.tx_packets as f64
    }
}

/// A [`FlowMonitor`] shared between the applications and channels writing to it.
pub type MonitorRef = Rc<RefCell<FlowMonitor>>;

/// Collects [`FlowStats`] for every flow in a simulation.
#[derive(Debug, Default)]
pub struct FlowMonitor {
    flows: BTreeMap<FlowId, FlowStats>,
}

impl FlowMonitor {
    /// Creates a monitor wrapped for sharing.
    pub fn shared() -> MonitorRef {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Makes `flow` appear in the results even if it never sends.
    pub fn register(&mut self, flow: FlowId) {
        self.flows.entry(flow).or_default();
    }

    pub(crate) fn record_tx(&mut self, packet: &Packet) {
        let stats = self.flows.entry(packet.flow).or_default();
        stats.tx_packets += 1;
        stats.tx_bytes += packet.size;
        stats.first_tx.get_or_insert(packet.sent_at);
    }

    pub(crate) fn record_rx(&mut self, packet: &Packet, now: Time) {
        let stats = self.flows.entry(packet.flow).or_default();
        stats.rx_packets += 1;
        stats.rx_bytes += packet.size;
        stats.delay_sum += now - packet.sent_at;
        stats.last_rx = Some(now);
    }

    pub(crate) fn record_drop(&mut self, packet: &Packet) {
        self.flows.entry(packet.flow).or_default().dropped += 1;
    }

    /// Statistics for one flow.
    pub fn get(&self, flow: FlowId) -> Option<&FlowStats> {
        self.flows.get(&flow)
    }

    /// A copy of all statistics, ordered by flow ID.
    pub fn snapshot(&self) -> BTreeMap<FlowId, FlowStats> {
        self.flows.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    fn packet(seq: u64, sent_at: Time) -> Packet {
        Packet {
            flow: FlowId::ZERO,
            seq,
            src: NodeId::new(0),
            dst: NodeId::new(1),
            size: Bytes::new(500),
            sent_at,
        }
    }

    #[test]
    fn derived_metrics() {
        let mut monitor = FlowMonitor::default();
        let p0 = packet(0, Time::ZERO);
        let p1 = packet(1, Time::from_millis(500));
        let p2 = packet(2, Time::from_millis(600));
        monitor.record_tx(&p0);
        monitor.record_tx(&p1);
        monitor.record_tx(&p2);
        monitor.record_rx(&p0, Time::from_millis(100));
        monitor.record_rx(&p1, Time::from_millis(1_000));
        let stats = monitor.get(FlowId::ZERO).unwrap();
        assert_eq!(stats.tx_bytes, Bytes::new(1_500));
        assert_eq!(stats.mean_delay(), Some(Time::from_millis(300)));
        // 1000 B over one second
        assert!((stats.throughput() - 8_000.0).abs() < 1e-9);
        assert_eq!(stats.lost_packets(), 1);
        assert!((stats.loss_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_flow() {
        let mut monitor = FlowMonitor::default();
        monitor.register(FlowId::new(4));
        let stats = monitor.get(FlowId::new(4)).unwrap();
        assert_eq!(stats.mean_delay(), None);
        assert_eq!(stats.throughput(), 0.0);
        assert_eq!(stats.loss_ratio(), 0.0);
    }
}
