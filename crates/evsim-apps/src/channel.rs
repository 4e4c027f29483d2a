//! Point-to-point links and the one-directional channels that carry packets over them.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use evsim_core::{BitsPerSec, Simulator, Time};
use log::debug;

use crate::{
    app::AppError,
    sink::SinkRef,
    stats::MonitorRef,
    types::{NodeId, Packet},
};

/// A bidirectional point-to-point link.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    typed_builder::TypedBuilder,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Link {
    /// One endpoint.
    pub a: NodeId,
    /// The other endpoint.
    pub b: NodeId,
    /// Transmission rate in each direction.
    #[builder(setter(into))]
    pub bandwidth: BitsPerSec,
    /// Propagation delay.
    pub delay: Time,
    /// Packets that may wait behind the one being transmitted before new ones are dropped.
    /// Unlimited if unset.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub queue_limit: Option<usize>,
}

impl Link {
    /// Returns `true` if the link connects `x` and `y`, in either direction.
    pub fn connects(&self, x: NodeId, y: NodeId) -> bool {
        self.a == x && self.b == y || self.a == y && self.b == x
    }
}

/// A [`Channel`] shared between the senders transmitting on it.
pub type ChannelRef = Rc<RefCell<Channel>>;

/// What happened to a packet handed to [`Channel::transmit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmit {
    /// The packet will reach the sink at `arrival`.
    Queued {
        /// Delivery time.
        arrival: Time,
    },
    /// The queue was full.
    Dropped,
}

/// One direction of a [`Link`]: a FIFO transmitter followed by a fixed propagation delay.
#[derive(Debug)]
pub struct Channel {
    src: NodeId,
    dst: NodeId,
    bandwidth: BitsPerSec,
    delay: Time,
    queue_limit: Option<usize>,
    busy_until: Time,
    // Completion times of packets not yet fully serialized, oldest first.
    backlog: VecDeque<Time>,
    sink: SinkRef,
    monitor: MonitorRef,
}

impl Channel {
    /// Creates the direction of `link` that starts at `src`, delivering into `sink`.
    pub fn new(
        link: &Link,
        src: NodeId,
        sink: SinkRef,
        monitor: MonitorRef,
    ) -> Result<Self, AppError> {
        let dst = if src == link.a {
            link.b
        } else if src == link.b {
            link.a
        } else {
            return Err(AppError::NotAnEndpoint {
                node: src,
                a: link.a,
                b: link.b,
            });
        };
        if link.bandwidth == BitsPerSec::ZERO {
            return Err(AppError::ZeroBandwidth {
                a: link.a,
                b: link.b,
            });
        }
        Ok(Self {
            src,
            dst,
            bandwidth: link.bandwidth,
            delay: link.delay,
            queue_limit: link.queue_limit,
            busy_until: Time::ZERO,
            backlog: VecDeque::new(),
            sink,
            monitor,
        })
    }

    /// Wraps the channel for sharing.
    pub fn shared(self) -> ChannelRef {
        Rc::new(RefCell::new(self))
    }

    /// The sending end.
    pub fn src(&self) -> NodeId {
        self.src
    }

    /// The receiving end.
    pub fn dst(&self) -> NodeId {
        self.dst
    }

    /// Enqueues `packet` and schedules its delivery on the receiver's context, or drops it if the
    /// queue is full.
    pub fn transmit(&mut self, sim: &mut Simulator, packet: Packet) -> Result<Transmit, AppError> {
        let now = sim.now();
        while self.backlog.front().is_some_and(|&done| done <= now) {
            self.backlog.pop_front();
        }
        // The head of the backlog is on the wire, the rest are waiting.
        let waiting = self.backlog.len().checked_sub(1);
        if waiting.zip(self.queue_limit).is_some_and(|(n, limit)| n >= limit) {
            debug!(
                "{}->{} queue full, dropping packet {} of flow {}",
                self.src, self.dst, packet.seq, packet.flow
            );
            self.monitor.borrow_mut().record_drop(&packet);
            return Ok(Transmit::Dropped);
        }
        let tx_time = self
            .bandwidth
            .tx_time(packet.size)
            .ok_or(AppError::ZeroBandwidth {
                a: self.src,
                b: self.dst,
            })?;
        let done = self.busy_until.max(now) + tx_time;
        self.busy_until = done;
        self.backlog.push_back(done);
        let arrival = done + self.delay;
        let sink = Rc::clone(&self.sink);
        sim.schedule_with_context(self.dst.context(), arrival - now, move |sim| {
            sink.borrow_mut().receive(sim, packet)
        })?;
        Ok(Transmit::Queued { arrival })
    }
}

#[cfg(test)]
mod tests {
    use evsim_core::{Bytes, Mbps};

    use super::*;
    use crate::{sink::PacketSink, stats::FlowMonitor, types::FlowId};

    fn link(queue_limit: Option<usize>) -> Link {
        Link {
            a: NodeId::new(0),
            b: NodeId::new(1),
            // 1000 B takes 1 ms to serialize
            bandwidth: Mbps::new(8).into(),
            delay: Time::from_millis(2),
            queue_limit,
        }
    }

    fn packet(seq: u64) -> Packet {
        Packet {
            flow: FlowId::ZERO,
            seq,
            src: NodeId::new(0),
            dst: NodeId::new(1),
            size: Bytes::new(1_000),
            sent_at: Time::ZERO,
        }
    }

    fn setup(queue_limit: Option<usize>) -> anyhow::Result<(ChannelRef, MonitorRef)> {
        let monitor = FlowMonitor::shared();
        let sink = PacketSink::new(NodeId::new(1), Rc::clone(&monitor)).shared();
        let channel =
            Channel::new(&link(queue_limit), NodeId::new(0), sink, Rc::clone(&monitor))?.shared();
        Ok((channel, monitor))
    }

    #[test]
    fn back_to_back_packets_queue() -> anyhow::Result<()> {
        let (channel, monitor) = setup(None)?;
        let mut sim = Simulator::new();
        let outcomes = (0..3)
            .map(|seq| channel.borrow_mut().transmit(&mut sim, packet(seq)))
            .collect::<Result<Vec<_>, _>>()?;
        let arrivals = [3, 4, 5].map(|ms| Transmit::Queued {
            arrival: Time::from_millis(ms),
        });
        assert_eq!(outcomes, arrivals);
        sim.run()?;
        let stats = monitor.borrow().snapshot()[&FlowId::ZERO].clone();
        assert_eq!(stats.rx_packets, 3);
        assert_eq!(stats.mean_delay(), Some(Time::from_millis(4)));
        assert_eq!(stats.last_rx, Some(Time::from_millis(5)));
        Ok(())
    }

    #[test]
    fn idle_channel_does_not_queue() -> anyhow::Result<()> {
        let (channel, monitor) = setup(Some(0))?;
        let mut sim = Simulator::new();
        for seq in 0..3 {
            let channel = Rc::clone(&channel);
            sim.try_schedule(Time::from_millis(10 * seq as i64), move |sim| {
                channel.borrow_mut().transmit(sim, packet(seq))?;
                Ok(())
            })?;
        }
        sim.run()?;
        let stats = monitor.borrow().snapshot()[&FlowId::ZERO].clone();
        assert_eq!(stats.rx_packets, 3);
        assert_eq!(stats.dropped, 0);
        Ok(())
    }

    #[test]
    fn full_queue_drops() -> anyhow::Result<()> {
        let (channel, monitor) = setup(Some(1))?;
        let mut sim = Simulator::new();
        let outcomes = (0..3)
            .map(|seq| channel.borrow_mut().transmit(&mut sim, packet(seq)))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(outcomes[2], Transmit::Dropped);
        sim.run()?;
        let stats = monitor.borrow().snapshot()[&FlowId::ZERO].clone();
        assert_eq!(stats.rx_packets, 2);
        assert_eq!(stats.dropped, 1);
        Ok(())
    }

    #[test]
    fn reverse_direction_delivers_to_first_endpoint() -> anyhow::Result<()> {
        let monitor = FlowMonitor::shared();
        let sink = PacketSink::new(NodeId::new(0), Rc::clone(&monitor)).shared();
        let mut channel = Channel::new(&link(None), NodeId::new(1), Rc::clone(&sink), monitor)?;
        assert_eq!((channel.src(), channel.dst()), (NodeId::new(1), NodeId::new(0)));
        let mut sim = Simulator::new();
        let reply = Packet {
            src: channel.src(),
            dst: channel.dst(),
            ..packet(0)
        };
        channel.transmit(&mut sim, reply)?;
        channel.transmit(&mut sim, reply)?;
        assert_eq!(sink.borrow().received(), 0);
        sim.run()?;
        assert_eq!(sink.borrow().received(), 2);
        assert_eq!(sim.now(), Time::from_millis(4));
        Ok(())
    }

    #[test]
    fn rejects_foreign_source() {
        let monitor = FlowMonitor::shared();
        let sink = PacketSink::new(NodeId::new(1), Rc::clone(&monitor)).shared();
        let result = Channel::new(&link(None), NodeId::new(7), sink, monitor);
        assert!(matches!(result, Err(AppError::NotAnEndpoint { .. })));
    }
}
