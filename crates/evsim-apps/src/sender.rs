//! A packet source that sends fixed-size packets at constant or exponentially distributed
//! intervals.

use std::{cell::RefCell, rc::Rc};

use evsim_core::{Bytes, EventId, Simulator, Time};
use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Exp};

use crate::{
    app::{AppError, AppRef, Application},
    channel::ChannelRef,
    stats::MonitorRef,
    types::{FlowId, NodeId, Packet},
};

/// Time between consecutive packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// A fixed gap.
    Constant(Time),
    /// Exponentially distributed gaps, i.e. Poisson arrivals.
    Exponential {
        /// Mean gap.
        mean: Time,
    },
}

impl Interval {
    /// The configured (mean) gap.
    pub fn mean(&self) -> Time {
        match *self {
            Interval::Constant(gap) => gap,
            Interval::Exponential { mean } => mean,
        }
    }
}

/// Configuration of a [`PacketSender`].
#[derive(Debug, Clone, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize)]
pub struct SenderConfig {
    /// Flow the packets belong to.
    pub flow: FlowId,
    /// Sending node.
    pub src: NodeId,
    /// Receiving node.
    pub dst: NodeId,
    /// Size of every packet.
    #[builder(setter(into))]
    pub packet_size: Bytes,
    /// Gap between packets.
    pub interval: Interval,
    /// Stop sending after this many packets.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub max_packets: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
enum Gap {
    Constant(Time),
    Exponential(Exp<f64>),
}

impl Gap {
    fn sample<R: Rng>(&self, rng: &mut R) -> Time {
        match self {
            Gap::Constant(gap) => *gap,
            Gap::Exponential(exp) => Time::from_secs_f64(exp.sample(rng)),
        }
    }
}

/// An [`Application`] that sends packets over a channel from its start time until its stop
/// time or until `max_packets` have been sent.
#[derive(Debug)]
pub struct PacketSender {
    config: SenderConfig,
    gap: Gap,
    channel: ChannelRef,
    monitor: MonitorRef,
    send_event: Option<EventId>,
    sent: u64,
    running: bool,
}

impl PacketSender {
    /// Creates a sender transmitting on `channel`.
    ///
    /// Fails with [`AppError::InvalidInterval`] unless the interval is positive.
    pub fn new(
        config: SenderConfig,
        channel: ChannelRef,
        monitor: MonitorRef,
    ) -> Result<Self, AppError> {
        let mean = config.interval.mean();
        if mean <= Time::ZERO {
            return Err(AppError::InvalidInterval(mean));
        }
        let gap = match config.interval {
            Interval::Constant(gap) => Gap::Constant(gap),
            Interval::Exponential { mean } => Gap::Exponential(
                Exp::new(1.0 / mean.as_secs_f64()).map_err(|_| AppError::InvalidInterval(mean))?,
            ),
        };
        Ok(Self {
            config,
            gap,
            channel,
            monitor,
            send_event: None,
            sent: 0,
            running: false,
        })
    }

    /// Wraps the sender for sharing.
    pub fn shared(self) -> AppRef<Self> {
        Rc::new(RefCell::new(self))
    }

    /// Packets sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Returns `true` between start and stop, while packets remain to be sent.
    pub fn is_running(&self) -> bool {
        self.running
    }

    fn send(app: &AppRef<Self>, sim: &mut Simulator) -> Result<(), AppError> {
        let mut this = app.borrow_mut();
        this.send_event = None;
        if !this.running {
            return Ok(());
        }
        let packet = Packet {
            flow: this.config.flow,
            seq: this.sent,
            src: this.config.src,
            dst: this.config.dst,
            size: this.config.packet_size,
            sent_at: sim.now(),
        };
        this.sent += 1;
        this.monitor.borrow_mut().record_tx(&packet);
        this.channel.borrow_mut().transmit(sim, packet)?;

        let sent = this.sent;
        if this.config.max_packets.is_some_and(|max| sent >= max) {
            debug!("flow {} sent all {sent} packets", this.config.flow);
            this.running = false;
            return Ok(());
        }
        let gap = this.gap.sample(sim.rng());
        let a = Rc::clone(app);
        let id = sim.try_schedule(gap, move |sim| {
            PacketSender::send(&a, sim)?;
            Ok(())
        })?;
        this.send_event = Some(id);
        Ok(())
    }
}

impl Application for PacketSender {
    fn node(&self) -> NodeId {
        self.config.src
    }

    fn start(app: &AppRef<Self>, sim: &mut Simulator) -> Result<(), AppError> {
        {
            let mut this = app.borrow_mut();
            debug!("flow {} starting at {}", this.config.flow, sim.now());
            this.running = true;
        }
        PacketSender::send(app, sim)
    }

    fn stop(app: &AppRef<Self>, sim: &mut Simulator) -> Result<(), AppError> {
        let mut this = app.borrow_mut();
        debug!(
            "flow {} stopping at {} after {} packets",
            this.config.flow,
            sim.now(),
            this.sent
        );
        this.running = false;
        if let Some(id) = this.send_event.take() {
            sim.cancel(id);
        }
        Ok(())
    }
}
