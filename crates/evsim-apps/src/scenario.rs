//! This module defines [`Scenario`], a declarative description of links and traffic flows, and
//! [`run`], which simulates one and reports per-flow statistics.

use std::{collections::BTreeMap, rc::Rc};

use evsim_core::{BitsPerSec, Bytes, RunSummary, SimError, SimOpts, Simulator, Time};
use log::info;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    app::{install, AppError},
    channel::{Channel, ChannelRef, Link},
    sender::{Interval, PacketSender, SenderConfig},
    sink::{PacketSink, SinkRef},
    stats::{FlowMonitor, FlowStats},
    types::{FlowId, NodeId},
};

/// A set of point-to-point links and the flows sent over them.
#[derive(Debug, Clone, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize)]
pub struct Scenario {
    /// Random number generator seed.
    #[builder(default)]
    #[serde(default)]
    pub seed: u64,
    /// Simulation stop time. Without one, the simulation runs until every flow has stopped and
    /// every packet has been delivered.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub stop_time: Option<Time>,
    /// Links.
    pub links: Vec<Link>,
    /// Flows.
    pub flows: Vec<FlowSpec>,
}

/// One packet flow between two directly linked nodes.
#[derive(Debug, Clone, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize)]
pub struct FlowSpec {
    /// Unique flow ID.
    pub id: FlowId,
    /// Sending node.
    pub src: NodeId,
    /// Receiving node.
    pub dst: NodeId,
    /// Size of every packet.
    #[builder(setter(into))]
    pub packet_size: Bytes,
    /// Gap between packets.
    pub interval: Interval,
    /// Time the sender starts.
    pub start: Time,
    /// Time the sender stops.
    pub stop: Time,
    /// Stop sending after this many packets.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub max_packets: Option<u64>,
}

impl FlowSpec {
    fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            flow: self.id,
            src: self.src,
            dst: self.dst,
            packet_size: self.packet_size,
            interval: self.interval,
            max_packets: self.max_packets,
        }
    }
}

impl Scenario {
    pub(crate) fn validate(self) -> Result<ValidScenario, ScenarioError> {
        for link in &self.links {
            if let Some(node) = [link.a, link.b].into_iter().find(|&n| n == NodeId::RESERVED) {
                return Err(ScenarioError::ReservedNode(node));
            }
            if link.bandwidth == BitsPerSec::ZERO {
                return Err(ScenarioError::ZeroBandwidth {
                    a: link.a,
                    b: link.b,
                });
            }
            if link.delay.is_negative() {
                return Err(ScenarioError::NegativeLinkDelay {
                    a: link.a,
                    b: link.b,
                    delay: link.delay,
                });
            }
        }
        let mut seen = FxHashSet::default();
        for flow in &self.flows {
            if !seen.insert(flow.id) {
                return Err(ScenarioError::DuplicateFlow(flow.id));
            }
            if flow.start.is_negative() {
                return Err(ScenarioError::NegativeStart {
                    flow: flow.id,
                    start: flow.start,
                });
            }
            if flow.stop < flow.start {
                return Err(ScenarioError::StopBeforeStart {
                    flow: flow.id,
                    start: flow.start,
                    stop: flow.stop,
                });
            }
            if flow.interval.mean() <= Time::ZERO {
                return Err(ScenarioError::InvalidInterval(flow.id));
            }
            if !self.links.iter().any(|l| l.connects(flow.src, flow.dst)) {
                return Err(ScenarioError::NoLink {
                    flow: flow.id,
                    src: flow.src,
                    dst: flow.dst,
                });
            }
        }
        Ok(ValidScenario {
            opts: SimOpts {
                seed: self.seed,
                stop_time: self.stop_time,
            },
            links: self.links,
            flows: self.flows,
        })
    }
}

#[derive(Debug)]
pub(crate) struct ValidScenario {
    pub(crate) opts: SimOpts,
    pub(crate) links: Vec<Link>,
    pub(crate) flows: Vec<FlowSpec>,
}

impl ValidScenario {
    fn link_between(&self, src: NodeId, dst: NodeId) -> Option<&Link> {
        self.links.iter().find(|l| l.connects(src, dst))
    }
}

/// An error type that describes an invalid scenario.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// A link uses [`NodeId::RESERVED`].
    #[error("node ID {0} is reserved")]
    ReservedNode(NodeId),

    /// A link has zero bandwidth.
    #[error("link {a}-{b} has zero bandwidth")]
    ZeroBandwidth {
        /// One link endpoint.
        a: NodeId,
        /// The other link endpoint.
        b: NodeId,
    },

    /// A link has a negative propagation delay.
    #[error("link {a}-{b} has negative delay {delay}")]
    NegativeLinkDelay {
        /// One link endpoint.
        a: NodeId,
        /// The other link endpoint.
        b: NodeId,
        /// The delay.
        delay: Time,
    },

    /// Two flows share an ID.
    #[error("duplicate flow ID {0}")]
    DuplicateFlow(FlowId),

    /// A flow starts before time zero.
    #[error("flow {flow} starts at negative time {start}")]
    NegativeStart {
        /// The flow.
        flow: FlowId,
        /// Start time.
        start: Time,
    },

    /// A flow stops before it starts.
    #[error("flow {flow} stops at {stop}, before it starts at {start}")]
    StopBeforeStart {
        /// The flow.
        flow: FlowId,
        /// Start time.
        start: Time,
        /// Stop time.
        stop: Time,
    },

    /// A flow's packet interval is not positive.
    #[error("flow {0} has a non-positive packet interval")]
    InvalidInterval(FlowId),

    /// A flow's endpoints are not directly linked.
    #[error("no link between {src} and {dst} for flow {flow}")]
    NoLink {
        /// The flow.
        flow: FlowId,
        /// Sending node.
        src: NodeId,
        /// Receiving node.
        dst: NodeId,
    },
}

/// The outcome of simulating a [`Scenario`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Report {
    /// What the scheduler did.
    pub summary: RunSummary,
    /// Statistics for every flow, including flows that never sent.
    pub flows: BTreeMap<FlowId, FlowStats>,
}

/// Simulates `scenario` to completion.
///
/// Every node that is the destination of some flow gets a sink. Flows with the same source and
/// destination share a channel, and therefore a queue.
pub fn run(scenario: Scenario) -> Result<Report, Error> {
    let scenario = scenario.validate()?;
    let mut sim = Simulator::with_opts(scenario.opts.clone())?;
    let monitor = FlowMonitor::shared();
    let mut sinks: FxHashMap<NodeId, SinkRef> = FxHashMap::default();
    let mut channels: FxHashMap<(NodeId, NodeId), ChannelRef> = FxHashMap::default();
    for flow in &scenario.flows {
        monitor.borrow_mut().register(flow.id);
        let channel = match channels.get(&(flow.src, flow.dst)) {
            Some(channel) => Rc::clone(channel),
            None => {
                let link = scenario
                    .link_between(flow.src, flow.dst)
                    .ok_or(ScenarioError::NoLink {
                        flow: flow.id,
                        src: flow.src,
                        dst: flow.dst,
                    })?;
                let sink = sinks
                    .entry(flow.dst)
                    .or_insert_with(|| PacketSink::new(flow.dst, Rc::clone(&monitor)).shared());
                let channel =
                    Channel::new(link, flow.src, Rc::clone(sink), Rc::clone(&monitor))?.shared();
                channels.insert((flow.src, flow.dst), Rc::clone(&channel));
                channel
            }
        };
        let sender =
            PacketSender::new(flow.sender_config(), channel, Rc::clone(&monitor))?.shared();
        install(&mut sim, &sender, flow.start, flow.stop)?;
    }
    info!(
        "simulating {} flows over {} links",
        scenario.flows.len(),
        scenario.links.len()
    );
    let summary = sim.run()?;
    let flows = monitor.borrow().snapshot();
    sim.destroy();
    Ok(Report { summary, flows })
}

/// Error running a scenario.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid scenario.
    #[error("invalid scenario")]
    InvalidScenario(#[from] ScenarioError),

    /// Error building applications.
    #[error(transparent)]
    App(#[from] AppError),

    /// Scheduler error.
    #[error(transparent)]
    Sim(#[from] SimError),
}

#[cfg(test)]
mod tests {
    use evsim_core::Mbps;

    use super::*;

    fn two_flows() -> Scenario {
        Scenario::builder()
            .stop_time(Time::from_secs(1))
            .links(vec![Link::builder()
                .a(NodeId::new(0))
                .b(NodeId::new(1))
                .bandwidth(Mbps::new(8))
                .delay(Time::from_millis(2))
                .build()])
            .flows(vec![
                FlowSpec::builder()
                    .id(FlowId::new(0))
                    .src(NodeId::new(0))
                    .dst(NodeId::new(1))
                    .packet_size(Bytes::new(1_000))
                    .interval(Interval::Constant(Time::from_millis(100)))
                    .start(Time::ZERO)
                    .stop(Time::from_millis(950))
                    .build(),
                FlowSpec::builder()
                    .id(FlowId::new(1))
                    .src(NodeId::new(1))
                    .dst(NodeId::new(0))
                    .packet_size(Bytes::new(1_000))
                    .interval(Interval::Constant(Time::from_millis(250)))
                    .start(Time::from_millis(100))
                    .stop(Time::from_millis(950))
                    .build(),
            ])
            .build()
    }

    #[test]
    fn two_flows_in_opposite_directions() -> anyhow::Result<()> {
        let report = run(two_flows())?;
        let f0 = &report.flows[&FlowId::new(0)];
        assert_eq!(f0.tx_packets, 10);
        assert_eq!(f0.rx_packets, 10);
        assert_eq!(f0.delay_sum, Time::from_millis(30));
        assert_eq!(f0.last_rx, Some(Time::from_millis(903)));
        let f1 = &report.flows[&FlowId::new(1)];
        assert_eq!(f1.tx_packets, 4);
        assert_eq!(f1.delay_sum, Time::from_millis(12));
        assert_eq!(f1.first_tx, Some(Time::from_millis(100)));
        assert_eq!(
            report.summary,
            RunSummary {
                executed: 30,
                skipped: 1,
                end_time: Time::from_secs(1),
                pending: 0,
                halted: true,
            }
        );
        Ok(())
    }

    #[test]
    fn runs_are_reproducible() -> anyhow::Result<()> {
        let mut scenario = two_flows();
        scenario.seed = 42;
        for flow in &mut scenario.flows {
            flow.interval = Interval::Exponential {
                mean: flow.interval.mean(),
            };
        }
        assert_eq!(run(scenario.clone())?, run(scenario)?);
        Ok(())
    }

    #[test]
    fn flows_share_a_channel_queue() -> anyhow::Result<()> {
        let mut scenario = two_flows();
        scenario.links[0].queue_limit = Some(0);
        // Both flows now send from node 0 at the same instants.
        scenario.flows[1].src = NodeId::new(0);
        scenario.flows[1].dst = NodeId::new(1);
        scenario.flows[1].interval = Interval::Constant(Time::from_millis(100));
        scenario.flows[1].start = Time::ZERO;
        let report = run(scenario)?;
        assert_eq!(report.flows[&FlowId::new(0)].dropped, 0);
        assert_eq!(report.flows[&FlowId::new(1)].dropped, 10);
        assert_eq!(report.flows[&FlowId::new(1)].loss_ratio(), 1.0);
        Ok(())
    }

    #[test]
    fn silent_flows_are_reported() -> anyhow::Result<()> {
        let mut scenario = two_flows();
        scenario.flows[1].start = Time::from_secs(2);
        scenario.flows[1].stop = Time::from_secs(3);
        let report = run(scenario)?;
        assert_eq!(report.flows[&FlowId::new(1)], FlowStats::default());
        Ok(())
    }

    #[test]
    fn invalid_scenarios() {
        let mut dup = two_flows();
        dup.flows[1].id = FlowId::new(0);
        assert!(matches!(
            dup.validate(),
            Err(ScenarioError::DuplicateFlow(id)) if id == FlowId::new(0)
        ));

        let mut unlinked = two_flows();
        unlinked.flows[0].dst = NodeId::new(5);
        assert!(matches!(
            unlinked.validate(),
            Err(ScenarioError::NoLink { .. })
        ));

        let mut backwards = two_flows();
        backwards.flows[0].stop = Time::ZERO;
        backwards.flows[0].start = Time::from_secs(1);
        assert!(matches!(
            backwards.validate(),
            Err(ScenarioError::StopBeforeStart { .. })
        ));

        let mut zero_gap = two_flows();
        zero_gap.flows[1].interval = Interval::Constant(Time::ZERO);
        assert!(matches!(
            zero_gap.validate(),
            Err(ScenarioError::InvalidInterval(_))
        ));

        let mut early = two_flows();
        early.flows[1].start = Time::from_millis(-1);
        assert!(matches!(
            early.validate(),
            Err(ScenarioError::NegativeStart { start, .. }) if start == Time::from_millis(-1)
        ));

        let mut dead_link = two_flows();
        dead_link.links[0].bandwidth = BitsPerSec::ZERO;
        assert!(matches!(
            dead_link.validate(),
            Err(ScenarioError::ZeroBandwidth { .. })
        ));

        // Small enough that the run would otherwise succeed with arrivals before the
        // serialization finishes.
        let mut time_travel = two_flows();
        time_travel.links[0].delay = Time::from_micros(-500);
        assert!(matches!(
            time_travel.validate(),
            Err(ScenarioError::NegativeLinkDelay { delay, .. }) if delay == Time::from_micros(-500)
        ));
    }

    #[test]
    fn reserved_node_is_rejected() {
        let mut scenario = two_flows();
        scenario.links[0].b = NodeId::RESERVED;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::ReservedNode(node)) if node == NodeId::RESERVED
        ));
    }

    #[test]
    fn invalid_scenario_fails_before_running() {
        let mut scenario = two_flows();
        scenario.links[0].delay = Time::from_millis(-5);
        assert!(matches!(
            run(scenario),
            Err(Error::InvalidScenario(ScenarioError::NegativeLinkDelay { .. }))
        ));
    }

    #[test]
    fn parse_json() -> anyhow::Result<()> {
        let json = r#"{
            "seed": 3,
            "stop_time": 2000000000,
            "links": [{ "a": 0, "b": 1, "bandwidth": 1000000000, "delay": 1000 }],
            "flows": [{
                "id": 0,
                "src": 0,
                "dst": 1,
                "packet_size": 1500,
                "interval": { "exponential": { "mean": 1000000 } },
                "start": 0,
                "stop": 1000000000,
                "max_packets": 100
            }]
        }"#;
        let scenario: Scenario = serde_json::from_str(json)?;
        assert_eq!(scenario.links[0].queue_limit, None);
        assert_eq!(
            scenario.flows[0].interval,
            Interval::Exponential {
                mean: Time::from_millis(1)
            }
        );
        let report = run(scenario)?;
        assert_eq!(report.flows[&FlowId::new(0)].rx_packets, 100);
        Ok(())
    }
}
