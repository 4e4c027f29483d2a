//! Applications: per-node traffic sources started and stopped by scheduled events.

use std::{cell::RefCell, rc::Rc};

use evsim_core::{EventId, SimError, Simulator, Time};

use crate::types::NodeId;

/// An application shared between the events that drive it.
pub type AppRef<A> = Rc<RefCell<A>>;

/// Something that runs on a node between a start and a stop time.
///
/// Both hooks take the shared handle rather than `&mut self` so that they can hand clones of it
/// to the events they schedule.
pub trait Application: Sized + 'static {
    /// The node the application runs on. Its events execute in that node's context.
    fn node(&self) -> NodeId;

    /// Called at the start time.
    fn start(app: &AppRef<Self>, sim: &mut Simulator) -> Result<(), AppError>;

    /// Called at the stop time. Must cancel anything the application still has pending.
    fn stop(app: &AppRef<Self>, sim: &mut Simulator) -> Result<(), AppError>;
}

/// Handles to the start and stop events scheduled by [`install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Installed {
    /// The start event.
    pub start: EventId,
    /// The stop event.
    pub stop: EventId,
}

/// Schedules `app` to start `start` and stop `stop` after the current time, both in the
/// context of the application's node.
pub fn install<A: Application>(
    sim: &mut Simulator,
    app: &AppRef<A>,
    start: Time,
    stop: Time,
) -> Result<Installed, AppError> {
    if stop < start {
        return Err(AppError::StopBeforeStart { start, stop });
    }
    let context = app.borrow().node().context();
    let a = Rc::clone(app);
    let start = sim.try_schedule_with_context(context, start, move |sim| {
        A::start(&a, sim)?;
        Ok(())
    })?;
    let a = Rc::clone(app);
    let stop = sim.try_schedule_with_context(context, stop, move |sim| {
        A::stop(&a, sim)?;
        Ok(())
    })?;
    Ok(Installed { start, stop })
}

/// Application error.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The stop time precedes the start time.
    #[error("stop time {stop} is before start time {start}")]
    StopBeforeStart {
        /// Start time.
        start: Time,
        /// Stop time.
        stop: Time,
    },

    /// A channel was requested from a node the link does not touch.
    #[error("node {node} is not an endpoint of link {a}-{b}")]
    NotAnEndpoint {
        /// The node.
        node: NodeId,
        /// One link endpoint.
        a: NodeId,
        /// The other link endpoint.
        b: NodeId,
    },

    /// A link has zero bandwidth.
    #[error("link {a}-{b} has zero bandwidth")]
    ZeroBandwidth {
        /// One link endpoint.
        a: NodeId,
        /// The other link endpoint.
        b: NodeId,
    },

    /// A packet interval is not positive.
    #[error("packet interval must be positive, got {0}")]
    InvalidInterval(Time),

    /// Scheduler error.
    #[error(transparent)]
    Sim(#[from] SimError),
}

#[cfg(test)]
mod tests {
    use evsim_core::testing::Journal;

    use super::*;

    #[derive(Debug)]
    struct Blinker {
        node: NodeId,
        journal: Journal,
        tick: Option<EventId>,
    }

    impl Blinker {
        fn tick(app: &AppRef<Self>, sim: &mut Simulator) -> Result<(), AppError> {
            let journal = app.borrow().journal.clone();
            journal.record(sim, format!("tick ctx={}", sim.context()));
            let a = Rc::clone(app);
            let id = sim.try_schedule(Time::from_secs(1), move |sim| {
                Blinker::tick(&a, sim)?;
                Ok(())
            })?;
            app.borrow_mut().tick = Some(id);
            Ok(())
        }
    }

    impl Application for Blinker {
        fn node(&self) -> NodeId {
            self.node
        }

        fn start(app: &AppRef<Self>, sim: &mut Simulator) -> Result<(), AppError> {
            Blinker::tick(app, sim)
        }

        fn stop(app: &AppRef<Self>, sim: &mut Simulator) -> Result<(), AppError> {
            let journal = app.borrow().journal.clone();
            journal.record(sim, "stop");
            if let Some(id) = app.borrow_mut().tick.take() {
                sim.cancel(id);
            }
            Ok(())
        }
    }

    #[test]
    fn start_stop_cancels_pending_work() -> anyhow::Result<()> {
        let journal = Journal::new();
        let app = Rc::new(RefCell::new(Blinker {
            node: NodeId::new(3),
            journal: journal.clone(),
            tick: None,
        }));
        let mut sim = Simulator::new();
        install(&mut sim, &app, Time::from_secs(1), Time::from_millis(3_500))?;
        let summary = sim.run()?;
        insta::assert_snapshot!(journal.render(), @r###"
        tick ctx=3 @ 1000000000ns
        tick ctx=3 @ 2000000000ns
        tick ctx=3 @ 3000000000ns
        stop @ 3500000000ns
        "###);
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.end_time, Time::from_millis(3_500));
        Ok(())
    }

    #[test]
    fn stop_before_start_is_rejected() {
        let app = Rc::new(RefCell::new(Blinker {
            node: NodeId::new(0),
            journal: Journal::new(),
            tick: None,
        }));
        let mut sim = Simulator::new();
        let result = install(&mut sim, &app, Time::from_secs(2), Time::from_secs(1));
        assert!(matches!(result, Err(AppError::StopBeforeStart { .. })));
        assert!(sim.is_finished());
    }
}
