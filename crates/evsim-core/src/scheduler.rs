//! The discrete-event scheduler.
//!
//! A [`Simulator`] owns a virtual clock and a set of pending events. Events are dispatched in
//! `(time, sequence number)` order, so two events due at the same time run in the order they
//! were scheduled, and two runs of the same program dispatch identically. Callbacks receive
//! `&mut Simulator` and may schedule or cancel further events while the loop is running.

use std::{cmp::Reverse, collections::BinaryHeap};

use log::{debug, info, trace, warn};
use rand::{rngs::StdRng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::{
    event::{Action, Callback, Context, EventId, Pending},
    opts::SimOpts,
    units::Time,
};

/// Whether a [`Simulator::run`] call is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum State {
    /// No run in progress.
    Idle,
    /// The dispatch loop is executing.
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Never,
    // A stop sentinel was reached; events due at this time still run.
    After(Time),
    Now,
}

/// A discrete-event simulator.
#[derive(Debug)]
pub struct Simulator {
    opts: SimOpts,
    now: Time,
    context: Context,
    next_uid: u64,
    // Entries of cancelled events stay here until popped; `pending` is authoritative.
    queue: BinaryHeap<Reverse<EventId>>,
    pending: FxHashMap<u64, Pending>,
    state: State,
    halt: Halt,
    executed: u64,
    rng: StdRng,
}

impl Simulator {
    /// Creates an idle simulator at time zero with default options.
    pub fn new() -> Self {
        let opts = SimOpts::default();
        let rng = StdRng::seed_from_u64(opts.seed);
        Self {
            opts,
            now: Time::ZERO,
            context: Context::NONE,
            next_uid: 0,
            queue: BinaryHeap::new(),
            pending: FxHashMap::default(),
            state: State::Idle,
            halt: Halt::Never,
            executed: 0,
            rng,
        }
    }

    /// Creates a simulator from options, installing a stop sentinel if `opts.stop_time` is set.
    ///
    /// Fails if the stop time is negative.
    pub fn with_opts(opts: SimOpts) -> Result<Self, SimError> {
        let mut sim = Self::new();
        sim.rng = StdRng::seed_from_u64(opts.seed);
        let stop_time = opts.stop_time;
        sim.opts = opts;
        if let Some(stop_time) = stop_time {
            sim.stop(stop_time)?;
        }
        Ok(sim)
    }

    /// Schedules `f` to run `delay` after the current time, in the current context.
    ///
    /// Fails with [`SimError::NegativeDelay`] if `delay` is negative; nothing is scheduled in
    /// that case.
    pub fn schedule<F>(&mut self, delay: Time, f: F) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.try_schedule(delay, infallible(f))
    }

    /// Like [`schedule`](Self::schedule), but the callback may fail. An error returned by `f`
    /// halts [`run`](Self::run), which then returns [`SimError::Callback`].
    pub fn try_schedule<F>(&mut self, delay: Time, f: F) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Simulator) -> anyhow::Result<()> + 'static,
    {
        let ts = self.due(delay)?;
        Ok(self.push(ts, self.context, Action::Callback(Box::new(f))))
    }

    /// Schedules `f` to run at the current time, after every event already due now.
    pub fn schedule_now<F>(&mut self, f: F) -> EventId
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        let callback: Callback = Box::new(infallible(f));
        self.push(self.now, self.context, Action::Callback(callback))
    }

    /// Schedules `f` to run `delay` after the current time with [`context()`](Self::context)
    /// set to `context`. Events scheduled from inside `f` inherit that context.
    pub fn schedule_with_context<F>(
        &mut self,
        context: Context,
        delay: Time,
        f: F,
    ) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.try_schedule_with_context(context, delay, infallible(f))
    }

    /// Fallible version of [`schedule_with_context`](Self::schedule_with_context).
    pub fn try_schedule_with_context<F>(
        &mut self,
        context: Context,
        delay: Time,
        f: F,
    ) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Simulator) -> anyhow::Result<()> + 'static,
    {
        let ts = self.due(delay)?;
        Ok(self.push(ts, context, Action::Callback(Box::new(f))))
    }

    /// Cancels a pending event and releases its callback.
    ///
    /// Cancelling an event that already ran, was already cancelled, or belongs to another
    /// simulator does nothing.
    pub fn cancel(&mut self, id: EventId) {
        if self.is_running(id) {
            self.pending.remove(&id.uid());
            debug!("cancelled {id}");
        }
    }

    /// Returns `true` if the event has neither run nor been cancelled.
    pub fn is_running(&self, id: EventId) -> bool {
        self.pending.get(&id.uid()).is_some_and(|p| p.id == id)
    }

    /// Returns `true` if the event has run or has been cancelled.
    pub fn is_expired(&self, id: EventId) -> bool {
        !self.is_running(id)
    }

    /// Time remaining until a pending event is due, or zero if it is no longer pending.
    pub fn delay_left(&self, id: EventId) -> Time {
        if self.is_running(id) {
            id.ts() - self.now
        } else {
            Time::ZERO
        }
    }

    /// Runs the dispatch loop until no events remain, a stop sentinel's time has been
    /// exhausted, [`stop_now`](Self::stop_now) is called, or a callback fails.
    ///
    /// Events left unexecuted remain pending; calling `run` again resumes from them. Calling
    /// `run` from inside a callback fails with [`SimError::AlreadyRunning`].
    pub fn run(&mut self) -> Result<RunSummary, SimError> {
        if self.state == State::Running {
            return Err(SimError::AlreadyRunning);
        }
        let guard = RunGuard::enter(self);
        guard.sim.dispatch()
    }

    /// Schedules a stop sentinel `delay` after the current time. Once the sentinel is reached,
    /// events due at exactly that time still run, but nothing later does.
    ///
    /// The returned handle can be passed to [`cancel`](Self::cancel).
    pub fn stop(&mut self, delay: Time) -> Result<EventId, SimError> {
        let ts = self.due(delay)?;
        let id = self.push(ts, Context::NONE, Action::Stop);
        debug!("stop requested at {ts}");
        Ok(id)
    }

    /// Halts the loop as soon as the currently executing callback returns. Has no effect
    /// outside of a run.
    pub fn stop_now(&mut self) {
        if self.state == State::Running {
            self.halt = Halt::Now;
        }
    }

    /// The current virtual time.
    pub fn now(&self) -> Time {
        self.now
    }

    /// The context of the executing event, or [`Context::NONE`] outside of one.
    pub fn context(&self) -> Context {
        self.context
    }

    /// The largest time an event can be scheduled at.
    pub fn maximum_time(&self) -> Time {
        Time::MAX
    }

    /// Returns `true` if no events are pending.
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of pending events, stop sentinels included.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of callbacks executed since creation or the last [`destroy`](Self::destroy).
    pub fn event_count(&self) -> u64 {
        self.executed
    }

    /// Whether a run is in progress.
    pub fn state(&self) -> State {
        self.state
    }

    /// The simulator's random number generator. Draws are reproducible for a given seed.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Drops every pending event and resets the clock, counters and random number generator.
    ///
    /// Calling this from inside a callback does nothing.
    pub fn destroy(&mut self) {
        if self.state == State::Running {
            warn!("ignoring destroy() called from inside a running simulation");
            return;
        }
        debug!("destroying simulator with {} pending events", self.pending.len());
        self.queue.clear();
        self.pending.clear();
        self.now = Time::ZERO;
        self.context = Context::NONE;
        self.halt = Halt::Never;
        self.executed = 0;
        self.rng = StdRng::seed_from_u64(self.opts.seed);
        // `next_uid` is kept so that handles issued before the reset stay inert.
    }

    fn due(&self, delay: Time) -> Result<Time, SimError> {
        if delay.is_negative() {
            return Err(SimError::NegativeDelay { delay });
        }
        self.now.checked_add(delay).ok_or(SimError::TimeOverflow {
            now: self.now,
            delay,
        })
    }

    fn push(&mut self, ts: Time, context: Context, action: Action) -> EventId {
        let id = EventId::new(ts, self.next_uid, context);
        self.next_uid += 1;
        self.queue.push(Reverse(id));
        self.pending.insert(id.uid(), Pending { id, action });
        id
    }

    fn dispatch(&mut self) -> Result<RunSummary, SimError> {
        self.halt = Halt::Never;
        let executed_before = self.executed;
        let mut skipped = 0;
        while let Some(&Reverse(next)) = self.queue.peek() {
            match self.halt {
                Halt::Now => break,
                Halt::After(t) if next.ts() > t => break,
                _ => {}
            }
            self.queue.pop();
            let Some(Pending { id, action }) = self.pending.remove(&next.uid()) else {
                // cancelled
                skipped += 1;
                continue;
            };
            debug_assert!(id.ts() >= self.now, "{id} is in the past");
            self.now = id.ts();
            self.context = id.context();
            match action {
                Action::Stop => {
                    debug!("stop sentinel reached at {}", self.now);
                    self.halt = Halt::After(self.now);
                }
                Action::Callback(f) => {
                    trace!("dispatching {id} in context {}", self.context);
                    self.executed += 1;
                    f(self).map_err(|source| SimError::Callback { event: id, source })?;
                }
            }
        }
        self.context = Context::NONE;
        let summary = RunSummary {
            executed: self.executed - executed_before,
            skipped,
            end_time: self.now,
            pending: self.pending.len(),
            halted: self.halt != Halt::Never,
        };
        info!(
            "simulation stopped at {}: {} events executed, {} pending",
            summary.end_time, summary.executed, summary.pending
        );
        Ok(summary)
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

fn infallible<F>(f: F) -> impl FnOnce(&mut Simulator) -> anyhow::Result<()> + 'static
where
    F: FnOnce(&mut Simulator) + 'static,
{
    move |sim| {
        f(sim);
        Ok(())
    }
}

// Restores `Idle` however the loop exits, including by unwinding out of a panicking callback.
struct RunGuard<'a> {
    sim: &'a mut Simulator,
}

impl<'a> RunGuard<'a> {
    fn enter(sim: &'a mut Simulator) -> Self {
        sim.state = State::Running;
        Self { sim }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.sim.state = State::Idle;
        self.sim.context = Context::NONE;
    }
}

/// Statistics about one [`Simulator::run`] call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunSummary {
    /// Callbacks executed during the run.
    pub executed: u64,
    /// Cancelled entries discarded during the run.
    pub skipped: u64,
    /// Virtual time when the run ended.
    pub end_time: Time,
    /// Events still pending when the run ended.
    pub pending: usize,
    /// `true` if the run ended because of a stop rather than running out of events.
    pub halted: bool,
}

/// Scheduler error.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// An event was scheduled with a negative delay.
    #[error("cannot schedule an event with negative delay {delay}")]
    NegativeDelay {
        /// The offending delay.
        delay: Time,
    },

    /// The event time does not fit in a [`Time`].
    #[error("event time overflows: {now} + {delay}")]
    TimeOverflow {
        /// The current time.
        now: Time,
        /// The requested delay.
        delay: Time,
    },

    /// `run()` was called from inside a callback.
    #[error("the simulator is already running")]
    AlreadyRunning,

    /// A callback returned an error.
    #[error("callback for {event} failed")]
    Callback {
        /// The event whose callback failed.
        event: EventId,
        /// The callback's error.
        #[source]
        source: anyhow::Error,
    },
}
