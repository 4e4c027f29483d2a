//! Event handles and the actions stored behind them.

use derivative::Derivative;

use crate::{scheduler::Simulator, units::Time};

identifier!(Context, u32);

impl Context {
    /// The context of code that is not running on behalf of any node, e.g. setup code before
    /// [`Simulator::run`] or the stop sentinel.
    pub const NONE: Context = Context::new(u32::MAX);
}

/// A handle to a scheduled event, returned by the `schedule` family of methods and accepted by
/// [`Simulator::cancel`], [`Simulator::is_running`] and [`Simulator::delay_left`].
///
/// Handles order by `(ts, uid)`, which is exactly the order in which events are dispatched.
/// Sequence numbers are never reused by a simulator, so a stale handle can never refer to a
/// newer event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct EventId {
    ts: Time,
    uid: u64,
    context: Context,
}

impl EventId {
    pub(crate) fn new(ts: Time, uid: u64, context: Context) -> Self {
        Self { ts, uid, context }
    }

    /// The virtual time at which the event is (or was) due.
    pub fn ts(&self) -> Time {
        self.ts
    }

    /// The sequence number breaking ties between events due at the same time.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// The context the event executes in.
    pub fn context(&self) -> Context {
        self.context
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}@{}", self.uid, self.ts)
    }
}

/// A unit of work executed by the simulator. Returning an error halts [`Simulator::run`].
pub type Callback = Box<dyn FnOnce(&mut Simulator) -> anyhow::Result<()>>;

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) enum Action {
    Callback(#[derivative(Debug = "ignore")] Callback),
    Stop,
}

/// A live event: its handle plus what to do when it comes due.
#[derive(Debug)]
pub(crate) struct Pending {
    pub(crate) id: EventId,
    pub(crate) action: Action,
}
