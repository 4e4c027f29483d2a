//! Helpers for tests that need to observe what a simulation did.

use std::{cell::RefCell, rc::Rc};

use crate::{scheduler::Simulator, units::Time};

/// A shared, append-only log of `(time, label)` entries written by callbacks.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Rc<RefCell<Vec<(Time, String)>>>,
}

impl Journal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `label` at the simulator's current time.
    pub fn record(&self, sim: &Simulator, label: impl Into<String>) {
        self.entries.borrow_mut().push((sim.now(), label.into()));
    }

    /// Returns a callback that records `label` when it runs.
    pub fn recorder(&self, label: impl Into<String>) -> impl FnOnce(&mut Simulator) + 'static {
        let journal = self.clone();
        let label = label.into();
        move |sim| journal.record(sim, label)
    }

    /// All entries in the order they were recorded.
    pub fn entries(&self) -> Vec<(Time, String)> {
        self.entries.borrow().clone()
    }

    /// Just the labels, in recording order.
    pub fn labels(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, label)| label.clone())
            .collect()
    }

    /// One `label @ time` line per entry.
    pub fn render(&self) -> String {
        self.entries
            .borrow()
            .iter()
            .map(|(time, label)| format!("{label} @ {time}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
