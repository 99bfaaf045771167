//! Aggregate traits for the engine's stateful records.
//!
//! A reorder request is the only aggregate today. Its lifecycle is decided by
//! pure code here and persisted field-by-field by the infrastructure layer.

use crate::error::{DomainError, DomainResult};

/// Identity plus a revision counter.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of transitions applied since creation. Stores compare it to
    /// reject writes based on a stale read.
    fn version(&self) -> u64;
}

/// What a writer believes the stored revision to be.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No check.
    Any,
    /// The stored revision must equal this value.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    /// Like [`matches`](Self::matches), as a [`DomainError::Conflict`] on mismatch.
    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            return Ok(());
        }
        Err(DomainError::conflict(format!(
            "stale write (expected {self:?}, stored revision {actual})"
        )))
    }
}

/// Command/event state machine.
///
/// `handle` looks at the current state and either refuses the command or
/// returns the events it implies; `apply` folds one event into the state.
/// Neither does IO.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: crate::event::Event + Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Fold one event into the state. Bumps `version()` by exactly one.
    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// `handle`, then `apply` every resulting event. State is untouched on error.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }
}
