//! Medicine stock module.
//!
//! This crate classifies medicine stock against reorder thresholds, implemented
//! purely as deterministic domain logic (no IO, no storage). Snapshots are read
//! from the surrounding application each evaluation cycle; nothing here owns
//! them.

pub mod evaluator;
pub mod snapshot;

pub use evaluator::{Evaluation, RejectedSnapshot, Severity, ShortageEvent, evaluate};
pub use snapshot::{
    DEFAULT_REORDER_LEVEL, DEFAULT_REORDER_QUANTITY, MedicineSnapshot, StockState, classify,
};
