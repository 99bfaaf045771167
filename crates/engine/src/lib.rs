//! Medicine reorder & supplier notification engine.
//!
//! [`ReorderEngine`] wires the pure evaluator and request aggregate to the
//! collaborator boundaries defined in `medstock-infra`, and exposes the
//! operations callers use: evaluation cycles, request transitions and
//! supplier notifications.

pub mod engine;
pub mod seed;

pub use engine::{ApprovalOutcome, Collaborators, ReorderEngine};
pub use seed::{Seed, SeedError};
