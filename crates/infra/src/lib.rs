//! Infrastructure layer: collaborator boundaries, locking, workflow
//! orchestration, notification dispatch, scheduling and configuration.
//!
//! Everything that performs IO goes through the async traits defined here.
//! In-memory adapters are provided for each boundary (tests/dev).

pub mod config;
pub mod deadline;
pub mod error;
pub mod keyed_lock;
pub mod notify;
pub mod request_store;
pub mod scheduler;
pub mod snapshots;
pub mod workflow;

pub use config::{ConfigError, EngineConfig};
pub use error::{EngineError, StoreError, TransportError};
pub use keyed_lock::KeyedLocks;
pub use scheduler::{CycleError, CycleReport, CycleRunner, EvaluationScheduler, SchedulerHandle, SchedulerStats};
pub use workflow::{ReorderOutcome, ReorderWorkflow};
