//! Reorder request domain module.
//!
//! The request lifecycle is a pure aggregate: commands are decided by
//! `handle`, state evolves through `apply`. Persistence and locking live in
//! the infrastructure layer.

pub mod request;

pub use request::{
    ApproveRequest, CancelReason, CancelRequest, CompleteRequest, OpenRequest, ReorderCommand,
    ReorderEvent, ReorderRequest, ReorderStatus, RequestApproved, RequestCancelled,
    RequestCompleted, RequestOpened, RequestUpdate,
};
