//! Reorder request persistence boundary.
//!
//! The workflow owns all transition logic; the store only keeps the latest
//! state per request and enforces two secondary defenses: at most one active
//! request per medicine, and optimistic version checks on update.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryRequestStore;
pub use r#trait::ReorderRequestStore;
