//! Supplier notification subsystem.
//!
//! The dispatcher renders a payload per supplier, hands it to the transport,
//! and records the outcome in an append-only history. Supplier records are
//! read from the directory; only `last_contacted` is ever written back.

pub mod directory;
pub mod dispatcher;
pub mod history;
pub mod transport;

pub use directory::{InMemorySupplierDirectory, SupplierDirectory};
pub use dispatcher::{NotificationDispatcher, SupplierOutcome};
pub use history::{InMemoryNotificationHistory, NotificationHistory};
pub use transport::{DeliveryReceipt, LogTransport, RecordingTransport, SupplierTransport};
