//! Suppliers and supplier notifications.
//!
//! Suppliers are owned by the surrounding application; the engine reads them
//! and only ever writes `last_contacted`. Notification records are the
//! engine's own append-only history.

pub mod notification;
pub mod payload;
pub mod supplier;

pub use notification::{NotificationRecord, NotificationStatus, NotificationType, NotifiedMedicine};
pub use payload::NotificationPayload;
pub use supplier::{Supplier, normalize_specialty};
