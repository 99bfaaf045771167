use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate.
pub trait Event {
    /// Stable, dotted type name (e.g. `reorder.request.approved`).
    fn event_type(&self) -> &'static str;

    fn occurred_at(&self) -> DateTime<Utc>;
}
