use std::cmp::Reverse;
use std::sync::RwLock;

use async_trait::async_trait;

use medstock_core::SupplierId;
use medstock_suppliers::NotificationRecord;

use crate::error::StoreError;

/// Append-only notification log.
#[async_trait]
pub trait NotificationHistory: Send + Sync {
    async fn append(&self, record: NotificationRecord) -> Result<(), StoreError>;

    /// Records for one supplier, newest first; ties are broken by id, highest first.
    async fn history_for(
        &self,
        supplier_id: &SupplierId,
    ) -> Result<Vec<NotificationRecord>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryNotificationHistory {
    records: RwLock<Vec<NotificationRecord>>,
}

impl InMemoryNotificationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationHistory for InMemoryNotificationHistory {
    async fn append(&self, record: NotificationRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        if records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::Conflict(format!(
                "notification {} already recorded",
                record.id
            )));
        }
        records.push(record);
        Ok(())
    }

    async fn history_for(
        &self,
        supplier_id: &SupplierId,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        let mut out: Vec<_> = records
            .iter()
            .filter(|r| &r.supplier_id == supplier_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| Reverse((r.timestamp, *r.id.as_uuid())));
        Ok(out)
    }
}
