use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medstock_core::{DomainError, DomainResult, MedicineId, NotificationId, SupplierId};

/// What the supplier is being told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    LowStock,
    Expiry,
    Reorder,
    Return,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::LowStock => "low_stock",
            NotificationType::Expiry => "expiry",
            NotificationType::Reorder => "reorder",
            NotificationType::Return => "return",
        }
    }
}

impl core::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of a notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Queued,
    Sent,
    Failed,
}

/// One medicine line inside a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifiedMedicine {
    pub medicine_id: MedicineId,
    pub name: String,
    pub stock: u64,
    pub requested_quantity: u32,
}

/// A single notification sent (or attempted) to one supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub supplier_id: SupplierId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub medicines: Vec<NotifiedMedicine>,
    pub status: NotificationStatus,
    pub timestamp: DateTime<Utc>,
    pub response: Option<String>,
}

impl NotificationRecord {
    pub fn queued(
        supplier_id: SupplierId,
        kind: NotificationType,
        medicines: Vec<NotifiedMedicine>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            supplier_id,
            kind,
            medicines,
            status: NotificationStatus::Queued,
            timestamp,
            response: None,
        }
    }

    pub fn mark_sent(&mut self, receipt: impl Into<String>) -> DomainResult<()> {
        self.ensure_queued()?;
        self.status = NotificationStatus::Sent;
        self.response = Some(receipt.into());
        Ok(())
    }

    pub fn mark_failed(&mut self, detail: impl Into<String>) -> DomainResult<()> {
        self.ensure_queued()?;
        self.status = NotificationStatus::Failed;
        self.response = Some(detail.into());
        Ok(())
    }

    fn ensure_queued(&self) -> DomainResult<()> {
        if self.status != NotificationStatus::Queued {
            return Err(DomainError::conflict("notification outcome already recorded"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NotificationRecord {
        NotificationRecord::queued(
            SupplierId::new("S1"),
            NotificationType::LowStock,
            vec![NotifiedMedicine {
                medicine_id: MedicineId::new("M1"),
                name: "Amoxicillin".to_string(),
                stock: 2,
                requested_quantity: 50,
            }],
            Utc::now(),
        )
    }

    #[test]
    fn outcome_is_recorded_once() {
        let mut r = record();
        r.mark_failed("smtp timeout").unwrap();
        assert_eq!(r.status, NotificationStatus::Failed);
        assert_eq!(r.response.as_deref(), Some("smtp timeout"));
        assert!(matches!(r.mark_sent("ok"), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn serializes_with_type_field() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["type"], "low_stock");
        assert_eq!(json["status"], "queued");
        assert_eq!(json["medicines"][0]["requestedQuantity"], 50);
    }
}
