use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};

use medstock_core::SupplierId;
use medstock_suppliers::{
    NotificationPayload, NotificationRecord, NotificationType, NotifiedMedicine, Supplier,
};

use super::directory::SupplierDirectory;
use super::history::NotificationHistory;
use super::transport::SupplierTransport;
use crate::deadline::with_deadline;
use crate::error::EngineError;
use crate::keyed_lock::KeyedLocks;

/// Per-supplier result of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierOutcome {
    pub supplier_id: SupplierId,
    /// `Ok` carries the recorded notification, which may itself be `failed`.
    pub result: Result<NotificationRecord, EngineError>,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    directory: Arc<dyn SupplierDirectory>,
    transport: Arc<dyn SupplierTransport>,
    history: Arc<dyn NotificationHistory>,
    locks: KeyedLocks<SupplierId>,
    notify_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        directory: Arc<dyn SupplierDirectory>,
        transport: Arc<dyn SupplierTransport>,
        history: Arc<dyn NotificationHistory>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            transport,
            history,
            locks: KeyedLocks::new(),
            notify_timeout,
        }
    }

    /// Notify one supplier and record the outcome.
    ///
    /// Delivery failures (including a transport timeout) do not fail the call:
    /// they produce a `failed` record. Only inactive suppliers, an empty
    /// medicine list, and history write failures are returned as errors.
    pub async fn notify(
        &self,
        supplier: &Supplier,
        medicines: &[NotifiedMedicine],
        kind: NotificationType,
    ) -> Result<NotificationRecord, EngineError> {
        if medicines.is_empty() {
            return Err(EngineError::validation("notification needs at least one medicine"));
        }
        if !supplier.is_active {
            return Err(EngineError::InactiveSupplier(supplier.id.clone()));
        }

        let _guard = self.locks.lock(supplier.id.clone()).await;

        let mut record =
            NotificationRecord::queued(supplier.id.clone(), kind, medicines.to_vec(), Utc::now());
        let payload = NotificationPayload::render(supplier, kind, medicines);

        let delivery = with_deadline("notify", self.notify_timeout, async {
            self.transport
                .send_message(supplier, &payload)
                .await
                .map_err(EngineError::from)
        })
        .await;

        match delivery {
            Ok(receipt) => {
                record.mark_sent(receipt.reference)?;
                if let Err(e) = self.directory.mark_contacted(&supplier.id, Utc::now()).await {
                    warn!(
                        supplier_id = %supplier.id,
                        notification_id = %record.id,
                        error = %e,
                        "notification sent but last_contacted not updated"
                    );
                }
                info!(
                    supplier_id = %supplier.id,
                    notification_id = %record.id,
                    kind = %kind,
                    medicines = medicines.len(),
                    "supplier notified"
                );
            }
            Err(e) => {
                record.mark_failed(e.to_string())?;
                warn!(
                    supplier_id = %supplier.id,
                    notification_id = %record.id,
                    kind = %kind,
                    error = %e,
                    "supplier notification failed"
                );
            }
        }

        self.history.append(record.clone()).await?;
        Ok(record)
    }

    /// Notify every active supplier matching `specialties`, concurrently.
    ///
    /// Outcomes come back in directory order, one per supplier. A failure for
    /// one supplier never affects the others.
    pub async fn notify_all(
        &self,
        medicines: &[NotifiedMedicine],
        kind: NotificationType,
        specialties: Option<&BTreeSet<String>>,
    ) -> Result<Vec<SupplierOutcome>, EngineError> {
        if medicines.is_empty() {
            return Err(EngineError::validation("notification needs at least one medicine"));
        }

        let suppliers = self.directory.list_active_suppliers(specialties).await?;
        if suppliers.is_empty() {
            warn!(kind = %kind, "no active supplier matches; nothing sent");
        }

        let outcomes = join_all(suppliers.iter().map(|supplier| async move {
            SupplierOutcome {
                supplier_id: supplier.id.clone(),
                result: self.notify(supplier, medicines, kind).await,
            }
        }))
        .await;

        Ok(outcomes)
    }

    pub async fn history_for(
        &self,
        supplier_id: &SupplierId,
    ) -> Result<Vec<NotificationRecord>, EngineError> {
        Ok(self.history.history_for(supplier_id).await?)
    }

    pub fn directory(&self) -> &Arc<dyn SupplierDirectory> {
        &self.directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{InMemoryNotificationHistory, InMemorySupplierDirectory, RecordingTransport};
    use medstock_core::MedicineId;
    use medstock_suppliers::NotificationStatus;

    struct Fixture {
        dispatcher: NotificationDispatcher,
        directory: Arc<InMemorySupplierDirectory>,
        transport: Arc<RecordingTransport>,
    }

    fn fixture(suppliers: Vec<Supplier>, timeout: Duration) -> Fixture {
        let directory = Arc::new(InMemorySupplierDirectory::new(suppliers));
        let transport = Arc::new(RecordingTransport::new());
        let history = Arc::new(InMemoryNotificationHistory::new());
        let dispatcher =
            NotificationDispatcher::new(directory.clone(), transport.clone(), history, timeout);
        Fixture {
            dispatcher,
            directory,
            transport,
        }
    }

    fn medicines() -> Vec<NotifiedMedicine> {
        vec![NotifiedMedicine {
            medicine_id: MedicineId::new("M1"),
            name: "Amoxicillin".to_string(),
            stock: 2,
            requested_quantity: 50,
        }]
    }

    async fn supplier(fx: &Fixture, id: &str) -> Supplier {
        fx.directory
            .get_supplier(&SupplierId::new(id))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn inactive_supplier_is_refused_without_record() {
        let fx = fixture(vec![Supplier::new("S1", "Dormant").inactive()], Duration::from_secs(1));
        let s1 = supplier(&fx, "S1").await;

        let err = fx
            .dispatcher
            .notify(&s1, &medicines(), NotificationType::LowStock)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::InactiveSupplier(SupplierId::new("S1")));
        assert!(fx.dispatcher.history_for(&s1.id).await.unwrap().is_empty());
        assert!(fx.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn empty_medicine_list_is_rejected() {
        let fx = fixture(vec![Supplier::new("S1", "Acme")], Duration::from_secs(1));
        let s1 = supplier(&fx, "S1").await;
        let err = fx
            .dispatcher
            .notify(&s1, &[], NotificationType::Reorder)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn successful_send_updates_last_contacted() {
        let fx = fixture(vec![Supplier::new("S1", "Acme")], Duration::from_secs(1));
        let s1 = supplier(&fx, "S1").await;

        let record = fx
            .dispatcher
            .notify(&s1, &medicines(), NotificationType::Reorder)
            .await
            .unwrap();
        assert_eq!(record.status, NotificationStatus::Sent);
        assert_eq!(record.response.as_deref(), Some("rec-1"));
        assert!(supplier(&fx, "S1").await.last_contacted.is_some());
        assert_eq!(fx.transport.sent()[0].1.subject, "Reorder request: 1 medicine(s)");
    }

    #[tokio::test]
    async fn fan_out_isolates_failures() {
        let fx = fixture(
            vec![
                Supplier::new("S1", "Acme"),
                Supplier::new("S2", "Flaky"),
                Supplier::new("S3", "Cardio"),
            ],
            Duration::from_secs(1),
        );
        fx.transport.fail_for("S2");

        let outcomes = fx
            .dispatcher
            .notify_all(&medicines(), NotificationType::LowStock, None)
            .await
            .unwrap();

        let statuses: Vec<_> = outcomes
            .iter()
            .map(|o| (o.supplier_id.as_str().to_string(), o.result.as_ref().unwrap().status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("S1".to_string(), NotificationStatus::Sent),
                ("S2".to_string(), NotificationStatus::Failed),
                ("S3".to_string(), NotificationStatus::Sent),
            ]
        );
        assert!(supplier(&fx, "S2").await.last_contacted.is_none());
        assert!(supplier(&fx, "S1").await.last_contacted.is_some());

        let s2_history = fx.dispatcher.history_for(&SupplierId::new("S2")).await.unwrap();
        assert_eq!(s2_history.len(), 1);
        assert_eq!(s2_history[0].status, NotificationStatus::Failed);
    }

    #[tokio::test]
    async fn transport_timeout_records_failure() {
        let fx = fixture(vec![Supplier::new("S1", "Slow")], Duration::from_millis(20));
        fx.transport.set_latency(Some(Duration::from_millis(300)));
        let s1 = supplier(&fx, "S1").await;

        let record = fx
            .dispatcher
            .notify(&s1, &medicines(), NotificationType::LowStock)
            .await
            .unwrap();
        assert_eq!(record.status, NotificationStatus::Failed);
        assert!(record.response.unwrap().contains("timed out"));
        assert!(supplier(&fx, "S1").await.last_contacted.is_none());
    }

    #[tokio::test]
    async fn specialty_filter_limits_recipients() {
        let fx = fixture(
            vec![
                Supplier::new("S1", "Acme").with_specialty("antibiotics"),
                Supplier::new("S2", "Cardio").with_specialty("cardiology"),
            ],
            Duration::from_secs(1),
        );
        let filter: BTreeSet<String> = ["cardiology".to_string()].into();
        let outcomes = fx
            .dispatcher
            .notify_all(&medicines(), NotificationType::Reorder, Some(&filter))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].supplier_id, SupplierId::new("S2"));
    }
}
