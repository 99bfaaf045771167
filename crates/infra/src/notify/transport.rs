use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use medstock_core::SupplierId;
use medstock_suppliers::{NotificationPayload, Supplier};

use crate::error::TransportError;

/// Acknowledgement returned by a transport on successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub reference: String,
}

/// Outbound channel to suppliers (email, EDI, webhook, ...).
#[async_trait]
pub trait SupplierTransport: Send + Sync {
    async fn send_message(
        &self,
        supplier: &Supplier,
        payload: &NotificationPayload,
    ) -> Result<DeliveryReceipt, TransportError>;
}

/// Transport that only writes the message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl SupplierTransport for LogTransport {
    async fn send_message(
        &self,
        supplier: &Supplier,
        payload: &NotificationPayload,
    ) -> Result<DeliveryReceipt, TransportError> {
        let reference = format!("log-{}", Uuid::now_v7());
        info!(
            supplier_id = %supplier.id,
            recipient = payload.recipient.as_deref().unwrap_or("-"),
            subject = %payload.subject,
            reference = %reference,
            "supplier message logged"
        );
        Ok(DeliveryReceipt { reference })
    }
}

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<(SupplierId, NotificationPayload)>,
    failing: HashSet<SupplierId>,
    latency: Option<Duration>,
}

/// Transport double: records deliveries and fails on demand (tests/dev).
#[derive(Debug, Default)]
pub struct RecordingTransport {
    inner: Mutex<Recorded>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery to `supplier_id` fails from now on.
    pub fn fail_for(&self, supplier_id: impl Into<SupplierId>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing.insert(supplier_id.into());
        }
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.latency = latency;
        }
    }

    /// Successful deliveries, in the order they completed.
    pub fn sent(&self) -> Vec<(SupplierId, NotificationPayload)> {
        self.inner.lock().map(|i| i.sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SupplierTransport for RecordingTransport {
    async fn send_message(
        &self,
        supplier: &Supplier,
        payload: &NotificationPayload,
    ) -> Result<DeliveryReceipt, TransportError> {
        let latency = self
            .inner
            .lock()
            .map_err(|_| TransportError::Unavailable("transport lock poisoned".into()))?
            .latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self
            .inner
            .lock()
            .map_err(|_| TransportError::Unavailable("transport lock poisoned".into()))?;
        if inner.failing.contains(&supplier.id) {
            return Err(TransportError::Rejected(format!(
                "mailbox for {} rejected the message",
                supplier.id
            )));
        }
        inner.sent.push((supplier.id.clone(), payload.clone()));
        Ok(DeliveryReceipt {
            reference: format!("rec-{}", inner.sent.len()),
        })
    }
}
