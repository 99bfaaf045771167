//! Stock snapshot source.
//!
//! The engine never owns medicine records; each cycle reads a fresh batch of
//! snapshots from the surrounding application.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use medstock_core::MedicineId;
use medstock_inventory::MedicineSnapshot;

use crate::error::TransportError;

#[async_trait]
pub trait StockSnapshotProvider: Send + Sync {
    async fn get_snapshots(&self) -> Result<Vec<MedicineSnapshot>, TransportError>;
}

#[derive(Debug, Default)]
struct ProviderState {
    snapshots: Vec<MedicineSnapshot>,
    unavailable: Option<String>,
    latency: Option<Duration>,
}

/// In-memory snapshot provider (tests/dev).
///
/// Mutators let tests move stock around between cycles and simulate an
/// unreachable or slow upstream.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotProvider {
    inner: Arc<RwLock<ProviderState>>,
}

impl InMemorySnapshotProvider {
    pub fn new(snapshots: Vec<MedicineSnapshot>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ProviderState {
                snapshots,
                ..ProviderState::default()
            })),
        }
    }

    /// Update the stock level of one medicine; returns false if it is unknown.
    pub fn set_stock(&self, medicine_id: &MedicineId, stock: i64) -> bool {
        let Ok(mut state) = self.inner.write() else {
            return false;
        };
        match state
            .snapshots
            .iter_mut()
            .find(|s| &s.medicine_id == medicine_id)
        {
            Some(snapshot) => {
                snapshot.stock = stock;
                true
            }
            None => false,
        }
    }

    /// Make every subsequent read fail with `reason`, or recover with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        if let Ok(mut state) = self.inner.write() {
            state.unavailable = reason.map(str::to_string);
        }
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut state) = self.inner.write() {
            state.latency = latency;
        }
    }
}

#[async_trait]
impl StockSnapshotProvider for InMemorySnapshotProvider {
    async fn get_snapshots(&self) -> Result<Vec<MedicineSnapshot>, TransportError> {
        let (latency, result) = {
            let state = self
                .inner
                .read()
                .map_err(|_| TransportError::Unavailable("snapshot provider lock poisoned".into()))?;
            let result = match &state.unavailable {
                Some(reason) => Err(TransportError::Unavailable(reason.clone())),
                None => Ok(state.snapshots.clone()),
            };
            (state.latency, result)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        result
    }
}
