use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use medstock_core::{AggregateRoot, ExpectedVersion, MedicineId, ReorderRequestId};
use medstock_reorder::{ReorderRequest, RequestUpdate};

use super::r#trait::ReorderRequestStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Tables {
    requests: HashMap<ReorderRequestId, ReorderRequest>,
    by_medicine: HashMap<MedicineId, Vec<ReorderRequestId>>,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: Option<String>,
    latency: Option<Duration>,
}

/// In-memory request store.
///
/// Intended for tests/dev. Latency is injected before the write is applied,
/// so a caller that gives up while waiting leaves no trace.
#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    tables: RwLock<Tables>,
    faults: RwLock<Faults>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, reason: Option<&str>) {
        if let Ok(mut faults) = self.faults.write() {
            faults.unavailable = reason.map(str::to_string);
        }
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut faults) = self.faults.write() {
            faults.latency = latency;
        }
    }

    /// Total number of stored requests across all medicines.
    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.requests.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let (unavailable, latency) = {
            let faults = self
                .faults
                .read()
                .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
            (faults.unavailable.clone(), faults.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match unavailable {
            Some(reason) => Err(StoreError::Unavailable(reason)),
            None => Ok(()),
        }
    }

    fn read_tables(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write_tables(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn active_in(tables: &Tables, medicine_id: &MedicineId) -> Option<ReorderRequest> {
        tables
            .by_medicine
            .get(medicine_id)?
            .iter()
            .filter_map(|id| tables.requests.get(id))
            .find(|r| r.is_active())
            .cloned()
    }
}

#[async_trait]
impl ReorderRequestStore for InMemoryRequestStore {
    async fn create_request(&self, request: ReorderRequest) -> Result<ReorderRequest, StoreError> {
        self.enter().await?;
        let mut tables = self.write_tables()?;

        let id = request.id_typed();
        if tables.requests.contains_key(&id) {
            return Err(StoreError::Conflict(format!("request {id} already exists")));
        }
        if request.is_active() {
            if let Some(existing) = Self::active_in(&tables, request.medicine_id()) {
                return Err(StoreError::Conflict(format!(
                    "medicine {} already has active request {}",
                    request.medicine_id(),
                    existing.id_typed()
                )));
            }
        }

        tables
            .by_medicine
            .entry(request.medicine_id().clone())
            .or_default()
            .push(id);
        tables.requests.insert(id, request.clone());
        Ok(request)
    }

    async fn update_request(
        &self,
        id: ReorderRequestId,
        update: &RequestUpdate,
        expected: ExpectedVersion,
    ) -> Result<ReorderRequest, StoreError> {
        self.enter().await?;
        let mut tables = self.write_tables()?;

        let stored = tables
            .requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("reorder request {id}")))?;

        let current = stored.version();
        if !expected.matches(current) {
            return Err(StoreError::Conflict(format!(
                "request {id}: expected {expected:?}, found version {current}"
            )));
        }
        if stored.status().is_terminal() {
            return Err(StoreError::Conflict(format!(
                "request {id} is {} and cannot change",
                stored.status()
            )));
        }
        if update.version <= current {
            return Err(StoreError::Conflict(format!(
                "request {id}: update version {} does not advance {current}",
                update.version
            )));
        }

        stored.apply_update(update);
        Ok(stored.clone())
    }

    async fn get_request(&self, id: ReorderRequestId) -> Result<Option<ReorderRequest>, StoreError> {
        self.enter().await?;
        Ok(self.read_tables()?.requests.get(&id).cloned())
    }

    async fn get_active_request(
        &self,
        medicine_id: &MedicineId,
    ) -> Result<Option<ReorderRequest>, StoreError> {
        self.enter().await?;
        Ok(Self::active_in(&*self.read_tables()?, medicine_id))
    }

    async fn list_for_medicine(
        &self,
        medicine_id: &MedicineId,
    ) -> Result<Vec<ReorderRequest>, StoreError> {
        self.enter().await?;
        let tables = self.read_tables()?;
        Ok(tables
            .by_medicine
            .get(medicine_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.requests.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use medstock_core::Aggregate;
    use medstock_reorder::{ReorderCommand, ReorderStatus};

    fn open(medicine: &str) -> ReorderRequest {
        ReorderRequest::open(ReorderRequestId::new(), MedicineId::new(medicine), 50, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn second_active_request_for_same_medicine_is_rejected() {
        let store = InMemoryRequestStore::new();
        store.create_request(open("M1")).await.unwrap();

        let err = store.create_request(open("M1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store.create_request(open("M2")).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = InMemoryRequestStore::new();
        let request = store.create_request(open("M1")).await.unwrap();

        let mut approved = request.clone();
        approved
            .execute(&ReorderCommand::approve(request.id_typed(), Utc::now()))
            .unwrap();

        store
            .update_request(request.id_typed(), &approved.to_update(), ExpectedVersion::Exact(1))
            .await
            .unwrap();

        let err = store
            .update_request(request.id_typed(), &approved.to_update(), ExpectedVersion::Exact(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let stored = store.get_request(request.id_typed()).await.unwrap().unwrap();
        assert_eq!(stored.status(), ReorderStatus::Approved);
        assert_eq!(stored.version(), 2);
    }

    #[tokio::test]
    async fn terminal_requests_are_frozen_and_free_the_medicine() {
        let store = InMemoryRequestStore::new();
        let request = store.create_request(open("M1")).await.unwrap();

        let mut cancelled = request.clone();
        cancelled
            .execute(&ReorderCommand::cancel(
                request.id_typed(),
                medstock_reorder::CancelReason::AdminOverride,
                Utc::now(),
            ))
            .unwrap();
        store
            .update_request(request.id_typed(), &cancelled.to_update(), ExpectedVersion::Any)
            .await
            .unwrap();

        assert!(store.get_active_request(&MedicineId::new("M1")).await.unwrap().is_none());

        let mut bumped = cancelled.to_update();
        bumped.version += 1;
        let err = store
            .update_request(request.id_typed(), &bumped, ExpectedVersion::Any)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store.create_request(open("M1")).await.unwrap();
        let history = store.list_for_medicine(&MedicineId::new("M1")).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status(), ReorderStatus::Cancelled);
        assert_eq!(history[1].status(), ReorderStatus::Pending);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryRequestStore::new();
        store.set_unavailable(Some("maintenance"));
        let err = store.create_request(open("M1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.is_empty());
    }
}
