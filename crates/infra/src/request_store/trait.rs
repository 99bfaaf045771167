use async_trait::async_trait;

use medstock_core::{ExpectedVersion, MedicineId, ReorderRequestId};
use medstock_reorder::{ReorderRequest, RequestUpdate};

use crate::error::StoreError;

/// Storage for reorder requests.
///
/// Implementations must:
/// - reject `create_request` with [`StoreError::Conflict`] when the medicine
///   already has an active (pending or approved) request
/// - reject `update_request` with [`StoreError::Conflict`] when the stored
///   version does not satisfy `expected`, or the stored request is terminal
/// - never expose partially written state
#[async_trait]
pub trait ReorderRequestStore: Send + Sync {
    async fn create_request(&self, request: ReorderRequest) -> Result<ReorderRequest, StoreError>;

    async fn update_request(
        &self,
        id: ReorderRequestId,
        update: &RequestUpdate,
        expected: ExpectedVersion,
    ) -> Result<ReorderRequest, StoreError>;

    async fn get_request(&self, id: ReorderRequestId) -> Result<Option<ReorderRequest>, StoreError>;

    /// The pending or approved request for `medicine_id`, if any.
    async fn get_active_request(
        &self,
        medicine_id: &MedicineId,
    ) -> Result<Option<ReorderRequest>, StoreError>;

    /// Every request ever created for `medicine_id`, oldest first.
    async fn list_for_medicine(
        &self,
        medicine_id: &MedicineId,
    ) -> Result<Vec<ReorderRequest>, StoreError>;
}
