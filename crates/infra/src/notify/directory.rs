use std::collections::BTreeSet;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use medstock_core::SupplierId;
use medstock_suppliers::Supplier;

use crate::error::StoreError;

/// Read access to suppliers, plus the single write the engine performs.
#[async_trait]
pub trait SupplierDirectory: Send + Sync {
    /// Active suppliers in directory order.
    ///
    /// With a non-empty `filter`, only suppliers covering at least one of the
    /// given specialties are returned.
    async fn list_active_suppliers(
        &self,
        filter: Option<&BTreeSet<String>>,
    ) -> Result<Vec<Supplier>, StoreError>;

    async fn get_supplier(&self, id: &SupplierId) -> Result<Option<Supplier>, StoreError>;

    async fn mark_contacted(&self, id: &SupplierId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// In-memory directory (tests/dev). Directory order is insertion order.
#[derive(Debug, Default)]
pub struct InMemorySupplierDirectory {
    suppliers: RwLock<Vec<Supplier>>,
}

impl InMemorySupplierDirectory {
    pub fn new(suppliers: Vec<Supplier>) -> Self {
        Self {
            suppliers: RwLock::new(suppliers),
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Storage("lock poisoned".to_string())
    }
}

#[async_trait]
impl SupplierDirectory for InMemorySupplierDirectory {
    async fn list_active_suppliers(
        &self,
        filter: Option<&BTreeSet<String>>,
    ) -> Result<Vec<Supplier>, StoreError> {
        let suppliers = self.suppliers.read().map_err(|_| Self::poisoned())?;
        Ok(suppliers
            .iter()
            .filter(|s| s.is_active)
            .filter(|s| filter.is_none_or(|f| s.matches_any(f)))
            .cloned()
            .collect())
    }

    async fn get_supplier(&self, id: &SupplierId) -> Result<Option<Supplier>, StoreError> {
        let suppliers = self.suppliers.read().map_err(|_| Self::poisoned())?;
        Ok(suppliers.iter().find(|s| &s.id == id).cloned())
    }

    async fn mark_contacted(&self, id: &SupplierId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut suppliers = self.suppliers.write().map_err(|_| Self::poisoned())?;
        let supplier = suppliers
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("supplier {id}")))?;
        supplier.last_contacted = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> InMemorySupplierDirectory {
        InMemorySupplierDirectory::new(vec![
            Supplier::new("S1", "Acme Pharma").with_specialty("antibiotics"),
            Supplier::new("S2", "Dormant Ltd").with_specialty("antibiotics").inactive(),
            Supplier::new("S3", "Cardio Supply").with_specialty("cardiology"),
        ])
    }

    #[tokio::test]
    async fn lists_active_suppliers_in_order() {
        let ids: Vec<_> = directory()
            .list_active_suppliers(None)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![SupplierId::new("S1"), SupplierId::new("S3")]);
    }

    #[tokio::test]
    async fn specialty_filter_narrows_the_list() {
        let filter: BTreeSet<String> = ["Cardiology".to_string()].into();
        let suppliers = directory().list_active_suppliers(Some(&filter)).await.unwrap();
        assert_eq!(suppliers.len(), 1);
        assert_eq!(suppliers[0].id, SupplierId::new("S3"));

        let empty = BTreeSet::new();
        assert_eq!(directory().list_active_suppliers(Some(&empty)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mark_contacted_updates_only_that_supplier() {
        let dir = directory();
        let at = Utc::now();
        dir.mark_contacted(&SupplierId::new("S3"), at).await.unwrap();

        let s3 = dir.get_supplier(&SupplierId::new("S3")).await.unwrap().unwrap();
        let s1 = dir.get_supplier(&SupplierId::new("S1")).await.unwrap().unwrap();
        assert_eq!(s3.last_contacted, Some(at));
        assert!(s1.last_contacted.is_none());

        let err = dir.mark_contacted(&SupplierId::new("S9"), at).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
