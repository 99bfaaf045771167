//! Seed data for the in-memory collaborators.
//!
//! The binary has no database of its own; it can be pointed at a JSON file
//! (`MEDSTOCK_SEED`) describing medicines and suppliers to start from.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use medstock_infra::notify::{InMemoryNotificationHistory, InMemorySupplierDirectory, LogTransport};
use medstock_infra::request_store::InMemoryRequestStore;
use medstock_infra::snapshots::InMemorySnapshotProvider;
use medstock_inventory::MedicineSnapshot;
use medstock_suppliers::Supplier;

use crate::engine::Collaborators;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot read seed file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid seed file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub medicines: Vec<MedicineSnapshot>,
    pub suppliers: Vec<Supplier>,
}

impl Seed {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
            path: display,
            source,
        })
    }

    /// In-memory collaborators preloaded with this seed; messages go to the log.
    pub fn into_in_memory(self) -> Collaborators {
        Collaborators {
            snapshots: Arc::new(InMemorySnapshotProvider::new(self.medicines)),
            requests: Arc::new(InMemoryRequestStore::new()),
            suppliers: Arc::new(InMemorySupplierDirectory::new(self.suppliers)),
            transport: Arc::new(LogTransport),
            history: Arc::new(InMemoryNotificationHistory::new()),
        }
    }
}
