//! Threshold evaluation over a batch of medicine snapshots.
//!
//! Model:
//! - Validate each snapshot on its own; malformed records are set aside, the
//!   rest of the batch is still evaluated.
//! - Classify the valid ones and emit a shortage for anything not `Normal`.
//! - Order shortages by severity (out of stock first), then by medicine id.
//!
//! The function is pure: the same input always produces the same output.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use medstock_core::{DomainError, MedicineId};

use crate::snapshot::{MedicineSnapshot, StockState};

/// How urgent a shortage is. `OutOfStock` ranks above `LowStock`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    LowStock,
    OutOfStock,
}

/// A detected stock shortage for one medicine during one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortageEvent {
    pub medicine_id: MedicineId,
    pub name: String,
    pub category: Option<String>,
    pub severity: Severity,
    pub stock: u64,
    pub suggested_quantity: u32,
}

/// A snapshot that failed validation, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSnapshot {
    pub medicine_id: MedicineId,
    pub error: DomainError,
}

/// Result of evaluating one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Shortages, most severe first, ties ordered by medicine id.
    pub shortages: Vec<ShortageEvent>,
    /// Medicines whose stock is above threshold, ordered by id.
    pub normal: Vec<MedicineId>,
    /// Malformed snapshots, in input order.
    pub rejected: Vec<RejectedSnapshot>,
}

impl Evaluation {
    pub fn rejected_ids(&self) -> Vec<&MedicineId> {
        self.rejected.iter().map(|r| &r.medicine_id).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Evaluate a batch of snapshots against their reorder thresholds.
///
/// When the same medicine appears more than once, the first occurrence is
/// evaluated and later ones are rejected as duplicates.
pub fn evaluate(snapshots: &[MedicineSnapshot]) -> Evaluation {
    let mut out = Evaluation::default();
    let mut seen: HashSet<&MedicineId> = HashSet::with_capacity(snapshots.len());

    for snapshot in snapshots {
        let state = match snapshot.stock_state() {
            Ok(state) => state,
            Err(error) => {
                out.rejected.push(RejectedSnapshot {
                    medicine_id: snapshot.medicine_id.clone(),
                    error,
                });
                continue;
            }
        };

        if !seen.insert(&snapshot.medicine_id) {
            out.rejected.push(RejectedSnapshot {
                medicine_id: snapshot.medicine_id.clone(),
                error: DomainError::validation("duplicate snapshot for medicine in batch"),
            });
            continue;
        }

        let severity = match state {
            StockState::Normal => {
                out.normal.push(snapshot.medicine_id.clone());
                continue;
            }
            StockState::LowStock => Severity::LowStock,
            StockState::OutOfStock => Severity::OutOfStock,
        };

        // validate() already bounded both values.
        out.shortages.push(ShortageEvent {
            medicine_id: snapshot.medicine_id.clone(),
            name: snapshot.name.clone(),
            category: snapshot.category.clone(),
            severity,
            stock: snapshot.stock as u64,
            suggested_quantity: snapshot.reorder_quantity as u32,
        });
    }

    out.shortages.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.medicine_id.cmp(&b.medicine_id))
    });
    out.normal.sort();

    out
}
