use serde::{Deserialize, Serialize};

use medstock_core::{DomainError, DomainResult, MedicineId};

/// Reorder level applied when the medicine record does not carry one.
pub const DEFAULT_REORDER_LEVEL: i64 = 10;

/// Reorder quantity applied when the medicine record does not carry one.
pub const DEFAULT_REORDER_QUANTITY: i64 = 50;

fn default_reorder_level() -> i64 {
    DEFAULT_REORDER_LEVEL
}

fn default_reorder_quantity() -> i64 {
    DEFAULT_REORDER_QUANTITY
}

/// Point-in-time stock reading for one medicine.
///
/// Numbers are signed on purpose: the records come from a schemaless store and
/// malformed values must be detectable rather than unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineSnapshot {
    pub medicine_id: MedicineId,
    pub name: String,
    /// Therapeutic category, matched against supplier specialties.
    #[serde(default)]
    pub category: Option<String>,
    pub stock: i64,
    #[serde(default = "default_reorder_level")]
    pub reorder_level: i64,
    #[serde(default = "default_reorder_quantity")]
    pub reorder_quantity: i64,
}

/// Stock classification of a single medicine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockState {
    Normal,
    LowStock,
    OutOfStock,
}

/// Classify a stock level against its reorder level.
pub fn classify(stock: u64, reorder_level: u64) -> StockState {
    if stock == 0 {
        StockState::OutOfStock
    } else if stock <= reorder_level {
        StockState::LowStock
    } else {
        StockState::Normal
    }
}

impl MedicineSnapshot {
    pub fn new(medicine_id: impl Into<MedicineId>, name: impl Into<String>, stock: i64) -> Self {
        Self {
            medicine_id: medicine_id.into(),
            name: name.into(),
            category: None,
            stock,
            reorder_level: DEFAULT_REORDER_LEVEL,
            reorder_quantity: DEFAULT_REORDER_QUANTITY,
        }
    }

    pub fn with_reorder_level(mut self, reorder_level: i64) -> Self {
        self.reorder_level = reorder_level;
        self
    }

    pub fn with_reorder_quantity(mut self, reorder_quantity: i64) -> Self {
        self.reorder_quantity = reorder_quantity;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Check the record is well-formed before it takes part in evaluation.
    pub fn validate(&self) -> DomainResult<()> {
        if self.medicine_id.is_blank() {
            return Err(DomainError::validation("medicine id cannot be empty"));
        }
        if self.stock < 0 {
            return Err(DomainError::validation(format!(
                "stock cannot be negative (got {})",
                self.stock
            )));
        }
        if self.reorder_level < 0 {
            return Err(DomainError::validation(format!(
                "reorder level cannot be negative (got {})",
                self.reorder_level
            )));
        }
        if self.reorder_quantity <= 0 {
            return Err(DomainError::validation(format!(
                "reorder quantity must be positive (got {})",
                self.reorder_quantity
            )));
        }
        if u32::try_from(self.reorder_quantity).is_err() {
            return Err(DomainError::validation(format!(
                "reorder quantity out of range (got {})",
                self.reorder_quantity
            )));
        }
        Ok(())
    }

    /// Classify this snapshot. Fails when the record is malformed.
    pub fn stock_state(&self) -> DomainResult<StockState> {
        self.validate()?;
        Ok(classify(self.stock as u64, self.reorder_level as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_boundaries() {
        assert_eq!(classify(0, 10), StockState::OutOfStock);
        assert_eq!(classify(1, 10), StockState::LowStock);
        assert_eq!(classify(10, 10), StockState::LowStock);
        assert_eq!(classify(11, 10), StockState::Normal);
        // A zero reorder level still flags an empty shelf.
        assert_eq!(classify(0, 0), StockState::OutOfStock);
        assert_eq!(classify(1, 0), StockState::Normal);
    }

    #[test]
    fn missing_thresholds_fall_back_to_defaults() {
        let snapshot: MedicineSnapshot =
            serde_json::from_str(r#"{"medicineId":"M1","name":"Amoxicillin","stock":4}"#).unwrap();
        assert_eq!(snapshot.reorder_level, DEFAULT_REORDER_LEVEL);
        assert_eq!(snapshot.reorder_quantity, DEFAULT_REORDER_QUANTITY);
        assert_eq!(snapshot.category, None);
    }

    #[test]
    fn negative_stock_is_rejected() {
        let err = MedicineSnapshot::new("M1", "Ibuprofen", -1).validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("stock")));
    }

    #[test]
    fn non_positive_reorder_quantity_is_rejected() {
        let snapshot = MedicineSnapshot::new("M1", "Ibuprofen", 3).with_reorder_quantity(0);
        assert!(matches!(snapshot.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn blank_id_is_rejected() {
        let snapshot = MedicineSnapshot::new(" ", "Ibuprofen", 3);
        assert!(snapshot.stock_state().is_err());
    }
}
