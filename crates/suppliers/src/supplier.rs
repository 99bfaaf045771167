use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medstock_core::SupplierId;

/// Supplier record as exposed by the supplier directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub specialties: BTreeSet<String>,
    #[serde(default)]
    pub last_contacted: Option<DateTime<Utc>>,
}

/// Canonical form used when comparing specialties and categories.
pub fn normalize_specialty(value: &str) -> String {
    value.trim().to_lowercase()
}

impl Supplier {
    pub fn new(id: impl Into<SupplierId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            is_active: true,
            specialties: BTreeSet::new(),
            last_contacted: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialties.insert(specialty.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Whether the supplier covers at least one of the given specialties.
    ///
    /// An empty filter matches every supplier. Comparison ignores case and
    /// surrounding whitespace.
    pub fn matches_any(&self, filter: &BTreeSet<String>) -> bool {
        if filter.is_empty() {
            return true;
        }
        self.specialties
            .iter()
            .map(|s| normalize_specialty(s))
            .any(|s| filter.iter().any(|f| normalize_specialty(f) == s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everyone() {
        let supplier = Supplier::new("S1", "Acme Pharma");
        assert!(supplier.matches_any(&BTreeSet::new()));
    }

    #[test]
    fn specialty_match_ignores_case() {
        let supplier = Supplier::new("S1", "Acme Pharma").with_specialty("Antibiotics");
        let filter: BTreeSet<String> = ["antibiotics ".to_string()].into();
        assert!(supplier.matches_any(&filter));

        let other: BTreeSet<String> = ["analgesics".to_string()].into();
        assert!(!supplier.matches_any(&other));
    }

    #[test]
    fn deserializes_directory_shape() {
        let supplier: Supplier = serde_json::from_str(
            r#"{"id":"S1","name":"Acme","isActive":true,"specialties":["cardiology"]}"#,
        )
        .unwrap();
        assert!(supplier.is_active);
        assert!(supplier.last_contacted.is_none());
        assert!(supplier.specialties.contains("cardiology"));
    }
}
