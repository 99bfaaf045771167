use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::notification::{NotificationType, NotifiedMedicine};
use crate::supplier::Supplier;

/// Rendered message handed to the supplier transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub recipient: Option<String>,
    pub subject: String,
    pub body: String,
}

impl NotificationPayload {
    pub fn render(supplier: &Supplier, kind: NotificationType, medicines: &[NotifiedMedicine]) -> Self {
        let count = medicines.len();
        let subject = match kind {
            NotificationType::LowStock => format!("Low stock alert: {count} medicine(s)"),
            NotificationType::Expiry => format!("Expiry notice: {count} medicine(s)"),
            NotificationType::Reorder => format!("Reorder request: {count} medicine(s)"),
            NotificationType::Return => format!("Return request: {count} medicine(s)"),
        };

        let intro = match kind {
            NotificationType::LowStock => "The following medicines are running low:",
            NotificationType::Expiry => "The following medicines are approaching expiry:",
            NotificationType::Reorder => "Please supply the following quantities:",
            NotificationType::Return => "We would like to return the following medicines:",
        };

        let mut body = format!("Dear {},\n\n{intro}\n", supplier.name);
        for m in medicines {
            // Writing into a String cannot fail.
            let _ = writeln!(
                body,
                "- {} ({}): in stock {}, requested {}",
                m.name, m.medicine_id, m.stock, m.requested_quantity
            );
        }

        Self {
            recipient: supplier.email.clone(),
            subject,
            body,
        }
    }
}
