//! Invoice models, read from the invoicing system.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice lifecycle status as stored by the invoicing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Issued => "issued",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "issued" => Some(Self::Issued),
            "paid" => Some(Self::Paid),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Invoice header with its line items.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub client_id: Option<Uuid>,
    pub issue_date: NaiveDate,
    pub status: String,
    #[sqlx(skip)]
    pub line_items: Vec<InvoiceLineItem>,
}

impl Invoice {
    /// Get parsed status.
    pub fn parsed_status(&self) -> Option<InvoiceStatus> {
        InvoiceStatus::from_string(&self.status)
    }
}

/// One line of an invoice.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub invoice_id: Uuid,
    pub line_number: i32,
    pub name: String,
    pub description: String,
    pub quantity: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub currency: String,
}

impl InvoiceLineItem {
    /// Name and description joined, for keyword and pattern searches.
    pub fn searchable_text(&self) -> String {
        if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.description)
        }
    }
}
