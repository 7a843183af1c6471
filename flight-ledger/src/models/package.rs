//! Purchased-hour packages and their consumption view.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a package's hours came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PackageSource {
    /// A line item billed directly in hours.
    HourBlock,
    /// One installment of a fixed-total course contract.
    CourseTranche {
        tranche_number: u32,
        total_tranches: u32,
    },
}

/// One purchased block of flight hours. Built fresh for every computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourPackage {
    pub invoice_id: Uuid,
    pub line_number: i32,
    pub client_id: Uuid,
    pub purchase_date: NaiveDate,
    pub total_hours: Decimal,
    pub amount: Decimal,
    pub currency: String,
    pub source: PackageSource,
}

/// One installment of a course contract with its allocated hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseTranche {
    pub invoice_id: Uuid,
    pub client_id: Uuid,
    pub purchase_date: NaiveDate,
    pub tranche_number: u32,
    pub total_tranches: u32,
    /// True when `total_tranches` came from the amount bands.
    pub total_inferred: bool,
    pub amount: Option<Decimal>,
    pub hours_allocated: Decimal,
}

impl CourseTranche {
    /// The package view of this tranche; `amount` is the billed line total.
    pub fn to_package(&self, line_number: i32, amount: Decimal, currency: &str) -> HourPackage {
        HourPackage {
            invoice_id: self.invoice_id,
            line_number,
            client_id: self.client_id,
            purchase_date: self.purchase_date,
            total_hours: self.hours_allocated,
            amount,
            currency: currency.to_string(),
            source: PackageSource::CourseTranche {
                tranche_number: self.tranche_number,
                total_tranches: self.total_tranches,
            },
        }
    }
}

/// Display status of a package after FIFO consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageStatus {
    #[serde(rename = "overdrawn")]
    Overdrawn,
    #[serde(rename = "low hours")]
    LowHours,
    #[serde(rename = "in progress")]
    InProgress,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overdrawn => "overdrawn",
            Self::LowHours => "low hours",
            Self::InProgress => "in progress",
        }
    }
}

impl std::fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A package annotated with its FIFO consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageUsage {
    pub package: HourPackage,
    pub used_hours: Decimal,
    pub remaining_hours: Decimal,
    pub status: PackageStatus,
}

/// Flat per-package row for drill-down screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDrilldown {
    pub invoice_id: Uuid,
    pub purchase_date: NaiveDate,
    pub total_hours: Decimal,
    pub used_hours: Decimal,
    pub remaining_hours: Decimal,
    pub status: PackageStatus,
}

impl From<&PackageUsage> for PackageDrilldown {
    fn from(u: &PackageUsage) -> Self {
        Self {
            invoice_id: u.package.invoice_id,
            purchase_date: u.package.purchase_date,
            total_hours: u.package.total_hours,
            used_hours: u.used_hours,
            remaining_hours: u.remaining_hours,
            status: u.status,
        }
    }
}
