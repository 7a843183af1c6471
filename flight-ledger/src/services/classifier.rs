//! Invoice line-item classification.

use regex::Regex;
use tracing::warn;
use uuid::Uuid;

use crate::models::{HourPackage, Invoice, InvoiceLineItem, PackageSource};

/// Hour unit codes recognised out of the box.
pub const DEFAULT_HOUR_UNITS: [&str; 3] = ["HUR", "HOUR", "H"];

/// Keywords that mark a non-hour line item as a course-contract payment.
pub const DEFAULT_COURSE_KEYWORDS: [&str; 3] = ["curs", "course", "ppl"];

/// What a line item contributes to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    HourPackage,
    CourseContract,
    Other,
}

#[derive(Debug, Clone)]
pub struct LineItemClassifier {
    hour_units: Vec<String>,
    /// Whole-word, case-insensitive alternation of the course keywords.
    course_pattern: Option<Regex>,
}

impl Default for LineItemClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_HOUR_UNITS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_COURSE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl LineItemClassifier {
    pub fn new(hour_units: Vec<String>, course_keywords: Vec<String>) -> Self {
        Self {
            hour_units,
            course_pattern: keyword_pattern(&course_keywords),
        }
    }

    /// Exact, case-sensitive match against the hour-unit set.
    pub fn is_hour_unit(&self, unit: &str) -> bool {
        self.hour_units.iter().any(|u| u == unit)
    }

    pub fn is_course_item(&self, item: &InvoiceLineItem) -> bool {
        if self.is_hour_unit(&item.unit) {
            return false;
        }
        self.course_pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&item.searchable_text()))
    }

    pub fn line_kind(&self, item: &InvoiceLineItem) -> LineKind {
        if self.is_hour_unit(&item.unit) {
            LineKind::HourPackage
        } else if self.is_course_item(item) {
            LineKind::CourseContract
        } else {
            LineKind::Other
        }
    }

    /// The hour package an item represents, if its unit denotes hours.
    pub fn classify(
        &self,
        client_id: Uuid,
        invoice: &Invoice,
        item: &InvoiceLineItem,
    ) -> Option<HourPackage> {
        if !self.is_hour_unit(&item.unit) {
            return None;
        }
        Some(HourPackage {
            invoice_id: invoice.invoice_id,
            line_number: item.line_number,
            client_id,
            purchase_date: invoice.issue_date,
            total_hours: item.quantity,
            amount: item.total,
            currency: item.currency.clone(),
            source: PackageSource::HourBlock,
        })
    }
}

fn keyword_pattern(keywords: &[String]) -> Option<Regex> {
    let alternation = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    if alternation.is_empty() {
        return None;
    }
    match Regex::new(&format!(r"(?i)\b(?:{alternation})\b")) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            warn!(error = %e, "Course keywords do not form a valid pattern");
            None
        }
    }
}
