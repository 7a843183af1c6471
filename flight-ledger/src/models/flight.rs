//! Flight record model, read from the flight log.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Category derived from the free-form flight-type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightTag {
    Ferry,
    Demo,
    Charter,
    Standard,
}

impl FlightTag {
    /// Case-insensitive substring classification. FERRY wins over DEMO,
    /// DEMO over CHARTER.
    pub fn classify(flight_type: &str) -> Self {
        let tag = flight_type.to_uppercase();
        if tag.contains("FERRY") {
            Self::Ferry
        } else if tag.contains("DEMO") {
            Self::Demo
        } else if tag.contains("CHARTER") {
            Self::Charter
        } else {
            Self::Standard
        }
    }

    /// Ferry and demo hours never deplete purchased packages.
    pub fn is_excluded_from_consumption(self) -> bool {
        matches!(self, Self::Ferry | Self::Demo)
    }
}

/// One logged flight.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FlightRecord {
    pub flight_id: Uuid,
    pub pilot_id: Option<Uuid>,
    pub instructor_id: Option<Uuid>,
    pub payer_id: Option<Uuid>,
    pub flight_date: NaiveDate,
    pub total_hours: Decimal,
    pub flight_type: String,
}

impl FlightRecord {
    pub fn tag(&self) -> FlightTag {
        FlightTag::classify(&self.flight_type)
    }

    /// The payer, when it is someone other than the pilot.
    pub fn third_party_payer(&self) -> Option<Uuid> {
        self.payer_id.filter(|payer| Some(*payer) != self.pilot_id)
    }

    /// True when the client flew this flight or paid for it.
    pub fn involves(&self, client_id: Uuid) -> bool {
        self.pilot_id == Some(client_id) || self.payer_id == Some(client_id)
    }
}
