//! Per-client flight-hour categories.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use crate::models::{
    FlightRecord, FlightTag, FlightTotals, NoteKind, ProcessingNote, RecordRef, YearBucket,
};

#[derive(Debug, Clone, Default)]
pub struct FlightAggregation {
    pub totals: HashMap<Uuid, FlightTotals>,
    /// Records that were skipped.
    pub notes: Vec<ProcessingNote>,
}

impl FlightAggregation {
    /// Totals for one client; zero when the client has no flights.
    pub fn for_client(&self, client_id: Uuid) -> FlightTotals {
        self.totals.get(&client_id).copied().unwrap_or_default()
    }
}

/// Sum flight records into per-client categories, split by year relative to `as_of`.
///
/// A flight paid for by someone other than the pilot lands in the pilot's
/// `charter` bucket and in the payer's `chartered` bucket. Ferry and demo
/// flights count only in their own bucket on the pilot side.
pub fn aggregate(records: &[FlightRecord], as_of: NaiveDate) -> FlightAggregation {
    let mut aggregation = FlightAggregation::default();

    for record in records {
        let Some(pilot_id) = record.pilot_id else {
            warn!(flight_id = %record.flight_id, "Flight record has no pilot, skipping");
            aggregation.notes.push(ProcessingNote::new(
                RecordRef::Flight {
                    flight_id: record.flight_id,
                },
                NoteKind::MissingClientLinkage,
                "flight record has no pilot",
            ));
            continue;
        };

        if record.total_hours < Decimal::ZERO {
            warn!(
                flight_id = %record.flight_id,
                hours = %record.total_hours,
                "Flight record has negative hours, skipping"
            );
            aggregation.notes.push(ProcessingNote::new(
                RecordRef::Flight {
                    flight_id: record.flight_id,
                },
                NoteKind::NegativeFlightHours,
                format!("total_hours = {}", record.total_hours),
            ));
            continue;
        }

        let hours = record.total_hours;
        let bucket = YearBucket::for_date(record.flight_date, as_of);
        let tag = record.tag();

        match tag {
            FlightTag::Ferry => {
                let pilot = aggregation.totals.entry(pilot_id).or_default();
                pilot.ferry.add(hours, bucket);
            }
            FlightTag::Demo => {
                let pilot = aggregation.totals.entry(pilot_id).or_default();
                pilot.demo.add(hours, bucket);
            }
            FlightTag::Charter | FlightTag::Standard => {
                let payer = record.third_party_payer();
                let pilot = aggregation.totals.entry(pilot_id).or_default();
                if tag == FlightTag::Charter || payer.is_some() {
                    pilot.charter.add(hours, bucket);
                }
                if payer.is_none() {
                    pilot.regular.add(hours, bucket);
                }
                if let Some(payer_id) = payer {
                    aggregation
                        .totals
                        .entry(payer_id)
                        .or_default()
                        .chartered
                        .add(hours, bucket);
                }
            }
        }
    }

    aggregation
}
