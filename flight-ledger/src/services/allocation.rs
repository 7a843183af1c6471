//! Course-contract hour allocation across installments.
//!
//! Non-final tranches get `floor(total / n)` hours and the final tranche gets
//! whatever is left, so one contract always sums to its fixed total exactly.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on installments inferred from a payment amount.
pub const MAX_TRANCHES: u32 = 6;

/// Default bands as `max_amount:tranches`, `*` for the open-ended top band.
pub const DEFAULT_TRANCHE_BANDS: &str = "2000:6,2500:5,3000:4,4000:3,6000:2,*:1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BandError {
    #[error("no amount bands configured")]
    Empty,

    #[error("malformed band '{0}', expected '<max_amount>:<tranches>' or '*:<tranches>'")]
    Malformed(String),

    #[error("band thresholds must be strictly ascending")]
    NotAscending,

    #[error("installment counts must not increase with the amount")]
    NotMonotonic,

    #[error("installment count {0} outside 1..={}", MAX_TRANCHES)]
    CountOutOfRange(u32),

    #[error("the open-ended band must be the last one")]
    OpenEndedNotLast,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrancheError {
    #[error("tranche number {number} outside 1..={total}")]
    OutOfRange { number: u32, total: u32 },
}

/// Payments up to `max_amount` imply `tranches` installments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountBand {
    /// `None` is the open-ended top band.
    pub max_amount: Option<Decimal>,
    pub tranches: u32,
}

/// Monotonic step function from payment amount to installment count.
///
/// This encodes contract pricing, so it is configuration rather than code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrancheBands {
    bands: Vec<AmountBand>,
}

impl Default for TrancheBands {
    fn default() -> Self {
        Self::parse(DEFAULT_TRANCHE_BANDS).expect("default tranche bands are valid")
    }
}

impl TrancheBands {
    pub fn new(bands: Vec<AmountBand>) -> Result<Self, BandError> {
        if bands.is_empty() {
            return Err(BandError::Empty);
        }
        for (i, band) in bands.iter().enumerate() {
            if band.tranches == 0 || band.tranches > MAX_TRANCHES {
                return Err(BandError::CountOutOfRange(band.tranches));
            }
            if band.max_amount.is_none() && i + 1 != bands.len() {
                return Err(BandError::OpenEndedNotLast);
            }
        }
        for pair in bands.windows(2) {
            if let (Some(lower), Some(upper)) = (pair[0].max_amount, pair[1].max_amount) {
                if upper <= lower {
                    return Err(BandError::NotAscending);
                }
            }
            if pair[1].tranches > pair[0].tranches {
                return Err(BandError::NotMonotonic);
            }
        }
        Ok(Self { bands })
    }

    /// Parse `"2000:6,2500:5,*:1"`.
    pub fn parse(input: &str) -> Result<Self, BandError> {
        let bands = input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|entry| {
                let (amount, count) = entry
                    .split_once(':')
                    .ok_or_else(|| BandError::Malformed(entry.to_string()))?;
                let max_amount = match amount.trim() {
                    "*" => None,
                    value => Some(
                        Decimal::from_str(value)
                            .map_err(|_| BandError::Malformed(entry.to_string()))?,
                    ),
                };
                let tranches = count
                    .trim()
                    .parse()
                    .map_err(|_| BandError::Malformed(entry.to_string()))?;
                Ok(AmountBand {
                    max_amount,
                    tranches,
                })
            })
            .collect::<Result<Vec<_>, BandError>>()?;
        Self::new(bands)
    }

    pub fn bands(&self) -> &[AmountBand] {
        &self.bands
    }

    /// Installment count for a payment amount, or `None` when it is above
    /// every bounded band and no open-ended band exists.
    pub fn infer(&self, amount: Decimal) -> Option<u32> {
        self.bands
            .iter()
            .find(|band| band.max_amount.is_none_or(|max| amount <= max))
            .map(|band| band.tranches)
    }
}

/// Hours allocated to one installment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrancheAllocation {
    pub tranche_number: u32,
    pub total_tranches: u32,
    pub hours: Decimal,
    /// `total_tranches` came from the amount bands.
    pub total_inferred: bool,
    /// Structure could not be determined; the whole course was allocated.
    pub single_payment: bool,
}

/// Hours for installment `number` of `total`; the final one takes the remainder.
pub fn tranche_hours(number: u32, total: u32, course_total_hours: Decimal) -> Decimal {
    let per_tranche = (course_total_hours / Decimal::from(total)).floor();
    if number == total {
        course_total_hours - per_tranche * Decimal::from(total - 1)
    } else {
        per_tranche
    }
}

/// Every installment's hours for a contract of `total` installments.
pub fn allocate_contract(total: u32, course_total_hours: Decimal) -> Vec<Decimal> {
    (1..=total)
        .map(|number| tranche_hours(number, total, course_total_hours))
        .collect()
}

#[derive(Debug, Clone)]
pub struct CourseAllocationCalculator {
    course_total_hours: Decimal,
    bands: TrancheBands,
}

impl CourseAllocationCalculator {
    pub fn new(course_total_hours: Decimal, bands: TrancheBands) -> Self {
        Self {
            course_total_hours,
            bands,
        }
    }

    pub fn course_total_hours(&self) -> Decimal {
        self.course_total_hours
    }

    pub fn allocate(
        &self,
        tranche_number: u32,
        total_tranches: Option<u32>,
        amount: Option<Decimal>,
    ) -> Result<TrancheAllocation, TrancheError> {
        let declared = total_tranches.filter(|total| *total > 0);
        let inferred = match declared {
            Some(_) => None,
            None => amount.and_then(|a| self.bands.infer(a)),
        };

        let Some(total) = declared.or(inferred) else {
            return Ok(TrancheAllocation {
                tranche_number: 1,
                total_tranches: 1,
                hours: self.course_total_hours,
                total_inferred: false,
                single_payment: true,
            });
        };

        if tranche_number == 0 || tranche_number > total {
            return Err(TrancheError::OutOfRange {
                number: tranche_number,
                total,
            });
        }

        Ok(TrancheAllocation {
            tranche_number,
            total_tranches: total,
            hours: tranche_hours(tranche_number, total, self.course_total_hours),
            total_inferred: inferred.is_some(),
            single_payment: false,
        })
    }
}
