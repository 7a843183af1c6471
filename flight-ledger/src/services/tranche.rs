//! Installment (tranche) extraction from free-text course-contract descriptions.
//!
//! Descriptions come from years of hand-written invoices in Romanian and
//! English ("Rata 2/4", "Installment 3 of 5", "Curs PPL - rata finală",
//! "tranșa 1 (2875 euro)"). Each recognised shape is one [`TranchePattern`];
//! patterns are tried in [`TranchePattern::PRIORITY`] order and the first
//! structural match wins. An embedded amount is not structural: it rides along
//! with whichever pattern wins and only stands on its own when nothing else
//! matched.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const INSTALLMENT_WORD: &str = r"(?:rat[aă]|tran[sșş][aăe]|tranche|instal{1,2}ments?)";
const NUMBER_PREFIX: &str = r"(?:nr\.?|no\.?|#)?";

static NUMBERED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b{INSTALLMENT_WORD}\s*{NUMBER_PREFIX}\s*(\d+)(?:\s*/\s*(\d+))?"
    ))
    .expect("valid numbered tranche regex")
});

static OF_FOLLOWS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:of|din)\b").expect("valid of/din regex"));

static NUMBERED_OF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b{INSTALLMENT_WORD}\s*{NUMBER_PREFIX}\s*(\d+)\s+(?:of|din)\s+(\d+)"
    ))
    .expect("valid numbered-of tranche regex")
});

static FINAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:rat[aă]|tran[sșş][aă]|plat[aă])\s+final[aă]|ultima\s+(?:rat[aă]|tran[sșş][aă])|(?:final|last)\s+(?:installment|instalment|tranche|payment))",
    )
    .expect("valid final tranche regex")
});

static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\(\s*(\d{1,3}(?:[.,\s]\d{3})+|\d+)(?:[.,](\d{1,2}))?\s*(?:euro|eur|€|lei|ron)\s*\)",
    )
    .expect("valid amount regex")
});

/// One recognised description shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranchePattern {
    /// "Rata 2/4", "Installment 3", "tranșa nr. 1".
    Numbered,
    /// "(2875 euro)", "(2.875,50 EUR)", "(1500 lei)".
    EmbeddedAmount,
    /// "rata finală", "ultima rată", "last installment".
    FinalInstallment,
    /// "Rata 2 din 4", "Installment 3 of 5".
    NumberedOf,
}

/// Tagged result of a single pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrancheMatch {
    Numbered { number: u32, total: Option<u32> },
    Amount(Decimal),
    Final,
    NumberedOf { number: u32, total: u32 },
}

impl TranchePattern {
    pub const PRIORITY: [TranchePattern; 4] = [
        TranchePattern::Numbered,
        TranchePattern::EmbeddedAmount,
        TranchePattern::FinalInstallment,
        TranchePattern::NumberedOf,
    ];

    pub fn try_match(self, text: &str) -> Option<TrancheMatch> {
        match self {
            TranchePattern::Numbered => match_numbered(text),
            TranchePattern::EmbeddedAmount => match_amount(text),
            TranchePattern::FinalInstallment => {
                FINAL.is_match(text).then_some(TrancheMatch::Final)
            }
            TranchePattern::NumberedOf => match_numbered_of(text),
        }
    }
}

/// Parsed installment structure of one course payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrancheDescriptor {
    pub tranche_number: u32,
    pub total_tranches: Option<u32>,
    pub is_final: bool,
    pub amount: Option<Decimal>,
    /// The pattern that decided the structure.
    pub pattern: TranchePattern,
}

/// Extract the installment structure from a description, if any pattern fits.
pub fn parse(description: &str) -> Option<TrancheDescriptor> {
    let mut amount = None;
    let mut structure: Option<(TranchePattern, TrancheMatch)> = None;

    for pattern in TranchePattern::PRIORITY {
        match pattern.try_match(description) {
            Some(TrancheMatch::Amount(value)) => amount = Some(value),
            Some(found) if structure.is_none() => structure = Some((pattern, found)),
            _ => {}
        }
    }

    let descriptor = match structure {
        Some((pattern, TrancheMatch::Numbered { number, total })) => TrancheDescriptor {
            tranche_number: number,
            total_tranches: total,
            is_final: total == Some(number),
            amount,
            pattern,
        },
        Some((pattern, TrancheMatch::Final)) => TrancheDescriptor {
            tranche_number: 1,
            total_tranches: Some(1),
            is_final: true,
            amount,
            pattern,
        },
        Some((pattern, TrancheMatch::NumberedOf { number, total })) => TrancheDescriptor {
            tranche_number: number,
            total_tranches: Some(total),
            is_final: number == total,
            amount,
            pattern,
        },
        Some((_, TrancheMatch::Amount(_))) | None => TrancheDescriptor {
            tranche_number: 1,
            total_tranches: None,
            is_final: false,
            amount: Some(amount?),
            pattern: TranchePattern::EmbeddedAmount,
        },
    };
    Some(descriptor)
}

/// Parse a record whose installment text may be split across several fields,
/// most specific first. A structural match in any field beats an amount-only
/// match; a structure without an amount borrows the first amount found.
pub fn parse_fields(fields: &[&str]) -> Option<TrancheDescriptor> {
    let parsed: Vec<TrancheDescriptor> = fields.iter().filter_map(|f| parse(f)).collect();
    let amount = parsed.iter().find_map(|d| d.amount);
    let mut descriptor = parsed
        .iter()
        .find(|d| d.pattern != TranchePattern::EmbeddedAmount)
        .or_else(|| parsed.first())?
        .clone();
    descriptor.amount = descriptor.amount.or(amount);
    Some(descriptor)
}

fn match_numbered(text: &str) -> Option<TrancheMatch> {
    let caps = NUMBERED.captures(text)?;
    let whole = caps.get(0)?;
    let total = caps.get(2).and_then(|m| m.as_str().parse().ok());
    // "Rata 2 din 4" belongs to the numbered-of pattern.
    if total.is_none() && OF_FOLLOWS.is_match(&text[whole.end()..]) {
        return None;
    }
    let number = caps.get(1)?.as_str().parse().ok()?;
    Some(TrancheMatch::Numbered { number, total })
}

fn match_numbered_of(text: &str) -> Option<TrancheMatch> {
    let caps = NUMBERED_OF.captures(text)?;
    let number = caps.get(1)?.as_str().parse().ok()?;
    let total = caps.get(2)?.as_str().parse().ok()?;
    Some(TrancheMatch::NumberedOf { number, total })
}

fn match_amount(text: &str) -> Option<TrancheMatch> {
    let caps = AMOUNT.captures(text)?;
    let units: String = caps
        .get(1)?
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    let value = match caps.get(2) {
        Some(cents) => format!("{}.{}", units, cents.as_str()),
        None => units,
    };
    Decimal::from_str(&value).ok().map(TrancheMatch::Amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_with_total() {
        let d = parse("Installment 1/4").unwrap();
        assert_eq!(d.tranche_number, 1);
        assert_eq!(d.total_tranches, Some(4));
        assert!(!d.is_final);
        assert_eq!(d.pattern, TranchePattern::Numbered);
    }

    #[test]
    fn test_numbered_romanian_without_total() {
        let d = parse("Curs PPL(A) - tranșa nr. 3").unwrap();
        assert_eq!(d.tranche_number, 3);
        assert_eq!(d.total_tranches, None);
        assert_eq!(d.amount, None);
    }

    #[test]
    fn test_numbered_last_of_declared_total_is_final() {
        let d = parse("RATA 4/4").unwrap();
        assert!(d.is_final);
    }

    #[test]
    fn test_amount_rides_along_with_structure() {
        let d = parse("Curs PPL rata 2 (2875 euro)").unwrap();
        assert_eq!(d.tranche_number, 2);
        assert_eq!(d.total_tranches, None);
        assert_eq!(d.amount, Some(Decimal::from(2875)));
    }

    #[test]
    fn test_amount_with_thousands_and_cents() {
        let d = parse("Rata 1 (2.875,50 EUR)").unwrap();
        assert_eq!(d.amount, Some(Decimal::from_str("2875.50").unwrap()));

        let d = parse("Rata 1 (1 500 lei)").unwrap();
        assert_eq!(d.amount, Some(Decimal::from(1500)));
    }

    #[test]
    fn test_amount_alone_yields_first_tranche_with_unknown_total() {
        let d = parse("Curs pilot privat (2000 euro)").unwrap();
        assert_eq!(d.tranche_number, 1);
        assert_eq!(d.total_tranches, None);
        assert_eq!(d.amount, Some(Decimal::from(2000)));
        assert_eq!(d.pattern, TranchePattern::EmbeddedAmount);
    }

    #[test]
    fn test_parenthesised_number_without_currency_is_not_an_amount() {
        assert!(parse("Curs PPL (2024)").is_none());
    }

    #[test]
    fn test_final_installment_is_single_payment() {
        for text in [
            "Curs PPL - rata finală",
            "Ultima rata curs",
            "Course fee, final installment",
            "Last installment",
            "plata finala",
        ] {
            let d = parse(text).unwrap_or_else(|| panic!("no match for {text:?}"));
            assert_eq!(d.tranche_number, 1, "{text}");
            assert_eq!(d.total_tranches, Some(1), "{text}");
            assert!(d.is_final, "{text}");
            assert_eq!(d.pattern, TranchePattern::FinalInstallment);
        }
    }

    #[test]
    fn test_numbered_of_defers_from_numbered() {
        let d = parse("Installment 2 of 5").unwrap();
        assert_eq!(d.pattern, TranchePattern::NumberedOf);
        assert_eq!(d.tranche_number, 2);
        assert_eq!(d.total_tranches, Some(5));
        assert!(!d.is_final);

        let d = parse("Rata 3 din 3 (1500 euro)").unwrap();
        assert_eq!(d.pattern, TranchePattern::NumberedOf);
        assert!(d.is_final);
        assert_eq!(d.amount, Some(Decimal::from(1500)));
    }

    #[test]
    fn test_first_installment_token_is_authoritative() {
        let d = parse("Rata 2/4, inlocuieste rata 1/4").unwrap();
        assert_eq!(d.tranche_number, 2);
        assert_eq!(d.total_tranches, Some(4));
    }

    #[test]
    fn test_word_boundaries() {
        // "separata" contains "rata" but is not an installment word.
        assert!(parse("Factura separata 2").is_none());
    }

    #[test]
    fn test_unrecognised_description() {
        assert!(parse("Curs PPL(A) complet").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn test_priority_order_is_stable() {
        assert_eq!(
            TranchePattern::PRIORITY,
            [
                TranchePattern::Numbered,
                TranchePattern::EmbeddedAmount,
                TranchePattern::FinalInstallment,
                TranchePattern::NumberedOf,
            ]
        );
    }

    #[test]
    fn test_comma_thousands_separator() {
        let d = parse("Curs PPL (1,500 euro)").unwrap();
        assert_eq!(d.amount, Some(Decimal::from(1500)));

        let d = parse("Rata 2 (12,500.50 EUR)").unwrap();
        assert_eq!(d.amount, Some(Decimal::from_str("12500.50").unwrap()));

        // Two decimals after a comma are cents, not thousands.
        let d = parse("Rata 2 (1,50 euro)").unwrap();
        assert_eq!(d.amount, Some(Decimal::from_str("1.50").unwrap()));
    }

    #[test]
    fn test_structure_in_any_field_beats_amount_only() {
        let d = parse_fields(&["Plata (2875 euro)", "Curs PPL(A) rata 4/4"]).unwrap();
        assert_eq!(d.tranche_number, 4);
        assert_eq!(d.total_tranches, Some(4));
        assert!(d.is_final);
        assert_eq!(d.pattern, TranchePattern::Numbered);
        assert_eq!(d.amount, Some(Decimal::from(2875)));
    }

    #[test]
    fn test_fields_fall_back_to_amount_only() {
        let d = parse_fields(&["Plata (2875 euro)", "Curs PPL(A)"]).unwrap();
        assert_eq!(d.pattern, TranchePattern::EmbeddedAmount);
        assert_eq!(d.total_tranches, None);
        assert!(parse_fields(&["", "Curs PPL(A)"]).is_none());
    }
}
