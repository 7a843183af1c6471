//! Oldest-first consumption of charged hours against purchased packages.

use rust_decimal::Decimal;

use crate::models::{HourPackage, PackageStatus, PackageUsage};

/// Default threshold at or below which a package shows as low.
pub const DEFAULT_LOW_HOURS_THRESHOLD: Decimal = Decimal::ONE;

pub fn derive_status(remaining_hours: Decimal, low_hours_threshold: Decimal) -> PackageStatus {
    if remaining_hours <= Decimal::ZERO {
        PackageStatus::Overdrawn
    } else if remaining_hours <= low_hours_threshold {
        PackageStatus::LowHours
    } else {
        PackageStatus::InProgress
    }
}

/// Consume `hours_to_consume` across `packages` ordered by purchase date,
/// then invoice id. Packages of the same invoice keep their line order.
pub fn allocate(
    mut packages: Vec<HourPackage>,
    hours_to_consume: Decimal,
    low_hours_threshold: Decimal,
) -> Vec<PackageUsage> {
    packages.sort_by(|a, b| {
        a.purchase_date
            .cmp(&b.purchase_date)
            .then_with(|| a.invoice_id.cmp(&b.invoice_id))
    });

    let mut left = hours_to_consume.max(Decimal::ZERO);
    packages
        .into_iter()
        .map(|package| {
            let total = package.total_hours;
            let used = if left <= Decimal::ZERO {
                Decimal::ZERO
            } else if left >= total {
                left -= total;
                total
            } else {
                let used = left;
                left = Decimal::ZERO;
                used
            };
            let remaining = total - used;
            PackageUsage {
                status: derive_status(remaining, low_hours_threshold),
                package,
                used_hours: used,
                remaining_hours: remaining,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PackageSource;
    use chrono::NaiveDate;
    use std::str::FromStr;
    use uuid::Uuid;

    fn package(hours: &str, year: i32, month: u32, day: u32) -> HourPackage {
        HourPackage {
            invoice_id: Uuid::new_v4(),
            line_number: 1,
            client_id: Uuid::nil(),
            purchase_date: NaiveDate::from_ymd_opt(year, month, day).unwrap(),
            total_hours: Decimal::from_str(hours).unwrap(),
            amount: Decimal::from(1000),
            currency: "EUR".to_string(),
            source: PackageSource::HourBlock,
        }
    }

    #[test]
    fn test_single_package_partially_used() {
        let usage = allocate(
            vec![package("10", 2024, 1, 1)],
            Decimal::from(4),
            DEFAULT_LOW_HOURS_THRESHOLD,
        );
        assert_eq!(usage[0].used_hours, Decimal::from(4));
        assert_eq!(usage[0].remaining_hours, Decimal::from(6));
        assert_eq!(usage[0].status, PackageStatus::InProgress);
    }

    #[test]
    fn test_oldest_package_consumed_first() {
        // Passed newest-first to check that ordering comes from purchase date.
        let newer = package("10", 2024, 3, 1);
        let older = package("5", 2024, 1, 1);
        let usage = allocate(vec![newer, older], Decimal::from(7), DEFAULT_LOW_HOURS_THRESHOLD);

        assert_eq!(usage[0].package.total_hours, Decimal::from(5));
        assert_eq!(usage[0].used_hours, Decimal::from(5));
        assert_eq!(usage[0].remaining_hours, Decimal::ZERO);
        assert_eq!(usage[0].status, PackageStatus::Overdrawn);
        assert_eq!(usage[1].used_hours, Decimal::from(2));
        assert_eq!(usage[1].remaining_hours, Decimal::from(8));
    }

    #[test]
    fn test_status_thresholds() {
        let threshold = DEFAULT_LOW_HOURS_THRESHOLD;
        assert_eq!(
            derive_status(Decimal::from_str("0.5").unwrap(), threshold),
            PackageStatus::LowHours
        );
        assert_eq!(derive_status(Decimal::ONE, threshold), PackageStatus::LowHours);
        assert_eq!(derive_status(Decimal::ZERO, threshold), PackageStatus::Overdrawn);
        assert_eq!(derive_status(Decimal::from(5), threshold), PackageStatus::InProgress);
    }

    #[test]
    fn test_same_day_ties_break_on_invoice_id() {
        let mut a = package("3", 2024, 5, 5);
        let mut b = package("3", 2024, 5, 5);
        a.invoice_id = Uuid::from_u128(2);
        b.invoice_id = Uuid::from_u128(1);

        let usage = allocate(vec![a, b], Decimal::from(4), DEFAULT_LOW_HOURS_THRESHOLD);
        assert_eq!(usage[0].package.invoice_id, Uuid::from_u128(1));
        assert_eq!(usage[0].used_hours, Decimal::from(3));
        assert_eq!(usage[1].used_hours, Decimal::ONE);
    }

    #[test]
    fn test_conservation_over_generated_sets() {
        let sizes = ["0.5", "1", "2.25", "5", "10", "45", "11", "12"];
        for n in 1..=sizes.len() {
            let packages: Vec<_> = sizes[..n]
                .iter()
                .enumerate()
                .map(|(i, h)| package(h, 2024, 1 + (i as u32 % 12), 1 + i as u32))
                .collect();
            let purchased: Decimal = packages.iter().map(|p| p.total_hours).sum();

            for consume in ["0", "0.25", "3", "7.5", "20", "200", "-4"] {
                let consume = Decimal::from_str(consume).unwrap();
                let usage = allocate(packages.clone(), consume, DEFAULT_LOW_HOURS_THRESHOLD);

                let used: Decimal = usage.iter().map(|u| u.used_hours).sum();
                assert_eq!(used, consume.max(Decimal::ZERO).min(purchased));
                for u in &usage {
                    assert!(u.used_hours >= Decimal::ZERO);
                    assert!(u.used_hours <= u.package.total_hours);
                    assert_eq!(u.used_hours + u.remaining_hours, u.package.total_hours);
                }
            }
        }
    }
}
