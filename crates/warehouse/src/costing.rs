//! Calendar-accurate storage duration and tiered storage cost.
//!
//! Rent is billed per quintal per started month, maintenance per started
//! month, insurance per started year. All amounts are rounded to two
//! decimals.

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use granary_core::{DomainError, DomainResult};

use crate::pricing::Pricing;

pub const CURRENCY_SYMBOL: &str = "₹";
const KG_PER_QUINTAL: i64 = 100;

/// Elapsed calendar time between two dates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePeriod {
    pub years: u32,
    pub months: u32,
    pub days: u32,
}

impl StoragePeriod {
    pub fn is_zero(&self) -> bool {
        self.years == 0 && self.months == 0 && self.days == 0
    }

    /// Months billed: a started month counts as a full month.
    pub fn billed_months(&self) -> u32 {
        self.years * 12 + self.months + u32::from(self.days > 0)
    }

    /// Years billed for insurance: a started year counts as a full year.
    pub fn billed_years(&self) -> u32 {
        self.years + u32::from(self.months > 0 || self.days > 0)
    }

    /// Human-readable form, e.g. `"1 year 3 months 5 days"`.
    pub fn describe(&self) -> String {
        [
            (self.years, "year"),
            (self.months, "month"),
            (self.days, "day"),
        ]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| {
            if n == 1 {
                format!("{n} {unit}")
            } else {
                format!("{n} {unit}s")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
    }
}

impl core::fmt::Display for StoragePeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Years, months and days from `entry` to `current`.
///
/// Field-wise difference with borrowing: a negative day count borrows the
/// length of the month before `current` (and of earlier months if the entry
/// day is longer than that month), a negative month count borrows a year.
pub fn storage_period(entry: NaiveDate, current: NaiveDate) -> DomainResult<StoragePeriod> {
    if current < entry {
        return Err(DomainError::invalid(format!(
            "current date {current} precedes entry date {entry}"
        )));
    }

    let mut years = current.year() - entry.year();
    let mut months = current.month() as i32 - entry.month() as i32;
    let mut days = current.day() as i32 - entry.day() as i32;

    let mut cursor = current;
    while days < 0 {
        let previous_month_end = cursor
            .with_day(1)
            .and_then(|first| first.pred_opt())
            .ok_or_else(|| DomainError::invalid(format!("date {cursor} is out of range")))?;
        months -= 1;
        days += previous_month_end.day() as i32;
        cursor = previous_month_end;
    }

    while months < 0 {
        years -= 1;
        months += 12;
    }

    Ok(StoragePeriod {
        years: years.max(0) as u32,
        months: months as u32,
        days: days as u32,
    })
}

/// Display strings showing how each line was computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostFormulas {
    pub rent: String,
    pub maintenance: String,
    pub insurance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub period: String,
    pub period_breakdown: StoragePeriod,
    pub quintals: Decimal,
    pub total_months: u32,
    pub total_years: u32,
    pub rent_cost: Decimal,
    pub maintenance_cost: Decimal,
    pub insurance_cost: Decimal,
    pub total_cost: Decimal,
    pub breakdown: CostFormulas,
}

fn overflow() -> DomainError {
    DomainError::invalid("storage cost overflows")
}

pub fn storage_cost(
    weight_kg: Decimal,
    entry: NaiveDate,
    current: NaiveDate,
    pricing: &Pricing,
) -> DomainResult<CostBreakdown> {
    if weight_kg < Decimal::ZERO {
        return Err(DomainError::invalid("weight cannot be negative"));
    }
    pricing.validate()?;

    let period = storage_period(entry, current)?;
    let quintals = weight_kg / Decimal::from(KG_PER_QUINTAL);
    let total_months = period.billed_months();
    let total_years = period.billed_years();

    let months = Decimal::from(total_months);
    let rent = pricing
        .rent_per_quintal_per_month
        .checked_mul(quintals)
        .and_then(|r| r.checked_mul(months));
    let maintenance = pricing.maintenance_per_month.checked_mul(months);
    let insurance = pricing
        .insurance_per_year
        .checked_mul(Decimal::from(total_years));
    let (Some(rent), Some(maintenance), Some(insurance)) = (rent, maintenance, insurance) else {
        return Err(overflow());
    };
    let total = rent
        .checked_add(maintenance)
        .and_then(|t| t.checked_add(insurance))
        .ok_or_else(overflow)?;

    let (quintals, rent, maintenance, insurance, total) = (
        round2(quintals),
        round2(rent),
        round2(maintenance),
        round2(insurance),
        round2(total),
    );

    let breakdown = CostFormulas {
        rent: format!(
            "{c}{} × {quintals:.2} quintals × {total_months} months = {c}{rent:.2}",
            pricing.rent_per_quintal_per_month,
            c = CURRENCY_SYMBOL,
        ),
        maintenance: format!(
            "{c}{} × {total_months} months = {c}{maintenance:.2}",
            pricing.maintenance_per_month,
            c = CURRENCY_SYMBOL,
        ),
        insurance: format!(
            "{c}{} × {total_years} year(s) = {c}{insurance:.2}",
            pricing.insurance_per_year,
            c = CURRENCY_SYMBOL,
        ),
    };

    Ok(CostBreakdown {
        period: period.describe(),
        period_breakdown: period,
        quintals,
        total_months,
        total_years,
        rent_cost: rent,
        maintenance_cost: maintenance,
        insurance_cost: insurance,
        total_cost: total,
        breakdown,
    })
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
