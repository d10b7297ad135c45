//! Engine configuration loaded from `GRANARY_*` environment variables.

use core::str::FromStr;

use rust_decimal::Decimal;

use granary_warehouse::{DEFAULT_SLOT_CAPACITY, Pricing};

pub const ENV_SLOT_CAPACITY: &str = "GRANARY_SLOT_CAPACITY";
pub const ENV_MAX_DISPATCH_ATTEMPTS: &str = "GRANARY_MAX_DISPATCH_ATTEMPTS";
pub const ENV_RECORD_TERM_DAYS: &str = "GRANARY_RECORD_TERM_DAYS";
pub const ENV_RENT_PER_QUINTAL_PER_MONTH: &str = "GRANARY_RENT_PER_QUINTAL_PER_MONTH";
pub const ENV_MAINTENANCE_PER_MONTH: &str = "GRANARY_MAINTENANCE_PER_MONTH";
pub const ENV_INSURANCE_PER_YEAR: &str = "GRANARY_INSURANCE_PER_YEAR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Capacity (bags) of every slot in newly created layouts.
    pub slot_capacity: u32,
    /// Optimistic-concurrency attempts per mutation.
    pub max_dispatch_attempts: u32,
    /// Length of a customer storage record, in days.
    pub record_term_days: u32,
    /// Pricing applied when no warehouse pricing is in scope.
    pub default_pricing: Pricing,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            max_dispatch_attempts: 5,
            record_term_days: 90,
            default_pricing: Pricing::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing keys keep their default;
    /// unparseable or out-of-range values log a warning and keep it too.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let positive = |v: &u32| *v > 0;
        let non_negative = |v: &Decimal| *v >= Decimal::ZERO;

        Self {
            slot_capacity: read(&lookup, ENV_SLOT_CAPACITY, defaults.slot_capacity, positive),
            max_dispatch_attempts: read(
                &lookup,
                ENV_MAX_DISPATCH_ATTEMPTS,
                defaults.max_dispatch_attempts,
                positive,
            ),
            record_term_days: read(
                &lookup,
                ENV_RECORD_TERM_DAYS,
                defaults.record_term_days,
                positive,
            ),
            default_pricing: Pricing::new(
                read(
                    &lookup,
                    ENV_RENT_PER_QUINTAL_PER_MONTH,
                    defaults.default_pricing.rent_per_quintal_per_month,
                    non_negative,
                ),
                read(
                    &lookup,
                    ENV_MAINTENANCE_PER_MONTH,
                    defaults.default_pricing.maintenance_per_month,
                    non_negative,
                ),
                read(
                    &lookup,
                    ENV_INSURANCE_PER_YEAR,
                    defaults.default_pricing.insurance_per_year,
                    non_negative,
                ),
            ),
        }
    }
}

fn read<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T
where
    T: FromStr + core::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            tracing::warn!(
                key,
                value = %raw,
                default = %default,
                "ignoring invalid configuration value"
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(EngineConfig::from_lookup(|_| None), EngineConfig::default());
        assert_eq!(EngineConfig::default().slot_capacity, 1500);
    }

    #[test]
    fn reads_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_SLOT_CAPACITY, "2000"),
            (ENV_MAX_DISPATCH_ATTEMPTS, " 9 "),
            (ENV_RENT_PER_QUINTAL_PER_MONTH, "7.5"),
        ]));
        assert_eq!(config.slot_capacity, 2000);
        assert_eq!(config.max_dispatch_attempts, 9);
        assert_eq!(
            config.default_pricing.rent_per_quintal_per_month,
            Decimal::new(75, 1)
        );
        assert_eq!(config.default_pricing.insurance_per_year, Decimal::from(5));
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_SLOT_CAPACITY, "0"),
            (ENV_RECORD_TERM_DAYS, "ninety"),
            (ENV_MAINTENANCE_PER_MONTH, "-1"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }
}
