//! Storage pricing schedule.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use granary_core::{DomainError, DomainResult, ValueObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub rent_per_quintal_per_month: Decimal,
    pub maintenance_per_month: Decimal,
    pub insurance_per_year: Decimal,
}

impl ValueObject for Pricing {}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            rent_per_quintal_per_month: Decimal::from(7),
            maintenance_per_month: Decimal::from(6),
            insurance_per_year: Decimal::from(5),
        }
    }
}

impl Pricing {
    pub fn new(
        rent_per_quintal_per_month: Decimal,
        maintenance_per_month: Decimal,
        insurance_per_year: Decimal,
    ) -> Self {
        Self {
            rent_per_quintal_per_month,
            maintenance_per_month,
            insurance_per_year,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        for (name, value) in [
            ("rent_per_quintal_per_month", self.rent_per_quintal_per_month),
            ("maintenance_per_month", self.maintenance_per_month),
            ("insurance_per_year", self.insurance_per_year),
        ] {
            if value < Decimal::ZERO {
                return Err(DomainError::invalid(format!("{name} cannot be negative")));
            }
        }
        Ok(())
    }

    /// Overlay the fields present in `update`.
    pub fn merged(self, update: &PricingUpdate) -> Self {
        Self {
            rent_per_quintal_per_month: update
                .rent_per_quintal_per_month
                .unwrap_or(self.rent_per_quintal_per_month),
            maintenance_per_month: update
                .maintenance_per_month
                .unwrap_or(self.maintenance_per_month),
            insurance_per_year: update.insurance_per_year.unwrap_or(self.insurance_per_year),
        }
    }
}

/// Partial pricing change; absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingUpdate {
    pub rent_per_quintal_per_month: Option<Decimal>,
    pub maintenance_per_month: Option<Decimal>,
    pub insurance_per_year: Option<Decimal>,
}

impl PricingUpdate {
    pub fn is_empty(&self) -> bool {
        self.rent_per_quintal_per_month.is_none()
            && self.maintenance_per_month.is_none()
            && self.insurance_per_year.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_fields_absent_from_the_update() {
        let update = PricingUpdate {
            maintenance_per_month: Some(Decimal::from(9)),
            ..PricingUpdate::default()
        };
        let merged = Pricing::default().merged(&update);
        assert_eq!(merged.rent_per_quintal_per_month, Decimal::from(7));
        assert_eq!(merged.maintenance_per_month, Decimal::from(9));
        assert_eq!(merged.insurance_per_year, Decimal::from(5));
    }

    #[test]
    fn negative_components_are_rejected() {
        let pricing = Pricing::new(Decimal::from(-1), Decimal::ZERO, Decimal::ZERO);
        assert!(matches!(pricing.validate(), Err(DomainError::InvalidArgument(_))));
        assert!(Pricing::default().validate().is_ok());
    }
}
