//! Rate definition ("slab") model.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::{Region, TaxConfiguration};

/// Tolerance for the central + regional = combined check.
pub fn split_rate_epsilon() -> Decimal {
    Decimal::new(1, 2)
}

/// Named tax rate with its regional split, owned by one configuration.
///
/// `central_rate`/`regional_rate`/`inter_regional_rate` are meaningful only
/// when the owning configuration has `has_regional_tax`. All rates are
/// percentages within [0, 100].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateDefinition {
    pub rate_id: Uuid,
    pub config_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub code: String,
    pub combined_rate: Decimal,
    pub central_rate: Decimal,
    pub regional_rate: Decimal,
    pub inter_regional_rate: Decimal,
    pub is_zero_rated: bool,
    pub is_exempt: bool,
    pub is_default: bool,
    pub is_active: bool,
    pub is_deleted: bool,
    pub display_order: i32,
    pub created_utc: DateTime<Utc>,
}

impl RateDefinition {
    /// Clone of this slab with the region's override applied.
    ///
    /// For systems without an inter-regional concept (US-style sales tax)
    /// the caller resolves the buyer's region and passes the adjusted slab
    /// to the calculator; the calculator itself never looks up regions.
    pub fn with_region_override(&self, region: &Region) -> RateDefinition {
        let mut adjusted = self.clone();
        if let Some(rate) = region.regional_tax_rate {
            adjusted.regional_rate = rate;
        }
        if region.has_local_tax {
            if let Some(local) = region.local_tax_rate {
                adjusted.regional_rate += local;
            }
        }
        adjusted.combined_rate = adjusted.central_rate + adjusted.regional_rate;
        adjusted
    }
}

/// Input for creating a rate definition.
#[derive(Debug, Clone, Validate)]
pub struct CreateRateDefinition {
    pub tenant_id: Uuid,
    pub config_id: Uuid,
    #[validate(length(min = 1, message = "Rate definition name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Rate definition code is required"))]
    pub code: String,
    pub combined_rate: Decimal,
    pub central_rate: Decimal,
    pub regional_rate: Decimal,
    pub inter_regional_rate: Decimal,
    pub is_zero_rated: bool,
    pub is_exempt: bool,
    pub is_default: bool,
    pub display_order: i32,
}

impl CreateRateDefinition {
    pub fn validate_for_save(&self, config: &TaxConfiguration) -> Result<(), AppError> {
        self.validate()?;
        validate_rates(
            config,
            self.combined_rate,
            self.central_rate,
            self.regional_rate,
            self.inter_regional_rate,
            self.is_zero_rated,
            self.is_exempt,
        )
    }
}

/// Input for updating a rate definition. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateRateDefinition {
    pub name: Option<String>,
    pub code: Option<String>,
    pub combined_rate: Option<Decimal>,
    pub central_rate: Option<Decimal>,
    pub regional_rate: Option<Decimal>,
    pub inter_regional_rate: Option<Decimal>,
    pub is_zero_rated: Option<bool>,
    pub is_exempt: Option<bool>,
    pub is_default: Option<bool>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

impl UpdateRateDefinition {
    /// Validate the update as it would apply on top of `existing`.
    pub fn validate_against(
        &self,
        config: &TaxConfiguration,
        existing: &RateDefinition,
    ) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation(anyhow!("name must not be empty")));
            }
        }
        if let Some(code) = &self.code {
            if code.trim().is_empty() {
                return Err(AppError::Validation(anyhow!("code must not be empty")));
            }
        }
        validate_rates(
            config,
            self.combined_rate.unwrap_or(existing.combined_rate),
            self.central_rate.unwrap_or(existing.central_rate),
            self.regional_rate.unwrap_or(existing.regional_rate),
            self.inter_regional_rate
                .unwrap_or(existing.inter_regional_rate),
            self.is_zero_rated.unwrap_or(existing.is_zero_rated),
            self.is_exempt.unwrap_or(existing.is_exempt),
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn validate_rates(
    config: &TaxConfiguration,
    combined_rate: Decimal,
    central_rate: Decimal,
    regional_rate: Decimal,
    inter_regional_rate: Decimal,
    is_zero_rated: bool,
    is_exempt: bool,
) -> Result<(), AppError> {
    check_rate_range("combined_rate", combined_rate)?;
    check_rate_range("central_rate", central_rate)?;
    check_rate_range("regional_rate", regional_rate)?;
    check_rate_range("inter_regional_rate", inter_regional_rate)?;

    if is_zero_rated && is_exempt {
        return Err(AppError::Validation(anyhow!(
            "is_zero_rated and is_exempt are mutually exclusive"
        )));
    }
    if (is_zero_rated || is_exempt) && !combined_rate.is_zero() {
        let flag = if is_exempt { "is_exempt" } else { "is_zero_rated" };
        return Err(AppError::Validation(anyhow!(
            "{} requires combined_rate to be 0, got {}",
            flag,
            combined_rate
        )));
    }

    // A slab with a nonzero central component is a true split system (India
    // GST, Canada GST+PST): the split must add up to the combined rate.
    // US-style slabs leave central_rate at 0 and carry the effective rate in
    // regional_rate/region overrides, with no split constraint.
    if config.has_regional_tax && central_rate > Decimal::ZERO {
        let split = central_rate + regional_rate;
        if (split - combined_rate).abs() > split_rate_epsilon() {
            return Err(AppError::Validation(anyhow!(
                "central_rate + regional_rate ({}) does not equal combined_rate ({})",
                split,
                combined_rate
            )));
        }
    }

    Ok(())
}

fn check_rate_range(field: &str, value: Decimal) -> Result<(), AppError> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(AppError::Validation(anyhow!(
            "{} ({}) must be between 0 and 100",
            field,
            value
        )));
    }
    Ok(())
}
