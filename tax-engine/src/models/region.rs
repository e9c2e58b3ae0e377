//! Sub-national region model.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// State/province with optional rate override and local add-on.
///
/// Regions inform the caller's slab selection; the calculator never reads
/// them directly.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Region {
    pub region_id: Uuid,
    pub config_id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub regional_tax_rate: Option<Decimal>,
    pub has_local_tax: bool,
    pub local_tax_rate: Option<Decimal>,
    pub display_order: i32,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_utc: DateTime<Utc>,
}

/// Whether a transaction crosses regions.
///
/// The buyer's ship-to region is authoritative; sellers configure their own
/// region code once and callers pass both codes per transaction.
pub fn is_inter_regional(seller_region_code: &str, buyer_region_code: &str) -> bool {
    !seller_region_code
        .trim()
        .eq_ignore_ascii_case(buyer_region_code.trim())
}

/// Input for creating a region.
#[derive(Debug, Clone, Validate)]
pub struct CreateRegion {
    pub tenant_id: Uuid,
    pub config_id: Uuid,
    #[validate(length(min = 1, message = "Region code is required"))]
    pub code: String,
    #[validate(length(min = 1, message = "Region name is required"))]
    pub name: String,
    pub regional_tax_rate: Option<Decimal>,
    pub has_local_tax: bool,
    pub local_tax_rate: Option<Decimal>,
    pub display_order: i32,
}

impl CreateRegion {
    pub fn validate_for_save(&self) -> Result<(), AppError> {
        self.validate()?;
        validate_region_rates(
            self.regional_tax_rate,
            self.has_local_tax,
            self.local_tax_rate,
        )
    }
}

/// Input for updating a region. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateRegion {
    pub code: Option<String>,
    pub name: Option<String>,
    pub regional_tax_rate: Option<Decimal>,
    pub has_local_tax: Option<bool>,
    pub local_tax_rate: Option<Decimal>,
    pub display_order: Option<i32>,
    pub is_active: Option<bool>,
}

impl UpdateRegion {
    /// Validate the update as it would apply on top of `existing`.
    pub fn validate_against(&self, existing: &Region) -> Result<(), AppError> {
        if let Some(code) = &self.code {
            if code.trim().is_empty() {
                return Err(AppError::Validation(anyhow!("code must not be empty")));
            }
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation(anyhow!("name must not be empty")));
            }
        }
        validate_region_rates(
            self.regional_tax_rate.or(existing.regional_tax_rate),
            self.has_local_tax.unwrap_or(existing.has_local_tax),
            self.local_tax_rate.or(existing.local_tax_rate),
        )
    }
}

fn validate_region_rates(
    regional_tax_rate: Option<Decimal>,
    has_local_tax: bool,
    local_tax_rate: Option<Decimal>,
) -> Result<(), AppError> {
    if let Some(rate) = regional_tax_rate {
        check_rate_range("regional_tax_rate", rate)?;
    }
    if has_local_tax {
        match local_tax_rate {
            Some(rate) => check_rate_range("local_tax_rate", rate)?,
            None => {
                return Err(AppError::Validation(anyhow!(
                    "local_tax_rate is required when has_local_tax is set"
                )))
            }
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
