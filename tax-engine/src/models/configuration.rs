//! Tax configuration model.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// National tax regime label. Descriptive metadata only: the calculator
/// branches on the `has_regional_tax`/`has_inter_regional_tax` flags, never
/// on this enum, so a `Custom` system needs no new calculation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxSystem {
    None,
    Gst,
    Vat,
    SalesTax,
    Hst,
    GstPst,
    Consumption,
    Custom,
}

impl TaxSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxSystem::None => "none",
            TaxSystem::Gst => "gst",
            TaxSystem::Vat => "vat",
            TaxSystem::SalesTax => "sales_tax",
            TaxSystem::Hst => "hst",
            TaxSystem::GstPst => "gst_pst",
            TaxSystem::Consumption => "consumption",
            TaxSystem::Custom => "custom",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "none" => TaxSystem::None,
            "gst" => TaxSystem::Gst,
            "vat" => TaxSystem::Vat,
            "sales_tax" => TaxSystem::SalesTax,
            "hst" => TaxSystem::Hst,
            "gst_pst" => TaxSystem::GstPst,
            "consumption" => TaxSystem::Consumption,
            _ => TaxSystem::Custom,
        }
    }
}

/// Whether stated prices exclude or already include tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    Exclusive,
    Inclusive,
}

impl CalculationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationMethod::Exclusive => "exclusive",
            CalculationMethod::Inclusive => "inclusive",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "inclusive" => CalculationMethod::Inclusive,
            _ => CalculationMethod::Exclusive,
        }
    }
}

/// Tenant-scoped tax configuration.
///
/// Labels are display/validation text only. Soft-deleted rows stay
/// retrievable by id because historical invoices reference the configuration
/// used at posting time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaxConfiguration {
    pub config_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub country_code: Option<String>,
    pub tax_system: String,
    pub tax_id_label: String,
    pub tax_id_format: String,
    pub central_tax_label: String,
    pub regional_tax_label: String,
    pub inter_regional_tax_label: String,
    pub combined_tax_label: String,
    pub product_code_label: String,
    pub service_code_label: String,
    pub has_regional_tax: bool,
    pub has_inter_regional_tax: bool,
    pub calculation_method: String,
    pub decimal_places: i32,
    pub round_at_line_level: bool,
    pub currency: String,
    pub is_default: bool,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl TaxConfiguration {
    pub fn tax_system(&self) -> TaxSystem {
        TaxSystem::from_string(&self.tax_system)
    }

    pub fn calculation_method(&self) -> CalculationMethod {
        CalculationMethod::from_string(&self.calculation_method)
    }
}

/// Input for creating a tax configuration.
///
/// New configurations never demote an existing default: the first active
/// configuration of a tenant becomes the default, later ones require an
/// explicit `set_as_default`.
#[derive(Debug, Clone, Validate)]
pub struct CreateTaxConfiguration {
    pub tenant_id: Uuid,
    #[validate(length(min = 1, message = "Configuration name is required"))]
    pub name: String,
    pub country_code: Option<String>,
    pub tax_system: TaxSystem,
    pub tax_id_label: String,
    pub tax_id_format: String,
    pub central_tax_label: String,
    pub regional_tax_label: String,
    pub inter_regional_tax_label: String,
    pub combined_tax_label: String,
    pub product_code_label: String,
    pub service_code_label: String,
    pub has_regional_tax: bool,
    pub has_inter_regional_tax: bool,
    pub calculation_method: CalculationMethod,
    #[validate(range(min = 0, max = 6, message = "decimal_places must be between 0 and 6"))]
    pub decimal_places: i32,
    pub round_at_line_level: bool,
    #[validate(length(min = 3, max = 3, message = "currency must be a 3-letter ISO code"))]
    pub currency: String,
}

impl CreateTaxConfiguration {
    pub fn validate_for_save(&self) -> Result<(), AppError> {
        self.validate()?;
        validate_flags(self.has_regional_tax, self.has_inter_regional_tax)?;
        validate_tax_id_format(&self.tax_id_format)
    }
}

/// Input for updating a tax configuration. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateTaxConfiguration {
    pub name: Option<String>,
    pub tax_id_label: Option<String>,
    pub tax_id_format: Option<String>,
    pub central_tax_label: Option<String>,
    pub regional_tax_label: Option<String>,
    pub inter_regional_tax_label: Option<String>,
    pub combined_tax_label: Option<String>,
    pub product_code_label: Option<String>,
    pub service_code_label: Option<String>,
    pub has_regional_tax: Option<bool>,
    pub has_inter_regional_tax: Option<bool>,
    pub calculation_method: Option<CalculationMethod>,
    pub decimal_places: Option<i32>,
    pub round_at_line_level: Option<bool>,
    pub currency: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateTaxConfiguration {
    /// Validate the update as it would apply on top of `existing`.
    pub fn validate_against(&self, existing: &TaxConfiguration) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation(anyhow!(
                    "name must not be empty"
                )));
            }
        }
        if let Some(dp) = self.decimal_places {
            if !(0..=6).contains(&dp) {
                return Err(AppError::Validation(anyhow!(
                    "decimal_places ({}) must be between 0 and 6",
                    dp
                )));
            }
        }
        if let Some(currency) = &self.currency {
            if currency.len() != 3 {
                return Err(AppError::Validation(anyhow!(
                    "currency ('{}') must be a 3-letter ISO code",
                    currency
                )));
            }
        }
        let regional = self.has_regional_tax.unwrap_or(existing.has_regional_tax);
        let inter = self
            .has_inter_regional_tax
            .unwrap_or(existing.has_inter_regional_tax);
        validate_flags(regional, inter)?;
        if let Some(format) = &self.tax_id_format {
            validate_tax_id_format(format)?;
        }
        Ok(())
    }
}

fn validate_flags(has_regional_tax: bool, has_inter_regional_tax: bool) -> Result<(), AppError> {
    if has_inter_regional_tax && !has_regional_tax {
        return Err(AppError::Validation(anyhow!(
            "has_inter_regional_tax requires has_regional_tax"
        )));
    }
    Ok(())
}

fn validate_tax_id_format(format: &str) -> Result<(), AppError> {
    if format.is_empty() {
        return Ok(());
    }
    Regex::new(format).map_err(|e| {
        AppError::Validation(anyhow!("tax_id_format is not a valid pattern: {}", e))
    })?;
    Ok(())
}
