//! Pure tax calculation core.
//!
//! No I/O, no shared state: safe to call concurrently across parallel
//! invoice-line processing. All failures propagate to the caller as
//! [`AppError::InvalidArgument`]; nothing is caught or logged here.

use anyhow::anyhow;
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;

use crate::models::{CalculationMethod, RateDefinition, TaxCalculationResult, TaxConfiguration};

/// Compute the tax breakdown for one monetary amount.
///
/// `amount` is pre-tax under the exclusive method and tax-inclusive under
/// the inclusive method. `is_inter_regional` is derived by the caller from
/// seller/buyer region codes; for systems without an inter-regional concept
/// the caller passes the region-adjusted slab instead
/// (see `RateDefinition::with_region_override`).
pub fn calculate_tax(
    amount: Decimal,
    slab: &RateDefinition,
    is_inter_regional: bool,
    config: &TaxConfiguration,
) -> Result<TaxCalculationResult, AppError> {
    if amount < Decimal::ZERO {
        return Err(AppError::InvalidArgument(anyhow!(
            "amount ({}) must not be negative",
            amount
        )));
    }
    if !slab.is_active || slab.is_deleted {
        return Err(AppError::InvalidArgument(anyhow!(
            "rate definition '{}' is not active",
            slab.name
        )));
    }
    if config.decimal_places < 0 {
        return Err(AppError::InvalidArgument(anyhow!(
            "decimal_places ({}) must not be negative",
            config.decimal_places
        )));
    }
    check_rate_range("combined_rate", slab.combined_rate)?;
    check_rate_range("central_rate", slab.central_rate)?;
    check_rate_range("regional_rate", slab.regional_rate)?;
    check_rate_range("inter_regional_rate", slab.inter_regional_rate)?;

    let method = config.calculation_method();
    let decimal_places = config.decimal_places as u32;

    // Exempt supplies keep the stated amount as the taxable base verbatim;
    // zero-rated supplies go through the normal base extraction (identical
    // once validation forces combined_rate to 0).
    if slab.is_exempt || slab.is_zero_rated {
        let taxable = if slab.is_exempt {
            amount
        } else {
            taxable_base(amount, slab.combined_rate, method)
        };
        let (taxable, total) = if config.round_at_line_level {
            (
                round(taxable, decimal_places),
                round(amount, decimal_places),
            )
        } else {
            (taxable, amount)
        };
        return Ok(build_result(
            taxable,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
            total,
            slab,
            config,
            is_inter_regional,
        ));
    }

    let mut taxable = taxable_base(amount, slab.combined_rate, method);

    let mut central_tax = Decimal::ZERO;
    let mut regional_tax = Decimal::ZERO;
    let mut inter_regional_tax = Decimal::ZERO;
    let mut total_tax;

    if !config.has_regional_tax {
        // Single-component systems (UK/EU VAT, simple GST): combined only.
        total_tax = taxable * percent(slab.combined_rate);
    } else if is_inter_regional && config.has_inter_regional_tax {
        // Cross-region in a split system (India IGST).
        inter_regional_tax = taxable * percent(slab.inter_regional_rate);
        total_tax = inter_regional_tax;
    } else {
        // Intra-region split (India CGST+SGST, Canada GST+PST), and the
        // fallback for cross-region transactions in systems with no
        // inter-regional concept (US sales tax) where the caller already
        // supplied the buyer-region-adjusted slab.
        central_tax = taxable * percent(slab.central_rate);
        regional_tax = taxable * percent(slab.regional_rate);
        total_tax = central_tax + regional_tax;
    }

    if config.round_at_line_level {
        taxable = round(taxable, decimal_places);
        central_tax = round(central_tax, decimal_places);
        regional_tax = round(regional_tax, decimal_places);
        inter_regional_tax = round(inter_regional_tax, decimal_places);
        // Total tax is re-derived from the rounded components so the split
        // always adds up exactly.
        total_tax = if config.has_regional_tax {
            central_tax + regional_tax + inter_regional_tax
        } else {
            round(total_tax, decimal_places)
        };
    }

    let total_amount = match method {
        CalculationMethod::Exclusive => taxable + total_tax,
        // Inclusive amounts already embed the tax.
        CalculationMethod::Inclusive => {
            if config.round_at_line_level {
                round(amount, decimal_places)
            } else {
                amount
            }
        }
    };

    Ok(build_result(
        taxable,
        central_tax,
        regional_tax,
        inter_regional_tax,
        total_tax,
        total_amount,
        slab,
        config,
        is_inter_regional,
    ))
}

fn taxable_base(amount: Decimal, combined_rate: Decimal, method: CalculationMethod) -> Decimal {
    match method {
        CalculationMethod::Exclusive => amount,
        CalculationMethod::Inclusive => amount / (Decimal::ONE + percent(combined_rate)),
    }
}

fn percent(rate: Decimal) -> Decimal {
    rate / Decimal::ONE_HUNDRED
}

fn round(value: Decimal, decimal_places: u32) -> Decimal {
    value.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero)
}

fn check_rate_range(field: &str, value: Decimal) -> Result<(), AppError> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(AppError::InvalidArgument(anyhow!(
            "{} ({}) must be between 0 and 100",
            field,
            value
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_result(
    taxable_amount: Decimal,
    central_tax_amount: Decimal,
    regional_tax_amount: Decimal,
    inter_regional_tax_amount: Decimal,
    total_tax_amount: Decimal,
    total_amount: Decimal,
    slab: &RateDefinition,
    config: &TaxConfiguration,
    is_inter_regional: bool,
) -> TaxCalculationResult {
    TaxCalculationResult {
        taxable_amount,
        central_tax_amount,
        regional_tax_amount,
        inter_regional_tax_amount,
        total_tax_amount,
        total_amount,
        combined_rate: slab.combined_rate,
        central_rate: slab.central_rate,
        regional_rate: slab.regional_rate,
        inter_regional_rate: slab.inter_regional_rate,
        central_tax_label: config.central_tax_label.clone(),
        regional_tax_label: config.regional_tax_label.clone(),
        inter_regional_tax_label: config.inter_regional_tax_label.clone(),
        combined_tax_label: config.combined_tax_label.clone(),
        is_inter_regional,
    }
}
