//! Calculation output types. Constructed per call, never persisted.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Structured tax breakdown for one amount/slab pair.
///
/// Only the branch-relevant component subset is nonzero. Labels are copied
/// from the owning configuration so callers can render the breakdown without
/// a second lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxCalculationResult {
    pub taxable_amount: Decimal,
    pub central_tax_amount: Decimal,
    pub regional_tax_amount: Decimal,
    pub inter_regional_tax_amount: Decimal,
    pub total_tax_amount: Decimal,
    pub total_amount: Decimal,
    pub combined_rate: Decimal,
    pub central_rate: Decimal,
    pub regional_rate: Decimal,
    pub inter_regional_rate: Decimal,
    pub central_tax_label: String,
    pub regional_tax_label: String,
    pub inter_regional_tax_label: String,
    pub combined_tax_label: String,
    pub is_inter_regional: bool,
}

/// Field-wise sum of per-line results, for document-level totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxAggregate {
    pub taxable_amount: Decimal,
    pub central_tax_amount: Decimal,
    pub regional_tax_amount: Decimal,
    pub inter_regional_tax_amount: Decimal,
    pub total_tax_amount: Decimal,
    pub total_amount: Decimal,
}

impl TaxAggregate {
    /// Sum each monetary field independently across line results.
    pub fn from_results(results: &[TaxCalculationResult]) -> TaxAggregate {
        let mut aggregate = TaxAggregate::default();
        for result in results {
            aggregate.taxable_amount += result.taxable_amount;
            aggregate.central_tax_amount += result.central_tax_amount;
            aggregate.regional_tax_amount += result.regional_tax_amount;
            aggregate.inter_regional_tax_amount += result.inter_regional_tax_amount;
            aggregate.total_tax_amount += result.total_tax_amount;
            aggregate.total_amount += result.total_amount;
        }
        aggregate
    }

    /// Document-level rounding: callers whose configuration has
    /// `round_at_line_level = false` round the aggregated totals once here
    /// instead of per line, avoiding compounded rounding error.
    pub fn rounded(&self, decimal_places: u32) -> TaxAggregate {
        let round = |value: Decimal| {
            value.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero)
        };
        TaxAggregate {
            taxable_amount: round(self.taxable_amount),
            central_tax_amount: round(self.central_tax_amount),
            regional_tax_amount: round(self.regional_tax_amount),
            inter_regional_tax_amount: round(self.inter_regional_tax_amount),
            total_tax_amount: round(self.total_tax_amount),
            total_amount: round(self.total_amount),
        }
    }
}
