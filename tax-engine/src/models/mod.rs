//! Domain models for the tax engine.

mod calculation;
mod configuration;
mod rate_definition;
mod region;

pub use calculation::{TaxAggregate, TaxCalculationResult};
pub use configuration::{
    CalculationMethod, CreateTaxConfiguration, TaxConfiguration, TaxSystem,
    UpdateTaxConfiguration,
};
pub use rate_definition::{CreateRateDefinition, RateDefinition, UpdateRateDefinition};
pub use region::{is_inter_regional, CreateRegion, Region, UpdateRegion};
