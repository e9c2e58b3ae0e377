//! Fixed catalog of national tax presets.
//!
//! Bootstrapping data for new tenant configurations: labels, capability
//! flags, method, rounding, currency. Templates carry no rate definitions or
//! regions; those are tenant-specific and seeded afterwards by the
//! administrator. Pure in-memory lookup, no persistence or network access.

use service_core::error::AppError;

use crate::models::{CalculationMethod, TaxSystem};

/// One national preset, applied verbatim to a new configuration.
#[derive(Debug, Clone, Copy)]
pub struct ConfigTemplate {
    pub country_code: &'static str,
    pub name: &'static str,
    pub tax_system: TaxSystem,
    pub tax_id_label: &'static str,
    pub tax_id_format: &'static str,
    pub central_tax_label: &'static str,
    pub regional_tax_label: &'static str,
    pub inter_regional_tax_label: &'static str,
    pub combined_tax_label: &'static str,
    pub product_code_label: &'static str,
    pub service_code_label: &'static str,
    pub has_regional_tax: bool,
    pub has_inter_regional_tax: bool,
    pub calculation_method: CalculationMethod,
    pub decimal_places: i32,
    pub round_at_line_level: bool,
    pub currency: &'static str,
}

static CATALOG: [ConfigTemplate; 9] = [
    ConfigTemplate {
        country_code: "IN",
        name: "India GST",
        tax_system: TaxSystem::Gst,
        tax_id_label: "GSTIN",
        tax_id_format: "^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$",
        central_tax_label: "CGST",
        regional_tax_label: "SGST",
        inter_regional_tax_label: "IGST",
        combined_tax_label: "GST",
        product_code_label: "HSN Code",
        service_code_label: "SAC Code",
        has_regional_tax: true,
        has_inter_regional_tax: true,
        calculation_method: CalculationMethod::Exclusive,
        decimal_places: 2,
        round_at_line_level: true,
        currency: "INR",
    },
    ConfigTemplate {
        country_code: "GB",
        name: "United Kingdom VAT",
        tax_system: TaxSystem::Vat,
        tax_id_label: "VAT Number",
        tax_id_format: "^GB[0-9]{9}$",
        central_tax_label: "",
        regional_tax_label: "",
        inter_regional_tax_label: "",
        combined_tax_label: "VAT",
        product_code_label: "Commodity Code",
        service_code_label: "Commodity Code",
        has_regional_tax: false,
        has_inter_regional_tax: false,
        calculation_method: CalculationMethod::Exclusive,
        decimal_places: 2,
        round_at_line_level: true,
        currency: "GBP",
    },
    ConfigTemplate {
        country_code: "US",
        name: "United States Sales Tax",
        tax_system: TaxSystem::SalesTax,
        tax_id_label: "EIN",
        tax_id_format: "^[0-9]{2}-[0-9]{7}$",
        central_tax_label: "",
        regional_tax_label: "State Tax",
        inter_regional_tax_label: "",
        combined_tax_label: "Sales Tax",
        product_code_label: "SKU",
        service_code_label: "SKU",
        has_regional_tax: true,
        has_inter_regional_tax: false,
        calculation_method: CalculationMethod::Exclusive,
        decimal_places: 2,
        round_at_line_level: true,
        currency: "USD",
    },
    ConfigTemplate {
        country_code: "CA",
        name: "Canada GST/PST",
        tax_system: TaxSystem::GstPst,
        tax_id_label: "Business Number",
        tax_id_format: "^[0-9]{9}$",
        central_tax_label: "GST",
        regional_tax_label: "PST",
        inter_regional_tax_label: "",
        combined_tax_label: "GST+PST",
        product_code_label: "Product Code",
        service_code_label: "Service Code",
        has_regional_tax: true,
        has_inter_regional_tax: false,
        calculation_method: CalculationMethod::Exclusive,
        decimal_places: 2,
        round_at_line_level: true,
        currency: "CAD",
    },
    ConfigTemplate {
        country_code: "AU",
        name: "Australia GST",
        tax_system: TaxSystem::Gst,
        tax_id_label: "ABN",
        tax_id_format: "^[0-9]{11}$",
        central_tax_label: "",
        regional_tax_label: "",
        inter_regional_tax_label: "",
        combined_tax_label: "GST",
        product_code_label: "Item Code",
        service_code_label: "Item Code",
        has_regional_tax: false,
        has_inter_regional_tax: false,
        calculation_method: CalculationMethod::Inclusive,
        decimal_places: 2,
        round_at_line_level: true,
        currency: "AUD",
    },
    ConfigTemplate {
        country_code: "EU",
        name: "European Union VAT",
        tax_system: TaxSystem::Vat,
        tax_id_label: "VAT ID",
        tax_id_format: "^[A-Z]{2}[0-9A-Z]{2,12}$",
        central_tax_label: "",
        regional_tax_label: "",
        inter_regional_tax_label: "",
        combined_tax_label: "VAT",
        product_code_label: "CN Code",
        service_code_label: "CN Code",
        has_regional_tax: false,
        has_inter_regional_tax: false,
        calculation_method: CalculationMethod::Exclusive,
        decimal_places: 2,
        round_at_line_level: true,
        currency: "EUR",
    },
    ConfigTemplate {
        country_code: "AE",
        name: "United Arab Emirates VAT",
        tax_system: TaxSystem::Vat,
        tax_id_label: "TRN",
        tax_id_format: "^[0-9]{15}$",
        central_tax_label: "",
        regional_tax_label: "",
        inter_regional_tax_label: "",
        combined_tax_label: "VAT",
        product_code_label: "Item Code",
        service_code_label: "Item Code",
        has_regional_tax: false,
        has_inter_regional_tax: false,
        calculation_method: CalculationMethod::Exclusive,
        decimal_places: 2,
        round_at_line_level: true,
        currency: "AED",
    },
    ConfigTemplate {
        country_code: "SG",
        name: "Singapore GST",
        tax_system: TaxSystem::Gst,
        tax_id_label: "GST Registration Number",
        tax_id_format: "^[0-9]{9}[A-Z]$",
        central_tax_label: "",
        regional_tax_label: "",
        inter_regional_tax_label: "",
        combined_tax_label: "GST",
        product_code_label: "Item Code",
        service_code_label: "Item Code",
        has_regional_tax: false,
        has_inter_regional_tax: false,
        calculation_method: CalculationMethod::Exclusive,
        decimal_places: 2,
        round_at_line_level: true,
        currency: "SGD",
    },
    ConfigTemplate {
        country_code: "NONE",
        name: "No Tax",
        tax_system: TaxSystem::None,
        tax_id_label: "Tax ID",
        tax_id_format: "",
        central_tax_label: "",
        regional_tax_label: "",
        inter_regional_tax_label: "",
        combined_tax_label: "Tax",
        product_code_label: "Product Code",
        service_code_label: "Service Code",
        has_regional_tax: false,
        has_inter_regional_tax: false,
        calculation_method: CalculationMethod::Exclusive,
        decimal_places: 2,
        round_at_line_level: true,
        currency: "USD",
    },
];

/// Look up a preset by country code (case-insensitive).
pub fn resolve(country_code: &str) -> Result<&'static ConfigTemplate, AppError> {
    let code = country_code.trim();
    CATALOG
        .iter()
        .find(|template| template.country_code.eq_ignore_ascii_case(code))
        .ok_or_else(|| AppError::UnknownTemplate(country_code.to_string()))
}

/// The full catalog, for listing presets to an administrator.
pub fn all() -> &'static [ConfigTemplate] {
    &CATALOG
}
