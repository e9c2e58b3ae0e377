//! Tax configuration and calculation engine.
//!
//! Multi-tenant tax engine for invoicing callers: tenant-scoped tax
//! configurations (labels, capability flags, rounding policy), named rate
//! definitions ("slabs") with optional central/regional splits, sub-national
//! regions with rate overrides, a fixed catalog of national presets for
//! bootstrapping, and a pure calculator that turns an amount plus a slab into
//! a structured tax breakdown.
//!
//! The engine is invoked in-process. Callers resolve the tenant's
//! configuration and slab through [`services::Database`], decide the
//! inter-regional flag by comparing seller and buyer region codes, and hand
//! everything to [`calculator::calculate_tax`]. The calculator itself never
//! touches storage.

pub mod calculator;
pub mod config;
pub mod models;
pub mod services;
pub mod templates;
