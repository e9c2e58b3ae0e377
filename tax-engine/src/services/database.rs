//! Database service for the tax engine.
//!
//! Every operation takes the tenant id as its first scoping argument and
//! binds it in the query, so cross-tenant access is impossible by
//! construction. Soft-deleted rows stay retrievable by id (historical
//! invoices reference them) but never appear in lists or default lookups.

use crate::models::{
    CreateRateDefinition, CreateRegion, CreateTaxConfiguration, RateDefinition, Region,
    TaxConfiguration, UpdateRateDefinition, UpdateRegion, UpdateTaxConfiguration,
};
use crate::services::metrics::{
    CONFIGURATIONS_TOTAL, DB_QUERY_DURATION, VALIDATION_FAILURES_TOTAL,
};
use crate::templates;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const CONFIG_COLUMNS: &str = r#"config_id, tenant_id, name, country_code, tax_system,
    tax_id_label, tax_id_format, central_tax_label, regional_tax_label,
    inter_regional_tax_label, combined_tax_label, product_code_label, service_code_label,
    has_regional_tax, has_inter_regional_tax, calculation_method, decimal_places,
    round_at_line_level, currency, is_default, is_active, is_deleted, created_utc, updated_utc"#;

const RATE_COLUMNS: &str = r#"rate_id, config_id, tenant_id, name, code,
    combined_rate, central_rate, regional_rate, inter_regional_rate,
    is_zero_rated, is_exempt, is_default, is_active, is_deleted, display_order, created_utc"#;

const REGION_COLUMNS: &str = r#"region_id, config_id, tenant_id, code, name,
    regional_tax_rate, has_local_tax, local_tax_rate, display_order,
    is_active, is_deleted, created_utc"#;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "tax-engine"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Configuration Operations
    // -------------------------------------------------------------------------

    /// Create a new tax configuration.
    ///
    /// The first active configuration of a tenant becomes the default;
    /// later ones are created non-default and require `set_as_default`.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn create_configuration(
        &self,
        input: &CreateTaxConfiguration,
    ) -> Result<TaxConfiguration, AppError> {
        if let Err(e) = input.validate_for_save() {
            VALIDATION_FAILURES_TOTAL
                .with_label_values(&["configuration"])
                .inc();
            return Err(e);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_configuration"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to begin: {}", e)))?;

        let has_default: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM tax_configurations
                WHERE tenant_id = $1 AND is_default = TRUE AND is_active = TRUE AND is_deleted = FALSE
            )
            "#,
        )
        .bind(input.tenant_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check default: {}", e))
        })?;

        let config_id = Uuid::new_v4();
        let config = sqlx::query_as::<_, TaxConfiguration>(&format!(
            r#"
            INSERT INTO tax_configurations (
                config_id, tenant_id, name, country_code, tax_system,
                tax_id_label, tax_id_format, central_tax_label, regional_tax_label,
                inter_regional_tax_label, combined_tax_label, product_code_label, service_code_label,
                has_regional_tax, has_inter_regional_tax, calculation_method, decimal_places,
                round_at_line_level, currency, is_default
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING {CONFIG_COLUMNS}
            "#
        ))
        .bind(config_id)
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(&input.country_code)
        .bind(input.tax_system.as_str())
        .bind(&input.tax_id_label)
        .bind(&input.tax_id_format)
        .bind(&input.central_tax_label)
        .bind(&input.regional_tax_label)
        .bind(&input.inter_regional_tax_label)
        .bind(&input.combined_tax_label)
        .bind(&input.product_code_label)
        .bind(&input.service_code_label)
        .bind(input.has_regional_tax)
        .bind(input.has_inter_regional_tax)
        .bind(input.calculation_method.as_str())
        .bind(input.decimal_places)
        .bind(input.round_at_line_level)
        .bind(&input.currency)
        .bind(!has_default)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Another default configuration already exists for this tenant"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!(
                "Failed to create tax configuration: {}",
                e
            )),
        })?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        CONFIGURATIONS_TOTAL
            .with_label_values(&[config.tax_system.as_str()])
            .inc();

        info!(
            config_id = %config.config_id,
            tax_system = %config.tax_system,
            is_default = config.is_default,
            "Tax configuration created"
        );

        Ok(config)
    }

    /// Create a configuration from a national preset.
    ///
    /// Resolves the template catalog and persists a tenant-scoped copy with
    /// no rate definitions or regions attached.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, country_code = %country_code))]
    pub async fn create_from_template(
        &self,
        tenant_id: Uuid,
        country_code: &str,
        name: Option<&str>,
    ) -> Result<TaxConfiguration, AppError> {
        let template = templates::resolve(country_code)?;

        let input = CreateTaxConfiguration {
            tenant_id,
            name: name.unwrap_or(template.name).to_string(),
            country_code: Some(template.country_code.to_string()),
            tax_system: template.tax_system,
            tax_id_label: template.tax_id_label.to_string(),
            tax_id_format: template.tax_id_format.to_string(),
            central_tax_label: template.central_tax_label.to_string(),
            regional_tax_label: template.regional_tax_label.to_string(),
            inter_regional_tax_label: template.inter_regional_tax_label.to_string(),
            combined_tax_label: template.combined_tax_label.to_string(),
            product_code_label: template.product_code_label.to_string(),
            service_code_label: template.service_code_label.to_string(),
            has_regional_tax: template.has_regional_tax,
            has_inter_regional_tax: template.has_inter_regional_tax,
            calculation_method: template.calculation_method,
            decimal_places: template.decimal_places,
            round_at_line_level: template.round_at_line_level,
            currency: template.currency.to_string(),
        };

        self.create_configuration(&input).await
    }

    /// Get the tenant's active default configuration, if any.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn get_current(&self, tenant_id: Uuid) -> Result<Option<TaxConfiguration>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_current"])
            .start_timer();

        let config = sqlx::query_as::<_, TaxConfiguration>(&format!(
            r#"
            SELECT {CONFIG_COLUMNS}
            FROM tax_configurations
            WHERE tenant_id = $1 AND is_default = TRUE AND is_active = TRUE AND is_deleted = FALSE
            "#
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get current configuration: {}", e))
        })?;

        timer.observe_duration();

        Ok(config)
    }

    /// Get a configuration by ID. Includes soft-deleted rows so historical
    /// invoice lookups keep working.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, config_id = %config_id))]
    pub async fn get_configuration(
        &self,
        tenant_id: Uuid,
        config_id: Uuid,
    ) -> Result<Option<TaxConfiguration>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_configuration"])
            .start_timer();

        let config = sqlx::query_as::<_, TaxConfiguration>(&format!(
            r#"
            SELECT {CONFIG_COLUMNS}
            FROM tax_configurations
            WHERE tenant_id = $1 AND config_id = $2
            "#
        ))
        .bind(tenant_id)
        .bind(config_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get configuration: {}", e))
        })?;

        timer.observe_duration();

        Ok(config)
    }

    /// List the tenant's non-deleted configurations.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_configurations(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<TaxConfiguration>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_configurations"])
            .start_timer();

        let configs = sqlx::query_as::<_, TaxConfiguration>(&format!(
            r#"
            SELECT {CONFIG_COLUMNS}
            FROM tax_configurations
            WHERE tenant_id = $1 AND is_deleted = FALSE
            ORDER BY created_utc, config_id
            "#
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list configurations: {}", e))
        })?;

        timer.observe_duration();

        Ok(configs)
    }

    /// Update a configuration.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, config_id = %config_id))]
    pub async fn update_configuration(
        &self,
        tenant_id: Uuid,
        config_id: Uuid,
        input: &UpdateTaxConfiguration,
    ) -> Result<Option<TaxConfiguration>, AppError> {
        let existing = match self.get_configuration(tenant_id, config_id).await? {
            Some(config) if !config.is_deleted => config,
            _ => return Ok(None),
        };

        if let Err(e) = input.validate_against(&existing) {
            VALIDATION_FAILURES_TOTAL
                .with_label_values(&["configuration"])
                .inc();
            return Err(e);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_configuration"])
            .start_timer();

        let method = input.calculation_method.map(|m| m.as_str().to_string());

        let config = sqlx::query_as::<_, TaxConfiguration>(&format!(
            r#"
            UPDATE tax_configurations
            SET name = COALESCE($3, name),
                tax_id_label = COALESCE($4, tax_id_label),
                tax_id_format = COALESCE($5, tax_id_format),
                central_tax_label = COALESCE($6, central_tax_label),
                regional_tax_label = COALESCE($7, regional_tax_label),
                inter_regional_tax_label = COALESCE($8, inter_regional_tax_label),
                combined_tax_label = COALESCE($9, combined_tax_label),
                product_code_label = COALESCE($10, product_code_label),
                service_code_label = COALESCE($11, service_code_label),
                has_regional_tax = COALESCE($12, has_regional_tax),
                has_inter_regional_tax = COALESCE($13, has_inter_regional_tax),
                calculation_method = COALESCE($14, calculation_method),
                decimal_places = COALESCE($15, decimal_places),
                round_at_line_level = COALESCE($16, round_at_line_level),
                currency = COALESCE($17, currency),
                is_active = COALESCE($18, is_active),
                updated_utc = NOW()
            WHERE tenant_id = $1 AND config_id = $2 AND is_deleted = FALSE
            RETURNING {CONFIG_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(config_id)
        .bind(&input.name)
        .bind(&input.tax_id_label)
        .bind(&input.tax_id_format)
        .bind(&input.central_tax_label)
        .bind(&input.regional_tax_label)
        .bind(&input.inter_regional_tax_label)
        .bind(&input.combined_tax_label)
        .bind(&input.product_code_label)
        .bind(&input.service_code_label)
        .bind(input.has_regional_tax)
        .bind(input.has_inter_regional_tax)
        .bind(&method)
        .bind(input.decimal_places)
        .bind(input.round_at_line_level)
        .bind(&input.currency)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update configuration: {}", e))
        })?;

        timer.observe_duration();

        if let Some(ref config) = config {
            info!(config_id = %config.config_id, "Tax configuration updated");
        }

        Ok(config)
    }

    /// Make a configuration the tenant default, demoting any previous one.
    ///
    /// Clear-and-set runs in a single transaction so concurrent calls for
    /// the same tenant can never leave two defaults or zero defaults.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, config_id = %config_id))]
    pub async fn set_as_default(
        &self,
        tenant_id: Uuid,
        config_id: Uuid,
    ) -> Result<TaxConfiguration, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_as_default"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to begin: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE tax_configurations
            SET is_default = FALSE, updated_utc = NOW()
            WHERE tenant_id = $1 AND config_id <> $2 AND is_default = TRUE AND is_deleted = FALSE
            "#,
        )
        .bind(tenant_id)
        .bind(config_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to clear default: {}", e))
        })?;

        let config = sqlx::query_as::<_, TaxConfiguration>(&format!(
            r#"
            UPDATE tax_configurations
            SET is_default = TRUE, updated_utc = NOW()
            WHERE tenant_id = $1 AND config_id = $2 AND is_active = TRUE AND is_deleted = FALSE
            RETURNING {CONFIG_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(config_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to set default: {}", e))
        })?;

        let config = match config {
            Some(config) => config,
            None => {
                tx.rollback().await.ok();
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Tax configuration {} not found or inactive",
                    config_id
                )));
            }
        };

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(config_id = %config.config_id, "Tax configuration set as default");

        Ok(config)
    }

    /// Soft-delete a configuration.
    ///
    /// Deleting the current default is a conflict; the caller must assign
    /// another default first. Never silently demotes.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, config_id = %config_id))]
    pub async fn delete_configuration(
        &self,
        tenant_id: Uuid,
        config_id: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_configuration"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE tax_configurations
            SET is_deleted = TRUE, is_active = FALSE, updated_utc = NOW()
            WHERE tenant_id = $1 AND config_id = $2 AND is_deleted = FALSE AND is_default = FALSE
            "#,
        )
        .bind(tenant_id)
        .bind(config_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete configuration: {}", e))
        })?;

        timer.observe_duration();

        if result.rows_affected() > 0 {
            info!(config_id = %config_id, "Tax configuration deleted");
            return Ok(true);
        }

        // Distinguish "missing/already deleted" from "still the default".
        match self.get_configuration(tenant_id, config_id).await? {
            Some(config) if !config.is_deleted && config.is_default => {
                Err(AppError::Conflict(anyhow::anyhow!(
                    "Tax configuration {} is the tenant default; assign another default first",
                    config_id
                )))
            }
            _ => Ok(false),
        }
    }

    // -------------------------------------------------------------------------
    // Rate Definition Operations
    // -------------------------------------------------------------------------

    /// Create a rate definition under a configuration.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, config_id = %input.config_id))]
    pub async fn create_rate_definition(
        &self,
        input: &CreateRateDefinition,
    ) -> Result<RateDefinition, AppError> {
        let config = match self
            .get_configuration(input.tenant_id, input.config_id)
            .await?
        {
            Some(config) if !config.is_deleted => config,
            _ => {
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Tax configuration {} not found",
                    input.config_id
                )))
            }
        };

        if let Err(e) = input.validate_for_save(&config) {
            VALIDATION_FAILURES_TOTAL
                .with_label_values(&["rate_definition"])
                .inc();
            return Err(e);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_rate_definition"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to begin: {}", e)))?;

        if input.is_default {
            sqlx::query(
                r#"
                UPDATE tax_rate_definitions
                SET is_default = FALSE
                WHERE tenant_id = $1 AND config_id = $2 AND is_default = TRUE AND is_deleted = FALSE
                "#,
            )
            .bind(input.tenant_id)
            .bind(input.config_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to clear default slab: {}", e))
            })?;
        }

        let rate_id = Uuid::new_v4();
        let rate = sqlx::query_as::<_, RateDefinition>(&format!(
            r#"
            INSERT INTO tax_rate_definitions (
                rate_id, config_id, tenant_id, name, code,
                combined_rate, central_rate, regional_rate, inter_regional_rate,
                is_zero_rated, is_exempt, is_default, display_order
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {RATE_COLUMNS}
            "#
        ))
        .bind(rate_id)
        .bind(input.config_id)
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(&input.code)
        .bind(input.combined_rate)
        .bind(input.central_rate)
        .bind(input.regional_rate)
        .bind(input.inter_regional_rate)
        .bind(input.is_zero_rated)
        .bind(input.is_exempt)
        .bind(input.is_default)
        .bind(input.display_order)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Rate definition code '{}' already exists for this configuration",
                    input.code
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!(
                "Failed to create rate definition: {}",
                e
            )),
        })?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(rate_id = %rate.rate_id, code = %rate.code, "Rate definition created");

        Ok(rate)
    }

    /// Get a rate definition by ID. Includes soft-deleted rows.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, rate_id = %rate_id))]
    pub async fn get_rate_definition(
        &self,
        tenant_id: Uuid,
        rate_id: Uuid,
    ) -> Result<Option<RateDefinition>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_rate_definition"])
            .start_timer();

        let rate = sqlx::query_as::<_, RateDefinition>(&format!(
            r#"
            SELECT {RATE_COLUMNS}
            FROM tax_rate_definitions
            WHERE tenant_id = $1 AND rate_id = $2
            "#
        ))
        .bind(tenant_id)
        .bind(rate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get rate definition: {}", e))
        })?;

        timer.observe_duration();

        Ok(rate)
    }

    /// List a configuration's active slabs in display order.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, config_id = %config_id))]
    pub async fn list_active_slabs(
        &self,
        tenant_id: Uuid,
        config_id: Uuid,
    ) -> Result<Vec<RateDefinition>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_slabs"])
            .start_timer();

        let rates = sqlx::query_as::<_, RateDefinition>(&format!(
            r#"
            SELECT {RATE_COLUMNS}
            FROM tax_rate_definitions
            WHERE tenant_id = $1 AND config_id = $2 AND is_active = TRUE AND is_deleted = FALSE
            ORDER BY display_order, name
            "#
        ))
        .bind(tenant_id)
        .bind(config_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list slabs: {}", e)))?;

        timer.observe_duration();

        Ok(rates)
    }

    /// Get a configuration's default slab, if one is marked.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, config_id = %config_id))]
    pub async fn get_default_slab(
        &self,
        tenant_id: Uuid,
        config_id: Uuid,
    ) -> Result<Option<RateDefinition>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_default_slab"])
            .start_timer();

        let rate = sqlx::query_as::<_, RateDefinition>(&format!(
            r#"
            SELECT {RATE_COLUMNS}
            FROM tax_rate_definitions
            WHERE tenant_id = $1 AND config_id = $2
              AND is_default = TRUE AND is_active = TRUE AND is_deleted = FALSE
            "#
        ))
        .bind(tenant_id)
        .bind(config_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get default slab: {}", e))
        })?;

        timer.observe_duration();

        Ok(rate)
    }

    /// Update a rate definition.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, rate_id = %rate_id))]
    pub async fn update_rate_definition(
        &self,
        tenant_id: Uuid,
        rate_id: Uuid,
        input: &UpdateRateDefinition,
    ) -> Result<Option<RateDefinition>, AppError> {
        let existing = match self.get_rate_definition(tenant_id, rate_id).await? {
            Some(rate) if !rate.is_deleted => rate,
            _ => return Ok(None),
        };

        let config = self
            .get_configuration(tenant_id, existing.config_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Tax configuration {} not found",
                    existing.config_id
                ))
            })?;

        if let Err(e) = input.validate_against(&config, &existing) {
            VALIDATION_FAILURES_TOTAL
                .with_label_values(&["rate_definition"])
                .inc();
            return Err(e);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_rate_definition"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to begin: {}", e)))?;

        if input.is_default == Some(true) {
            sqlx::query(
                r#"
                UPDATE tax_rate_definitions
                SET is_default = FALSE
                WHERE tenant_id = $1 AND config_id = $2 AND rate_id <> $3
                  AND is_default = TRUE AND is_deleted = FALSE
                "#,
            )
            .bind(tenant_id)
            .bind(existing.config_id)
            .bind(rate_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to clear default slab: {}", e))
            })?;
        }

        let rate = sqlx::query_as::<_, RateDefinition>(&format!(
            r#"
            UPDATE tax_rate_definitions
            SET name = COALESCE($3, name),
                code = COALESCE($4, code),
                combined_rate = COALESCE($5, combined_rate),
                central_rate = COALESCE($6, central_rate),
                regional_rate = COALESCE($7, regional_rate),
                inter_regional_rate = COALESCE($8, inter_regional_rate),
                is_zero_rated = COALESCE($9, is_zero_rated),
                is_exempt = COALESCE($10, is_exempt),
                is_default = COALESCE($11, is_default),
                is_active = COALESCE($12, is_active),
                display_order = COALESCE($13, display_order)
            WHERE tenant_id = $1 AND rate_id = $2 AND is_deleted = FALSE
            RETURNING {RATE_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(rate_id)
        .bind(&input.name)
        .bind(&input.code)
        .bind(input.combined_rate)
        .bind(input.central_rate)
        .bind(input.regional_rate)
        .bind(input.inter_regional_rate)
        .bind(input.is_zero_rated)
        .bind(input.is_exempt)
        .bind(input.is_default)
        .bind(input.is_active)
        .bind(input.display_order)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Rate definition code already exists for this configuration"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!(
                "Failed to update rate definition: {}",
                e
            )),
        })?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        if let Some(ref rate) = rate {
            info!(rate_id = %rate.rate_id, "Rate definition updated");
        }

        Ok(rate)
    }

    /// Soft-delete a rate definition.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, rate_id = %rate_id))]
    pub async fn delete_rate_definition(
        &self,
        tenant_id: Uuid,
        rate_id: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_rate_definition"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE tax_rate_definitions
            SET is_deleted = TRUE, is_active = FALSE, is_default = FALSE
            WHERE tenant_id = $1 AND rate_id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(tenant_id)
        .bind(rate_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete rate definition: {}", e))
        })?;

        timer.observe_duration();

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(rate_id = %rate_id, "Rate definition deleted");
        }

        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Region Operations
    // -------------------------------------------------------------------------

    /// Create a region under a configuration.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, config_id = %input.config_id))]
    pub async fn create_region(&self, input: &CreateRegion) -> Result<Region, AppError> {
        match self
            .get_configuration(input.tenant_id, input.config_id)
            .await?
        {
            Some(config) if !config.is_deleted => {}
            _ => {
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Tax configuration {} not found",
                    input.config_id
                )))
            }
        }

        if let Err(e) = input.validate_for_save() {
            VALIDATION_FAILURES_TOTAL
                .with_label_values(&["region"])
                .inc();
            return Err(e);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_region"])
            .start_timer();

        let region_id = Uuid::new_v4();
        let region = sqlx::query_as::<_, Region>(&format!(
            r#"
            INSERT INTO tax_regions (
                region_id, config_id, tenant_id, code, name,
                regional_tax_rate, has_local_tax, local_tax_rate, display_order
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {REGION_COLUMNS}
            "#
        ))
        .bind(region_id)
        .bind(input.config_id)
        .bind(input.tenant_id)
        .bind(&input.code)
        .bind(&input.name)
        .bind(input.regional_tax_rate)
        .bind(input.has_local_tax)
        .bind(input.local_tax_rate)
        .bind(input.display_order)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Region code '{}' already exists for this configuration",
                    input.code
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create region: {}", e)),
        })?;

        timer.observe_duration();

        info!(region_id = %region.region_id, code = %region.code, "Region created");

        Ok(region)
    }

    /// Get a region by ID. Includes soft-deleted rows.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, region_id = %region_id))]
    pub async fn get_region(
        &self,
        tenant_id: Uuid,
        region_id: Uuid,
    ) -> Result<Option<Region>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_region"])
            .start_timer();

        let region = sqlx::query_as::<_, Region>(&format!(
            r#"
            SELECT {REGION_COLUMNS}
            FROM tax_regions
            WHERE tenant_id = $1 AND region_id = $2
            "#
        ))
        .bind(tenant_id)
        .bind(region_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get region: {}", e)))?;

        timer.observe_duration();

        Ok(region)
    }

    /// Look up an active region by its code, for inter-regional checks and
    /// US-style per-state overrides at calculation time.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, config_id = %config_id))]
    pub async fn get_region_by_code(
        &self,
        tenant_id: Uuid,
        config_id: Uuid,
        code: &str,
    ) -> Result<Option<Region>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_region_by_code"])
            .start_timer();

        let region = sqlx::query_as::<_, Region>(&format!(
            r#"
            SELECT {REGION_COLUMNS}
            FROM tax_regions
            WHERE tenant_id = $1 AND config_id = $2 AND UPPER(code) = UPPER($3)
              AND is_active = TRUE AND is_deleted = FALSE
            "#
        ))
        .bind(tenant_id)
        .bind(config_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get region by code: {}", e))
        })?;

        timer.observe_duration();

        Ok(region)
    }

    /// List a configuration's active regions in display order.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, config_id = %config_id))]
    pub async fn list_active_regions(
        &self,
        tenant_id: Uuid,
        config_id: Uuid,
    ) -> Result<Vec<Region>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_regions"])
            .start_timer();

        let regions = sqlx::query_as::<_, Region>(&format!(
            r#"
            SELECT {REGION_COLUMNS}
            FROM tax_regions
            WHERE tenant_id = $1 AND config_id = $2 AND is_active = TRUE AND is_deleted = FALSE
            ORDER BY display_order, name
            "#
        ))
        .bind(tenant_id)
        .bind(config_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list regions: {}", e)))?;

        timer.observe_duration();

        Ok(regions)
    }

    /// Update a region.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, region_id = %region_id))]
    pub async fn update_region(
        &self,
        tenant_id: Uuid,
        region_id: Uuid,
        input: &UpdateRegion,
    ) -> Result<Option<Region>, AppError> {
        let existing = match self.get_region(tenant_id, region_id).await? {
            Some(region) if !region.is_deleted => region,
            _ => return Ok(None),
        };

        if let Err(e) = input.validate_against(&existing) {
            VALIDATION_FAILURES_TOTAL
                .with_label_values(&["region"])
                .inc();
            return Err(e);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_region"])
            .start_timer();

        let region = sqlx::query_as::<_, Region>(&format!(
            r#"
            UPDATE tax_regions
            SET code = COALESCE($3, code),
                name = COALESCE($4, name),
                regional_tax_rate = COALESCE($5, regional_tax_rate),
                has_local_tax = COALESCE($6, has_local_tax),
                local_tax_rate = COALESCE($7, local_tax_rate),
                display_order = COALESCE($8, display_order),
                is_active = COALESCE($9, is_active)
            WHERE tenant_id = $1 AND region_id = $2 AND is_deleted = FALSE
            RETURNING {REGION_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(region_id)
        .bind(&input.code)
        .bind(&input.name)
        .bind(input.regional_tax_rate)
        .bind(input.has_local_tax)
        .bind(input.local_tax_rate)
        .bind(input.display_order)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Region code already exists for this configuration"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to update region: {}", e)),
        })?;

        timer.observe_duration();

        if let Some(ref region) = region {
            info!(region_id = %region.region_id, "Region updated");
        }

        Ok(region)
    }

    /// Soft-delete a region.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, region_id = %region_id))]
    pub async fn delete_region(&self, tenant_id: Uuid, region_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_region"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE tax_regions
            SET is_deleted = TRUE, is_active = FALSE
            WHERE tenant_id = $1 AND region_id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(tenant_id)
        .bind(region_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete region: {}", e)))?;

        timer.observe_duration();

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(region_id = %region_id, "Region deleted");
        }

        Ok(deleted)
    }
}
