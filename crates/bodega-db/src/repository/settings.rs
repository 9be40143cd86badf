//! # Settings Repository
//!
//! Per-tenant key/value settings. The tax configuration the settlement
//! engine consumes lives here under [`TAX_ENABLED_KEY`] and
//! [`TAX_RATE_KEY`].
//!
//! The repository only stores and fetches strings; interpretation (and
//! the hard failure on a missing/invalid tax rate) happens in the engine,
//! so a configuration problem surfaces as a config error rather than a
//! stock or persistence error.

use sqlx::{Row, SqlitePool};

use crate::error::DbResult;

/// Settings key: `"true"`/`"false"` — whether checkout applies tax.
pub const TAX_ENABLED_KEY: &str = "tax.enabled";

/// Settings key: fractional tax rate, e.g. `"0.16"` for 16%.
pub const TAX_RATE_KEY: &str = "tax.rate";

/// Repository for per-tenant settings.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Gets a setting value, or `None` when unset.
    pub async fn get(&self, tenant_id: &str, key: &str) -> DbResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE tenant_id = ?1 AND key = ?2")
            .bind(tenant_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(row.try_get("value")?),
            None => None,
        })
    }

    /// Gets a setting value, falling back to `default` when unset.
    pub async fn get_or(&self, tenant_id: &str, key: &str, default: &str) -> DbResult<String> {
        Ok(self
            .get(tenant_id, key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Upserts a setting.
    pub async fn set(&self, tenant_id: &str, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (tenant_id, key, value) VALUES (?1, ?2, ?3)
            ON CONFLICT (tenant_id, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(tenant_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
