// Database helper: connect/reconnect, liveness checks, and the domain
// queries the handlers run

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, warn};

use ticketd_core::DatabaseSettings;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// One handler's database connection.
pub struct Database {
    settings: DatabaseSettings,
    pool: PgPool,
}

impl Database {
    /// Connect eagerly. Handlers that require storage call this during
    /// construction, where failure is fatal.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StorageError> {
        let pool = Self::open(settings).await?;
        debug!(host = %settings.host, database = %settings.database, "database connected");
        Ok(Self {
            settings: settings.clone(),
            pool,
        })
    }

    async fn open(settings: &DatabaseSettings) -> Result<PgPool, StorageError> {
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&settings.url())
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))
    }

    pub async fn is_connected(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn reconnect(&mut self) -> Result<(), StorageError> {
        self.pool = Self::open(&self.settings).await?;
        debug!(host = %self.settings.host, "database reconnected");
        Ok(())
    }

    /// Lazy reconnect-on-use: called before every command rather than on a
    /// health-check timer.
    async fn ensure_connected(&mut self) -> Result<(), StorageError> {
        if self.is_connected().await {
            return Ok(());
        }
        warn!(host = %self.settings.host, "database connection lost; reconnecting");
        self.reconnect().await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ============================================
    // Code-lookup table
    // ============================================

    /// Current enabled flag ('Y'/'N') for a code-lookup row.
    pub async fn code_lookup_flag(
        &mut self,
        class: &str,
        code: &str,
    ) -> Result<Option<String>, StorageError> {
        self.ensure_connected().await?;
        let flag = sqlx::query_scalar::<_, String>(
            "SELECT enabled FROM code_lookup WHERE class = $1 AND code = $2",
        )
        .bind(class)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(flag)
    }

    pub async fn insert_code_lookup(
        &mut self,
        class: &str,
        code: &str,
        description: &str,
        enabled: &str,
    ) -> Result<(), StorageError> {
        self.ensure_connected().await?;
        sqlx::query(
            r#"
            INSERT INTO code_lookup (class, code, description, enabled)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(class)
        .bind(code)
        .bind(description)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_code_lookup_flag(
        &mut self,
        class: &str,
        code: &str,
        enabled: &str,
    ) -> Result<(), StorageError> {
        self.ensure_connected().await?;
        sqlx::query(
            r#"
            UPDATE code_lookup
            SET enabled = $3
            WHERE class = $1
              AND code = $2
            "#,
        )
        .bind(class)
        .bind(code)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ============================================
    // Price table
    // ============================================

    /// Update a model's price, inserting the row if it does not exist yet.
    /// Both statements run in one transaction per row, committed here.
    pub async fn upsert_price(&mut self, model: &str, price: f64) -> Result<(), StorageError> {
        self.ensure_connected().await?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE price_list
            SET price = $2,
                updated_by = 'ticketd',
                active = TRUE,
                updated_at = NOW()
            WHERE model = $1
            "#,
        )
        .bind(model)
        .bind(price)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO price_list (model, price, updated_by, active, created_at, updated_at)
            SELECT $1, $2, 'ticketd', TRUE, NOW(), NOW()
            WHERE NOT EXISTS (SELECT 1 FROM price_list WHERE model = $1)
            "#,
        )
        .bind(model)
        .bind(price)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // ============================================
    // Mail lists
    // ============================================

    /// Recipients for a configured mail list. The list lives in the enabled
    /// code-lookup row as a single semicolon-separated attribute.
    pub async fn mail_list(&mut self, lookup_code: &str) -> Result<Vec<String>, StorageError> {
        self.ensure_connected().await?;
        let attribute = sqlx::query_scalar::<_, String>(
            r#"
            SELECT attribute1 FROM code_lookup
            WHERE class = 'EMAIL_LIST'
              AND code = $1
              AND enabled = 'Y'
            "#,
        )
        .bind(lookup_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attribute
            .map(|raw| split_mail_list(&raw))
            .unwrap_or_default())
    }
}

fn split_mail_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_mail_list_drops_empty_entries() {
        assert_eq!(
            split_mail_list("ops@example.com;;oncall@example.com;"),
            vec!["ops@example.com", "oncall@example.com"]
        );
        assert!(split_mail_list("").is_empty());
        assert!(split_mail_list(";;").is_empty());
    }

    #[test]
    fn split_mail_list_trims_whitespace() {
        assert_eq!(
            split_mail_list(" ops@example.com ; oncall@example.com"),
            vec!["ops@example.com", "oncall@example.com"]
        );
    }
}
