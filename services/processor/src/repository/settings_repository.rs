use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::errors::Result;

/// Generic key/value site settings
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    /// Values for every requested key that exists; missing keys are absent from the map
    async fn get_settings(&self, keys: &[&str]) -> Result<HashMap<String, String>>;
}

pub struct PostgresSettingsRepository {
    pool: PgPool,
}

impl PostgresSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for PostgresSettingsRepository {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            r#"SELECT value FROM site_settings WHERE key = $1"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn get_settings(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();

        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"SELECT key, value FROM site_settings WHERE key = ANY($1)"#,
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}
