use anyhow::Result;
use sqlx::{PgPool, Row};

use crate::repo::SettingsStore;

#[derive(Clone)]
pub struct SettingsRepo {
    pub pool: PgPool,
}

impl SettingsRepo {
    pub async fn load(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("value")))
    }

    pub async fn upsert(&self, key: &str, value: serde_json::Value, description: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, description, created_at, updated_at)
            VALUES ($1, $2, $3, now(), now())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                description = EXCLUDED.description,
                updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(description)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl SettingsStore for SettingsRepo {
    async fn load_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.load(key).await
    }

    async fn upsert_setting(&self, key: &str, value: serde_json::Value, description: &str) -> Result<()> {
        self.upsert(key, value, description).await
    }
}
