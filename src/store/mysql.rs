use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tokio::sync::OnceCell;

use super::postgres::TokenRow;
use super::{CredentialStore, ACQUIRE_TIMEOUT};
use crate::models::token::AccessToken;

/// MySQL-backed store. Connects and migrates lazily, like `PgStore`.
/// Timestamps are `DATETIME(6)` in UTC; sqlx pins the session time zone.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    schema: Arc<OnceCell<()>>,
}

impl MySqlStore {
    pub fn connect_lazy(database_url: &str) -> anyhow::Result<Self> {
        let pool = MySqlPoolOptions::new()
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(database_url)
            .context("invalid mysql connection string")?;
        Ok(Self {
            pool,
            schema: Arc::new(OnceCell::new()),
        })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::migrate!("./migrations/mysql").run(&self.pool).await?;
                tracing::info!("mysql credential store ready");
                Ok::<_, anyhow::Error>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MySqlStore {
    async fn save(&self, token: &AccessToken) -> anyhow::Result<()> {
        self.migrate().await?;
        sqlx::query(
            r#"INSERT INTO access_tokens (token, kind, issued_at, expires_at)
               VALUES (?, ?, ?, ?)
               ON DUPLICATE KEY UPDATE
                   kind = VALUES(kind),
                   issued_at = VALUES(issued_at),
                   expires_at = VALUES(expires_at)"#,
        )
        .bind(&token.token)
        .bind(token.kind.as_str())
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, token: &str) -> anyhow::Result<Option<AccessToken>> {
        self.migrate().await?;
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT token, kind, issued_at, expires_at FROM access_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AccessToken::try_from).transpose()
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        self.migrate().await?;
        let result = sqlx::query("DELETE FROM access_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
