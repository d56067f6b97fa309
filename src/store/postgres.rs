use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::OnceCell;

use super::{CredentialStore, ACQUIRE_TIMEOUT};
use crate::models::token::AccessToken;

/// Postgres-backed store. The pool connects on first use and the schema is
/// migrated on the first successful round trip, so a database that is down at
/// boot only fails individual store calls.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    schema: Arc<OnceCell<()>>,
}

impl PgStore {
    pub fn connect_lazy(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(database_url)
            .context("invalid postgres connection string")?;
        Ok(Self {
            pool,
            schema: Arc::new(OnceCell::new()),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/postgres directory once.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::migrate!("./migrations/postgres").run(&self.pool).await?;
                tracing::info!("postgres credential store ready");
                Ok::<_, anyhow::Error>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn save(&self, token: &AccessToken) -> anyhow::Result<()> {
        self.migrate().await?;
        sqlx::query(
            r#"INSERT INTO access_tokens (token, kind, issued_at, expires_at)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (token) DO UPDATE
               SET kind = EXCLUDED.kind,
                   issued_at = EXCLUDED.issued_at,
                   expires_at = EXCLUDED.expires_at"#,
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
            "SELECT token, kind, issued_at, expires_at FROM access_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AccessToken::try_from).transpose()
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        self.migrate().await?;
        let result = sqlx::query("DELETE FROM access_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct TokenRow {
    pub token: String,
    pub kind: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TryFrom<TokenRow> for AccessToken {
    type Error = anyhow::Error;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(AccessToken {
            token: row.token,
            kind: row.kind.parse()?,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        })
    }
}
