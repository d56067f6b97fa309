use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::CredentialStore;
use crate::models::token::AccessToken;

/// SQLite-backed store. Timestamps are stored as Unix milliseconds so that
/// `expires_at < ?` compares numerically.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(dsn: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .context("invalid sqlite connection string")?
            .create_if_missing(true);

        // An in-memory database lives and dies with its connection, so the
        // pool must hold exactly one and never recycle it.
        let pool = if dsn.contains(":memory:") || dsn.contains("mode=memory") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn save(&self, token: &AccessToken) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO access_tokens (token, kind, issued_at, expires_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT (token) DO UPDATE
               SET kind = excluded.kind,
                   issued_at = excluded.issued_at,
                   expires_at = excluded.expires_at"#,
        )
        .bind(&token.token)
        .bind(token.kind.as_str())
        .bind(token.issued_at.timestamp_millis())
        .bind(token.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, token: &str) -> anyhow::Result<Option<AccessToken>> {
        let row = sqlx::query_as::<_, SqliteTokenRow>(
            "SELECT token, kind, issued_at, expires_at FROM access_tokens WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AccessToken::try_from).transpose()
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE expires_at < ?1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteTokenRow {
    token: String,
    kind: String,
    issued_at: i64,
    expires_at: i64,
}

impl TryFrom<SqliteTokenRow> for AccessToken {
    type Error = anyhow::Error;

    fn try_from(row: SqliteTokenRow) -> Result<Self, Self::Error> {
        Ok(AccessToken {
            kind: row.kind.parse()?,
            issued_at: from_millis(row.issued_at)?,
            expires_at: from_millis(row.expires_at)?,
            token: row.token,
        })
    }
}

fn from_millis(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn memory_store() -> SqliteStore {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let store = memory_store().await;
        let now = Utc::now();
        let token = AccessToken::temporary("test-key-123".into(), now, Duration::hours(1));

        store.save(&token).await.unwrap();
        let got = store.get("test-key-123").await.unwrap().unwrap();

        assert_eq!(got.token, "test-key-123");
        assert_eq!(got.kind, token.kind);
        assert_eq!(got.issued_at.timestamp_millis(), now.timestamp_millis());
        assert_eq!(got.expires_at.timestamp_millis(), token.expires_at.timestamp_millis());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = memory_store().await;
        assert!(store.get("non-existent-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_last_write_wins() {
        let store = memory_store().await;
        let now = Utc::now();
        let first = AccessToken::temporary("replace-key".into(), now, Duration::hours(1));
        let second = AccessToken::temporary("replace-key".into(), now, Duration::hours(2));

        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM access_tokens")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        let got = store.get("replace-key").await.unwrap().unwrap();
        assert_eq!(got.expires_at.timestamp(), second.expires_at.timestamp());
    }

    #[tokio::test]
    async fn test_delete_expired_counts_only_expired() {
        let store = memory_store().await;
        let now = Utc::now();
        for i in 0..4 {
            let t = AccessToken::temporary(format!("expired-{}", i), now - Duration::hours(2), Duration::hours(1));
            store.save(&t).await.unwrap();
        }
        for i in 0..3 {
            let t = AccessToken::temporary(format!("valid-{}", i), now, Duration::hours(1));
            store.save(&t).await.unwrap();
        }

        assert_eq!(store.delete_expired(now).await.unwrap(), 4);
        assert!(store.get("expired-0").await.unwrap().is_none());
        assert!(store.get("valid-2").await.unwrap().is_some());
        assert_eq!(store.delete_expired(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_store_errors() {
        let store = memory_store().await;
        store.close().await;
        assert!(store.get("anything").await.is_err());
    }
}
