//! Issuance, validation, and expiry of gateway access tokens.
//!
//! Every validation reads the store; nothing is cached in-process.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::models::token::AccessToken;
use crate::store::CredentialStore;

/// Lifetime of tokens minted by the login callback.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 10;

/// Upper bound accepted by `keygate token issue --hours` (ten years).
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Mint a temporary token and persist it.
    ///
    /// Never fails. A persistence error is logged and the token is still
    /// returned, but it will not validate later since validation reads the
    /// store. An empty `token` means the random source failed or `ttl` put
    /// the expiry out of range; callers must treat it as unusable.
    pub async fn issue(&self, ttl: Duration) -> AccessToken {
        let now = Utc::now();
        let Some(token) = AccessToken::checked_temporary(generate_token_value(), now, ttl) else {
            tracing::error!(ttl_seconds = ttl.num_seconds(), "token lifetime out of range, nothing issued");
            return AccessToken::temporary(String::new(), now, Duration::zero());
        };

        if token.token.is_empty() {
            tracing::error!("random source failed, issued token is empty and was not persisted");
            return token;
        }

        if let Err(e) = self.store.save(&token).await {
            tracing::error!(error = %e, "failed to persist access token");
        }
        token
    }

    pub async fn validate(&self, token: &str) -> bool {
        self.validate_at(token, Utc::now()).await
    }

    /// Store lookup followed by the validity predicate. Missing rows and
    /// lookup errors both fail closed.
    pub async fn validate_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        if token.is_empty() {
            return false;
        }
        match self.store.get(token).await {
            Ok(Some(row)) => row.is_valid_at(now),
            Ok(None) => false,
            Err(e) => {
                tracing::error!(error = %e, "access token lookup failed");
                false
            }
        }
    }

    pub async fn sweep_expired(&self) -> u64 {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Remove every row with `expires_at < now`. Store errors count as zero;
    /// the next scheduled sweep retries.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> u64 {
        match self.store.delete_expired(now).await {
            Ok(n) => {
                if n > 0 {
                    tracing::info!(removed = n, "swept expired access tokens");
                }
                n
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to delete expired access tokens");
                0
            }
        }
    }
}

/// 16 random bytes through SHA-256, hex encoded. Empty on RNG failure.
fn generate_token_value() -> String {
    let mut bytes = [0u8; 16];
    if let Err(e) = OsRng.try_fill_bytes(&mut bytes) {
        tracing::error!(error = %e, "OS random source unavailable");
        return String::new();
    }
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;

    fn manager() -> (CredentialManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CredentialManager::new(store.clone()), store)
    }

    /// A store that is always down.
    struct BrokenStore;

    #[async_trait]
    impl CredentialStore for BrokenStore {
        async fn save(&self, _: &AccessToken) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn get(&self, _: &str) -> anyhow::Result<Option<AccessToken>> {
            anyhow::bail!("connection refused")
        }
        async fn delete_expired(&self, _: DateTime<Utc>) -> anyhow::Result<u64> {
            anyhow::bail!("connection refused")
        }
        async fn close(&self) {}
    }

    #[test]
    fn test_generated_tokens_are_hex_and_unique() {
        let a = generate_token_value();
        let b = generate_token_value();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_issue_persists_and_validates() {
        let (manager, store) = manager();
        let token = manager.issue(Duration::hours(4)).await;

        assert!(!token.token.is_empty());
        assert_eq!(token.expires_at - token.issued_at, Duration::hours(4));
        assert_eq!(store.len(), 1);
        assert!(manager.validate(&token.token).await);
    }

    #[tokio::test]
    async fn test_issue_with_out_of_range_ttl_is_unusable() {
        let (manager, store) = manager();
        let token = manager.issue(Duration::hours(10_000_000_000)).await;

        assert!(token.token.is_empty());
        assert!(!token.is_valid());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_validate_unknown_and_empty_tokens() {
        let (manager, _) = manager();
        assert!(!manager.validate("non-existent-key").await);
        assert!(!manager.validate("").await);
    }

    #[tokio::test]
    async fn test_validate_straddles_expiry_to_the_second() {
        let (manager, store) = manager();
        let now = Utc::now();
        let token = AccessToken::temporary("edge".into(), now, Duration::seconds(30));
        store.save(&token).await.unwrap();

        assert!(manager.validate_at("edge", token.expires_at - Duration::seconds(1)).await);
        assert!(!manager.validate_at("edge", token.expires_at).await);
        assert!(!manager.validate_at("edge", token.expires_at + Duration::seconds(1)).await);
    }

    #[tokio::test]
    async fn test_expired_row_is_invalid_before_sweep() {
        let (manager, store) = manager();
        let token = manager.issue(Duration::hours(-1)).await;

        assert_eq!(store.len(), 1);
        assert!(!manager.validate(&token.token).await);
    }

    #[tokio::test]
    async fn test_sweep_removes_exactly_expired() {
        let (manager, store) = manager();
        for _ in 0..3 {
            manager.issue(Duration::hours(-1)).await;
        }
        for _ in 0..2 {
            manager.issue(Duration::hours(1)).await;
        }

        assert_eq!(manager.sweep_expired().await, 3);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_broken_store_degrades_without_panicking() {
        let manager = CredentialManager::new(Arc::new(BrokenStore));

        let token = manager.issue(Duration::hours(1)).await;
        assert!(!token.token.is_empty());
        assert!(token.is_valid());

        // fail closed: the unpersisted token does not validate
        assert!(!manager.validate(&token.token).await);
        assert_eq!(manager.sweep_expired().await, 0);
    }
}
