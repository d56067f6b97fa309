use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::CredentialStore;
use crate::models::token::AccessToken;

/// In-process store backed by a `DashMap`.
///
/// Tokens live only as long as the process; multiple gateway instances do not
/// see each other's tokens. Useful for single-node setups and tests.
#[derive(Default)]
pub struct MemoryStore {
    tokens: DashMap<String, AccessToken>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn save(&self, token: &AccessToken) -> anyhow::Result<()> {
        self.tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get(&self, token: &str) -> anyhow::Result<Option<AccessToken>> {
        Ok(self.tokens.get(token).map(|entry| entry.value().clone()))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut removed = 0u64;
        self.tokens.retain(|_, t| {
            let live = t.expires_at >= now;
            if !live {
                removed += 1;
            }
            live
        });
        Ok(removed)
    }

    async fn close(&self) {}
}
