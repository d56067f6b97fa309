//! Identity exchange: turns an authorization code from the login redirect
//! into a verified identity that the callback flow can mint a token for.

pub mod oidc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    #[error("token endpoint rejected the code: {0}")]
    TokenEndpoint(String),

    #[error("no id_token in token response")]
    MissingIdToken,

    #[error("id_token verification failed: {0}")]
    InvalidIdToken(#[from] jsonwebtoken::errors::Error),

    #[error("unknown key id: {0}")]
    UnknownKeyId(String),

    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Claims taken from a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
}

impl Identity {
    /// An empty allow-list admits everyone. Otherwise the email must have
    /// exactly one `@` and a domain matching an entry, ignoring case.
    pub fn email_domain_allowed(&self, allowed_domains: &[String]) -> bool {
        if allowed_domains.is_empty() {
            return true;
        }
        let mut parts = self.email.split('@');
        let domain = match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(domain), None) => domain,
            _ => return false,
        };
        allowed_domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
    }
}

#[async_trait]
pub trait IdentityExchange: Send + Sync {
    /// URL to send the browser to. `redirect` overrides the configured
    /// callback URL when present.
    async fn authorize_url(&self, state: &str, redirect: Option<&str>) -> Result<String, ExchangeError>;

    async fn exchange(&self, code: &str) -> Result<Identity, ExchangeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: &str) -> Identity {
        Identity {
            subject: "sub-1".into(),
            email: email.into(),
            email_verified: true,
            name: None,
        }
    }

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_allow_list_admits_all() {
        assert!(identity("anyone@anywhere.io").email_domain_allowed(&[]));
        assert!(identity("not-an-email").email_domain_allowed(&[]));
    }

    #[test]
    fn test_domain_match_is_case_insensitive() {
        let allowed = domains(&["example.com", "corp.example.org"]);
        assert!(identity("alice@Example.COM").email_domain_allowed(&allowed));
        assert!(identity("bob@corp.example.org").email_domain_allowed(&allowed));
        assert!(!identity("eve@evil.com").email_domain_allowed(&allowed));
        assert!(!identity("eve@sub.example.com").email_domain_allowed(&allowed));
    }

    #[test]
    fn test_malformed_email_rejected() {
        let allowed = domains(&["example.com"]);
        assert!(!identity("no-at-sign").email_domain_allowed(&allowed));
        assert!(!identity("a@b@example.com").email_domain_allowed(&allowed));
        assert!(!identity("").email_domain_allowed(&allowed));
    }
}
