use chrono::Duration;
use clap::{Parser, Subcommand};

use crate::credentials::{CredentialManager, DEFAULT_TOKEN_TTL_HOURS, MAX_TOKEN_TTL_HOURS};

/// keygate: access-gated gateway for OpenAI-compatible providers
#[derive(Parser)]
#[command(name = "keygate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Address to bind (overrides HTTP_LISTEN_ADDR)
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Manage access tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue a temporary access token
    Issue {
        /// Lifetime in hours
        #[arg(
            long,
            default_value_t = DEFAULT_TOKEN_TTL_HOURS,
            value_parser = clap::value_parser!(i64).range(1..=MAX_TOKEN_TTL_HOURS)
        )]
        hours: i64,
    },
    /// Check whether a token is currently valid
    Check { token: String },
    /// Delete expired tokens now
    Sweep,
}

/// Run a token subcommand against the configured store; returns the text to print.
pub async fn handle_token_command(
    cmd: TokenCommands,
    manager: &CredentialManager,
) -> anyhow::Result<String> {
    match cmd {
        TokenCommands::Issue { hours } => {
            if !(1..=MAX_TOKEN_TTL_HOURS).contains(&hours) {
                anyhow::bail!("--hours must be between 1 and {}, got {}", MAX_TOKEN_TTL_HOURS, hours);
            }
            let token = manager.issue(Duration::hours(hours)).await;
            if token.token.is_empty() {
                anyhow::bail!("token generation failed");
            }
            Ok(format!(
                "Token: {}\nExpires: {}",
                token.token,
                token.expires_at.to_rfc3339()
            ))
        }
        TokenCommands::Check { token } => {
            let valid = manager.validate(&token).await;
            Ok(if valid { "valid" } else { "invalid" }.to_string())
        }
        TokenCommands::Sweep => {
            let removed = manager.sweep_expired().await;
            Ok(format!("Removed {} expired token(s)", removed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::memory::MemoryStore;

    fn manager() -> CredentialManager {
        CredentialManager::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_parse_token_issue_default_hours() {
        let cli = Cli::try_parse_from(["keygate", "token", "issue"]).unwrap();
        match cli.command {
            Some(Commands::Token {
                command: TokenCommands::Issue { hours },
            }) => assert_eq!(hours, 10),
            _ => panic!("expected token issue"),
        }
    }

    #[test]
    fn test_parse_serve_addr() {
        let cli = Cli::try_parse_from(["keygate", "serve", "--addr", "127.0.0.1:9000"]).unwrap();
        match cli.command {
            Some(Commands::Serve { addr }) => assert_eq!(addr.as_deref(), Some("127.0.0.1:9000")),
            _ => panic!("expected serve"),
        }
        assert!(Cli::try_parse_from(["keygate"]).unwrap().command.is_none());
    }

    #[tokio::test]
    async fn test_issue_then_check() {
        let manager = manager();
        let out = handle_token_command(TokenCommands::Issue { hours: 1 }, &manager)
            .await
            .unwrap();
        let token = out
            .lines()
            .next()
            .and_then(|l| l.strip_prefix("Token: "))
            .unwrap()
            .to_string();
        assert_eq!(token.len(), 64);

        let check = handle_token_command(TokenCommands::Check { token }, &manager)
            .await
            .unwrap();
        assert_eq!(check, "valid");

        let check = handle_token_command(TokenCommands::Check { token: "nope".into() }, &manager)
            .await
            .unwrap();
        assert_eq!(check, "invalid");
    }

    #[tokio::test]
    async fn test_issue_rejects_non_positive_hours() {
        assert!(handle_token_command(TokenCommands::Issue { hours: 0 }, &manager())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_issue_rejects_huge_hours() {
        let manager = manager();
        let err = handle_token_command(TokenCommands::Issue { hours: 10_000_000_000 }, &manager)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--hours"));
        assert!(Cli::try_parse_from(["keygate", "token", "issue", "--hours", "10000000000"]).is_err());
        assert!(Cli::try_parse_from(["keygate", "token", "issue", "--hours", "0"]).is_err());
    }

    #[tokio::test]
    async fn test_sweep_reports_count() {
        let manager = manager();
        manager.issue(Duration::hours(-2)).await;
        manager.issue(Duration::hours(-1)).await;
        manager.issue(Duration::hours(1)).await;

        let out = handle_token_command(TokenCommands::Sweep, &manager).await.unwrap();
        assert_eq!(out, "Removed 2 expired token(s)");
    }
}
