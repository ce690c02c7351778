//! Exchange account credentials

use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// API token of one exchange account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountToken {
    pub account: String,
    pub api_token: String,
}

/// Contents of `credentials.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub is_staging: bool,
    #[serde(default)]
    pub tauros_tokens: Vec<AccountToken>,
    #[serde(default)]
    pub openexchangerates_token: String,
    #[serde(default)]
    pub gdax_token: Option<String>,
    #[serde(default)]
    pub base_webhook_url: String,
}

/// The path segment a webhook for `token` is registered under
pub fn webhook_key(token: &str) -> Option<&str> {
    token.get(4..10)
}

impl Credentials {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LedgerError::InvalidConfig {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let credentials: Credentials =
            serde_json::from_str(&content).map_err(|e| LedgerError::InvalidConfig {
                message: format!("Failed to parse {}: {}", path.display(), e),
            })?;
        credentials.validate()?;
        Ok(credentials)
    }

    pub fn validate(&self) -> Result<()> {
        for token in &self.tauros_tokens {
            if token.account.trim().is_empty() {
                return Err(LedgerError::InvalidConfig { message: "Empty account name".to_string() });
            }
            if webhook_key(&token.api_token).is_none() {
                return Err(LedgerError::InvalidConfig {
                    message: format!("API token for {} is too short", token.account),
                });
            }
        }
        Ok(())
    }

    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.tauros_tokens.iter().map(|t| t.account.as_str())
    }

    pub fn token_for(&self, account: &str) -> Result<&str> {
        self.tauros_tokens
            .iter()
            .find(|t| t.account == account)
            .map(|t| t.api_token.as_str())
            .ok_or_else(|| LedgerError::UnknownAccount(account.to_string()))
    }

    /// Resolve the account a webhook was posted for
    pub fn account_for_webhook_key(&self, key: &str) -> Result<&str> {
        self.tauros_tokens
            .iter()
            .find(|t| webhook_key(&t.api_token) == Some(key))
            .map(|t| t.account.as_str())
            .ok_or_else(|| LedgerError::UnknownAccount(format!("webhook key {}", key)))
    }

    /// Endpoint the exchange should post `account`'s notifications to
    pub fn webhook_endpoint(&self, account: &str) -> Result<String> {
        let token = self.token_for(account)?;
        let key = webhook_key(token).ok_or_else(|| LedgerError::InvalidConfig {
            message: format!("API token for {} is too short", account),
        })?;
        Ok(format!("{}/webhooks/{}", self.base_webhook_url.trim_end_matches('/'), key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CREDENTIALS: &str = r#"{
        "is_staging": true,
        "tauros_tokens": [
            {"account": "main", "api_token": "abcd123456efgh"},
            {"account": "second", "api_token": "zzzz999999yyyy"}
        ],
        "openexchangerates_token": "oxr",
        "base_webhook_url": "https://bots.example.com/"
    }"#;

    #[test]
    fn test_load_and_lookup() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CREDENTIALS.as_bytes()).unwrap();

        let credentials = Credentials::load_from_file(file.path()).unwrap();
        assert!(credentials.is_staging);
        assert_eq!(credentials.accounts().collect::<Vec<_>>(), vec!["main", "second"]);
        assert_eq!(credentials.token_for("second").unwrap(), "zzzz999999yyyy");
        assert!(matches!(credentials.token_for("other"), Err(LedgerError::UnknownAccount(_))));
    }

    #[test]
    fn test_webhook_key_routing() {
        let credentials: Credentials = serde_json::from_str(CREDENTIALS).unwrap();
        assert_eq!(webhook_key("abcd123456efgh"), Some("123456"));
        assert_eq!(credentials.account_for_webhook_key("123456").unwrap(), "main");
        assert!(credentials.account_for_webhook_key("nope").is_err());
        assert_eq!(
            credentials.webhook_endpoint("main").unwrap(),
            "https://bots.example.com/webhooks/123456"
        );
    }

    #[test]
    fn test_short_token_is_invalid() {
        let credentials: Credentials = serde_json::from_str(
            r#"{"tauros_tokens":[{"account":"main","api_token":"abc"}]}"#,
        )
        .unwrap();
        assert!(matches!(credentials.validate(), Err(LedgerError::InvalidConfig { .. })));
    }
}
