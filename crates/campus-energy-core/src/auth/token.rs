use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

const SERVICE_NAME: &str = "campus-energy";

/// Environment variable that overrides the stored token.
pub const TOKEN_ENV_VAR: &str = "CAMPUS_ENERGY_TOKEN";

/// Keychain-backed token storage, one entry per backend URL.
pub struct TokenStore {
    account: String,
}

impl TokenStore {
    pub fn new(api_base_url: &str) -> Self {
        Self {
            account: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account).context("Failed to create keyring entry")
    }

    /// Store the bearer token in the OS keychain
    pub fn store(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .context("Failed to store token in keychain")
    }

    /// Delete the stored token
    pub fn delete(&self) -> Result<()> {
        self.entry()?
            .delete_credential()
            .context("Failed to delete token from keychain")
    }

    /// Resolve the token: environment first, then keychain.
    pub fn token(&self) -> Option<String> {
        if let Some(token) = env_token(std::env::var(TOKEN_ENV_VAR).ok()) {
            return Some(token);
        }
        match self.entry().and_then(|e| e.get_password().context("No token in keychain")) {
            Ok(token) if !token.trim().is_empty() => Some(token),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "No stored token");
                None
            }
        }
    }
}

fn env_token(value: Option<String>) -> Option<String> {
    value
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
