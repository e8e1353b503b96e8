//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"STK_MARKETPLACE_CLIENT_ID"`).
//! - Callers invoke [`resolve_secrets`] once at startup and pass the result
//!   into constructors; no other code reads secret env vars.
//! - `Debug` output of [`ResolvedSecrets`] is redacted.
//! - Error messages name the env var, never its value.
//!
//! The marketplace client id is required. Everything else is optional.

use anyhow::{bail, Result};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Marketplace application key (`x-api-key` and OAuth client id).
    pub marketplace_client_id: String,
    /// OAuth redirect URI; needed only to complete onboarding.
    pub marketplace_redirect_uri: Option<String>,
    pub database_url: Option<String>,
    /// Primary access token used to seed an in-memory store (`--memory` runs).
    pub bootstrap_primary_token: Option<String>,
    /// Marketplace refresh token used to seed an in-memory store.
    pub bootstrap_marketplace_refresh_token: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("marketplace_client_id", &"<REDACTED>")
            .field(
                "marketplace_redirect_uri",
                &self.marketplace_redirect_uri.as_ref().map(|_| "<REDACTED>"),
            )
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .field(
                "bootstrap_primary_token",
                &self.bootstrap_primary_token.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "bootstrap_marketplace_refresh_token",
                &self
                    .bootstrap_marketplace_refresh_token
                    .as_ref()
                    .map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Env var names extracted from the config JSON.
struct SecretEnvNames {
    marketplace_client_id_var: String,
    marketplace_redirect_uri_var: String,
    database_url_var: String,
    bootstrap_primary_token_var: String,
    bootstrap_marketplace_refresh_var: String,
}

/// Non-empty string at `pointer`, trimmed.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        marketplace_client_id_var: read_str_at(config_json, "/marketplace/keys_env/client_id")
            .unwrap_or_else(|| "STK_MARKETPLACE_CLIENT_ID".to_string()),
        marketplace_redirect_uri_var: read_str_at(config_json, "/marketplace/keys_env/redirect_uri")
            .unwrap_or_else(|| "STK_MARKETPLACE_REDIRECT_URI".to_string()),
        database_url_var: read_str_at(config_json, "/store/database_url_env")
            .unwrap_or_else(|| "STK_DATABASE_URL".to_string()),
        bootstrap_primary_token_var: "STK_PRIMARY_ACCESS_TOKEN".to_string(),
        bootstrap_marketplace_refresh_var: "STK_MARKETPLACE_REFRESH_TOKEN".to_string(),
    }
}

fn env_lookup(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Resolve secrets from the process environment.
pub fn resolve_secrets(config_json: &Value) -> Result<ResolvedSecrets> {
    resolve_secrets_from(config_json, env_lookup)
}

/// Resolve secrets through `lookup` (env var name -> value).
///
/// Blank values count as unset.
pub fn resolve_secrets_from<F>(config_json: &Value, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let names = parse_env_names(config_json);
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let Some(marketplace_client_id) = get(&names.marketplace_client_id_var) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (marketplace client id) is not set or empty",
            names.marketplace_client_id_var,
        );
    };

    Ok(ResolvedSecrets {
        marketplace_client_id,
        marketplace_redirect_uri: get(&names.marketplace_redirect_uri_var),
        database_url: get(&names.database_url_var),
        bootstrap_primary_token: get(&names.bootstrap_primary_token_var),
        bootstrap_marketplace_refresh_token: get(&names.bootstrap_marketplace_refresh_var),
    })
}
