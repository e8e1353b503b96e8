//! stk-config
//!
//! Layered YAML configuration for the sync engine.
//!
//! - Later layers override earlier ones (deep merge, objects only).
//! - The merged document is canonicalised and hashed (sha256, hex) so every
//!   run can log exactly which configuration it used.
//! - Literal secrets are rejected; config stores env var NAMES only
//!   (see [`secrets`]).

pub mod secrets;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // Stripe / OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
    "shpat_",     // shop admin API access token
    "shpss_",     // shop app shared secret
];

// ---------------------------------------------------------------------------
// Typed settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimarySettings {
    pub api_version: String,
    /// Overrides `https://<shop>`.
    pub base_url: Option<String>,
}

impl Default for PrimarySettings {
    fn default() -> Self {
        Self {
            api_version: "2021-01".to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceKeysEnv {
    pub client_id: String,
    pub redirect_uri: String,
}

impl Default for MarketplaceKeysEnv {
    fn default() -> Self {
        Self {
            client_id: "STK_MARKETPLACE_CLIENT_ID".to_string(),
            redirect_uri: "STK_MARKETPLACE_REDIRECT_URI".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceSettings {
    pub api_base_url: String,
    pub token_url: String,
    /// Reuse a stored token only if it expires later than this.
    pub refresh_margin_secs: u64,
    pub listings_page_size: u32,
    pub keys_env: MarketplaceKeysEnv,
}

impl Default for MarketplaceSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://openapi.etsy.com".to_string(),
            token_url: "https://api.etsy.com/v3/public/oauth/token".to_string(),
            refresh_margin_secs: 600,
            listings_page_size: 100,
            keys_env: MarketplaceKeysEnv::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkSettings {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            interval_secs: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub database_url_env: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_url_env: "STK_DATABASE_URL".to_string(),
        }
    }
}

/// Effective settings for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub primary: PrimarySettings,
    pub marketplace: MarketplaceSettings,
    pub bulk: BulkSettings,
    pub store: StoreSettings,
}

impl SyncConfig {
    /// Typed view of a merged config document. Absent keys take defaults.
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: SyncConfig =
            serde_json::from_value(config_json.clone()).context("invalid sync config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.bulk.max_attempts == 0 {
            bail!("CONFIG_INVALID: /bulk/max_attempts must be >= 1");
        }
        if !(1..=100).contains(&self.marketplace.listings_page_size) {
            bail!("CONFIG_INVALID: /marketplace/listings_page_size must be within 1..=100");
        }
        if self.marketplace.refresh_margin_secs > 86_400 {
            bail!("CONFIG_INVALID: /marketplace/refresh_margin_secs must be at most one day");
        }
        if self.primary.api_version.trim().is_empty() {
            bail!("CONFIG_INVALID: /primary/api_version is empty");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

/// JSON-pointer prefixes read by the sync engine. Any leaf not under one of
/// these is reported as unused.
pub const CONSUMED_POINTERS: &[&str] = &["/primary", "/marketplace", "/bulk", "/store"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Produce an unused-key report.
/// If `policy == Fail`, returns an error when unused keys exist.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = CONSUMED_POINTERS
        .iter()
        .map(|p| normalize_pointer(p))
        .collect();
    let consumed_prefixes: Vec<String> = consumed.into_iter().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !consumed_prefixes.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected. \
            Remove them or extend the consumed registry. First few: {}",
            report.unused_leaf_pointers.len(),
            preview_list(&report.unused_leaf_pointers, 12)
        );
    }

    Ok(report)
}

/// Normalize JSON pointer: leading "/", no trailing "/" (except root).
fn normalize_pointer(p: &str) -> String {
    let mut s = p.trim().to_string();
    if s.is_empty() {
        return "/".to_string();
    }
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    while s.ends_with('/') && s.len() > 1 {
        s.pop();
    }
    s
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but NOT "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" || leaf == prefix {
        return true;
    }
    leaf.starts_with(prefix)
        && leaf
            .get(prefix.len()..prefix.len() + 1)
            .map(|c| c == "/")
            .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    let take = items.iter().take(n).cloned().collect::<Vec<_>>();
    format!("{:?}", take)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        if raw.trim().is_empty() {
            continue;
        }
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        // A comment-only layer parses as null; it contributes nothing.
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    // serde_json's default Map is ordered by key, so compact serialization is
    // canonical regardless of YAML key order.
    let s = serde_json::to_string(v).context("canonical json serialize failed")?;
    Ok(s)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Reject any string leaf that looks like a live credential. The error names
/// the leaf pointer only.
fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    match first_secret_leaf(v, String::new()) {
        Some(ptr) => bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED"),
        None => Ok(()),
    }
}

fn first_secret_leaf(v: &Value, at: String) -> Option<String> {
    match v {
        Value::String(s) if looks_like_secret(s) => Some(if at.is_empty() { "/".to_string() } else { at }),
        Value::Object(map) => map
            .iter()
            .find_map(|(k, child)| first_secret_leaf(child, format!("{at}/{}", escape_pointer_token(k)))),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, child)| first_secret_leaf(child, format!("{at}/{i}"))),
        _ => None,
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_prefix_respects_segment_boundary() {
        assert!(is_prefix_pointer("/bulk", "/bulk/max_attempts"));
        assert!(is_prefix_pointer("/bulk", "/bulk"));
        assert!(!is_prefix_pointer("/bulk", "/bulkhead/x"));
        assert!(is_prefix_pointer("/", "/anything"));
    }

    #[test]
    fn escaped_tokens_in_leaf_pointers() {
        let v = serde_json::json!({ "a/b": { "c~d": 1 } });
        let mut out = Vec::new();
        collect_leaf_pointers(&v, "", &mut out);
        assert_eq!(out, vec!["/a~1b/c~0d".to_string()]);
    }
}
