use figment::{Figment, providers::Env};
use serde::Deserialize;
use std::fmt;
use url::Url;

use crate::error::StoreError;

fn default_database_url() -> String {
    "sqlite:credentials.sqlite".to_string()
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_refresh_timeout_secs() -> u64 {
    15
}

fn default_expiry_skew_secs() -> i64 {
    120
}

fn default_token_uri() -> Url {
    Url::parse("https://oauth2.googleapis.com/token").expect("valid default token URI")
}

/// Process-wide OAuth client registration, loaded once from the environment.
///
/// This replaced the former per-record client_id/client_secret/scopes columns;
/// the schema manager rejects stores still carrying them.
#[derive(Clone, Deserialize)]
pub struct OauthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: Url,
}

// client_secret must never leak through Debug formatting.
impl fmt::Debug for OauthClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OauthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("token_uri", &self.token_uri.as_str())
            .finish()
    }
}

/// Immutable service configuration, constructed once at startup and passed
/// explicitly to the components that need it.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
    #[serde(default)]
    pub proxy: Option<Url>,
    /// Upper bound on one token-exchange round trip.
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
    /// Safety margin subtracted from stored expiries when judging freshness.
    #[serde(default = "default_expiry_skew_secs")]
    pub expiry_skew_secs: i64,
    pub oauth: OauthClientConfig,
}

impl Config {
    /// Load from `CREDSTORE_*` environment variables; nested fields use a
    /// double underscore (`CREDSTORE_OAUTH__CLIENT_ID`).
    pub fn from_env() -> Result<Self, StoreError> {
        let cfg = Figment::new()
            .merge(Env::prefixed("CREDSTORE_").split("__"))
            .extract()?;
        Ok(cfg)
    }
}
