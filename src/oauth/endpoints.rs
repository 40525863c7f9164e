use backon::{ExponentialBuilder, Retryable};
use chrono::{Duration as ChronoDuration, Utc};
use oauth2::{
    Client as OAuth2Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RefreshToken,
    Scope, StandardRevocableToken, TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenResponse,
    },
};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::OauthClientConfig;
use crate::error::{IsRetryable, StoreError};
use crate::oauth::{TokenExchanger, TokenGrant};

/// Fallback lifetime when the server omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

type RefreshOauth2Client = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Production exchanger: refresh-token grant against the configured token
/// endpoint, using the process-wide client registration.
pub struct OauthTokenExchanger {
    oauth: RefreshOauth2Client,
    scopes: Vec<Scope>,
    http: reqwest::Client,
}

impl OauthTokenExchanger {
    /// Build the exchanger with a preconfigured HTTP client. The request
    /// timeout bounds every exchange; a timed-out call surfaces as transient.
    pub fn new(cfg: &OauthClientConfig, proxy: Option<Url>, timeout: Duration) -> Self {
        let mut builder = reqwest::Client::builder()
            .user_agent("credstore-oauth/1.0".to_string())
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url.as_str())
                .expect("invalid proxy url for reqwest client");
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .expect("FATAL: initialize token exchange HTTP client failed");

        let oauth = OAuth2Client::new(ClientId::new(cfg.client_id.clone()))
            .set_client_secret(ClientSecret::new(cfg.client_secret.clone()))
            .set_token_uri(TokenUrl::from_url(cfg.token_uri.clone()));

        let scopes = cfg.scopes.iter().cloned().map(Scope::new).collect();

        Self {
            oauth,
            scopes,
            http,
        }
    }

    async fn exchange_once(&self, refresh_token: &str) -> Result<TokenGrant, StoreError> {
        let token_result: BasicTokenResponse = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .add_scopes(self.scopes.iter().cloned())
            .request_async(&self.http)
            .await?;

        let lifetime = token_result
            .expires_in()
            .and_then(|d| ChronoDuration::from_std(d).ok())
            .unwrap_or_else(|| ChronoDuration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));

        Ok(TokenGrant {
            access_token: token_result.access_token().secret().clone(),
            expiry: Utc::now() + lifetime,
        })
    }
}

impl TokenExchanger for OauthTokenExchanger {
    /// One logical exchange; transient sub-failures are retried a bounded
    /// number of times before the error surfaces to the caller.
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, StoreError> {
        let retry_policy = default_retry_policy();

        let grant = (|| async { self.exchange_once(refresh_token).await })
            .retry(retry_policy)
            .when(|e: &StoreError| e.is_retryable())
            .notify(|err, dur: Duration| {
                warn!("token exchange retrying after error {}, sleeping {:?}", err, dur);
            })
            .await?;

        debug!("token exchange succeeded");
        Ok(grant)
    }
}
