//! Token exchange against the external authorization server.

pub mod endpoints;

pub use endpoints::OauthTokenExchanger;

use chrono::{DateTime, Utc};
use std::future::Future;

use crate::error::StoreError;

/// Outcome of one successful token exchange: the new short-lived access
/// token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expiry: DateTime<Utc>,
}

/// Seam between the refresh coordinator and the authorization endpoint.
///
/// Errors follow the refresh protocol's classification: `InvalidGrant` for a
/// definitive rejection of the refresh token, `TransientAuth` for everything
/// that may succeed on retry.
pub trait TokenExchanger: Send + Sync {
    fn exchange(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenGrant, StoreError>> + Send;
}
