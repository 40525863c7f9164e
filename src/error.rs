use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

use crate::db::models::CredentialStatus;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("no credential for identity ({email}, {project_id})")]
    NotFound { email: String, project_id: String },

    /// The persisted `credentials` table has a shape this build does not
    /// understand. Never auto-migrated; the operator must reset the store.
    #[error(
        "incompatible credentials schema (unexpected columns: {})\n\
         remediation: stop the service, drop the `credentials` table \
         (or delete the database file), then restart to bootstrap the \
         current schema",
        .unexpected.join(", ")
    )]
    IncompatibleSchema { unexpected: Vec<String> },

    #[error("credential storage unavailable: {0}")]
    Storage(#[from] SqlxError),

    /// Refresh attempt failed without a definitive verdict from the
    /// authorization server. Stored state is untouched; retry later.
    #[error("transient authorization failure: {0}")]
    TransientAuth(String),

    /// The authorization server rejected the grant itself (`invalid_grant`).
    /// The coordinator turns this into `RequiresReauthorization` once it has
    /// persisted the status change.
    #[error("authorization grant rejected: {0}")]
    InvalidGrant(String),

    /// The identity is parked until it is re-authorized out of band.
    #[error("identity ({email}, {project_id}) requires re-authorization (status: {status})")]
    RequiresReauthorization {
        email: String,
        project_id: String,
        status: CredentialStatus,
    },

    #[error("access_token and expiry must be set together")]
    UnpairedTokenFields,

    #[error("identity fields (email, project_id) must be non-empty")]
    EmptyIdentity,

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),
}

/// Whether an error is worth retrying from the caller's side.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::TransientAuth(_) | StoreError::Storage(_))
    }
}

/// Collapse the oauth2 crate's token-request error into the two kinds the
/// refresh protocol distinguishes: `invalid_grant` is the only signal treated
/// as definitive revocation; everything else (transport failures, timeouts,
/// parse errors, other server error codes such as `invalid_client`) counts as
/// transient and must not mutate stored state.
impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for StoreError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err)
                if *err.error() == BasicErrorResponseType::InvalidGrant =>
            {
                StoreError::InvalidGrant(
                    err.error_description()
                        .cloned()
                        .unwrap_or_else(|| "refresh token revoked or expired".to_string()),
                )
            }
            RequestTokenError::ServerResponse(err) => {
                StoreError::TransientAuth(format!("server response: {}", err.error()))
            }
            RequestTokenError::Request(req_e) => {
                StoreError::TransientAuth(format!("request failed: {req_e}"))
            }
            RequestTokenError::Parse(parse_err, _body) => {
                StoreError::TransientAuth(format!("malformed token response: {parse_err}"))
            }
            RequestTokenError::Other(s) => StoreError::TransientAuth(s),
        }
    }
}
