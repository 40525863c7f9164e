use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StoreError;

/// Lifecycle status of a stored credential. Only the refresh coordinator (or
/// an explicit external re-authorization) moves a record between these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    /// Refresh is expected to succeed.
    Active,
    /// Refresh was rejected; the grant is unusable until re-authorized.
    Invalid,
    /// The authorization server reported the grant as revoked.
    Revoked,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Invalid => "invalid",
            CredentialStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CredentialStatus::Active),
            "invalid" => Some(CredentialStatus::Invalid),
            "revoked" => Some(CredentialStatus::Revoked),
            _ => None,
        }
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (email, project_id) pair addressing exactly one credential record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub email: String,
    pub project_id: String,
}

impl IdentityKey {
    pub fn new(email: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            project_id: project_id.into(),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.email, self.project_id)
    }
}

/// One row of the `credentials` table.
///
/// `access_token` and `expiry` are always written together; an unset expiry
/// means the cached token (if any) is treated as already expired.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub email: String,
    pub project_id: String,
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub status: CredentialStatus,
}

impl CredentialRecord {
    /// A freshly authorized identity: refresh token only, no cached access
    /// token yet.
    pub fn new(
        email: impl Into<String>,
        project_id: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            project_id: project_id.into(),
            refresh_token: refresh_token.into(),
            access_token: None,
            expiry: None,
            status: CredentialStatus::Active,
        }
    }

    pub fn identity(&self) -> IdentityKey {
        IdentityKey::new(self.email.clone(), self.project_id.clone())
    }

    /// Reject identity-less or token/expiry-unpaired records before they
    /// reach storage.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.email.is_empty() || self.project_id.is_empty() {
            return Err(StoreError::EmptyIdentity);
        }
        if self.access_token.is_some() != self.expiry.is_some() {
            return Err(StoreError::UnpairedTokenFields);
        }
        Ok(())
    }

    /// Whether the cached access token is still usable at `now`, with `skew`
    /// subtracted from the stored expiry so callers never receive a token
    /// about to lapse mid-use.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        match (&self.access_token, self.expiry) {
            (Some(token), Some(expiry)) => !token.is_empty() && now < expiry - skew,
            _ => false,
        }
    }
}

// Token material must never leak through Debug formatting (logs, panics).
impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("email", &self.email)
            .field("project_id", &self.project_id)
            .field("refresh_token", &"<redacted>")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .field("status", &self.status)
            .finish()
    }
}
