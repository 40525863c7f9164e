use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

use crate::db::models::{CredentialRecord, CredentialStatus, IdentityKey};
use crate::db::sqlite::CredentialStore;
use crate::error::StoreError;
use crate::oauth::TokenExchanger;

/// Per-identity refresh driver.
///
/// Callers ask for a usable access token; a fresh cached token is returned
/// without touching the network. Stale identities are refreshed at most once
/// at a time: concurrent callers for the same identity queue on that
/// identity's gate and re-read the store once admitted, so a whole burst of
/// stale requests produces exactly one exchange against the authorization
/// server.
pub struct RefreshCoordinator<E: TokenExchanger> {
    store: CredentialStore,
    exchanger: E,
    skew: ChronoDuration,
    // Guarded map of per-identity gates. The outer mutex is held only to
    // clone an Arc, never across an await; the inner tokio mutex is the
    // single serialization point per identity.
    in_flight: StdMutex<HashMap<IdentityKey, Arc<TokioMutex<()>>>>,
}

impl<E: TokenExchanger> RefreshCoordinator<E> {
    pub fn new(store: CredentialStore, exchanger: E, skew: ChronoDuration) -> Self {
        Self {
            store,
            exchanger,
            skew,
            in_flight: StdMutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Return a usable access token for the identity, refreshing if needed.
    ///
    /// Errors: `RequiresReauthorization` if the identity is not ACTIVE (no
    /// network call is made) or becomes revoked during this refresh;
    /// `TransientAuth` if the exchange failed without a verdict (stored
    /// state untouched); `NotFound` / `Storage` from the record store.
    pub async fn access_token(&self, key: &IdentityKey) -> Result<String, StoreError> {
        let record = self.store.get(key).await?;
        self.require_active(&record)?;

        if let Some(token) = self.cached_token(&record) {
            debug!(email = %key.email, project_id = %key.project_id, "cached token still fresh");
            return Ok(token);
        }

        let gate = self.refresh_gate(key);
        let _serialized = gate.lock().await;

        // Re-read under the gate: a waiter ahead of us may have refreshed
        // (or revoked) this identity while we queued.
        let record = self.store.get(key).await?;
        self.require_active(&record)?;
        if let Some(token) = self.cached_token(&record) {
            debug!(
                email = %key.email,
                project_id = %key.project_id,
                "token refreshed by concurrent caller"
            );
            return Ok(token);
        }

        self.refresh_locked(key, &record).await
    }

    /// The single place that talks to the authorization server. Caller must
    /// hold the identity's gate.
    async fn refresh_locked(
        &self,
        key: &IdentityKey,
        record: &CredentialRecord,
    ) -> Result<String, StoreError> {
        info!(email = %key.email, project_id = %key.project_id, "refreshing access token");

        match self.exchanger.exchange(&record.refresh_token).await {
            Ok(grant) => {
                self.store
                    .update_tokens(key, &grant.access_token, grant.expiry, CredentialStatus::Active)
                    .await?;
                info!(
                    email = %key.email,
                    project_id = %key.project_id,
                    expiry = %grant.expiry,
                    "access token refreshed"
                );
                Ok(grant.access_token)
            }
            Err(StoreError::InvalidGrant(reason)) => {
                warn!(
                    email = %key.email,
                    project_id = %key.project_id,
                    reason = %reason,
                    "refresh token rejected; marking identity revoked"
                );
                self.store
                    .update_status(key, CredentialStatus::Revoked)
                    .await?;
                Err(StoreError::RequiresReauthorization {
                    email: key.email.clone(),
                    project_id: key.project_id.clone(),
                    status: CredentialStatus::Revoked,
                })
            }
            // Transient failure: no stored state may reflect an attempt that
            // never definitively completed.
            Err(e) => {
                warn!(
                    email = %key.email,
                    project_id = %key.project_id,
                    error = %e,
                    "refresh failed transiently; stored state unchanged"
                );
                Err(e)
            }
        }
    }

    fn require_active(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        if record.status == CredentialStatus::Active {
            return Ok(());
        }
        Err(StoreError::RequiresReauthorization {
            email: record.email.clone(),
            project_id: record.project_id.clone(),
            status: record.status,
        })
    }

    fn cached_token(&self, record: &CredentialRecord) -> Option<String> {
        if record.is_fresh(Utc::now(), self.skew) {
            record.access_token.clone()
        } else {
            None
        }
    }

    /// Gate map grows one entry per distinct identity ever refreshed here;
    /// bounded by the store's population.
    fn refresh_gate(&self, key: &IdentityKey) -> Arc<TokioMutex<()>> {
        let mut map = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(key.clone()).or_default().clone()
    }
}
