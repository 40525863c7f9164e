//! Startup routine: open the persistence layer, verify the schema version,
//! and hand back a ready credential service.
//!
//! On `IncompatibleSchema` the caller must refuse normal operation; the error
//! message carries the exact remediation (stop, drop the `credentials` table
//! or delete the database file, restart). Nothing is written over old data.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::db::sqlite::CredentialStore;
use crate::error::StoreError;
use crate::oauth::OauthTokenExchanger;
use crate::service::refresh::RefreshCoordinator;

/// The assembled subsystem: record store plus refresh coordinator.
#[derive(Clone)]
pub struct CredentialService {
    store: CredentialStore,
    coordinator: Arc<RefreshCoordinator<OauthTokenExchanger>>,
}

impl CredentialService {
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator<OauthTokenExchanger>> {
        &self.coordinator
    }
}

/// Open (creating if missing) the store, verify the schema, and wire up the
/// refresh coordinator with the process-wide OAuth client configuration.
pub async fn open(cfg: &Config) -> Result<CredentialService, StoreError> {
    let connect_opts =
        SqliteConnectOptions::from_str(cfg.database_url.as_str())?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;

    let store = CredentialStore::new(pool);
    store.verify_schema().await?;
    info!(database_url = %cfg.database_url, "credential schema verified");

    let exchanger = OauthTokenExchanger::new(
        &cfg.oauth,
        cfg.proxy.clone(),
        Duration::from_secs(cfg.refresh_timeout_secs),
    );
    let coordinator = Arc::new(RefreshCoordinator::new(
        store.clone(),
        exchanger,
        chrono::Duration::seconds(cfg.expiry_skew_secs),
    ));

    Ok(CredentialService { store, coordinator })
}
