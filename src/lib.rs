pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod oauth;
pub mod service;

pub use db::{CredentialRecord, CredentialStatus, CredentialStore, IdentityKey};
pub use error::StoreError;
pub use oauth::{OauthTokenExchanger, TokenExchanger, TokenGrant};
pub use service::refresh::RefreshCoordinator;
