//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and conversions
//! - `schema.rs`: SQL DDL plus schema-shape classification (SQLite-first)
//! - `sqlite.rs`: the `CredentialStore` over a sqlx pool

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{CredentialRecord, CredentialStatus, IdentityKey};
pub use schema::{SQLITE_INIT, SchemaState, classify_columns};
pub use sqlite::{CredentialStore, SqlitePool};
