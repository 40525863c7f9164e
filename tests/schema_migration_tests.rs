use credstore::db::{SchemaState, classify_columns};
use credstore::{CredentialRecord, CredentialStore, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{
    fs,
    path::PathBuf,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

/// The pre-migration table shape, with per-record OAuth client configuration.
const LEGACY_INIT: &str = r#"
CREATE TABLE credentials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NULL,
    client_id TEXT NOT NULL,
    client_secret TEXT NOT NULL,
    project_id TEXT NOT NULL UNIQUE,
    scopes TEXT NULL,
    refresh_token TEXT NOT NULL,
    access_token TEXT NULL,
    expiry TEXT NOT NULL,
    status INTEGER NOT NULL DEFAULT 1
)
"#;

async fn open_pool(tag: &str) -> (credstore::db::SqlitePool, PathBuf) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "credstore-{tag}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));

    let database_url = format!("sqlite:{}", temp_path.display());
    let opts = SqliteConnectOptions::from_str(&database_url)
        .expect("connect options")
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(opts)
        .await
        .expect("sqlite connect failed");
    (pool, temp_path)
}

#[tokio::test]
async fn empty_store_creates_current_schema() {
    let (pool, path) = open_pool("fresh").await;
    let store = CredentialStore::new(pool);

    store.verify_schema().await.expect("fresh verify failed");

    // Table is usable immediately.
    store
        .upsert(&CredentialRecord::new("a@x.com", "p1", "rt1"))
        .await
        .expect("upsert after bootstrap failed");

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn current_store_verifies_unchanged() {
    let (pool, path) = open_pool("current").await;
    let store = CredentialStore::new(pool);

    store.verify_schema().await.expect("first verify failed");
    store
        .upsert(&CredentialRecord::new("a@x.com", "p1", "rt1"))
        .await
        .expect("upsert failed");

    // A second open against the same file must pass and keep the data.
    store.verify_schema().await.expect("second verify failed");
    let all = store.list_all().await.expect("list_all failed");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].refresh_token, "rt1");

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn legacy_store_fails_with_incompatible_schema() {
    let (pool, path) = open_pool("legacy").await;
    sqlx::query(LEGACY_INIT)
        .execute(&pool)
        .await
        .expect("legacy DDL failed");
    sqlx::query(
        "INSERT INTO credentials (email, client_id, client_secret, project_id, refresh_token, expiry) \
         VALUES ('a@x.com', 'cid', 'csecret', 'p1', 'rt1', '2024-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .expect("legacy insert failed");

    let store = CredentialStore::new(pool.clone());
    let err = store.verify_schema().await.expect_err("verify must fail");

    match &err {
        StoreError::IncompatibleSchema { unexpected } => {
            assert!(unexpected.contains(&"client_id".to_string()));
            assert!(unexpected.contains(&"client_secret".to_string()));
            assert!(unexpected.contains(&"scopes".to_string()));
        }
        other => panic!("expected IncompatibleSchema, got {other:?}"),
    }
    // The message carries the operator remediation.
    assert!(err.to_string().contains("drop the `credentials` table"));

    // Fail fast must not touch the old data.
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM credentials")
        .fetch_one(&pool)
        .await
        .expect("count failed");
    assert_eq!(count, 1);

    let _ = fs::remove_file(&path);
}

#[test]
fn classify_columns_covers_all_shapes() {
    assert_eq!(classify_columns(Vec::<String>::new()), SchemaState::Missing);

    assert_eq!(
        classify_columns([
            "email",
            "project_id",
            "refresh_token",
            "access_token",
            "expiry",
            "status",
        ]),
        SchemaState::Current
    );

    // Extra legacy columns.
    let state = classify_columns([
        "id",
        "email",
        "client_id",
        "client_secret",
        "project_id",
        "scopes",
        "refresh_token",
        "access_token",
        "expiry",
        "status",
    ]);
    match state {
        SchemaState::Incompatible { unexpected } => {
            assert!(unexpected.contains(&"client_id".to_string()));
        }
        other => panic!("expected Incompatible, got {other:?}"),
    }

    // Missing columns are incompatible too, not silently patched.
    let state = classify_columns(["email", "project_id", "refresh_token"]);
    assert!(matches!(state, SchemaState::Incompatible { .. }));
}
