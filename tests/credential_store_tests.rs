use chrono::{Duration, Utc};
use credstore::{CredentialRecord, CredentialStatus, CredentialStore, IdentityKey, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{
    fs,
    path::PathBuf,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

async fn open_store(tag: &str) -> (CredentialStore, PathBuf) {
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

    let store = CredentialStore::new(pool);
    store.verify_schema().await.expect("schema verify failed");
    (store, temp_path)
}

#[tokio::test]
async fn upsert_then_get_returns_equal_record() {
    let (store, path) = open_store("roundtrip").await;

    let mut record = CredentialRecord::new("a@x.com", "p1", "rt1");
    record.access_token = Some("at0".to_string());
    record.expiry = Some(Utc::now() + Duration::hours(1));

    store.upsert(&record).await.expect("upsert failed");
    let fetched = store
        .get(&IdentityKey::new("a@x.com", "p1"))
        .await
        .expect("get failed");

    assert_eq!(fetched, record);

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn upsert_replaces_existing_identity_without_duplicates() {
    let (store, path) = open_store("replace").await;

    store
        .upsert(&CredentialRecord::new("a@x.com", "p1", "rt1"))
        .await
        .expect("first upsert failed");
    store
        .upsert(&CredentialRecord::new("a@x.com", "p1", "rt2"))
        .await
        .expect("second upsert failed");

    let all = store.list_all().await.expect("list_all failed");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].refresh_token, "rt2");

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn update_tokens_keeps_refresh_token() {
    let (store, path) = open_store("partial-update").await;
    let key = IdentityKey::new("a@x.com", "p1");

    store
        .upsert(&CredentialRecord::new("a@x.com", "p1", "rt1"))
        .await
        .expect("upsert failed");

    let expiry = Utc::now() + Duration::hours(1);
    store
        .update_tokens(&key, "at1", expiry, CredentialStatus::Active)
        .await
        .expect("update_tokens failed");

    let fetched = store.get(&key).await.expect("get failed");
    assert_eq!(fetched.refresh_token, "rt1");
    assert_eq!(fetched.access_token.as_deref(), Some("at1"));
    assert_eq!(fetched.expiry, Some(expiry));
    assert_eq!(fetched.status, CredentialStatus::Active);

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn update_status_and_delete() {
    let (store, path) = open_store("status-delete").await;
    let key = IdentityKey::new("a@x.com", "p1");

    store
        .upsert(&CredentialRecord::new("a@x.com", "p1", "rt1"))
        .await
        .expect("upsert failed");

    store
        .update_status(&key, CredentialStatus::Revoked)
        .await
        .expect("update_status failed");
    let fetched = store.get(&key).await.expect("get failed");
    assert_eq!(fetched.status, CredentialStatus::Revoked);

    store.delete(&key).await.expect("delete failed");
    assert!(matches!(
        store.get(&key).await,
        Err(StoreError::NotFound { .. })
    ));

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn operations_on_unknown_identity_return_not_found() {
    let (store, path) = open_store("not-found").await;
    let key = IdentityKey::new("ghost@x.com", "p0");

    assert!(matches!(
        store.get(&key).await,
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        store
            .update_tokens(&key, "at", Utc::now(), CredentialStatus::Active)
            .await,
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        store.update_status(&key, CredentialStatus::Invalid).await,
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        store.delete(&key).await,
        Err(StoreError::NotFound { .. })
    ));

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn upsert_rejects_unpaired_token_and_expiry() {
    let (store, path) = open_store("unpaired").await;

    let mut record = CredentialRecord::new("a@x.com", "p1", "rt1");
    record.access_token = Some("at1".to_string());
    // expiry left unset
    assert!(matches!(
        store.upsert(&record).await,
        Err(StoreError::UnpairedTokenFields)
    ));

    let mut record = CredentialRecord::new("a@x.com", "p1", "rt1");
    record.expiry = Some(Utc::now());
    assert!(matches!(
        store.upsert(&record).await,
        Err(StoreError::UnpairedTokenFields)
    ));

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn upsert_many_is_transactional_and_ordered() {
    let (store, path) = open_store("batch").await;

    let records = vec![
        CredentialRecord::new("a@x.com", "p1", "rt1"),
        CredentialRecord::new("b@x.com", "p2", "rt2"),
        CredentialRecord::new("a@x.com", "p2", "rt3"),
    ];
    store.upsert_many(&records).await.expect("batch failed");

    let all = store.list_all().await.expect("list_all failed");
    assert_eq!(all.len(), 3);
    // Snapshot is ordered by (email, project_id).
    assert_eq!(all[0].identity(), IdentityKey::new("a@x.com", "p1"));
    assert_eq!(all[1].identity(), IdentityKey::new("a@x.com", "p2"));
    assert_eq!(all[2].identity(), IdentityKey::new("b@x.com", "p2"));

    let _ = fs::remove_file(&path);
}

#[test]
fn debug_output_redacts_secrets() {
    let mut record = CredentialRecord::new("a@x.com", "p1", "super-secret-rt");
    record.access_token = Some("super-secret-at".to_string());
    record.expiry = Some(Utc::now());

    let rendered = format!("{record:?}");
    assert!(!rendered.contains("super-secret-rt"));
    assert!(!rendered.contains("super-secret-at"));
    assert!(rendered.contains("a@x.com"));
}
