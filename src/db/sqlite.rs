use crate::db::models::{CredentialRecord, CredentialStatus, IdentityKey};
use crate::db::schema::{SQLITE_INIT, SchemaState, classify_columns};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::info;

pub type SqlitePool = Pool<Sqlite>;

const SELECT_COLUMNS: &str =
    "email, project_id, refresh_token, access_token, expiry, status";

/// Single source of truth for token material and status. All storage access
/// goes through this type; no component touches the table directly.
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Compare the on-disk table shape against the current schema version.
    ///
    /// Fresh store: create the table and proceed. Current shape: proceed.
    /// Anything else (notably the legacy per-record client_id/client_secret/
    /// scopes columns): fail with `IncompatibleSchema` and leave the table
    /// untouched so the operator can inspect it before resetting.
    pub async fn verify_schema(&self) -> Result<(), StoreError> {
        let rows = sqlx::query("SELECT name FROM pragma_table_info('credentials')")
            .fetch_all(&self.pool)
            .await?;
        let observed: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<_, _>>()?;

        match classify_columns(observed) {
            SchemaState::Missing => {
                self.init_schema().await?;
                info!("credentials table created at current schema version");
                Ok(())
            }
            SchemaState::Current => Ok(()),
            SchemaState::Incompatible { unexpected } => {
                Err(StoreError::IncompatibleSchema { unexpected })
            }
        }
    }

    /// Initialize the schema by executing the bundled DDL.
    async fn init_schema(&self) -> Result<(), StoreError> {
        // execute multiple statements safely (SQLite supports multi-commands but sqlx::query doesn't)
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn get(&self, key: &IdentityKey) -> Result<CredentialRecord, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM credentials WHERE email = ? AND project_id = ?"
        ))
        .bind(&key.email)
        .bind(&key.project_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_record(row),
            None => Err(StoreError::NotFound {
                email: key.email.clone(),
                project_id: key.project_id.clone(),
            }),
        }
    }

    /// Insert or fully replace the record for its identity. A single upsert
    /// statement, so concurrent readers observe either the old or the new
    /// row, never a half-written one.
    pub async fn upsert(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        record.validate()?;
        sqlx::query(
            r#"
            INSERT INTO credentials (
                email, project_id, refresh_token, access_token, expiry, status
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(email, project_id) DO UPDATE SET
                refresh_token=excluded.refresh_token,
                access_token=excluded.access_token,
                expiry=excluded.expiry,
                status=excluded.status
            "#,
        )
        .bind(&record.email)
        .bind(&record.project_id)
        .bind(&record.refresh_token)
        .bind(&record.access_token)
        .bind(record.expiry.map(|e| e.to_rfc3339()))
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Batch upsert using a single transaction, in input order.
    pub async fn upsert_many(&self, records: &[CredentialRecord]) -> Result<(), StoreError> {
        for record in records {
            record.validate()?;
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO credentials (
                    email, project_id, refresh_token, access_token, expiry, status
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(email, project_id) DO UPDATE SET
                    refresh_token=excluded.refresh_token,
                    access_token=excluded.access_token,
                    expiry=excluded.expiry,
                    status=excluded.status
                "#,
            )
            .bind(&record.email)
            .bind(&record.project_id)
            .bind(&record.refresh_token)
            .bind(&record.access_token)
            .bind(record.expiry.map(|e| e.to_rfc3339()))
            .bind(record.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Partial update after a refresh: token, expiry and status only. The
    /// stored refresh_token is untouched, so the coordinator never has to
    /// round-trip it.
    pub async fn update_tokens(
        &self,
        key: &IdentityKey,
        access_token: &str,
        expiry: DateTime<Utc>,
        status: CredentialStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE credentials SET access_token = ?, expiry = ?, status = ? \
             WHERE email = ? AND project_id = ?",
        )
        .bind(access_token)
        .bind(expiry.to_rfc3339())
        .bind(status.as_str())
        .bind(&key.email)
        .bind(&key.project_id)
        .execute(&self.pool)
        .await?;

        Self::require_row(result.rows_affected(), key)
    }

    pub async fn update_status(
        &self,
        key: &IdentityKey,
        status: CredentialStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE credentials SET status = ? WHERE email = ? AND project_id = ?",
        )
        .bind(status.as_str())
        .bind(&key.email)
        .bind(&key.project_id)
        .execute(&self.pool)
        .await?;

        Self::require_row(result.rows_affected(), key)
    }

    pub async fn delete(&self, key: &IdentityKey) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM credentials WHERE email = ? AND project_id = ?")
            .bind(&key.email)
            .bind(&key.project_id)
            .execute(&self.pool)
            .await?;

        Self::require_row(result.rows_affected(), key)
    }

    /// Snapshot of every record, taken by one SELECT.
    pub async fn list_all(&self) -> Result<Vec<CredentialRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM credentials ORDER BY email, project_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    fn require_row(rows_affected: u64, key: &IdentityKey) -> Result<(), StoreError> {
        if rows_affected == 0 {
            return Err(StoreError::NotFound {
                email: key.email.clone(),
                project_id: key.project_id.clone(),
            });
        }
        Ok(())
    }

    fn row_to_record(row: SqliteRow) -> Result<CredentialRecord, StoreError> {
        let email: String = row.try_get("email")?;
        let project_id: String = row.try_get("project_id")?;
        let refresh_token: String = row.try_get("refresh_token")?;
        let access_token: Option<String> = row.try_get("access_token")?;
        let expiry_str: Option<String> = row.try_get("expiry")?;
        let status_str: String = row.try_get("status")?;

        let expiry: Option<DateTime<Utc>> = expiry_str
            .map(|s| {
                chrono::DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))
            })
            .transpose()?;
        let status = CredentialStatus::parse(&status_str).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown credential status: {status_str}").into())
        })?;

        Ok(CredentialRecord {
            email,
            project_id,
            refresh_token,
            access_token,
            expiry,
            status,
        })
    }
}
