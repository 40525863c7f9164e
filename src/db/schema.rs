//! SQL DDL and schema-shape classification for the credential store.
//! SQLite-first design; can be adapted for other RDBMS.

use std::collections::BTreeSet;

/// Current-version schema:
/// - identity primary key (email, project_id)
/// - token material plus paired RFC3339 expiry
/// - `status` TEXT ('active' | 'invalid' | 'revoked')
///
/// OAuth client configuration (client id/secret, scopes) is process-wide and
/// env-derived; it is deliberately not persisted per record.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    email TEXT NOT NULL,
    project_id TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    access_token TEXT NULL,
    expiry TEXT NULL, -- RFC3339, written together with access_token
    status TEXT NOT NULL DEFAULT 'active',
    PRIMARY KEY (email, project_id)
);
"#;

/// Column set the current schema version carries.
pub const EXPECTED_COLUMNS: [&str; 6] = [
    "email",
    "project_id",
    "refresh_token",
    "access_token",
    "expiry",
    "status",
];

/// Result of comparing the on-disk `credentials` table to the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaState {
    /// Table absent; safe to create the current version.
    Missing,
    /// Table matches the current version exactly.
    Current,
    /// Table exists with a different shape (e.g. the legacy per-record
    /// client_id/client_secret/scopes columns). Never auto-migrated.
    Incompatible { unexpected: Vec<String> },
}

/// Classify the observed column names of the `credentials` table.
///
/// Any deviation from the exact expected set counts as incompatible: extra
/// legacy columns held secrets tied to a client configuration that no longer
/// exists in persisted form, and missing columns mean an unknown older or
/// newer layout. Both require an explicit operator reset.
pub fn classify_columns<I, S>(observed: I) -> SchemaState
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let observed: BTreeSet<String> = observed.into_iter().map(Into::into).collect();
    if observed.is_empty() {
        return SchemaState::Missing;
    }

    let expected: BTreeSet<String> = EXPECTED_COLUMNS.iter().map(|c| c.to_string()).collect();
    if observed == expected {
        return SchemaState::Current;
    }

    let mut unexpected: Vec<String> = observed.difference(&expected).cloned().collect();
    if unexpected.is_empty() {
        // Nothing extra, but columns are missing; report those instead.
        unexpected = expected
            .difference(&observed)
            .map(|c| format!("missing:{c}"))
            .collect();
    }
    SchemaState::Incompatible { unexpected }
}
