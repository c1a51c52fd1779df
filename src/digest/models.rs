use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

/// One persisted credential: the partial digest valid for a (user, login)
/// pair. `confirmed` mirrors the login's membership in the enumerator's
/// confirmed set.
#[derive(Debug, Clone, Serialize)]
pub struct PartialDigest {
    pub user_id: Uuid,
    pub login: String,
    pub partial_digest: String,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for PartialDigest {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            login: row.try_get("login")?,
            partial_digest: row.try_get("partial_digest")?,
            confirmed: row.try_get("confirmed")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// One row per distinct nonce ever seen. `count` is absent when the client
/// does not send a nonce-count.
#[derive(Debug, Clone)]
pub struct UserNonce {
    pub nonce: String,
    pub user_id: Uuid,
    pub count: Option<i64>,
    pub last_used_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for UserNonce {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            nonce: row.try_get("nonce")?,
            user_id: row.try_get("user_id")?,
            count: row.try_get("count")?,
            last_used_at: row.try_get("last_used_at")?,
        })
    }
}

/// A freshly computed credential waiting in the pending cache for the owning
/// user record to become durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDigest {
    pub login: String,
    pub partial_digest: String,
    pub confirmed: bool,
}
