//! Nonce replay protection (RFC 2617 nonce-count tracking).

use crate::digest::models::UserNonce;
use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

const NONCE_LENGTH: usize = 40;

/// Outcome of a nonce validation. Callers surface rejections as a generic
/// authentication failure; the reason is for logging only, never the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceOutcome {
    Accepted,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The nonce exists but was recorded for a different user.
    Unknown,
    /// The client replayed an equal-or-lower nonce-count, or reused a nonce
    /// that carries no count at all.
    StaleCount,
    /// The client supplied no count where one was recorded before, or vice
    /// versa. Default-reject policy.
    CountMismatch,
}

/// Decide whether a reuse of a known nonce is acceptable, given the stored and
/// client-supplied counts.
fn compare_counts(stored: Option<i64>, client: Option<i64>) -> Result<i64, RejectReason> {
    match (stored, client) {
        (Some(stored), Some(client)) if client <= stored => Err(RejectReason::StaleCount),
        (Some(_), Some(client)) => Ok(client),
        // Reuse of a countless nonce is a replay by definition.
        (None, None) => Err(RejectReason::StaleCount),
        (Some(_), None) | (None, Some(_)) => Err(RejectReason::CountMismatch),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

pub struct NonceGuard;

impl NonceGuard {
    /// Validates one digest-auth request against the nonce store, before any
    /// credential comparison happens.
    ///
    /// First sight of a nonce records it and accepts unconditionally. A known
    /// nonce is accepted only with a strictly higher count, which is then
    /// persisted along with `last_used_at`; rejected validations leave the row
    /// untouched. The row is read `FOR UPDATE` so concurrent validations of
    /// the same nonce serialize at the database.
    ///
    /// # Errors
    /// Returns an error if the storage layer fails; replay rejections are a
    /// normal [`NonceOutcome`], not an error.
    pub async fn validate(
        pool: &PgPool,
        user_id: Uuid,
        nonce: &str,
        client_count: Option<i64>,
    ) -> Result<NonceOutcome> {
        let mut tx = pool.begin().await?;

        let existing =
            sqlx::query_as::<_, UserNonce>("SELECT * FROM user_nonces WHERE nonce = $1 FOR UPDATE")
                .bind(nonce)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to fetch nonce")?;

        let Some(existing) = existing else {
            // Two first-sight validations of the same nonce can both pass the
            // FOR UPDATE select before either row exists; the loser trips the
            // primary key. That is a replay, not a storage failure.
            let inserted = sqlx::query(
                r"
                INSERT INTO user_nonces (nonce, user_id, count, last_used_at)
                VALUES ($1, $2, $3, NOW())
                ",
            )
            .bind(nonce)
            .bind(user_id)
            .bind(client_count)
            .execute(&mut *tx)
            .await;

            return match inserted {
                Ok(_) => {
                    tx.commit().await?;
                    Ok(NonceOutcome::Accepted)
                }
                Err(err) if is_unique_violation(&err) => {
                    Ok(NonceOutcome::Rejected(RejectReason::StaleCount))
                }
                Err(err) => Err(err).context("Failed to record nonce"),
            };
        };

        if existing.user_id != user_id {
            return Ok(NonceOutcome::Rejected(RejectReason::Unknown));
        }

        match compare_counts(existing.count, client_count) {
            Ok(count) => {
                sqlx::query(
                    "UPDATE user_nonces SET count = $1, last_used_at = NOW() WHERE nonce = $2",
                )
                .bind(count)
                .bind(nonce)
                .execute(&mut *tx)
                .await
                .context("Failed to update nonce count")?;
                tx.commit().await?;
                Ok(NonceOutcome::Accepted)
            }
            Err(reason) => Ok(NonceOutcome::Rejected(reason)),
        }
    }
}

/// Random alphanumeric nonce material for the handshake layer. Rows are only
/// created once a nonce is first validated, so issuing costs no storage.
#[must_use]
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}
