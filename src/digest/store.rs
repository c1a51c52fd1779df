//! Persistence for the `partial_digests` table.

use crate::digest::models::{PartialDigest, StagedDigest};
use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PartialDigestRepo;

impl PartialDigestRepo {
    /// Atomically replaces every credential row for a user with the staged
    /// list. Full replace, not a merge: an alias missing from `staged` is gone
    /// afterwards even if it existed before.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; no partial state is left
    /// behind.
    pub async fn replace_all(pool: &PgPool, user_id: Uuid, staged: &[StagedDigest]) -> Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM partial_digests WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear partial digests")?;

        for digest in staged {
            sqlx::query(
                r"
                INSERT INTO partial_digests (user_id, login, partial_digest, confirmed)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(user_id)
            .bind(&digest.login)
            .bind(&digest.partial_digest)
            .bind(digest.confirmed)
            .execute(&mut *tx)
            .await
            .context("Failed to insert partial digest")?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Lists all credential rows for a user.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<PartialDigest>> {
        sqlx::query_as::<_, PartialDigest>(
            "SELECT * FROM partial_digests WHERE user_id = $1 ORDER BY login",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list partial digests")
    }

    /// Flips the confirmed flag in place; the digest value is untouched since
    /// it does not depend on confirmation state. Update-only: a login without
    /// an existing row is silently unaffected — rows are only ever created by
    /// [`Self::replace_all`], which has the raw password in hand.
    ///
    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn set_confirmed(
        pool: &PgPool,
        user_id: Uuid,
        login: &str,
        confirmed: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE partial_digests SET confirmed = $1 WHERE user_id = $2 AND login = $3",
        )
        .bind(confirmed)
        .bind(user_id)
        .bind(login)
        .execute(pool)
        .await
        .context("Failed to update confirmed flag")?;
        Ok(())
    }

    /// Deletes the row for a login that no longer appears in either enumerator
    /// set.
    ///
    /// # Errors
    /// Returns an error if the database execution fails.
    pub async fn delete_login(pool: &PgPool, user_id: Uuid, login: &str) -> Result<()> {
        sqlx::query("DELETE FROM partial_digests WHERE user_id = $1 AND login = $2")
            .bind(user_id)
            .bind(login)
            .execute(pool)
            .await
            .context("Failed to delete partial digest")?;
        Ok(())
    }

    /// Looks up the expected partial digests for an incoming login. Logins are
    /// not globally unique, so this scans across users; the realm is baked
    /// into the hash rather than stored as a filter column.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn lookup_by_login(pool: &PgPool, login: &str) -> Result<Vec<PartialDigest>> {
        sqlx::query_as::<_, PartialDigest>("SELECT * FROM partial_digests WHERE login = $1")
            .bind(login)
            .fetch_all(pool)
            .await
            .context("Failed to lookup partial digests")
    }
}
