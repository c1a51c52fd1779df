//! Orchestrates recomputation and reconciliation of stored partial digests
//! against the login enumerator.
//!
//! Three trigger points, driven by the account collaborator through the hook
//! endpoints: password set (stage, flush deferred to the save signal), account
//! creation (stage + flush immediately), successful authentication
//! (reconcile). The raw password exists only at those moments, which is why
//! reconciliation falls back to a full recompute instead of patching digests
//! incrementally: one alias's digest cannot be derived from another's.

use crate::digest::enumerator::LoginEnumerator;
use crate::digest::hash::partial_digest;
use crate::digest::models::{PartialDigest, StagedDigest};
use crate::digest::pending::PendingDigestCache;
use crate::digest::store::PartialDigestRepo;
use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct CredentialSynchronizer {
    pool: PgPool,
    realm: String,
    logins: Arc<dyn LoginEnumerator>,
    pending: PendingDigestCache,
}

/// Per-alias fixes and the set-level verdict for one reconciliation pass.
struct Review {
    flips: Vec<(String, bool)>,
    deletes: Vec<String>,
    stale: bool,
}

/// Compare stored rows against the enumerator sets. Flag moves are fixable in
/// place and vanished aliases can be deleted, but any membership drift of the
/// sets themselves marks the credentials stale.
fn review_rows(
    rows: &[PartialDigest],
    confirmed: &HashSet<String>,
    unconfirmed: &HashSet<String>,
) -> Review {
    let mut flips = Vec::new();
    let mut deletes = Vec::new();
    let mut db_confirmed = HashSet::new();
    let mut db_unconfirmed = HashSet::new();

    for row in rows {
        if confirmed.contains(&row.login) {
            if !row.confirmed {
                flips.push((row.login.clone(), true));
            }
            db_confirmed.insert(row.login.clone());
        } else if unconfirmed.contains(&row.login) {
            if row.confirmed {
                flips.push((row.login.clone(), false));
            }
            db_unconfirmed.insert(row.login.clone());
        } else {
            deletes.push(row.login.clone());
        }
    }

    // A login present in both enumerator sets counts as confirmed.
    let expected_unconfirmed: HashSet<String> =
        unconfirmed.difference(confirmed).cloned().collect();
    let stale = db_confirmed != *confirmed || db_unconfirmed != expected_unconfirmed;

    Review {
        flips,
        deletes,
        stale,
    }
}

/// Compute the staged digest list for a password. The confirmed set wins when
/// a login appears in both sets, keeping one row per (user, login).
fn build_staged(
    confirmed: &HashSet<String>,
    unconfirmed: &HashSet<String>,
    realm: &str,
    raw_password: &str,
) -> Vec<StagedDigest> {
    let mut staged = Vec::with_capacity(confirmed.len() + unconfirmed.len());
    for login in confirmed {
        staged.push(StagedDigest {
            partial_digest: partial_digest(login, realm, raw_password),
            login: login.clone(),
            confirmed: true,
        });
    }
    for login in unconfirmed {
        if !confirmed.contains(login) {
            staged.push(StagedDigest {
                partial_digest: partial_digest(login, realm, raw_password),
                login: login.clone(),
                confirmed: false,
            });
        }
    }
    staged
}

impl CredentialSynchronizer {
    #[must_use]
    pub fn new(pool: PgPool, realm: String, logins: Arc<dyn LoginEnumerator>) -> Self {
        Self {
            pool,
            realm,
            logins,
            pending: PendingDigestCache::new(),
        }
    }

    /// The process-wide staging cache this synchronizer flushes from.
    #[must_use]
    pub fn pending(&self) -> &PendingDigestCache {
        &self.pending
    }

    /// The realm baked into every partial digest this instance computes.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Computes partial digests for every alias in both enumerator sets and
    /// stages them under the new password's stored hash. No effect on the
    /// persistent store yet.
    ///
    /// Accounts with no usable password (`raw_password` is `None`) are a
    /// silent no-op: they simply never get digest credentials.
    ///
    /// # Errors
    /// Returns an error if the enumerator fails.
    pub async fn compute_and_stage(
        &self,
        user_id: Uuid,
        password_hash: &str,
        raw_password: Option<&SecretString>,
    ) -> Result<()> {
        let Some(raw_password) = raw_password else {
            debug!(%user_id, "no usable password, skipping digest staging");
            return Ok(());
        };

        let confirmed = self.logins.confirmed_logins(&self.pool, user_id).await?;
        let unconfirmed = self.logins.unconfirmed_logins(&self.pool, user_id).await?;
        let staged = build_staged(
            &confirmed,
            &unconfirmed,
            &self.realm,
            raw_password.expose_secret(),
        );

        debug!(%user_id, aliases = staged.len(), "staged partial digests");
        self.pending.stage(password_hash, staged).await;
        Ok(())
    }

    /// Replaces the user's stored credentials with the staged list for the
    /// given password hash, consuming the cache entry exactly once. Called at
    /// or after the point the user record's password hash is durably
    /// committed.
    ///
    /// No entry for the token is a no-op: the entry may already have been
    /// flushed, or was never staged (save without a password change).
    ///
    /// # Errors
    /// Returns an error if the replace fails; the cache entry stays staged so
    /// the failure is retryable and visible to the password-change caller.
    pub async fn flush(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let Some(staged) = self.pending.get(password_hash).await else {
            debug!(%user_id, "no pending digests for password hash, nothing to flush");
            return Ok(());
        };

        PartialDigestRepo::replace_all(&self.pool, user_id, &staged).await?;
        self.pending.remove(password_hash).await;
        info!(%user_id, aliases = staged.len(), "flushed partial digests");
        Ok(())
    }

    /// Reconciles stored credentials with the enumerator after a successful
    /// authentication, the only point after creation where the raw password is
    /// available again.
    ///
    /// Flag moves are flipped in place and vanished aliases deleted; any
    /// membership drift between the sets triggers a full recompute with the
    /// just-used password. Afterwards the store exactly matches the
    /// enumerator's output.
    ///
    /// # Errors
    /// Returns an error if the enumerator or the storage layer fails.
    pub async fn reconcile(
        &self,
        user_id: Uuid,
        password_hash: &str,
        raw_password: &SecretString,
    ) -> Result<()> {
        let confirmed = self.logins.confirmed_logins(&self.pool, user_id).await?;
        let unconfirmed = self.logins.unconfirmed_logins(&self.pool, user_id).await?;
        let rows = PartialDigestRepo::list_by_user(&self.pool, user_id).await?;

        let review = review_rows(&rows, &confirmed, &unconfirmed);

        for (login, flag) in &review.flips {
            PartialDigestRepo::set_confirmed(&self.pool, user_id, login, *flag).await?;
        }
        for login in &review.deletes {
            PartialDigestRepo::delete_login(&self.pool, user_id, login).await?;
        }

        if review.stale {
            info!(%user_id, "digest credentials drifted from login aliases, recomputing");
            self.compute_and_stage(user_id, password_hash, Some(raw_password))
                .await?;
            self.flush(user_id, password_hash).await?;
        }

        Ok(())
    }
}
