//! Process-wide staging area for freshly computed partial digests.
//!
//! Partial-digest computation needs the raw password, which exists only for
//! the duration of the password-set request; persisting the credentials must
//! wait until the owning user record is durable. Entries are keyed by the new
//! password's stored hash so two unrelated password changes can never collide,
//! and a re-stage of the same change event is harmlessly idempotent.
//!
//! Entries are transient by design: they never survive a restart, and an entry
//! whose save never happens leaks until then (accepted trade-off, bounded by
//! the rarity of abandoned password changes).

use crate::digest::models::StagedDigest;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct PendingDigestCache {
    entries: Mutex<HashMap<String, Vec<StagedDigest>>>,
}

impl PendingDigestCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the digest list for a password-change token, replacing any
    /// previous staging for the same token.
    pub async fn stage(&self, token: &str, digests: Vec<StagedDigest>) {
        self.entries.lock().await.insert(token.to_string(), digests);
    }

    /// Read the staged list for a token without consuming it.
    pub async fn get(&self, token: &str) -> Option<Vec<StagedDigest>> {
        self.entries.lock().await.get(token).cloned()
    }

    /// Remove a consumed entry. Called exactly once, after the flush commits.
    pub async fn remove(&self, token: &str) {
        self.entries.lock().await.remove(token);
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
