//! Pluggable source of truth for which login aliases a user currently has.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::sync::RwLock;
use uuid::Uuid;

/// Ground truth for "which aliases should have valid digest credentials right
/// now". Both methods may return empty sets and must not fail for a valid
/// user.
#[async_trait]
pub trait LoginEnumerator: Send + Sync {
    async fn confirmed_logins(&self, pool: &PgPool, user_id: Uuid) -> Result<HashSet<String>>;
    async fn unconfirmed_logins(&self, pool: &PgPool, user_id: Uuid) -> Result<HashSet<String>>;
}

/// Default enumerator backed by the `users` table: the username is always a
/// confirmed login; the email is confirmed once verified, unconfirmed before.
pub struct AccountLoginEnumerator;

async fn account_row(pool: &PgPool, user_id: Uuid) -> Result<Option<(String, String, bool)>> {
    let row = sqlx::query(
        "SELECT username, email, email_verified_at IS NOT NULL AS email_verified \
         FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch user logins")?;

    row.map(|row| -> Result<_, sqlx::Error> {
        Ok((
            row.try_get("username")?,
            row.try_get("email")?,
            row.try_get("email_verified")?,
        ))
    })
    .transpose()
    .context("Failed to decode user logins")
}

#[async_trait]
impl LoginEnumerator for AccountLoginEnumerator {
    async fn confirmed_logins(&self, pool: &PgPool, user_id: Uuid) -> Result<HashSet<String>> {
        let mut logins = HashSet::new();
        if let Some((username, email, email_verified)) = account_row(pool, user_id).await? {
            logins.insert(username);
            if email_verified {
                logins.insert(email);
            }
        }
        Ok(logins)
    }

    async fn unconfirmed_logins(&self, pool: &PgPool, user_id: Uuid) -> Result<HashSet<String>> {
        let mut logins = HashSet::new();
        if let Some((_, email, email_verified)) = account_row(pool, user_id).await? {
            if !email_verified {
                logins.insert(email);
            }
        }
        Ok(logins)
    }
}

/// Enumerator with fixed, swappable sets. Useful when the alias source lives
/// outside the database, and for tests that need to move aliases between sets.
#[derive(Debug, Default)]
pub struct StaticLoginEnumerator {
    confirmed: RwLock<HashSet<String>>,
    unconfirmed: RwLock<HashSet<String>>,
}

impl StaticLoginEnumerator {
    #[must_use]
    pub fn new<I, J>(confirmed: I, unconfirmed: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self {
            confirmed: RwLock::new(confirmed.into_iter().collect()),
            unconfirmed: RwLock::new(unconfirmed.into_iter().collect()),
        }
    }

    /// Replace both sets atomically with respect to each other's lock order.
    pub fn replace<I, J>(&self, confirmed: I, unconfirmed: J)
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        let mut c = self.confirmed.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut u = self
            .unconfirmed
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *c = confirmed.into_iter().collect();
        *u = unconfirmed.into_iter().collect();
    }
}

#[async_trait]
impl LoginEnumerator for StaticLoginEnumerator {
    async fn confirmed_logins(&self, _pool: &PgPool, _user_id: Uuid) -> Result<HashSet<String>> {
        Ok(self
            .confirmed
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    async fn unconfirmed_logins(&self, _pool: &PgPool, _user_id: Uuid) -> Result<HashSet<String>> {
        Ok(self
            .unconfirmed
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }
}
