//! The three credential-synchronization trigger points, exposed as explicit
//! hook endpoints for the account collaborator: password set, user created
//! (stage + immediate flush), user saved (the deferred-flush signal), and
//! successful authentication (reconcile).

use crate::digest::CredentialSynchronizer;
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// Password set or account created. `password_hash` is the hash the account
/// layer is about to (or did) persist; it keys the pending cache.
/// `raw_password` is absent for accounts that cannot use digest auth.
#[derive(Deserialize, Debug)]
pub struct PasswordEvent {
    pub user_id: Uuid,
    pub password_hash: String,
    #[serde(default)]
    pub raw_password: Option<SecretString>,
}

/// The "user record saved" signal: the password hash is durable, staged
/// digests may now be flushed.
#[derive(Deserialize, Debug)]
pub struct SaveEvent {
    pub user_id: Uuid,
    pub password_hash: String,
}

/// A successful authentication, the only post-creation moment the raw
/// password is available for recomputation.
#[derive(Deserialize, Debug)]
pub struct AuthenticatedEvent {
    pub user_id: Uuid,
    pub password_hash: String,
    pub raw_password: SecretString,
}

/// Password set: compute and stage only. The flush happens when the account
/// layer reports the record saved, so a save that never lands cannot leave a
/// token that mismatches the committed hash.
#[instrument(skip_all)]
pub async fn password_set(
    sync: Extension<Arc<CredentialSynchronizer>>,
    payload: Option<Json<PasswordEvent>>,
) -> impl IntoResponse {
    let Some(Json(event)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string());
    };

    debug!(user_id = %event.user_id, "password-set hook");

    match sync
        .compute_and_stage(
            event.user_id,
            &event.password_hash,
            event.raw_password.as_ref(),
        )
        .await
    {
        Ok(()) => (StatusCode::NO_CONTENT, String::new()),
        Err(err) => {
            error!("Failed to stage partial digests: {err:?}");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// Account creation with an initial password: creation and persistence are
/// atomic from the caller's perspective, so stage and flush in one step.
#[instrument(skip_all)]
pub async fn user_created(
    sync: Extension<Arc<CredentialSynchronizer>>,
    payload: Option<Json<PasswordEvent>>,
) -> impl IntoResponse {
    let Some(Json(event)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string());
    };

    debug!(user_id = %event.user_id, "user-created hook");

    let staged = sync
        .compute_and_stage(
            event.user_id,
            &event.password_hash,
            event.raw_password.as_ref(),
        )
        .await;

    let result = match staged {
        Ok(()) => sync.flush(event.user_id, &event.password_hash).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => (StatusCode::NO_CONTENT, String::new()),
        Err(err) => {
            error!("Failed to sync digests for created user: {err:?}");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// User record saved: flush whatever is staged for its password hash. A save
/// without a preceding password change finds nothing and is a no-op.
///
/// A flush failure must fail the enclosing password change; stale credentials
/// are worse than a surfaced error.
#[instrument(skip_all)]
pub async fn user_saved(
    sync: Extension<Arc<CredentialSynchronizer>>,
    payload: Option<Json<SaveEvent>>,
) -> impl IntoResponse {
    let Some(Json(event)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string());
    };

    debug!(user_id = %event.user_id, "user-saved hook");

    match sync.flush(event.user_id, &event.password_hash).await {
        Ok(()) => (StatusCode::NO_CONTENT, String::new()),
        Err(err) => {
            error!("Failed to flush partial digests: {err:?}");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// Successful authentication: reconcile the store against the enumerator,
/// recomputing everything if the alias sets drifted.
#[instrument(skip_all)]
pub async fn authenticated(
    sync: Extension<Arc<CredentialSynchronizer>>,
    payload: Option<Json<AuthenticatedEvent>>,
) -> impl IntoResponse {
    let Some(Json(event)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string());
    };

    debug!(user_id = %event.user_id, "authenticated hook");

    match sync
        .reconcile(event.user_id, &event.password_hash, &event.raw_password)
        .await
    {
        Ok(()) => (StatusCode::NO_CONTENT, String::new()),
        Err(err) => {
            error!("Failed to reconcile partial digests: {err:?}");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
