use crate::digest::{NonceGuard, NonceOutcome};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct NonceRequest {
    pub user_id: Uuid,
    pub nonce: String,
    #[serde(default)]
    pub count: Option<i64>,
}

/// Validate one digest-auth request against the nonce store. The response
/// never says why a nonce was rejected: distinguishing replay-rejection from
/// digest-mismatch would hand an oracle to an attacker. The reason is logged
/// at debug level only.
#[instrument(skip_all)]
pub async fn validate(
    pool: Extension<PgPool>,
    payload: Option<Json<NonceRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Missing payload"})),
        );
    };

    match NonceGuard::validate(&pool, request.user_id, &request.nonce, request.count).await {
        Ok(NonceOutcome::Accepted) => (StatusCode::OK, Json(json!({"accepted": true}))),
        Ok(NonceOutcome::Rejected(reason)) => {
            debug!(user_id = %request.user_id, ?reason, "nonce rejected");
            (StatusCode::OK, Json(json!({"accepted": false})))
        }
        Err(err) => {
            error!("Failed to validate nonce: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "storage unavailable"})),
            )
        }
    }
}
