use crate::api::handlers::valid_login;
use crate::digest::PartialDigestRepo;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, instrument};

#[derive(Deserialize, Debug)]
pub struct LookupParams {
    pub login: String,
}

/// Expected partial digests for an incoming login, for comparison against the
/// client-supplied response digest. Logins are not globally unique, so this
/// may return rows for several users; the realm is part of each hash, not a
/// query key.
#[instrument(skip_all)]
pub async fn lookup(
    pool: Extension<PgPool>,
    params: Option<Query<LookupParams>>,
) -> impl IntoResponse {
    let Some(Query(params)) = params else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Missing login parameter"})),
        );
    };

    if !valid_login(&params.login) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Invalid login"})),
        );
    }

    match PartialDigestRepo::lookup_by_login(&pool, &params.login).await {
        Ok(rows) => (StatusCode::OK, Json(json!(rows))),
        Err(err) => {
            error!("Failed to lookup partial digests: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "storage unavailable"})),
            )
        }
    }
}
