use crate::digest::CredentialSynchronizer;
use crate::GIT_COMMIT_HASH;
use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;

/// Liveness plus build info, and the realm this instance hashes credentials
/// against — a digest computed under the wrong realm never verifies, so the
/// realm belongs in the first place an operator looks.
pub async fn health(sync: Extension<Arc<CredentialSynchronizer>>) -> impl IntoResponse {
    let short_hash = GIT_COMMIT_HASH.get(..7).unwrap_or_default();

    let body = Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "build": GIT_COMMIT_HASH,
        "realm": sync.realm(),
    }));

    let mut headers = HeaderMap::new();
    if let Ok(value) = format!(
        "{}:{}:{short_hash}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    )
    .parse()
    {
        headers.insert("X-App", value);
    }

    (headers, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::StaticLoginEnumerator;
    use axum::body::to_bytes;
    use sqlx::postgres::PgPool;

    #[tokio::test]
    async fn reports_realm_and_build_info() {
        // connect_lazy opens no connection; the handler never touches the
        // database.
        let pool = PgPool::connect_lazy("postgres://localhost:5432/digestd").unwrap();
        let sync = Arc::new(CredentialSynchronizer::new(
            pool,
            "users@example.org".to_string(),
            Arc::new(StaticLoginEnumerator::default()),
        ));

        let response = health(Extension(sync)).await.into_response();
        assert!(response.headers().contains_key("X-App"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["realm"], "users@example.org");
    }
}
