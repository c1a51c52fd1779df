use crate::digest::{AccountLoginEnumerator, CredentialSynchronizer};
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod handlers;

use handlers::{authenticated, health, lookup, password_set, user_created, user_saved, validate};

/// Build the router. The synchronizer carries the process-wide pending cache,
/// so exactly one instance must serve all requests.
pub fn router(pool: sqlx::PgPool, sync: Arc<CredentialSynchronizer>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/hooks/password-set", post(password_set))
        .route("/hooks/user-created", post(user_created))
        .route("/hooks/user-saved", post(user_saved))
        .route("/hooks/authenticated", post(authenticated))
        .route("/digest/partial-digests", get(lookup))
        .route("/nonce/validate", post(validate))
        .layer(Extension(pool))
        .layer(Extension(sync))
        .layer(TraceLayer::new_for_http())
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, realm: String) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let sync = Arc::new(CredentialSynchronizer::new(
        pool.clone(),
        realm,
        Arc::new(AccountLoginEnumerator),
    ));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;
    info!(port, "starting {}", env!("CARGO_PKG_NAME"));

    let app = router(pool, sync);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
