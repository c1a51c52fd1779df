//! Integration tests for the credential synchronization engine and the nonce
//! replay guard, against a real Postgres.
//!
//! They need a disposable database reachable via `DIGESTD_TEST_DSN` and skip
//! cleanly when it is not set. The schema is (re)applied on each run; every
//! test works on its own freshly created user so the suite can run in
//! parallel against one database.

use anyhow::{Context, Result};
use digestd::digest::{
    hash::partial_digest, CredentialSynchronizer, NonceGuard, NonceOutcome, PartialDigestRepo,
    StaticLoginEnumerator,
};
use secrecy::SecretString;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));
const REALM: &str = "testrealm";

fn split_sql_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
        .collect()
}

async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(dsn) = std::env::var("DIGESTD_TEST_DSN") else {
        eprintln!("Skipping integration test: DIGESTD_TEST_DSN not set");
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&dsn)
        .await
        .context("failed to connect test pool")?;

    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    Ok(Some(pool))
}

async fn create_user(pool: &PgPool) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash) VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(format!("user-{id}"))
    .bind(format!("user-{id}@example.org"))
    .bind("stored-hash")
    .execute(pool)
    .await
    .context("failed to create test user")?;
    Ok(id)
}

fn secret(raw: &str) -> SecretString {
    SecretString::from(raw.to_string())
}

fn synchronizer(
    pool: &PgPool,
    confirmed: &[&str],
    unconfirmed: &[&str],
) -> (CredentialSynchronizer, Arc<StaticLoginEnumerator>) {
    let logins = Arc::new(StaticLoginEnumerator::new(
        confirmed.iter().map(ToString::to_string).collect::<Vec<_>>(),
        unconfirmed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
    ));
    let sync = CredentialSynchronizer::new(pool.clone(), REALM.to_string(), logins.clone());
    (sync, logins)
}

#[tokio::test]
async fn stage_and_flush_materializes_enumerator_sets() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let user_id = create_user(&pool).await?;
    let (sync, _logins) = synchronizer(&pool, &["alice", "alice@x.com"], &[]);

    sync.compute_and_stage(user_id, "hash-1", Some(&secret("secret")))
        .await?;
    // Nothing persisted until the save signal.
    assert!(PartialDigestRepo::list_by_user(&pool, user_id)
        .await?
        .is_empty());

    sync.flush(user_id, "hash-1").await?;

    let rows = PartialDigestRepo::list_by_user(&pool, user_id).await?;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.confirmed));
    let by_login: HashSet<(String, String)> = rows
        .iter()
        .map(|row| (row.login.clone(), row.partial_digest.clone()))
        .collect();
    for login in ["alice", "alice@x.com"] {
        assert!(by_login.contains(&(login.to_string(), partial_digest(login, REALM, "secret"))));
    }

    // The cache entry is consumed exactly once; a second flush is a no-op.
    assert!(sync.pending().get("hash-1").await.is_none());
    sync.flush(user_id, "hash-1").await?;
    assert_eq!(
        PartialDigestRepo::list_by_user(&pool, user_id).await?.len(),
        2
    );

    Ok(())
}

#[tokio::test]
async fn no_usable_password_stages_nothing() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let user_id = create_user(&pool).await?;
    let (sync, _logins) = synchronizer(&pool, &["alice"], &[]);

    sync.compute_and_stage(user_id, "hash-1", None).await?;
    assert!(sync.pending().is_empty().await);

    sync.flush(user_id, "hash-1").await?;
    assert!(PartialDigestRepo::list_by_user(&pool, user_id)
        .await?
        .is_empty());

    Ok(())
}

#[tokio::test]
async fn lookup_scans_across_users() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let login = format!("shared-{}", Uuid::new_v4());

    for password in ["secret-a", "secret-b"] {
        let user_id = create_user(&pool).await?;
        let (sync, _logins) = synchronizer(&pool, &[&login], &[]);
        sync.compute_and_stage(user_id, password, Some(&secret(password)))
            .await?;
        sync.flush(user_id, password).await?;
    }

    let rows = PartialDigestRepo::lookup_by_login(&pool, &login).await?;
    assert_eq!(rows.len(), 2);
    let digests: HashSet<String> = rows.iter().map(|r| r.partial_digest.clone()).collect();
    assert!(digests.contains(&partial_digest(&login, REALM, "secret-a")));
    assert!(digests.contains(&partial_digest(&login, REALM, "secret-b")));

    Ok(())
}

#[tokio::test]
async fn reconcile_recomputes_after_alias_drift() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let user_id = create_user(&pool).await?;
    let (sync, logins) = synchronizer(&pool, &["alice", "alice@x.com"], &[]);

    sync.compute_and_stage(user_id, "hash-1", Some(&secret("secret")))
        .await?;
    sync.flush(user_id, "hash-1").await?;

    // alice2 joins the confirmed set, alice@x.com disappears entirely.
    logins.replace(
        vec!["alice".to_string(), "alice2".to_string()],
        Vec::new(),
    );

    sync.reconcile(user_id, "hash-1", &secret("secret")).await?;

    let rows = PartialDigestRepo::list_by_user(&pool, user_id).await?;
    let by_login: HashSet<String> = rows.iter().map(|row| row.login.clone()).collect();
    let expected: HashSet<String> = ["alice", "alice2"].iter().map(ToString::to_string).collect();
    assert_eq!(by_login, expected);
    assert!(rows.iter().all(|row| row.confirmed));
    let alice2 = rows.iter().find(|row| row.login == "alice2").unwrap();
    assert_eq!(alice2.partial_digest, partial_digest("alice2", REALM, "secret"));

    // Idempotence: a second reconcile with no intervening change is a no-op.
    let before: Vec<(String, String, bool)> = rows
        .iter()
        .map(|r| (r.login.clone(), r.partial_digest.clone(), r.confirmed))
        .collect();
    sync.reconcile(user_id, "hash-1", &secret("secret")).await?;
    let after: Vec<(String, String, bool)> = PartialDigestRepo::list_by_user(&pool, user_id)
        .await?
        .iter()
        .map(|r| (r.login.clone(), r.partial_digest.clone(), r.confirmed))
        .collect();
    assert_eq!(before, after);

    Ok(())
}

#[tokio::test]
async fn reconcile_flips_confirmed_flag_in_place() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let user_id = create_user(&pool).await?;
    let (sync, logins) = synchronizer(&pool, &["alice"], &["alice@x.com"]);

    sync.compute_and_stage(user_id, "hash-1", Some(&secret("secret")))
        .await?;
    sync.flush(user_id, "hash-1").await?;

    let rows = PartialDigestRepo::list_by_user(&pool, user_id).await?;
    let unconfirmed = rows.iter().find(|r| r.login == "alice@x.com").unwrap();
    assert!(!unconfirmed.confirmed);
    let original_digest = unconfirmed.partial_digest.clone();

    // The email gets verified between two authentications.
    logins.replace(
        vec!["alice".to_string(), "alice@x.com".to_string()],
        Vec::new(),
    );

    sync.reconcile(user_id, "hash-1", &secret("secret")).await?;

    let rows = PartialDigestRepo::list_by_user(&pool, user_id).await?;
    let flipped = rows.iter().find(|r| r.login == "alice@x.com").unwrap();
    assert!(flipped.confirmed);
    // The digest is password-login-realm derived, untouched by confirmation.
    assert_eq!(flipped.partial_digest, original_digest);

    Ok(())
}

#[tokio::test]
async fn nonce_counts_are_strictly_increasing() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let user_id = create_user(&pool).await?;
    let nonce = format!("nonce-{}", Uuid::new_v4());

    // First sight: recorded and accepted.
    assert_eq!(
        NonceGuard::validate(&pool, user_id, &nonce, Some(1)).await?,
        NonceOutcome::Accepted
    );
    // Equal or lower counts are replays.
    assert!(matches!(
        NonceGuard::validate(&pool, user_id, &nonce, Some(1)).await?,
        NonceOutcome::Rejected(_)
    ));
    assert!(matches!(
        NonceGuard::validate(&pool, user_id, &nonce, Some(0)).await?,
        NonceOutcome::Rejected(_)
    ));
    // A strictly higher count advances.
    assert_eq!(
        NonceGuard::validate(&pool, user_id, &nonce, Some(2)).await?,
        NonceOutcome::Accepted
    );
    assert!(matches!(
        NonceGuard::validate(&pool, user_id, &nonce, Some(2)).await?,
        NonceOutcome::Rejected(_)
    ));

    Ok(())
}

#[tokio::test]
async fn racing_first_sight_validations_accept_exactly_once() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let user_id = create_user(&pool).await?;
    let nonce = format!("nonce-{}", Uuid::new_v4());

    // Whichever interleaving the scheduler picks, one request wins the insert
    // and the other is a replay — never a storage error.
    let (a, b) = tokio::join!(
        NonceGuard::validate(&pool, user_id, &nonce, Some(1)),
        NonceGuard::validate(&pool, user_id, &nonce, Some(1)),
    );
    let outcomes = [a?, b?];

    let accepted = outcomes
        .iter()
        .filter(|outcome| **outcome == NonceOutcome::Accepted)
        .count();
    assert_eq!(accepted, 1);
    assert!(outcomes
        .iter()
        .any(|outcome| matches!(outcome, NonceOutcome::Rejected(_))));

    Ok(())
}

#[tokio::test]
async fn countless_nonce_is_single_use() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let user_id = create_user(&pool).await?;
    let nonce = format!("nonce-{}", Uuid::new_v4());

    assert_eq!(
        NonceGuard::validate(&pool, user_id, &nonce, None).await?,
        NonceOutcome::Accepted
    );
    assert!(matches!(
        NonceGuard::validate(&pool, user_id, &nonce, None).await?,
        NonceOutcome::Rejected(_)
    ));
    // Suddenly presenting a count where none was recorded is a mismatch.
    assert!(matches!(
        NonceGuard::validate(&pool, user_id, &nonce, Some(1)).await?,
        NonceOutcome::Rejected(_)
    ));

    Ok(())
}

#[tokio::test]
async fn nonce_is_bound_to_its_user() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let owner = create_user(&pool).await?;
    let intruder = create_user(&pool).await?;
    let nonce = format!("nonce-{}", Uuid::new_v4());

    assert_eq!(
        NonceGuard::validate(&pool, owner, &nonce, Some(1)).await?,
        NonceOutcome::Accepted
    );
    assert!(matches!(
        NonceGuard::validate(&pool, intruder, &nonce, Some(2)).await?,
        NonceOutcome::Rejected(_)
    ));
    // The owner is unaffected by the failed attempt.
    assert_eq!(
        NonceGuard::validate(&pool, owner, &nonce, Some(2)).await?,
        NonceOutcome::Accepted
    );

    Ok(())
}
