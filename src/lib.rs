//! # digestd (Digest Authentication credential state)
//!
//! `digestd` owns the server-side state behind HTTP Digest Authentication
//! (RFC 2617) for accounts reachable under multiple login aliases:
//!
//! - **Partial digests:** one `MD5(login:realm:password)` row per (user,
//!   login alias), kept in step with the pluggable login enumerator on every
//!   password change, account creation, and successful authentication.
//! - **Pending staging:** digests are computed while the raw password is in
//!   hand and flushed to storage only once the owning user record is durable,
//!   keyed by the new password's own stored hash.
//! - **Replay protection:** per-nonce count tracking with strict monotonicity;
//!   replays reject without leaking why.
//!
//! The RFC 2617 challenge/response wire grammar, password hashing, and account
//! lifecycle policy are collaborators. They drive this core through explicit
//! hook endpoints (password set, user created, user saved, authenticated) and
//! consume the lookup and nonce-validation contracts.

pub mod api;
pub mod cli;
pub mod digest;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
