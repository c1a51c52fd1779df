//! Credential state for HTTP Digest Authentication (RFC 2617).
//!
//! Three pieces live here:
//!
//! - the credential synchronization engine ([`sync::CredentialSynchronizer`])
//!   which keeps the `partial_digests` table in step with the login aliases a
//!   [`enumerator::LoginEnumerator`] reports for each user,
//! - the transient [`pending::PendingDigestCache`] bridging the moment a raw
//!   password is known and the moment the owning user record is durable,
//! - the [`nonce::NonceGuard`] replay-protection store.
//!
//! The RFC 2617 header grammar and the account store itself are collaborators;
//! they call in through the hook endpoints in [`crate::api`] or embed these
//! types directly.

pub mod enumerator;
pub mod hash;
pub mod models;
pub mod nonce;
pub mod pending;
pub mod store;
pub mod sync;

pub use enumerator::{AccountLoginEnumerator, LoginEnumerator, StaticLoginEnumerator};
pub use nonce::{NonceGuard, NonceOutcome, RejectReason};
pub use pending::PendingDigestCache;
pub use store::PartialDigestRepo;
pub use sync::CredentialSynchronizer;
