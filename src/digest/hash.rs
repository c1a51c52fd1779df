//! RFC 2617 partial digest (HA1) computation.

use md5::{Digest, Md5};

/// Compute the partial digest `MD5(login:realm:password)`, hex encoded.
///
/// This is the only value ever persisted for a credential; the raw password
/// stays confined to the caller.
#[must_use]
pub fn partial_digest(login: &str, realm: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(login.as_bytes());
    hasher.update(b":");
    hasher.update(realm.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
