pub mod health;
pub use self::health::health;

pub mod hooks;
pub use self::hooks::{authenticated, password_set, user_created, user_saved};

pub mod lookup;
pub use self::lookup::lookup;

pub mod nonce;
pub use self::nonce::validate;

// common functions for the handlers
use regex::Regex;

/// A digest-auth login may not contain ':' (the H(A1) separator) or control
/// characters; the original table caps logins at 128 characters.
pub fn valid_login(login: &str) -> bool {
    Regex::new(r"^[^:[:cntrl:]]{1,128}$").map_or(false, |re| re.is_match(login))
}
