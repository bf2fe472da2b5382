//! Session token generation and digesting
//!
//! The client holds the raw token; the store only ever sees its SHA-256 digest.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

/// Random characters in a session token
pub const TOKEN_LEN: usize = 48;

pub struct SessionToken;

impl SessionToken {
    /// Generate a new session token
    pub fn generate() -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect()
    }

    /// Digest used as the session id in storage
    pub fn digest(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
