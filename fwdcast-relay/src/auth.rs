//! Password hashing for session-scoped access gates.
//!
//! Trimmed down from the teacher's `AuthCrypto` (`ferrex-core`'s
//! `domain/users/auth/crypto.rs`): fwdcast sessions are ephemeral and never
//! persisted past the session's own lifetime, so there is no pepper to
//! rotate and no bearer token to HMAC before storing. Argon2id with a random
//! salt per password is enough.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;

/// Hash a session password, producing a PHC string suitable for storage on
/// the `Session`.
pub fn hash(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .expect("argon2 hashing with a freshly generated salt cannot fail")
        .to_string()
}

/// Verify a candidate password against a stored hash. A malformed stored
/// hash (which should never happen, since only `hash` produces them) is
/// treated as a verification failure rather than a panic.
pub fn verify(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
