//! Password hashing and registration rules.
//!
//! Hashes are Argon2id PHC strings with a random salt, so parameters travel
//! with the hash.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::sync::OnceLock;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_USERNAME_LENGTH: usize = 150;

/// Hash a plaintext password with Argon2id.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Check a password against a stored hash. A malformed hash is an error, a
/// mismatch is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Burn the same work as a real verification. Used when the username is
/// unknown so both credential failures take comparable time.
pub fn verify_dummy(password: &str) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

    let hash = DUMMY_HASH.get_or_init(|| hash_password("dummy-password-for-timing").ok());
    if let Some(hash) = hash {
        let _ = verify_password(password, hash);
    }
}

/// Usernames are 1-150 characters of letters, digits and `@.+-_`.
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username cannot be empty".to_string());
    }

    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(format!(
            "Username cannot be longer than {} characters",
            MAX_USERNAME_LENGTH
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(
            "Username can only contain letters, numbers and @/./+/-/_ characters".to_string(),
        );
    }

    Ok(())
}

/// Reject passwords that are short, entirely numeric, or equal to the username.
pub fn validate_password(password: &str, username: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }

    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err("Password cannot be entirely numeric".to_string());
    }

    if password.eq_ignore_ascii_case(username) {
        return Err("Password is too similar to the username".to_string());
    }

    Ok(())
}
