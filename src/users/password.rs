//! Password policy and argon2 hashing.
//!
//! Hashing is intentionally slow; the async wrappers run it on the
//! blocking pool so a login burst never stalls the request workers.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

const MIN_LENGTH: usize = 8;
const SPECIAL: &str = "!@#$%^&*()-_=+[]{};:'\",.<>/?\\|`~";

/// Pure password-policy check consumed by registration and reset:
/// length ≥ 8, at least one upper, lower, digit, and special character.
///
/// # Errors
/// Returns one message per violated rule.
pub fn validate_password(password: &str) -> Result<(), Vec<String>> {
    let mut violations = Vec::new();
    if password.chars().count() < MIN_LENGTH {
        violations.push(format!("must be at least {MIN_LENGTH} characters long"));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        violations.push("must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        violations.push("must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push("must contain a digit".to_string());
    }
    if !password.chars().any(|c| SPECIAL.contains(c)) {
        violations.push("must contain a special character".to_string());
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Hash with argon2id and a fresh random salt.
///
/// # Errors
/// Returns an error when hashing fails (should not happen with default params).
pub fn hash(value: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(value.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash secret: {err}"))
}

/// Constant-time-ish verification against a stored PHC hash string.
///
/// # Errors
/// Returns an error when the stored hash is not parseable.
pub fn verify(value: &str, stored_hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|err| anyhow!("invalid stored hash: {err}"))?;
    Ok(Argon2::default()
        .verify_password(value.as_bytes(), &parsed)
        .is_ok())
}

/// `hash` on the blocking pool; never blocks the async worker.
///
/// # Errors
/// Propagates hashing errors and blocking-task join failures.
pub async fn hash_blocking(value: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash(&value))
        .await
        .context("password hashing task failed")?
}

/// `verify` on the blocking pool.
///
/// # Errors
/// Propagates verification errors and blocking-task join failures.
pub async fn verify_blocking(value: String, stored_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify(&value, &stored_hash))
        .await
        .context("password verification task failed")?
}
