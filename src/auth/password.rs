//! Password hashing
//!
//! bcrypt with a per-hash random salt. The cost factor trades login
//! latency against brute-force resistance; 10 is the shipped default.

use crate::error::AppError;

/// Default bcrypt cost for new hashes
pub const DEFAULT_COST: u32 = 10;

/// Lowest cost bcrypt accepts
pub const MIN_COST: u32 = 4;

/// Highest cost bcrypt accepts
pub const MAX_COST: u32 = 31;

/// Hash a plaintext password
pub fn hash(plaintext: &str, cost: u32) -> Result<String, AppError> {
    Ok(bcrypt::hash(plaintext, cost)?)
}

/// Verify a plaintext password against a stored bcrypt hash
///
/// # Errors
/// Returns error if the stored hash is not a valid bcrypt string
pub fn verify(plaintext: &str, stored_hash: &str) -> Result<bool, AppError> {
    Ok(bcrypt::verify(plaintext, stored_hash)?)
}

/// [`hash`] on the blocking thread pool
pub async fn hash_async(plaintext: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash(&plaintext, cost))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
}

/// [`verify`] on the blocking thread pool
pub async fn verify_async(plaintext: String, stored_hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify(&plaintext, &stored_hash))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
}
