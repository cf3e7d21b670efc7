use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::database::Database;

/// Prefix on every issued key, so leaked keys are easy to grep for
pub const API_KEY_PREFIX: &str = "wu_";

const API_KEY_BYTES: usize = 24;

/// Stored form of an API key. Plaintext keys are never persisted.
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{API_KEY_PREFIX}{}", hex::encode(bytes))
}

/// Create or regenerate a user's key. The returned plaintext is the only copy.
pub async fn issue_api_key(database: &dyn Database, user_id: &str, now: DateTime<Utc>) -> Result<String> {
    let api_key = generate_api_key();
    database.store_api_key(user_id, &hash_api_key(&api_key), now).await?;
    tracing::info!(user_id, "API key issued");
    Ok(api_key)
}
