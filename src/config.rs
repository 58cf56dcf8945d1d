use std::env;

use anyhow::Result;

use crate::moderation::lexicon::Weights;

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
pub struct Config {
    pub db_path: String,
    /// Base64-encoded 32-byte key for message body encryption.
    /// Required for send/fetch; `proctor keygen` mints one.
    pub encryption_key: String,
    /// Toxicity score at or above this blocks the content.
    pub block_threshold: f64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Only the encryption key has no default — moderation-only commands
    /// work without it.
    pub fn load() -> Result<Self> {
        let block_threshold = env::var("PROCTOR_BLOCK_THRESHOLD")
            .ok()
            .and_then(|raw| raw.parse::<f64>().ok())
            .unwrap_or(Weights::default().block_threshold);

        Ok(Self {
            db_path: env::var("PROCTOR_DB_PATH").unwrap_or_else(|_| "./proctor.db".to_string()),
            encryption_key: env::var("PROCTOR_ENCRYPTION_KEY").unwrap_or_default(),
            block_threshold,
        })
    }

    /// Check that the encryption key is configured.
    /// Call this before any operation that reads or writes message bodies.
    pub fn require_encryption_key(&self) -> Result<()> {
        if self.encryption_key.is_empty() {
            anyhow::bail!(
                "PROCTOR_ENCRYPTION_KEY not set. Generate one with `proctor keygen`\n\
                 and add it to your .env file."
            );
        }
        Ok(())
    }
}
