// Message body codec — AES-256-GCM under a tagged envelope.
//
// Stored format: "enc:v1:" + base64(nonce || ciphertext). The tag lets
// decrypt branch deterministically on "is this ciphertext" instead of
// guessing from base64 decode success, which matters because legacy rows
// written before encryption shipped can themselves be valid base64. Rows
// without the tag pass through unchanged; a tagged row whose payload does
// not authenticate decrypts to None so read paths can fall back to the
// stored value instead of failing.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Marks a content column value as ciphertext.
pub const ENVELOPE_PREFIX: &str = "enc:v1:";

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct EncryptionCodec {
    key: [u8; 32],
}

impl EncryptionCodec {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build a codec from a base64-encoded 32-byte key (the form the
    /// PROCTOR_ENCRYPTION_KEY variable carries).
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .context("encryption key is not valid base64")?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow!("encryption key must decode to exactly 32 bytes"))?;
        Ok(Self::new(key))
    }

    /// Generate a fresh random key, base64-encoded for the .env file.
    pub fn generate_key_base64() -> String {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Whether a stored value carries the ciphertext tag.
    pub fn is_envelope(stored: &str) -> bool {
        stored.starts_with(ENVELOPE_PREFIX)
    }

    /// Encrypt `plaintext` into a tagged envelope with a random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("encryption failed: {e}"))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        Ok(format!("{ENVELOPE_PREFIX}{}", BASE64.encode(payload)))
    }

    /// Invert `encrypt`. Untagged values are legacy plaintext and come back
    /// unchanged; a tagged value that fails to decode, authenticate, or
    /// parse as UTF-8 yields None.
    pub fn decrypt(&self, stored: &str) -> Option<String> {
        let Some(encoded) = stored.strip_prefix(ENVELOPE_PREFIX) else {
            return Some(stored.to_string());
        };

        let payload = BASE64.decode(encoded).ok()?;
        if payload.len() < NONCE_LEN {
            return None;
        }
        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .ok()?;

        String::from_utf8(plaintext).ok()
    }
}
