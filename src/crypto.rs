//! At-rest protection for wallet private keys.
//!
//! Envelopes are `base64(nonce):base64(ciphertext):base64(tag)` under AES-256-GCM,
//! keyed by SHA-256 of `PRIVATE_KEY_ENCRYPTION_KEY`. Values without exactly three
//! segments are legacy plaintext and pass through `decrypt` untouched.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Result, TraderbotError};

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;
const ENVELOPE_SEPARATOR: &str = ":";
const ENVELOPE_SEGMENTS: usize = 3;

#[derive(Clone)]
pub struct SecretCodec {
    secret: Option<String>,
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCodec")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

impl SecretCodec {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn ensure_configured(&self) -> Result<()> {
        match self.secret {
            Some(_) => Ok(()),
            None => Err(TraderbotError::MissingKeyMaterial),
        }
    }

    // Same secret always derives the same key.
    fn cipher(&self) -> Result<Aes256Gcm> {
        let secret = self
            .secret
            .as_deref()
            .ok_or(TraderbotError::MissingKeyMaterial)?;
        let key = Sha256::digest(secret.as_bytes());
        Aes256Gcm::new_from_slice(&key)
            .map_err(|e| TraderbotError::ConfigError(format!("Invalid derived key: {}", e)))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Err(TraderbotError::InvalidInput(
                "Cannot encrypt empty value".to_string(),
            ));
        }
        let cipher = self.cipher()?;

        let mut nonce = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce);

        // aes-gcm appends the tag to the ciphertext
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| TraderbotError::EncryptionFailed(e.to_string()))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LENGTH);

        Ok([
            STANDARD.encode(nonce),
            STANDARD.encode(ciphertext),
            STANDARD.encode(tag),
        ]
        .join(ENVELOPE_SEPARATOR))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String> {
        if envelope.is_empty() {
            return Err(TraderbotError::InvalidInput(
                "Cannot decrypt empty value".to_string(),
            ));
        }

        let segments: Vec<&str> = envelope.split(ENVELOPE_SEPARATOR).collect();
        if segments.len() != ENVELOPE_SEGMENTS {
            return Ok(envelope.to_string());
        }

        let cipher = self.cipher()?;
        let nonce = decode_segment(segments[0])?;
        let mut sealed = decode_segment(segments[1])?;
        let tag = decode_segment(segments[2])?;
        if nonce.len() != NONCE_LENGTH || tag.len() != TAG_LENGTH {
            return Err(TraderbotError::AuthenticationFailed);
        }
        sealed.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_ref())
            .map_err(|_| TraderbotError::AuthenticationFailed)?;
        String::from_utf8(plaintext).map_err(|_| TraderbotError::AuthenticationFailed)
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(segment)
        .map_err(|_| TraderbotError::AuthenticationFailed)
}

/// One-way SHA-256 hex digest, stored next to the ciphertext for auditing.
pub fn fingerprint(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
