//! Sealing of platform credentials at rest.
//!
//! Sealed values are `base64(nonce || ciphertext)` using ChaCha20-Poly1305
//! with a key derived from the shared auth secret.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use sha2::{Digest, Sha256};
use shortsops_models::TokenBundle;
use tracing::warn;

use crate::error::{ProviderError, ProviderResult};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Secret used when `AUTH_SECRET` is unset. Development only.
const DEV_SECRET: &str = "default-key-for-dev-only-min-32-chars";

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: ChaCha20Poly1305,
}

impl CredentialCipher {
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&digest)),
        }
    }

    pub fn from_env() -> Self {
        match std::env::var("AUTH_SECRET") {
            Ok(secret) if !secret.is_empty() => Self::from_secret(&secret),
            _ => {
                warn!("AUTH_SECRET not set, using development credential key");
                Self::from_secret(DEV_SECRET)
            }
        }
    }

    pub fn seal(&self, tokens: &TokenBundle) -> ProviderResult<String> {
        let plaintext = serde_json::to_vec(tokens)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| ProviderError::credentials("encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> ProviderResult<TokenBundle> {
        let raw = STANDARD
            .decode(sealed.trim())
            .map_err(|e| ProviderError::credentials(format!("invalid encoding: {}", e)))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(ProviderError::credentials("sealed value too short"));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ProviderError::credentials("authentication failed"))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| ProviderError::credentials(format!("invalid token bundle: {}", e)))
    }
}
