//! Symmetric encryption of provider credentials at rest.
//!
//! Network API keys are stored encrypted and only decrypted at the moment an
//! adapter attaches them to an upstream request. The vault uses AES-256-GCM,
//! so tampered or truncated ciphertext fails authentication at decrypt time
//! instead of yielding garbage plaintext.

use crate::errors::{Error, Result};
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use rand::RngExt;

/// Length of the AES-GCM nonce prepended to every ciphertext.
const NONCE_LEN: usize = 12;

/// Encrypts and decrypts provider credentials with a process-wide secret.
///
/// The secret is injected at construction (from configuration), never read
/// from ambient state. The 256-bit cipher key is the secret's UTF-8 bytes,
/// truncated or zero-padded to 32 bytes.
///
/// Ciphertexts are `base64(nonce || sealed)` with a random 96-bit nonce, so
/// encrypting the same plaintext twice produces different ciphertexts.
/// Empty input passes through unchanged in both directions.
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Create a vault from the configured secret.
    pub fn new(secret: &str) -> Self {
        let mut key_bytes = [0u8; 32];
        let secret_bytes = secret.as_bytes();
        let len = secret_bytes.len().min(key_bytes.len());
        key_bytes[..len].copy_from_slice(&secret_bytes[..len]);

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt a credential for storage.
    ///
    /// Returns the ciphertext as a base64-encoded string (nonce + sealed
    /// data). An empty input is returned as-is.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| Error::Credential {
                message: "encryption failed".to_string(),
            })?;

        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&sealed);
        Ok(general_purpose::STANDARD.encode(out))
    }

    /// Decrypt a credential encrypted with [`encrypt`](Self::encrypt).
    ///
    /// Fails with [`Error::Credential`] on malformed base64, truncated data,
    /// or failed authentication. Callers must propagate the failure - a
    /// request is never dispatched with an unverified credential.
    pub fn decrypt(&self, encrypted: &str) -> Result<String> {
        if encrypted.is_empty() {
            return Ok(String::new());
        }

        let data = general_purpose::STANDARD
            .decode(encrypted)
            .map_err(|e| Error::Credential {
                message: format!("failed to decode encrypted credential: {e}"),
            })?;

        if data.len() < NONCE_LEN {
            return Err(Error::Credential {
                message: "encrypted credential too short".to_string(),
            });
        }

        let (nonce_bytes, sealed) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self.cipher.decrypt(nonce, sealed).map_err(|_| Error::Credential {
            message: "decryption failed".to_string(),
        })?;

        String::from_utf8(plaintext).map_err(|_| Error::Credential {
            message: "decrypted credential is not valid UTF-8".to_string(),
        })
    }
}

/// Install the process-wide rustls crypto provider for test binaries.
///
/// Production installs this in `main`; the test harness has no such entry
/// point, so each test that builds a `reqwest::Client` calls this first.
/// Idempotent and safe to call from many tests concurrently.
#[cfg(test)]
pub(crate) fn install_test_crypto_provider() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> CredentialVault {
        CredentialVault::new("test-secret-key-for-unit-tests")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let vault = test_vault();
        let plaintext = "sk-abc123-very-secret-provider-key";

        let encrypted = vault.encrypt(plaintext).expect("Encryption should succeed");

        // Should be valid base64
        assert!(general_purpose::STANDARD.decode(&encrypted).is_ok());

        let decrypted = vault.decrypt(&encrypted).expect("Decryption should succeed");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_string_passes_through() {
        let vault = test_vault();
        assert_eq!(vault.encrypt("").unwrap(), "");
        assert_eq!(vault.decrypt("").unwrap(), "");
    }

    #[test]
    fn test_encryption_produces_different_ciphertexts() {
        let vault = test_vault();
        let plaintext = "same plaintext";

        let encrypted1 = vault.encrypt(plaintext).unwrap();
        let encrypted2 = vault.encrypt(plaintext).unwrap();

        // Random nonce means identical plaintexts never share ciphertext
        assert_ne!(encrypted1, encrypted2);
        assert_eq!(vault.decrypt(&encrypted1).unwrap(), plaintext);
        assert_eq!(vault.decrypt(&encrypted2).unwrap(), plaintext);
    }

    #[test]
    fn test_decrypt_with_invalid_base64() {
        let vault = test_vault();
        let result = vault.decrypt("not valid base64!!!");
        assert!(matches!(result, Err(Error::Credential { .. })));
    }

    #[test]
    fn test_decrypt_with_too_short_data() {
        let vault = test_vault();
        let result = vault.decrypt(&general_purpose::STANDARD.encode([0u8; 5]));
        assert!(matches!(result, Err(Error::Credential { .. })));
    }

    #[test]
    fn test_decrypt_detects_tampering() {
        let vault = test_vault();
        let encrypted = vault.encrypt("secret").unwrap();

        let mut raw = general_purpose::STANDARD.decode(&encrypted).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let tampered = general_purpose::STANDARD.encode(raw);

        let result = vault.decrypt(&tampered);
        assert!(matches!(result, Err(Error::Credential { .. })));
    }

    #[test]
    fn test_different_keys_cannot_decrypt() {
        let vault1 = CredentialVault::new("first-secret");
        let vault2 = CredentialVault::new("second-secret");

        let encrypted = vault1.encrypt("secret").unwrap();
        assert!(matches!(vault2.decrypt(&encrypted), Err(Error::Credential { .. })));
    }

    #[test]
    fn test_long_secret_is_truncated_consistently() {
        let secret = "a".repeat(100);
        let vault1 = CredentialVault::new(&secret);
        let vault2 = CredentialVault::new(&secret);

        let encrypted = vault1.encrypt("payload").unwrap();
        assert_eq!(vault2.decrypt(&encrypted).unwrap(), "payload");
    }
}
