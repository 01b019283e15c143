//! Secret envelope encryption
//!
//! AES-256-GCM encryption with HKDF per-tenant key derivation.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use frostguard_core::TenantId;

/// Length of AES-256 key in bytes.
const KEY_LENGTH: usize = 32;

/// Length of GCM nonce in bytes.
const NONCE_LENGTH: usize = 12;

/// Number of plaintext characters kept as the fingerprint.
const FINGERPRINT_LENGTH: usize = 4;

/// Context string for HKDF key derivation.
const HKDF_INFO: &[u8] = b"frostguard-credentials-v1";

/// Errors that can occur while sealing or opening secrets.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// The master key is malformed.
    #[error("invalid master key: {message}")]
    InvalidKey { message: String },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed { message: String },

    /// Decryption or authentication failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed { message: String },
}

/// Result type for secret operations.
pub type SecretsResult<T> = Result<T, SecretsError>;

/// A secret in its stored form: ciphertext plus a short fingerprint.
///
/// The fingerprint is the last four characters of the plaintext, enough for
/// an operator to match a key against the remote console without the stored
/// record ever revealing the key itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    /// base64(nonce || AES-256-GCM ciphertext).
    pub ciphertext: String,
    /// Last 4 characters of the plaintext.
    pub fingerprint: String,
}

/// Service for sealing and opening tenant credentials.
///
/// Uses AES-256-GCM with HKDF-derived per-tenant keys, so a leaked
/// ciphertext from one tenant is useless against another even under the
/// same deployment master key.
#[derive(Clone)]
pub struct SecretVault {
    /// Master key for deriving tenant-specific keys.
    master_key: [u8; KEY_LENGTH],
}

impl std::fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVault").finish_non_exhaustive()
    }
}

impl SecretVault {
    /// Create a new vault with the given 32-byte master key.
    #[must_use]
    pub fn new(master_key: [u8; KEY_LENGTH]) -> Self {
        Self { master_key }
    }

    /// Create a vault from a hex-encoded master key.
    pub fn from_hex(hex_key: &str) -> SecretsResult<Self> {
        let bytes = hex::decode(hex_key).map_err(|e| SecretsError::InvalidKey {
            message: format!("invalid hex key: {e}"),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Create a vault from a base64-encoded master key.
    pub fn from_base64(base64_key: &str) -> SecretsResult<Self> {
        let bytes = BASE64
            .decode(base64_key)
            .map_err(|e| SecretsError::InvalidKey {
                message: format!("invalid base64 key: {e}"),
            })?;
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> SecretsResult<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(SecretsError::InvalidKey {
                message: format!("key must be {} bytes, got {}", KEY_LENGTH, bytes.len()),
            });
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self::new(key))
    }

    /// Derive a tenant-specific key using HKDF-SHA256.
    fn derive_tenant_key(&self, tenant_id: TenantId) -> [u8; KEY_LENGTH] {
        let hkdf = Hkdf::<Sha256>::new(Some(tenant_id.as_uuid().as_bytes()), &self.master_key);
        let mut derived_key = [0u8; KEY_LENGTH];
        // 32 bytes is always a valid HKDF-SHA256 output length.
        hkdf.expand(HKDF_INFO, &mut derived_key)
            .expect("HKDF-SHA256 supports 32-byte output");
        derived_key
    }

    /// Seal a plaintext secret for a tenant.
    pub fn seal(&self, tenant_id: TenantId, plaintext: &str) -> SecretsResult<SealedSecret> {
        let key = self.derive_tenant_key(tenant_id);
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| SecretsError::EncryptionFailed {
                message: e.to_string(),
            })?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let encrypted = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SecretsError::EncryptionFailed {
                message: e.to_string(),
            })?;

        let mut combined = Vec::with_capacity(NONCE_LENGTH + encrypted.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&encrypted);

        Ok(SealedSecret {
            ciphertext: BASE64.encode(combined),
            fingerprint: Self::fingerprint(plaintext),
        })
    }

    /// Open a sealed secret. Only callers that need the plaintext for an
    /// outbound remote call should use this.
    pub fn open(&self, tenant_id: TenantId, sealed: &SealedSecret) -> SecretsResult<String> {
        let combined =
            BASE64
                .decode(&sealed.ciphertext)
                .map_err(|e| SecretsError::DecryptionFailed {
                    message: format!("invalid base64 ciphertext: {e}"),
                })?;

        if combined.len() <= NONCE_LENGTH {
            return Err(SecretsError::DecryptionFailed {
                message: "ciphertext too short".to_string(),
            });
        }
        let (nonce_bytes, encrypted) = combined.split_at(NONCE_LENGTH);

        let key = self.derive_tenant_key(tenant_id);
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| SecretsError::DecryptionFailed {
                message: e.to_string(),
            })?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .map_err(|_| SecretsError::DecryptionFailed {
                message: "authentication failed".to_string(),
            })?;

        String::from_utf8(plaintext).map_err(|_| SecretsError::DecryptionFailed {
            message: "plaintext is not valid UTF-8".to_string(),
        })
    }

    /// Fingerprint of a plaintext secret: its last 4 characters.
    ///
    /// Shorter secrets are fingerprinted whole; the callers creating keys
    /// never produce anything that short.
    #[must_use]
    pub fn fingerprint(plaintext: &str) -> String {
        let chars: Vec<char> = plaintext.chars().collect();
        let start = chars.len().saturating_sub(FINGERPRINT_LENGTH);
        chars[start..].iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> SecretVault {
        SecretVault::new([7u8; 32])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let vault = vault();
        let tenant = TenantId::new();
        let sealed = vault.seal(tenant, "NNSXS.SECRETKEYMATERIAL.ABCD").unwrap();

        assert_ne!(sealed.ciphertext, "NNSXS.SECRETKEYMATERIAL.ABCD");
        assert_eq!(sealed.fingerprint, "ABCD");

        let opened = vault.open(tenant, &sealed).unwrap();
        assert_eq!(opened, "NNSXS.SECRETKEYMATERIAL.ABCD");
    }

    #[test]
    fn test_tenant_isolation() {
        let vault = vault();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        let sealed = vault.seal(tenant_a, "secret-value").unwrap();
        let err = vault.open(tenant_b, &sealed).unwrap_err();
        assert!(matches!(err, SecretsError::DecryptionFailed { .. }));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let vault = vault();
        let tenant = TenantId::new();
        let mut sealed = vault.seal(tenant, "secret-value").unwrap();

        let mut bytes = BASE64.decode(&sealed.ciphertext).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        sealed.ciphertext = BASE64.encode(bytes);

        assert!(vault.open(tenant, &sealed).is_err());
    }

    #[test]
    fn test_nonce_makes_ciphertexts_unique() {
        let vault = vault();
        let tenant = TenantId::new();
        let a = vault.seal(tenant, "same-secret").unwrap();
        let b = vault.seal(tenant, "same-secret").unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_fingerprint_short_input() {
        assert_eq!(SecretVault::fingerprint("ab"), "ab");
        assert_eq!(SecretVault::fingerprint("abcdef"), "cdef");
    }

    #[test]
    fn test_master_key_constructors() {
        let hex_key = "00".repeat(32);
        assert!(SecretVault::from_hex(&hex_key).is_ok());
        assert!(SecretVault::from_hex("abcd").is_err());

        let b64_key = BASE64.encode([0u8; 32]);
        assert!(SecretVault::from_base64(&b64_key).is_ok());
        assert!(SecretVault::from_base64("!!!").is_err());
    }
}
