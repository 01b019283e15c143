//! FrostGuard credential storage.
//!
//! Secrets issued by the network operator (API keys, webhook secrets) are
//! never persisted in plaintext. This crate seals them with AES-256-GCM
//! under an HKDF-derived per-tenant key and stores only the ciphertext plus
//! a last-4-characters fingerprint. Status surfaces built on top of the
//! stored form can show the fingerprint and a presence flag; only the
//! components making outbound calls ever open the envelope.

pub mod vault;

pub use vault::{SealedSecret, SecretVault, SecretsError, SecretsResult};
