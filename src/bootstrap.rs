//! Bootstrap Issuance - One-Time Key Delivery
//!
//! Installed state is whatever the client's cookie says. Nothing here
//! verifies it: omitting the cookie re-issues a key, forging it blocks
//! re-bootstrap. Both are accepted limitations of the protocol.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, TryRngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token in the bootstrap template replaced by the key-object document.
pub const KEY_PLACEHOLDER: &[u8] = b"$$ENCRYPTION_KEY$$";

/// AES-256 key length.
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Secure randomness unavailable: {0}")]
    RandomnessUnavailable(String),
}

/// Source of fresh key material.
pub trait KeySource: Send + Sync {
    fn fill_key(&self, key: &mut [u8; KEY_LEN]) -> Result<(), KeyError>;
}

/// Operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsKeySource;

impl KeySource for OsKeySource {
    fn fill_key(&self, key: &mut [u8; KEY_LEN]) -> Result<(), KeyError> {
        OsRng
            .try_fill_bytes(key)
            .map_err(|e| KeyError::RandomnessUnavailable(e.to_string()))
    }
}

/// JSON Web Key document for a symmetric AES-GCM key.
///
/// Field order is part of the emitted bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyObject {
    pub alg: String,
    pub ext: bool,
    pub k: String,
    pub key_ops: Vec<String>,
    pub kty: String,
}

impl KeyObject {
    pub fn from_key(key: &[u8; KEY_LEN]) -> Self {
        Self {
            alg: "A256GCM".to_string(),
            ext: true,
            k: URL_SAFE_NO_PAD.encode(key),
            key_ops: vec!["encrypt".to_string(), "decrypt".to_string()],
            kty: "oct".to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        // No field ever needs JSON escaping.
        format!(
            r#"{{"alg":"{}","ext":{},"k":"{}","key_ops":[{}],"kty":"{}"}}"#,
            self.alg,
            self.ext,
            self.k,
            self.key_ops
                .iter()
                .map(|op| format!("\"{op}\""))
                .collect::<Vec<_>>()
                .join(","),
            self.kty,
        )
    }
}

/// Replace the first placeholder occurrence in `template` with `replacement`.
pub fn splice_first(template: &[u8], placeholder: &[u8], replacement: &[u8]) -> Vec<u8> {
    let position = if placeholder.is_empty() {
        None
    } else {
        template
            .windows(placeholder.len())
            .position(|window| window == placeholder)
    };
    match position {
        Some(at) => {
            let mut out =
                Vec::with_capacity(template.len() - placeholder.len() + replacement.len());
            out.extend_from_slice(&template[..at]);
            out.extend_from_slice(replacement);
            out.extend_from_slice(&template[at + placeholder.len()..]);
            out
        }
        None => template.to_vec(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Script body with a fresh key spliced in.
    Issued(Vec<u8>),
    /// The request carried the installed cookie.
    AlreadyInstalled,
    /// No key could be generated for this request.
    KeyUnavailable,
}

/// Per-request state machine for the bootstrap route.
pub struct BootstrapIssuer<'a> {
    template: &'a [u8],
    keys: &'a dyn KeySource,
}

impl<'a> BootstrapIssuer<'a> {
    pub fn new(template: &'a [u8], keys: &'a dyn KeySource) -> Self {
        Self { template, keys }
    }

    pub fn issue(&self, installed: bool) -> BootstrapOutcome {
        if installed {
            return BootstrapOutcome::AlreadyInstalled;
        }

        let mut key = [0u8; KEY_LEN];
        if let Err(e) = self.keys.fill_key(&mut key) {
            tracing::warn!(error = %e, "bootstrap key generation failed");
            return BootstrapOutcome::KeyUnavailable;
        }

        let document = KeyObject::from_key(&key).to_json();
        BootstrapOutcome::Issued(splice_first(
            self.template,
            KEY_PLACEHOLDER,
            document.as_bytes(),
        ))
    }
}
