//! Detached signature verification for map data
//!
//! A signed map `<uri>` is accompanied by `<uri>.sig` (a raw 64-byte ed25519
//! signature) and, unless the map carries an inline trusted key, by
//! `<uri>.pub` holding the signer's key in printable base-32 form. A
//! discovered key is only used when its printable form is in the trusted
//! key set.

pub mod encoding;

use crate::error::{MapError, Result};
use crate::io::{with_suffix, MappedFile};
use ahash::AHashSet;
use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use std::fmt;
use std::path::Path;
use tracing::{error, info, warn};

/// Size of a detached signature file
pub const SIGNATURE_BYTES: usize = SIGNATURE_LENGTH;

/// Number of hex characters in an inline `key=` value
pub const HEX_KEY_LEN: usize = PUBLIC_KEY_LENGTH * 2;

/// Signer public key
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Build from raw key bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            MapError::InvalidPubkey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        VerifyingKey::from_bytes(&raw)
            .map(PublicKey)
            .map_err(|e| MapError::InvalidPubkey(e.to_string()))
    }

    /// Decode the 64 hex characters used by inline `key=` definitions
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        if hex_key.len() != HEX_KEY_LEN {
            return Err(MapError::InvalidPubkey(format!(
                "expected {} hex characters, got {}",
                HEX_KEY_LEN,
                hex_key.len()
            )));
        }
        let bytes = hex::decode(hex_key).map_err(|e| MapError::InvalidPubkey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Decode the printable base-32 form found in `.pub` files
    ///
    /// Surrounding whitespace (a trailing newline, typically) is ignored.
    pub fn from_base32(encoded: &[u8]) -> Result<Self> {
        let trimmed = encoded.trim_ascii();
        let bytes = encoding::decode(trimmed)
            .ok_or_else(|| MapError::InvalidPubkey("bad base32 encoding".to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Printable base-32 form, as listed in the trusted key set
    pub fn to_base32(&self) -> String {
        encoding::encode(self.0.as_bytes())
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.0.as_bytes()
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        PublicKey(key)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base32())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base32())
    }
}

/// Verify a detached signature
///
/// A malformed signature is reported as a failed verification.
pub fn verify(data: &[u8], signature: &[u8], key: &PublicKey) -> bool {
    match Signature::from_slice(signature) {
        Ok(sig) => key.0.verify(data, &sig).is_ok(),
        Err(_) => false,
    }
}

/// Trust decisions for signed maps
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    /// Canonical printable forms of the trusted keys
    trusted: AHashSet<String>,
}

impl SignatureVerifier {
    /// Create a verifier from the configured trusted key strings
    ///
    /// Keys are stored re-encoded, so any accepted spelling of a key
    /// matches the discovered one. Undecodable entries are skipped.
    pub fn new<I, S>(trusted_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut trusted = AHashSet::new();
        for entry in trusted_keys {
            let entry = entry.as_ref().trim();
            match PublicKey::from_base32(entry.as_bytes()) {
                Ok(key) => {
                    trusted.insert(key.to_base32());
                }
                Err(e) => warn!(key = %entry, "ignoring trusted key: {}", e),
            }
        }
        SignatureVerifier { trusted }
    }

    /// Whether a key is in the trusted key set
    pub fn is_trusted(&self, key: &PublicKey) -> bool {
        self.trusted.contains(&key.to_base32())
    }

    /// Decode a discovered key and accept it only if it is trusted
    pub fn accept_discovered(&self, encoded: &[u8], origin: &str) -> Result<PublicKey> {
        let key = PublicKey::from_base32(encoded).map_err(|e| {
            error!(origin = %origin, "cannot load pubkey: {}", e);
            e
        })?;

        if !self.is_trusted(&key) {
            error!(origin = %origin, key = %key, "pubkey is untrusted");
            return Err(MapError::UntrustedKey(key.to_base32()));
        }

        Ok(key)
    }

    /// Pick the key for a file-backed map
    ///
    /// An explicit key is used as is. Otherwise `<path>.pub` is loaded and
    /// checked against the trusted key set.
    pub fn resolve_trust(&self, explicit: Option<&PublicKey>, path: &Path) -> Result<PublicKey> {
        if let Some(key) = explicit {
            return Ok(key.clone());
        }

        let pub_path = with_suffix(path, ".pub");
        let data = MappedFile::open(&pub_path).map_err(|e| {
            error!(path = %pub_path.display(), "can't open pubkey: {}", e);
            e
        })?;

        self.accept_discovered(&data, &pub_path.display().to_string())
    }

    /// Check a signature, failing on wrong length or mismatch
    pub fn check(&self, data: &[u8], signature: &[u8], key: &PublicKey, origin: &str) -> Result<()> {
        if signature.len() != SIGNATURE_BYTES {
            error!(origin = %origin, len = signature.len(), "invalid signature");
            return Err(MapError::SignatureLength {
                got: signature.len(),
                expected: SIGNATURE_BYTES,
            });
        }

        if !verify(data, signature, key) {
            error!(origin = %origin, "can't verify signature: incorrect signature");
            return Err(MapError::BadSignature(origin.to_string()));
        }

        info!(origin = %origin, key = %key, "verified signature using trusted key");
        Ok(())
    }

    /// Verify file-map data against `<path>.sig`
    pub fn check_file(&self, path: &Path, explicit: Option<&PublicKey>, data: &[u8]) -> Result<()> {
        let key = self.resolve_trust(explicit, path)?;

        let sig_path = with_suffix(path, ".sig");
        let signature = MappedFile::open(&sig_path).map_err(|e| {
            error!(path = %sig_path.display(), "can't open signature: {}", e);
            e
        })?;

        self.check(data, &signature, &key, &sig_path.display().to_string())
    }
}

#[cfg(test)]
pub(crate) fn test_signing_key() -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::from_bytes(&[42u8; 32])
}
