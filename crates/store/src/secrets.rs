//! Credential encryption seam.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Encrypts credential fields before they are persisted.
///
/// Implementations backed by an OS secret service report
/// `is_available() == true`; the shipped [`ReversibleEncoder`] fallback
/// reports `false` so callers can surface the weaker guarantee.
pub trait EncryptionAdapter: Send + Sync {
    /// Whether a real secret service backs this adapter.
    fn is_available(&self) -> bool;

    fn encrypt(&self, plain: &str) -> String;

    /// Reverses [`encrypt`](Self::encrypt). Returns `None` for values
    /// this adapter cannot decode.
    fn decrypt(&self, stored: &str) -> Option<String>;
}

const PREFIX: &str = "b64:";

/// Reversible-encoding fallback used when no secret service is present.
///
/// Values are prefixed so the adapter can tell its own output from
/// legacy plaintext, which it passes through unchanged on decrypt.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReversibleEncoder;

impl EncryptionAdapter for ReversibleEncoder {
    fn is_available(&self) -> bool {
        false
    }

    fn encrypt(&self, plain: &str) -> String {
        format!("{PREFIX}{}", BASE64.encode(plain.as_bytes()))
    }

    fn decrypt(&self, stored: &str) -> Option<String> {
        match stored.strip_prefix(PREFIX) {
            Some(encoded) => {
                let bytes = BASE64.decode(encoded).ok()?;
                String::from_utf8(bytes).ok()
            }
            // Legacy plaintext from before the adapter existed.
            None => Some(stored.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let enc = ReversibleEncoder;
        let stored = enc.encrypt("hunter2");
        assert_ne!(stored, "hunter2");
        assert!(stored.starts_with("b64:"));
        assert_eq!(enc.decrypt(&stored).unwrap(), "hunter2");
    }

    #[test]
    fn legacy_plaintext_passes_through() {
        let enc = ReversibleEncoder;
        assert_eq!(enc.decrypt("oldpassword").unwrap(), "oldpassword");
    }

    #[test]
    fn invalid_encoding_is_none() {
        let enc = ReversibleEncoder;
        assert!(enc.decrypt("b64:!!!not-base64!!!").is_none());
    }

    #[test]
    fn fallback_is_not_a_secret_service() {
        assert!(!ReversibleEncoder.is_available());
    }

    #[test]
    fn unicode_roundtrip() {
        let enc = ReversibleEncoder;
        let stored = enc.encrypt("pässwörd™");
        assert_eq!(enc.decrypt(&stored).unwrap(), "pässwörd™");
    }
}
