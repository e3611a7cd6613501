//! [`KeyBytes`]: in-memory holder for the service key.

use aes_gcm_siv::aead::{rand_core::RngCore, OsRng};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::KEY_LEN;

/// Number of SHA-256 bytes shown in [`KeyBytes::key_id`].
const KEY_ID_LEN: usize = 6;

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// Zeroed on drop and never cloned.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyBytes([u8; KEY_LEN]);

impl KeyBytes {
    /// Draw a new key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut key = Self([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key.0);
        key
    }

    /// Copy `bytes` into a key buffer, or `None` if the length is wrong.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != KEY_LEN {
            return None;
        }
        let mut key = Self([0u8; KEY_LEN]);
        key.0.copy_from_slice(bytes);
        Some(key)
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Short, non-secret fingerprint of the key for logs.
    ///
    /// Two processes report the same id only if they hold the same key.
    pub fn key_id(&self) -> String {
        let digest = Sha256::digest(self.as_bytes());
        URL_SAFE_NO_PAD.encode(&digest[..KEY_ID_LEN])
    }
}

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material — not even in debug builds.
        f.write_str("KeyBytes([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        assert_ne!(KeyBytes::generate().as_bytes(), KeyBytes::generate().as_bytes());
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(KeyBytes::from_slice(&[0u8; KEY_LEN]).is_some());
        assert!(KeyBytes::from_slice(&[0u8; 16]).is_none());
        assert!(KeyBytes::from_slice(&[]).is_none());
    }

    #[test]
    fn key_id_is_stable_and_short() {
        let key = KeyBytes::from_slice(&[0x42u8; KEY_LEN]).unwrap();
        let same = KeyBytes::from_slice(&[0x42u8; KEY_LEN]).unwrap();
        let other = KeyBytes::from_slice(&[0x43u8; KEY_LEN]).unwrap();
        assert_eq!(key.key_id(), same.key_id());
        assert_ne!(key.key_id(), other.key_id());
        assert_eq!(key.key_id().len(), 8);
    }

    #[test]
    fn key_bytes_wipe_on_drop() {
        fn wiped_on_drop<T: ZeroizeOnDrop>() {}
        wiped_on_drop::<KeyBytes>();

        let mut key = KeyBytes::generate();
        key.zeroize();
        assert_eq!(key.as_bytes(), &[0u8; KEY_LEN]);
    }

    #[test]
    fn key_bytes_redacted_in_debug() {
        let key = KeyBytes::from_slice(&[0xFFu8; KEY_LEN]).unwrap();
        let out = format!("{key:?}");
        assert!(out.contains("REDACTED"));
        assert!(!out.contains("255"));
    }
}
