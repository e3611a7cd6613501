//! [`CipherService`]: encrypt and decrypt whole payloads under the service key.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) with a fresh random 96-bit
//! nonce per call. GCM-SIV degrades gracefully if a nonce ever repeats (it only
//! reveals that two plaintexts were equal), so a CSPRNG hiccup cannot expose
//! the authentication key the way it would with plain GCM.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aes_gcm_siv::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256GcmSiv, Nonce,
};
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the AES-GCM-SIV authentication tag.
pub const TAG_LEN: usize = 16;

/// First byte of every token produced by this version of the service.
pub const TOKEN_VERSION: u8 = 0x01;

/// Version byte plus big-endian issued-at seconds.
const HEADER_LEN: usize = 1 + 8;

/// Shortest structurally valid token: header, nonce and the tag of an empty payload.
pub const MIN_TOKEN_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

/// How far in the future an issued-at timestamp may be before a TTL check rejects it.
pub const MAX_CLOCK_SKEW_SECS: u64 = 60;

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKey(usize),

    /// The token is too short or carries an unknown version byte.
    #[error("malformed token")]
    MalformedToken,

    /// The authentication tag did not verify.
    #[error("token authentication failed")]
    Authentication,

    /// The token authenticated but is outside the configured TTL window.
    #[error("token expired")]
    Expired,

    /// AES-GCM-SIV encryption failed (payload beyond the algorithm's length limit).
    #[error("aead operation failed")]
    AeadFailure,
}

impl CipherError {
    /// `true` for every failure caused by the token itself.
    ///
    /// Callers must present all rejections identically so that the service
    /// does not act as a decryption oracle.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CipherError::MalformedToken | CipherError::Authentication | CipherError::Expired
        )
    }
}

/// Cipher context derived once from the service key.
///
/// Immutable after construction and safe to share between request handlers
/// behind an `Arc`.
pub struct CipherService {
    cipher: Aes256GcmSiv,
}

impl std::fmt::Debug for CipherService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherService([REDACTED])")
    }
}

impl CipherService {
    /// Build the cipher context from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKey`] if `key` is not [`KEY_LEN`] bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKey(key.len()));
        }
        let cipher =
            Aes256GcmSiv::new_from_slice(key).map_err(|_| CipherError::InvalidKey(key.len()))?;
        Ok(Self { cipher })
    }

    /// Encrypt `plaintext` into a new token stamped with the current time.
    ///
    /// Every call draws a fresh nonce, so encrypting the same bytes twice
    /// yields different tokens. Empty input is valid.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::AeadFailure`] only if the payload exceeds the
    /// AES-GCM-SIV length limit (2^36 bytes).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.encrypt_at(plaintext, unix_now())
    }

    pub(crate) fn encrypt_at(
        &self,
        plaintext: &[u8],
        issued_at: u64,
    ) -> Result<Vec<u8>, CipherError> {
        use aes_gcm_siv::aead::rand_core::RngCore;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let mut header = [0u8; HEADER_LEN];
        header[0] = TOKEN_VERSION;
        header[1..].copy_from_slice(&issued_at.to_be_bytes());

        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: &header,
                },
            )
            .map_err(|_| CipherError::AeadFailure)?;

        let mut token = Vec::with_capacity(HEADER_LEN + NONCE_LEN + sealed.len());
        token.extend_from_slice(&header);
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&sealed);
        Ok(token)
    }

    /// Verify and decrypt a token. No expiry check is applied.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::MalformedToken`] if the token is shorter than
    /// [`MIN_TOKEN_LEN`] or has an unknown version byte, and
    /// [`CipherError::Authentication`] if the tag does not verify.
    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.open(token).map(|(_, plaintext)| plaintext)
    }

    /// Verify and decrypt a token, rejecting it if it is older than `ttl`.
    ///
    /// # Errors
    ///
    /// As [`CipherService::decrypt`], plus [`CipherError::Expired`] when the
    /// token's issued-at time is more than `ttl` in the past or more than
    /// [`MAX_CLOCK_SKEW_SECS`] in the future.
    pub fn decrypt_with_ttl(&self, token: &[u8], ttl: Duration) -> Result<Vec<u8>, CipherError> {
        self.decrypt_with_ttl_at(token, ttl, unix_now())
    }

    fn decrypt_with_ttl_at(
        &self,
        token: &[u8],
        ttl: Duration,
        now: u64,
    ) -> Result<Vec<u8>, CipherError> {
        let (issued_at, plaintext) = self.open(token)?;
        if issued_at > now.saturating_add(MAX_CLOCK_SKEW_SECS)
            || issued_at.saturating_add(ttl.as_secs()) < now
        {
            return Err(CipherError::Expired);
        }
        Ok(plaintext)
    }

    /// Split a token into its fields and open the AEAD box.
    ///
    /// Plaintext is only produced after the tag has been verified.
    fn open(&self, token: &[u8]) -> Result<(u64, Vec<u8>), CipherError> {
        if token.len() < MIN_TOKEN_LEN || token[0] != TOKEN_VERSION {
            return Err(CipherError::MalformedToken);
        }
        let (header, rest) = token.split_at(HEADER_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: header,
                },
            )
            .map_err(|_| CipherError::Authentication)?;

        let mut issued_at = [0u8; 8];
        issued_at.copy_from_slice(&header[1..]);
        Ok((u64::from_be_bytes(issued_at), plaintext))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
