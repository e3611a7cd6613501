//! AES-256-GCM-SIV token encryption for uploaded files.
//!
//! This module is intentionally free of HTTP and filesystem dependencies.
//! It turns opaque plaintext bytes into self-describing tokens and back.
//!
//! # Token format
//!
//! ```text
//! 0x01 | issued_at (u64 BE, 8 bytes) | nonce (12 bytes) | ciphertext + tag (n + 16 bytes)
//! ```
//!
//! The 9-byte header is authenticated as associated data. The version byte
//! enables future algorithm migration without breaking existing tokens.

pub mod armor;
pub mod cipher;

pub use cipher::{CipherError, CipherService, KEY_LEN};
