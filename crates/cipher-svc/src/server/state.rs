//! Shared application state injected into every Axum handler.

use std::{sync::Arc, time::Duration};

use crate::crypto::CipherService;
use crate::storage::FileStorage;

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable so that Axum can clone the state for each
/// request without copying key material or paths.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Cipher context built once from the service key.
    pub cipher: Arc<CipherService>,
    /// Upload and output directories.
    pub storage: Arc<FileStorage>,
    /// Maximum token age accepted by `POST /decrypt`; `None` disables expiry.
    pub token_ttl: Option<Duration>,
}

impl AppState {
    /// Create a new [`AppState`] from the initialised components.
    pub fn new(cipher: CipherService, storage: FileStorage, token_ttl: Option<Duration>) -> Self {
        Self {
            cipher: Arc::new(cipher),
            storage: Arc::new(storage),
            token_ttl,
        }
    }

    /// State with a fixed key and storage rooted at `data_dir`, for tests.
    #[cfg(test)]
    pub fn for_tests(data_dir: &std::path::Path) -> Self {
        let cipher = CipherService::new(&[0x42u8; crate::crypto::KEY_LEN]).unwrap();
        let storage = FileStorage::init(data_dir, false).unwrap();
        Self::new(cipher, storage, None)
    }
}
