//! Secure Storage Module
//!
//! Durable token storage. On Windows the files are encrypted with DPAPI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::auth::TokenPair;

#[cfg(windows)]
use windows::Win32::Security::Cryptography::{
    CryptProtectData, CryptUnprotectData, CRYPTPROTECT_UI_FORBIDDEN, CRYPT_INTEGER_BLOB,
};

/// Application data directory (`<local data>/PawHub`)
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("PawHub")
}

/// Keys a token is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKey {
    Access,
    Refresh,
}

impl TokenKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKey::Access => "access_token",
            TokenKey::Refresh => "refresh_token",
        }
    }
}

/// Durable key-value storage for the token pair.
///
/// Only the refresh coordinator and explicit login/logout write here.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: TokenKey) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: TokenKey, value: &str) -> Result<(), StorageError>;

    async fn remove(&self, key: TokenKey) -> Result<(), StorageError>;

    async fn load_pair(&self) -> Result<TokenPair, StorageError> {
        Ok(TokenPair {
            access_token: self.get(TokenKey::Access).await?,
            refresh_token: self.get(TokenKey::Refresh).await?,
        })
    }

    /// Store both tokens; an absent token removes the stored one.
    async fn store_pair(&self, pair: &TokenPair) -> Result<(), StorageError> {
        for (key, value) in [
            (TokenKey::Access, &pair.access_token),
            (TokenKey::Refresh, &pair.refresh_token),
        ] {
            match value {
                Some(token) => self.set(key, token).await?,
                None => self.remove(key).await?,
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.remove(TokenKey::Access).await?;
        self.remove(TokenKey::Refresh).await
    }
}

/// File-backed token storage, one encrypted `<key>.dat` file per token
pub struct SecureStorage {
    storage_path: PathBuf,
}

impl SecureStorage {
    /// Open storage rooted at `dir`, creating it if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let storage_path = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_path).map_err(|e| StorageError::Io(e.to_string()))?;

        debug!("Secure storage initialized at: {:?}", storage_path);
        Ok(Self { storage_path })
    }

    /// Open storage in the default application data directory
    pub fn open_default() -> Result<Self, StorageError> {
        Self::new(app_data_dir())
    }

    fn file_path(&self, key: TokenKey) -> PathBuf {
        self.storage_path.join(format!("{}.dat", key.as_str()))
    }

    #[cfg(windows)]
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        dpapi_transform(data, true).ok_or_else(|| StorageError::Encryption("DPAPI encryption failed".into()))
    }

    #[cfg(windows)]
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        dpapi_transform(data, false).ok_or_else(|| StorageError::Decryption("DPAPI decryption failed".into()))
    }

    #[cfg(not(windows))]
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        // Development platforms store plain bytes
        Ok(data.to_vec())
    }

    #[cfg(not(windows))]
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        Ok(data.to_vec())
    }
}

#[cfg(windows)]
fn dpapi_transform(data: &[u8], protect: bool) -> Option<Vec<u8>> {
    let input = CRYPT_INTEGER_BLOB {
        cbData: data.len() as u32,
        pbData: data.as_ptr() as *mut u8,
    };
    let mut output = CRYPT_INTEGER_BLOB {
        cbData: 0,
        pbData: std::ptr::null_mut(),
    };

    unsafe {
        let result = if protect {
            CryptProtectData(&input, None, None, None, None, CRYPTPROTECT_UI_FORBIDDEN, &mut output)
        } else {
            CryptUnprotectData(&input, None, None, None, None, CRYPTPROTECT_UI_FORBIDDEN, &mut output)
        };
        if result.is_err() {
            return None;
        }

        let bytes = std::slice::from_raw_parts(output.pbData, output.cbData as usize).to_vec();

        // Output buffer is allocated by DPAPI
        windows::Win32::Foundation::LocalFree(windows::Win32::Foundation::HLOCAL(
            output.pbData as *mut std::ffi::c_void,
        ));

        Some(bytes)
    }
}

#[async_trait]
impl TokenStore for SecureStorage {
    async fn get(&self, key: TokenKey) -> Result<Option<String>, StorageError> {
        let encrypted = match tokio::fs::read(self.file_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };

        let decrypted = self.decrypt(&encrypted)?;
        String::from_utf8(decrypted)
            .map(Some)
            .map_err(|e| StorageError::Decryption(e.to_string()))
    }

    async fn set(&self, key: TokenKey, value: &str) -> Result<(), StorageError> {
        let encrypted = self.encrypt(value.as_bytes())?;
        tokio::fs::write(self.file_path(key), encrypted)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;

        debug!("Saved encrypted token: {}", key.as_str());
        Ok(())
    }

    async fn remove(&self, key: TokenKey) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.file_path(key)).await {
            Ok(()) => {
                info!("Deleted stored token: {}", key.as_str());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }
}

/// In-memory token storage for hosts without a data directory, and tests
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<TokenKey, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: &TokenPair) -> Self {
        let mut tokens = HashMap::new();
        if let Some(access) = &pair.access_token {
            tokens.insert(TokenKey::Access, access.clone());
        }
        if let Some(refresh) = &pair.refresh_token {
            tokens.insert(TokenKey::Refresh, refresh.clone());
        }
        Self { tokens: Mutex::new(tokens) }
    }

    fn with_tokens<T>(
        &self,
        f: impl FnOnce(&mut HashMap<TokenKey, String>) -> T,
    ) -> Result<T, StorageError> {
        self.tokens
            .lock()
            .map(|mut tokens| f(&mut tokens))
            .map_err(|_| StorageError::Io("token map lock poisoned".into()))
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: TokenKey) -> Result<Option<String>, StorageError> {
        self.with_tokens(|tokens| tokens.get(&key).cloned())
    }

    async fn set(&self, key: TokenKey, value: &str) -> Result<(), StorageError> {
        self.with_tokens(|tokens| {
            tokens.insert(key, value.to_string());
        })
    }

    async fn remove(&self, key: TokenKey) -> Result<(), StorageError> {
        self.with_tokens(|tokens| {
            tokens.remove(&key);
        })
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),
}
