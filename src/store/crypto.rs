//! Payload encryption for everything persisted on the device.
//!
//! A 256-bit device key is generated on first use and kept in a 0600 file
//! next to the database. The AES-256-GCM key is derived from it with
//! Argon2id. Resetting the device key makes every previously sealed payload
//! unreadable; readers treat those as missing.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use once_cell::sync::OnceCell;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, trace, warn};

use crate::error::StoreError;

const DEVICE_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const SEAL_VERSION: u8 = 1;
const KDF_SALT: &[u8] = b"attendance-agent/local-store/v1";

/// Opaque encryption service for local payloads.
pub trait PayloadCipher: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StoreError>;

    /// `None` for anything that does not decrypt under the current key.
    fn open(&self, sealed: &[u8]) -> Option<Vec<u8>>;
}

pub fn seal_json<T: Serialize>(cipher: &dyn PayloadCipher, value: &T) -> Result<Vec<u8>, StoreError> {
    let plaintext = serde_json::to_vec(value)?;
    cipher.seal(&plaintext)
}

pub fn open_json<T: DeserializeOwned>(cipher: &dyn PayloadCipher, sealed: &[u8]) -> Option<T> {
    let plaintext = cipher.open(sealed)?;
    match serde_json::from_slice(&plaintext) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "decrypted payload has an unexpected shape");
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceKeyFile {
    path: PathBuf,
}

impl DeviceKeyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load_or_create(&self) -> Result<[u8; DEVICE_KEY_LEN], StoreError> {
        if self.path.exists() {
            let encoded = fs::read_to_string(&self.path)?;
            let decoded = BASE64
                .decode(encoded.trim().as_bytes())
                .map_err(|e| StoreError::DeviceKey(e.to_string()))?;
            if decoded.len() != DEVICE_KEY_LEN {
                return Err(StoreError::DeviceKey(format!(
                    "expected {DEVICE_KEY_LEN} bytes, found {}",
                    decoded.len()
                )));
            }
            let mut key = [0u8; DEVICE_KEY_LEN];
            key.copy_from_slice(&decoded);
            return Ok(key);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut key = [0u8; DEVICE_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        write_new_file_restricted(&self.path, BASE64.encode(key).as_bytes())?;
        info!(path = %self.path.display(), "generated new device key");
        Ok(key)
    }

    /// Deletes the key. Returns whether one existed.
    pub fn reset(&self) -> Result<bool, StoreError> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        warn!(path = %self.path.display(), "device key removed, sealed records are now unreadable");
        Ok(true)
    }
}

/// AES-256-GCM keyed from the device key. The key is loaded (or created) lazily.
pub struct DeviceCipher {
    key_file: DeviceKeyFile,
    kdf: KdfParams,
    key: OnceCell<[u8; 32]>,
}

impl DeviceCipher {
    pub fn new(key_file: DeviceKeyFile, kdf: KdfParams) -> Self {
        Self {
            key_file,
            kdf,
            key: OnceCell::new(),
        }
    }

    /// Loads (or creates) the device key and runs the key derivation now.
    /// Both block, so async callers run this through `spawn_blocking` at
    /// startup and every later seal/open finds the key ready.
    pub fn warm(&self) -> Result<(), StoreError> {
        self.key().map(|_| ())
    }

    pub fn is_warm(&self) -> bool {
        self.key.get().is_some()
    }

    /// Drops the device key; the next seal generates a fresh one.
    pub fn reset(&mut self) -> Result<bool, StoreError> {
        self.key.take();
        self.key_file.reset()
    }

    fn key(&self) -> Result<&[u8; 32], StoreError> {
        self.key.get_or_try_init(|| {
            let device_key = self.key_file.load_or_create()?;
            derive_key(&device_key, self.kdf)
        })
    }
}

impl PayloadCipher for DeviceCipher {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StoreError> {
        let cipher = Aes256Gcm::new_from_slice(self.key()?).map_err(|_| StoreError::Crypto)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| StoreError::Crypto)?;

        let mut sealed = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        sealed.push(SEAL_VERSION);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Option<Vec<u8>> {
        if sealed.len() <= 1 + NONCE_LEN || sealed[0] != SEAL_VERSION {
            trace!(len = sealed.len(), "sealed payload malformed");
            return None;
        }
        let key = match self.key() {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "device key unavailable");
                return None;
            }
        };
        let cipher = Aes256Gcm::new_from_slice(key).ok()?;
        let (nonce, ciphertext) = sealed[1..].split_at(NONCE_LEN);
        cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
    }
}

fn derive_key(device_key: &[u8], kdf: KdfParams) -> Result<[u8; 32], StoreError> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, 1, Some(32))
        .map_err(|e| StoreError::DeviceKey(e.to_string()))?;
    let mut out = [0u8; 32];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(device_key, KDF_SALT, &mut out)
        .map_err(|e| StoreError::DeviceKey(e.to_string()))?;
    Ok(out)
}

fn write_new_file_restricted(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
    file.write_all(data)?;
    file.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
