/*!
 * Secure storage for Wireless@SGx credentials
 *
 * Primary backend is the OS keyring. When no keyring is available
 * (headless boxes, minimal desktops) credentials fall back to an
 * AES-256-GCM encrypted file under ~/.config/wirelesssgx/, with the
 * file key stored alongside, both owner-readable only.
 */

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use keyring::Entry;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::isp::Isp;

const SERVICE_NAME: &str = "wirelesssgx";
const USERNAME_KEY: &str = "username";
const PASSWORD_KEY: &str = "password";
const CONFIG_KEY: &str = "config";

const GCM_NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("keyring unavailable: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored record is malformed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("failed to encrypt credentials for the fallback file")]
    Encrypt,
    #[error("fallback key file is corrupt")]
    BadKeyFile,
}

/// Stored credentials, as handed back to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub isp: String,
}

#[derive(Serialize, Deserialize)]
struct StoredConfig {
    isp: String,
    last_connection: String,
}

pub struct SecureStorage {
    fallback_file: PathBuf,
}

impl SecureStorage {
    pub fn new() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            fallback_file: base.join(SERVICE_NAME).join("credentials.enc"),
        }
    }

    #[cfg(test)]
    fn with_fallback_file(fallback_file: PathBuf) -> Self {
        Self { fallback_file }
    }

    /// Save credentials, preferring the keyring and falling back to the
    /// encrypted file when the keyring is unusable.
    pub fn save_credentials(
        &self,
        username: &str,
        password: &str,
        isp: Isp,
    ) -> Result<(), StorageError> {
        match self.save_to_keyring(username, password, isp) {
            Ok(()) => Ok(()),
            Err(err) => {
                debug!("keyring save failed ({err}), using encrypted file fallback");
                self.save_to_file(username, password, isp)
            }
        }
    }

    /// Load credentials from whichever backend holds them.
    pub fn load_credentials(&self) -> Option<Credentials> {
        self.load_from_keyring().or_else(|| self.load_from_file())
    }

    /// Remove credentials from both backends. Keyring removal is best
    /// effort (entries may never have existed there).
    pub fn delete_credentials(&self) -> Result<(), StorageError> {
        for key in [USERNAME_KEY, PASSWORD_KEY, CONFIG_KEY] {
            if let Ok(entry) = Entry::new(SERVICE_NAME, key) {
                let _ = entry.delete_password();
            }
        }
        if self.fallback_file.exists() {
            fs::remove_file(&self.fallback_file)?;
        }
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        self.load_credentials().is_some()
    }

    fn save_to_keyring(
        &self,
        username: &str,
        password: &str,
        isp: Isp,
    ) -> Result<(), StorageError> {
        Entry::new(SERVICE_NAME, USERNAME_KEY)?.set_password(username)?;
        Entry::new(SERVICE_NAME, PASSWORD_KEY)?.set_password(password)?;

        let config = StoredConfig {
            isp: isp.name().to_string(),
            last_connection: "success".to_string(),
        };
        Entry::new(SERVICE_NAME, CONFIG_KEY)?.set_password(&serde_json::to_string(&config)?)?;
        Ok(())
    }

    fn load_from_keyring(&self) -> Option<Credentials> {
        let username = Entry::new(SERVICE_NAME, USERNAME_KEY)
            .ok()?
            .get_password()
            .ok()?;
        let password = Entry::new(SERVICE_NAME, PASSWORD_KEY)
            .ok()?
            .get_password()
            .ok()?;

        let isp = Entry::new(SERVICE_NAME, CONFIG_KEY)
            .ok()
            .and_then(|entry| entry.get_password().ok())
            .and_then(|raw| serde_json::from_str::<StoredConfig>(&raw).ok())
            .map(|config| config.isp)
            .unwrap_or_else(|| Isp::default().name().to_string());

        Some(Credentials {
            username,
            password,
            isp,
        })
    }

    fn key_file(&self) -> PathBuf {
        match self.fallback_file.parent() {
            Some(parent) => parent.join(".key"),
            None => PathBuf::from(".key"),
        }
    }

    fn get_or_create_key(&self) -> Result<aes_gcm::Key<Aes256Gcm>, StorageError> {
        let key_file = self.key_file();
        if key_file.exists() {
            let raw = fs::read(&key_file)?;
            if raw.len() != 32 {
                return Err(StorageError::BadKeyFile);
            }
            return Ok(*GenericArray::from_slice(&raw));
        }

        let key = Aes256Gcm::generate_key(OsRng);
        if let Some(parent) = key_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&key_file, key.as_slice())?;
        restrict_permissions(&key_file)?;
        Ok(key)
    }

    fn save_to_file(&self, username: &str, password: &str, isp: Isp) -> Result<(), StorageError> {
        if let Some(parent) = self.fallback_file.parent() {
            fs::create_dir_all(parent)?;
        }

        let key = self.get_or_create_key()?;
        let cipher = Aes256Gcm::new(&key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let record = Credentials {
            username: username.to_string(),
            password: password.to_string(),
            isp: isp.name().to_string(),
        };
        let plaintext = serde_json::to_vec(&record)?;
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| StorageError::Encrypt)?;

        let mut contents = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
        contents.extend_from_slice(&nonce);
        contents.extend_from_slice(&ciphertext);
        fs::write(&self.fallback_file, contents)?;
        restrict_permissions(&self.fallback_file)?;
        Ok(())
    }

    fn load_from_file(&self) -> Option<Credentials> {
        let raw = fs::read(&self.fallback_file).ok()?;
        if raw.len() < GCM_NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = raw.split_at(GCM_NONCE_LEN);

        let key = self.get_or_create_key().ok()?;
        let cipher = Aes256Gcm::new(&key);
        let plaintext = cipher
            .decrypt(GenericArray::from_slice(nonce), ciphertext)
            .ok()?;
        serde_json::from_slice(&plaintext).ok()
    }
}

impl Default for SecureStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}
