//! Client-side encryption vault
//!
//! A random 256-bit data key encrypts records. The data key itself is stored
//! wrapped (AES-256-GCM) under a key derived from the master password with
//! PBKDF2-HMAC-SHA256, so changing the password only re-wraps the data key.

use crate::error::{Error, Result};
use crate::storage::Settings;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

pub const KEYDATA_KEY: &str = "keydata";
pub const AUTH_KEY: &str = "auth";
pub const BACKUP_PREFIX: &str = "backup_";
pub const DEFAULT_ITERATIONS: u32 = 100_000;
const ROTATION_DAYS: i64 = 30;
const NONCE_LEN: usize = 12;
const PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// Symmetric cipher over the unwrapped data key
#[derive(Clone)]
pub struct Cipher {
    key: [u8; 32],
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cipher(..)")
    }
}

impl Cipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn generate() -> Self {
        Self::new(rand::random())
    }

    fn aead(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| Error::Encryption)
    }

    /// `base64(iv || ciphertext)` with a fresh 96-bit IV
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<String> {
        let iv: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .aead()?
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| Error::Encryption)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    pub fn decrypt_bytes(&self, blob: &str) -> Result<Vec<u8>> {
        let raw = STANDARD
            .decode(blob.trim())
            .map_err(|e| Error::Decryption(format!("invalid encoding: {}", e)))?;
        if raw.len() <= NONCE_LEN {
            return Err(Error::Decryption("ciphertext too short".to_string()));
        }
        let (iv, ciphertext) = raw.split_at(NONCE_LEN);
        self.aead()?
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| Error::Decryption("authentication failed".to_string()))
    }

    pub fn encrypt<T: Serialize>(&self, value: &T) -> Result<String> {
        self.encrypt_bytes(&serde_json::to_vec(value)?)
    }

    pub fn decrypt<T: DeserializeOwned>(&self, blob: &str) -> Result<T> {
        let plaintext = self.decrypt_bytes(blob)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| Error::Decryption(format!("invalid payload: {}", e)))
    }
}

/// Wrapped key material kept under `keydata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyData {
    pub salt: String,
    pub iv: String,
    pub encrypted_key: String,
    pub key_version: u32,
    pub created: String,
    pub key_rotation_due: String,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

impl KeyData {
    pub fn rotation_due_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.key_rotation_due)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }

    pub fn is_rotation_due(&self) -> bool {
        self.rotation_due_at().is_some_and(|due| Utc::now() > due)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub last_auth: Option<String>,
    pub auth_count: u64,
    pub setup_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VaultStatus {
    pub authenticated: bool,
    pub setup_complete: bool,
    pub last_auth: Option<String>,
    pub auth_count: u64,
    pub key_version: Option<u32>,
    pub key_rotation_due: Option<String>,
    pub days_until_rotation: Option<i64>,
    pub algorithm: &'static str,
    pub key_derivation: &'static str,
    pub iterations: u32,
}

fn derive_kek(password: &str, salt: &[u8], iterations: u32) -> Cipher {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    Cipher::new(key)
}

fn wrap(data_key: &Cipher, password: &str, iterations: u32, key_version: u32) -> Result<KeyData> {
    let salt: [u8; 32] = rand::random();
    let kek = derive_kek(password, &salt, iterations);
    let wrapped = STANDARD
        .decode(kek.encrypt_bytes(&data_key.key)?)
        .map_err(|_| Error::Encryption)?;
    let (iv, encrypted_key) = wrapped.split_at(NONCE_LEN);

    let now = Utc::now();
    Ok(KeyData {
        salt: STANDARD.encode(salt),
        iv: STANDARD.encode(iv),
        encrypted_key: STANDARD.encode(encrypted_key),
        key_version,
        created: now.to_rfc3339(),
        key_rotation_due: (now + Duration::days(ROTATION_DAYS)).to_rfc3339(),
        iterations,
    })
}

fn unwrap_key(key_data: &KeyData, password: &str) -> Result<Cipher> {
    let decode = |s: &str| STANDARD.decode(s).map_err(|_| Error::InvalidPassword);
    let salt = decode(&key_data.salt)?;
    let mut blob = decode(&key_data.iv)?;
    blob.extend(decode(&key_data.encrypted_key)?);

    let kek = derive_kek(password, &salt, key_data.iterations);
    let raw = kek
        .decrypt_bytes(&STANDARD.encode(blob))
        .map_err(|_| Error::InvalidPassword)?;
    let key: [u8; 32] = raw.try_into().map_err(|_| Error::InvalidPassword)?;
    Ok(Cipher::new(key))
}

/// Master-password vault backed by the settings table
pub struct Vault {
    settings: Settings,
    iterations: u32,
    cipher: Option<Cipher>,
}

impl Vault {
    pub fn new(settings: Settings) -> Self {
        Self::with_iterations(settings, DEFAULT_ITERATIONS)
    }

    /// Lower iteration counts are only meant for tests
    pub fn with_iterations(settings: Settings, iterations: u32) -> Self {
        Self {
            settings,
            iterations: iterations.max(1),
            cipher: None,
        }
    }

    pub fn key_data(&self) -> Result<Option<KeyData>> {
        self.settings.get(KEYDATA_KEY)
    }

    pub fn is_setup(&self) -> Result<bool> {
        Ok(self.key_data()?.is_some())
    }

    pub fn is_unlocked(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn cipher(&self) -> Option<&Cipher> {
        self.cipher.as_ref()
    }

    /// First-time setup: generate a data key and wrap it under the password
    pub fn setup(&mut self, password: &str) -> Result<Cipher> {
        if self.is_setup()? {
            return Err(Error::Config(
                "vault is already set up; unlock or rotate instead".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(Error::InvalidPassword);
        }

        info!("Setting up client-side encryption");
        let data_key = Cipher::generate();
        let key_data = wrap(&data_key, password, self.iterations, 1)?;
        self.settings.set(KEYDATA_KEY, &key_data)?;
        self.record_auth()?;

        self.cipher = Some(data_key.clone());
        Ok(data_key)
    }

    /// Unwrap the data key; sets the vault up when no key data exists yet
    pub fn unlock(&mut self, password: &str) -> Result<Cipher> {
        let Some(key_data) = self.key_data()? else {
            return self.setup(password);
        };

        let data_key = unwrap_key(&key_data, password)?;
        self.record_auth()?;
        if key_data.is_rotation_due() {
            warn!("Key rotation recommended: due since {}", key_data.key_rotation_due);
        }

        self.cipher = Some(data_key.clone());
        Ok(data_key)
    }

    /// Forget the data key held in memory
    pub fn lock(&mut self) {
        self.cipher = None;
    }

    /// Re-wrap the same data key under a fresh salt and (optionally) a new
    /// password. Existing records stay readable.
    pub fn rotate(&mut self, current: &str, new_password: Option<&str>) -> Result<()> {
        let key_data = self.key_data()?.ok_or(Error::VaultLocked)?;
        let data_key = unwrap_key(&key_data, current)?;

        let password = new_password.unwrap_or(current);
        if password.is_empty() {
            return Err(Error::InvalidPassword);
        }

        let backup_key = format!("{}{}", BACKUP_PREFIX, Utc::now().timestamp_millis());
        self.settings.set(&backup_key, &key_data)?;
        let rotated = wrap(
            &data_key,
            password,
            self.iterations,
            key_data.key_version + 1,
        )?;
        self.settings.set(KEYDATA_KEY, &rotated)?;
        info!("Key rotation complete (version {})", rotated.key_version);

        self.cipher = Some(data_key);
        Ok(())
    }

    pub fn status(&self) -> Result<VaultStatus> {
        let auth: AuthState = self.settings.get(AUTH_KEY)?.unwrap_or_default();
        let key_data = self.key_data()?;

        let days_until_rotation = key_data
            .as_ref()
            .and_then(|k| k.rotation_due_at())
            .map(|due| {
                let secs = (due - Utc::now()).num_seconds();
                // Round up like a calendar countdown
                (secs as f64 / 86_400.0).ceil() as i64
            });

        Ok(VaultStatus {
            authenticated: self.is_unlocked(),
            setup_complete: auth.setup_complete || key_data.is_some(),
            last_auth: auth.last_auth,
            auth_count: auth.auth_count,
            key_version: key_data.as_ref().map(|k| k.key_version),
            key_rotation_due: key_data.as_ref().map(|k| k.key_rotation_due.clone()),
            days_until_rotation,
            algorithm: "AES-256-GCM",
            key_derivation: "PBKDF2-HMAC-SHA256",
            iterations: key_data
                .as_ref()
                .map(|k| k.iterations)
                .unwrap_or(self.iterations),
        })
    }

    fn record_auth(&self) -> Result<()> {
        self.settings.update(AUTH_KEY, |auth: Option<AuthState>| {
            let mut auth = auth.unwrap_or_default();
            auth.last_auth = Some(Utc::now().to_rfc3339());
            auth.auth_count += 1;
            auth.setup_complete = true;
            auth
        })?;
        Ok(())
    }
}

/// Random password drawn from letters, digits, and symbols
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}
