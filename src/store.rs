//! Persistent backing and the secret-key-at-rest store.
//!
//! [`StorageBackend`] is a minimal string key/value contract shared by
//! the ballot store and the secret store: an in-memory map for tests
//! and short-lived tools, and a JSON file rewritten atomically
//! (write-temp-then-rename) for real use. Writes are serialised by the
//! backend's own lock.
//!
//! [`SecretStore`] keeps voter private keys encrypted at rest:
//! PBKDF2-HMAC-SHA256 over the owner's wallet address (100 000 rounds,
//! fixed application salt) derives an AES-256-GCM key; values are
//! `enc:` + base64(IV ‖ ciphertext) with a fresh 12-byte IV per write.
//! The derived key is used and dropped, never persisted. This guards
//! against casual inspection of the backing file — it is not a hardware
//! wallet, and an attacker who knows the owner's address and has the
//! file can brute the KDF. Anything stronger needs a real secret as the
//! KDF input, which this layer by design does not require.
//!
//! Failure discipline: a value that will not parse or will not
//! authenticate yields `None` ("secret absent"), never a wrong secret.
//! Legacy plaintext values (no `enc:` prefix) are accepted once and
//! immediately re-encrypted in place.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

const ENC_PREFIX: &str = "enc:";
const KDF_ITERATIONS: u32 = 100_000;
const APP_SALT: [u8; 16] = *b"maci-client-kdf\0";
const IV_LEN: usize = 12;

/// String key/value persistence shared by the ballot and secret stores.
pub trait StorageBackend: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Write (or overwrite) a value.
    fn put(&self, key: &str, value: &str) -> Result<()>;
    /// Delete a value; absent keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile in-memory backend.
#[derive(Default)]
pub struct MemoryBackend {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().expect("backend poisoned").get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .lock()
            .expect("backend poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.lock().expect("backend poisoned").remove(key);
        Ok(())
    }
}

/// JSON-file backend. The whole map is rewritten through a temporary
/// file and renamed into place, so a crashed write leaves the previous
/// state intact rather than a half-written file.
pub struct FileBackend {
    path: PathBuf,
    map: Mutex<BTreeMap<String, String>>,
}

impl FileBackend {
    /// Open (or create) the backing file. An unparseable file is
    /// treated as empty — degraded to "records absent", logged, never
    /// guessed at.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "backing file corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    fn persist(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().expect("backend poisoned").get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().expect("backend poisoned");
        map.insert(key.to_string(), value.to_string());
        self.persist(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.map.lock().expect("backend poisoned");
        if map.remove(key).is_some() {
            self.persist(&map)?;
        }
        Ok(())
    }
}

/// Authenticated at-rest encryption of voter secrets, keyed by the
/// owner's wallet address.
pub struct SecretStore {
    backend: std::sync::Arc<dyn StorageBackend>,
}

impl SecretStore {
    /// Store over the given backend.
    pub fn new(backend: std::sync::Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Encrypt `secret` under `owner_address` and persist it at
    /// `label`.
    pub fn store(&self, label: &str, secret: &[u8], owner_address: &str) -> Result<()> {
        let key = derive_key(owner_address);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), secret)
            .map_err(|_| Error::Serialization("secret encryption failed".into()))?;

        let mut payload = Vec::with_capacity(IV_LEN + ciphertext.len());
        payload.extend_from_slice(&iv);
        payload.extend_from_slice(&ciphertext);
        let value = format!("{ENC_PREFIX}{}", BASE64.encode(payload));
        self.backend.put(label, &value)
    }

    /// Load and decrypt the secret at `label`. Returns `None` when the
    /// value is absent, malformed, or fails authentication — a damaged
    /// record degrades to "secret absent", never to a wrong secret.
    /// Legacy plaintext values are re-encrypted transparently.
    pub fn load(&self, label: &str, owner_address: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let Some(value) = self.backend.get(label)? else {
            return Ok(None);
        };

        let Some(encoded) = value.strip_prefix(ENC_PREFIX) else {
            // Legacy plaintext entry: upgrade in place on first touch.
            tracing::warn!(label, "re-encrypting legacy plaintext secret");
            let secret = Zeroizing::new(value.into_bytes());
            self.store(label, &secret, owner_address)?;
            return Ok(Some(secret));
        };

        let Ok(payload) = BASE64.decode(encoded) else {
            tracing::warn!(label, "secret payload is not valid base64");
            return Ok(None);
        };
        if payload.len() <= IV_LEN {
            tracing::warn!(label, "secret payload too short");
            return Ok(None);
        }

        let key = derive_key(owner_address);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
        match cipher.decrypt(Nonce::from_slice(&payload[..IV_LEN]), &payload[IV_LEN..]) {
            Ok(plain) => Ok(Some(Zeroizing::new(plain))),
            Err(_) => {
                tracing::warn!(label, "secret failed authentication");
                Ok(None)
            }
        }
    }

    /// Remove the secret at `label`.
    pub fn remove(&self, label: &str) -> Result<()> {
        self.backend.remove(label)
    }

    /// Move a secret to a retirement label (key change: the old key is
    /// kept inert for recovery, not destroyed).
    pub fn retire(&self, label: &str, retired_label: &str) -> Result<()> {
        if let Some(value) = self.backend.get(label)? {
            self.backend.put(retired_label, &value)?;
            self.backend.remove(label)?;
        }
        Ok(())
    }
}

/// Address → AES key. Addresses are case-normalised so checksummed and
/// lowercased spellings derive the same key.
fn derive_key(owner_address: &str) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(
        owner_address.trim().to_lowercase().as_bytes(),
        &APP_SALT,
        KDF_ITERATIONS,
        &mut key[..],
    );
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const OWNER: &str = "0xAbCd00000000000000000000000000000000Ef12";

    fn store() -> SecretStore {
        SecretStore::new(Arc::new(MemoryBackend::new()))
    }

    #[test]
    fn store_load_round_trips() {
        let s = store();
        s.store("secret:poll:voter", b"super secret scalar", OWNER)
            .unwrap();
        let loaded = s.load("secret:poll:voter", OWNER).unwrap().unwrap();
        assert_eq!(loaded.as_slice(), b"super secret scalar");
    }

    #[test]
    fn values_are_prefixed_and_opaque() {
        let backend = Arc::new(MemoryBackend::new());
        let s = SecretStore::new(backend.clone());
        s.store("label", b"material", OWNER).unwrap();
        let raw = backend.get("label").unwrap().unwrap();
        assert!(raw.starts_with(ENC_PREFIX));
        assert!(!raw.contains("material"));
    }

    #[test]
    fn wrong_owner_reads_nothing() {
        let s = store();
        s.store("label", b"material", OWNER).unwrap();
        assert!(s.load("label", "0xsomeoneelse").unwrap().is_none());
    }

    #[test]
    fn address_case_does_not_split_the_key_space() {
        let s = store();
        s.store("label", b"material", OWNER).unwrap();
        let loaded = s.load("label", &OWNER.to_lowercase()).unwrap().unwrap();
        assert_eq!(loaded.as_slice(), b"material");
    }

    #[test]
    fn corrupt_payloads_degrade_to_absent() {
        let backend = Arc::new(MemoryBackend::new());
        let s = SecretStore::new(backend.clone());

        backend.put("label", "enc:!!!not-base64!!!").unwrap();
        assert!(s.load("label", OWNER).unwrap().is_none());

        // Valid base64, garbage ciphertext.
        backend
            .put("label", &format!("enc:{}", BASE64.encode([0u8; 40])))
            .unwrap();
        assert!(s.load("label", OWNER).unwrap().is_none());
    }

    #[test]
    fn legacy_plaintext_is_upgraded_on_first_load() {
        let backend = Arc::new(MemoryBackend::new());
        let s = SecretStore::new(backend.clone());
        backend.put("label", "12345678901234567890").unwrap();

        let loaded = s.load("label", OWNER).unwrap().unwrap();
        assert_eq!(loaded.as_slice(), b"12345678901234567890");

        let upgraded = backend.get("label").unwrap().unwrap();
        assert!(upgraded.starts_with(ENC_PREFIX));
        // And it still decrypts.
        let again = s.load("label", OWNER).unwrap().unwrap();
        assert_eq!(again.as_slice(), b"12345678901234567890");
    }

    #[test]
    fn retire_moves_the_value() {
        let backend = Arc::new(MemoryBackend::new());
        let s = SecretStore::new(backend.clone());
        s.store("label", b"old key", OWNER).unwrap();
        s.retire("label", "label#1").unwrap();
        assert!(s.load("label", OWNER).unwrap().is_none());
        assert_eq!(
            s.load("label#1", OWNER).unwrap().unwrap().as_slice(),
            b"old key"
        );
    }

    #[test]
    fn file_backend_survives_reopen_and_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let backend = FileBackend::open(&path).unwrap();
            backend.put("a", "1").unwrap();
            backend.put("b", "2").unwrap();
            backend.remove("a").unwrap();
        }
        {
            let backend = FileBackend::open(&path).unwrap();
            assert!(backend.get("a").unwrap().is_none());
            assert_eq!(backend.get("b").unwrap().unwrap(), "2");
        }
        fs::write(&path, "definitely not json").unwrap();
        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.get("b").unwrap().is_none());
    }
}
