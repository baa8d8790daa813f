//! Encryption-key lifecycle for encrypted stores.
//!
//! Every encrypted store has a random 32-byte work key. The work key is
//! wrapped by a root key that never leaves a [`RootKeystore`] and persisted
//! next to the database:
//!
//! ```text
//! <db dir>/key/<db name without .db>.pub_key       current key
//! <db dir>/key/<db name without .db>.pub_key_new   key being rotated in
//! ```
//!
//! A key file is `[1 byte distributed flag][8 bytes creation time, LE
//! seconds][wrapped work key]`. Files are replaced atomically (temp file and
//! rename); rotation writes the `_new` file and renames it over the primary.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{RdbError, RdbResult};
use crate::sql_utils::anonymous_path;

/// Capacity of an [`RdbPassword`].
pub const MAX_PASSWORD_LEN: usize = 128;
/// Size of a generated work key.
pub const RDB_KEY_SIZE: usize = 32;
/// Keys older than this are reported as expired.
pub const KEY_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const ROOT_KEY_ALIAS_PREFIX: &[u8] = b"DistributedDataRdb";
const WORK_KEY_AAD: &[u8] = b"relstore:work-key";
const ROOT_KEY_RETRIES: u32 = 5;
const KEY_DIR: &str = "key";
const SUFFIX_PUB_KEY: &str = ".pub_key";
const SUFFIX_PUB_KEY_NEW: &str = ".pub_key_new";
const HEADER_LEN: usize = 1 + 8;
const DISTRIBUTED: u8 = 1;
const UNDISTRIBUTED: u8 = 0;

/// Which key file an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFileType {
    /// The key currently protecting the database.
    Pub,
    /// The key being rotated in.
    New,
}

/// Fixed-capacity buffer holding a database key.
///
/// Unused capacity is filled with `0xFF`; the whole buffer is zeroed on
/// drop.
#[derive(Clone)]
pub struct RdbPassword {
    data: [u8; MAX_PASSWORD_LEN],
    size: usize,
    is_key_expired: bool,
}

impl Default for RdbPassword {
    fn default() -> Self {
        Self {
            data: [0; MAX_PASSWORD_LEN],
            size: 0,
            is_key_expired: false,
        }
    }
}

impl RdbPassword {
    /// Copies `value` into the buffer.
    ///
    /// # Errors
    ///
    /// [`RdbError::Key`] when `value` is longer than [`MAX_PASSWORD_LEN`];
    /// the buffer is left unchanged.
    pub fn set_value(&mut self, value: &[u8]) -> RdbResult<()> {
        if value.len() > MAX_PASSWORD_LEN {
            return Err(RdbError::Key(format!(
                "password of {} bytes exceeds {MAX_PASSWORD_LEN}",
                value.len()
            )));
        }
        self.data[..value.len()].copy_from_slice(value);
        if value.len() < self.size {
            self.data[value.len()..self.size].fill(u8::MAX);
        }
        self.size = value.len();
        Ok(())
    }

    /// Empties the password.
    pub fn clear(&mut self) {
        self.data[..self.size].fill(u8::MAX);
        self.size = 0;
    }

    /// Key bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Key length.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Whether a key is present.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.size != 0
    }

    /// Whether the key file is older than [`KEY_LIFETIME`].
    #[must_use]
    pub const fn is_key_expired(&self) -> bool {
        self.is_key_expired
    }

    /// Copies the key into a zeroizing buffer.
    #[must_use]
    pub fn to_key(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.data().to_vec())
    }
}

impl PartialEq for RdbPassword {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}

impl Eq for RdbPassword {}

impl Drop for RdbPassword {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl fmt::Debug for RdbPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RdbPassword")
            .field("size", &self.size)
            .field("is_key_expired", &self.is_key_expired)
            .finish_non_exhaustive()
    }
}

/// Decoded key file.
pub struct SecretKeyData {
    /// `1` once the key was shared with the sync service.
    pub distributed: u8,
    /// Creation time, seconds since the Unix epoch.
    pub time_value: i64,
    /// Work key wrapped by the root key.
    pub secret_key: Zeroizing<Vec<u8>>,
}

impl SecretKeyData {
    fn encode(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(HEADER_LEN + self.secret_key.len()));
        out.push(self.distributed);
        out.extend_from_slice(&self.time_value.to_le_bytes());
        out.extend_from_slice(&self.secret_key);
        out
    }

    fn decode(bytes: &[u8]) -> RdbResult<Self> {
        if bytes.len() <= HEADER_LEN {
            return Err(RdbError::Key("key file is truncated".to_string()));
        }
        let mut time = [0_u8; 8];
        time.copy_from_slice(&bytes[1..HEADER_LEN]);
        Ok(Self {
            distributed: bytes[0],
            time_value: i64::from_le_bytes(time),
            secret_key: Zeroizing::new(bytes[HEADER_LEN..].to_vec()),
        })
    }
}

impl fmt::Debug for SecretKeyData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyData")
            .field("distributed", &self.distributed)
            .field("time_value", &self.time_value)
            .finish_non_exhaustive()
    }
}

/// Hardware-backed (or software) store of root keys.
///
/// Root keys never leave the keystore; callers only wrap and unwrap data
/// with them.
pub trait RootKeystore: Send + Sync {
    /// Whether a root key exists under `alias`.
    fn root_key_exists(&self, alias: &[u8]) -> RdbResult<bool>;

    /// Creates a root key under `alias`. A no-op when it already exists.
    fn generate_root_key(&self, alias: &[u8]) -> RdbResult<()>;

    /// Encrypts `plaintext` under the root key, authenticating `aad`.
    fn encrypt(&self, alias: &[u8], aad: &[u8], plaintext: &[u8]) -> RdbResult<Vec<u8>>;

    /// Decrypts data produced by [`encrypt`](Self::encrypt) with the same
    /// alias and `aad`. Any tampering must fail.
    fn decrypt(&self, alias: &[u8], aad: &[u8], ciphertext: &[u8]) -> RdbResult<Zeroizing<Vec<u8>>>;
}

/// Process-local [`RootKeystore`] using XChaCha20-Poly1305.
///
/// Each ciphertext carries its random 24-byte nonce as a prefix.
#[derive(Default)]
pub struct SoftwareKeystore {
    keys: Mutex<HashMap<Vec<u8>, Zeroizing<[u8; 32]>>>,
}

impl SoftwareKeystore {
    /// Empty keystore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cipher(&self, alias: &[u8]) -> RdbResult<XChaCha20Poly1305> {
        let keys = self
            .keys
            .lock()
            .map_err(|_| RdbError::lock_poisoned("keystore"))?;
        let key = keys
            .get(alias)
            .ok_or_else(|| RdbError::Key("root key not found".to_string()))?;
        Ok(XChaCha20Poly1305::new(Key::from_slice(key.as_slice())))
    }
}

impl fmt::Debug for SoftwareKeystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareKeystore").finish_non_exhaustive()
    }
}

impl RootKeystore for SoftwareKeystore {
    fn root_key_exists(&self, alias: &[u8]) -> RdbResult<bool> {
        let keys = self
            .keys
            .lock()
            .map_err(|_| RdbError::lock_poisoned("keystore"))?;
        Ok(keys.contains_key(alias))
    }

    fn generate_root_key(&self, alias: &[u8]) -> RdbResult<()> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| RdbError::lock_poisoned("keystore"))?;
        keys.entry(alias.to_vec()).or_insert_with(|| {
            let mut key = Zeroizing::new([0_u8; 32]);
            OsRng.fill_bytes(key.as_mut_slice());
            key
        });
        Ok(())
    }

    fn encrypt(&self, alias: &[u8], aad: &[u8], plaintext: &[u8]) -> RdbResult<Vec<u8>> {
        let cipher = self.cipher(alias)?;
        let mut nonce = [0_u8; 24];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|err| RdbError::Key(err.to_string()))?;
        let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, alias: &[u8], aad: &[u8], ciphertext: &[u8]) -> RdbResult<Zeroizing<Vec<u8>>> {
        if ciphertext.len() < 24 {
            return Err(RdbError::Key("wrapped key too short".to_string()));
        }
        let (nonce, payload) = ciphertext.split_at(24);
        let cipher = self.cipher(alias)?;
        cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload { msg: payload, aad },
            )
            .map(Zeroizing::new)
            .map_err(|err| RdbError::Key(err.to_string()))
    }
}

/// Creates, persists, loads and rotates the work keys of encrypted stores.
///
/// One manager serves every store of an application bundle. Key files are
/// addressed by the database path passed to each call.
pub struct RdbSecurityManager {
    keystore: Arc<dyn RootKeystore>,
    bundle_name: String,
    retry_interval: Duration,
    file_lock: Mutex<()>,
}

impl fmt::Debug for RdbSecurityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RdbSecurityManager")
            .field("bundle_name", &self.bundle_name)
            .finish_non_exhaustive()
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Whether a key created at `created` (Unix seconds) is past its lifetime.
#[must_use]
pub fn is_key_expired(created: i64) -> bool {
    let lifetime = i64::try_from(KEY_LIFETIME.as_secs()).unwrap_or(i64::MAX);
    created.saturating_add(lifetime) < now_secs()
}

impl RdbSecurityManager {
    /// Manager for `bundle_name`, wrapping keys with `keystore`.
    pub fn new(keystore: Arc<dyn RootKeystore>, bundle_name: impl Into<String>) -> Self {
        Self {
            keystore,
            bundle_name: bundle_name.into(),
            retry_interval: Duration::from_secs(1),
            file_lock: Mutex::new(()),
        }
    }

    /// Pause between root-key generation attempts.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Alias of the root key wrapping keys of `db_path`. The bundle name is
    /// preferred; the database directory stands in when it is empty.
    #[must_use]
    pub fn root_key_alias(&self, db_path: &Path) -> Vec<u8> {
        let mut alias = ROOT_KEY_ALIAS_PREFIX.to_vec();
        if self.bundle_name.is_empty() {
            let dir = db_path.parent().unwrap_or_else(|| Path::new(""));
            alias.extend_from_slice(dir.to_string_lossy().as_bytes());
        } else {
            alias.extend_from_slice(self.bundle_name.as_bytes());
        }
        alias
    }

    /// Directory holding the key files of `db_path`.
    #[must_use]
    pub fn key_dir(db_path: &Path) -> PathBuf {
        db_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(KEY_DIR)
    }

    /// Path of the `file_type` key file of `db_path`.
    #[must_use]
    pub fn key_file_path(db_path: &Path, file_type: KeyFileType) -> PathBuf {
        let name = db_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = name.strip_suffix(".db").unwrap_or(&name);
        let suffix = match file_type {
            KeyFileType::Pub => SUFFIX_PUB_KEY,
            KeyFileType::New => SUFFIX_PUB_KEY_NEW,
        };
        Self::key_dir(db_path).join(format!("{stem}{suffix}"))
    }

    /// Creates the root key if missing, retrying a few times.
    pub fn ensure_root_key(&self, alias: &[u8]) -> RdbResult<()> {
        if self.keystore.root_key_exists(alias)? {
            return Ok(());
        }
        let mut last_err = None;
        for attempt in 1..=ROOT_KEY_RETRIES {
            match self.keystore.generate_root_key(alias) {
                Ok(()) => {
                    log::info!("root key generated");
                    return Ok(());
                }
                Err(err) => {
                    log::error!("root key generation failed, attempt {attempt}: {err}");
                    last_err = Some(err);
                    if attempt < ROOT_KEY_RETRIES {
                        thread::sleep(self.retry_interval);
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| RdbError::Key("root key generation failed".to_string())))
    }

    /// Wraps `key` with the root key of `db_path`.
    pub fn encrypt_work_key(&self, db_path: &Path, key: &[u8]) -> RdbResult<Vec<u8>> {
        let alias = self.root_key_alias(db_path);
        let wrapped = self.keystore.encrypt(&alias, WORK_KEY_AAD, key)?;
        if wrapped.is_empty() {
            return Err(RdbError::Key("keystore returned an empty wrapped key".to_string()));
        }
        Ok(wrapped)
    }

    /// Unwraps a key produced by [`encrypt_work_key`](Self::encrypt_work_key).
    pub fn decrypt_work_key(&self, db_path: &Path, wrapped: &[u8]) -> RdbResult<Zeroizing<Vec<u8>>> {
        let alias = self.root_key_alias(db_path);
        self.keystore.decrypt(&alias, WORK_KEY_AAD, wrapped)
    }

    fn write_key_file(&self, path: &Path, data: &SecretKeyData) -> RdbResult<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        fs::create_dir_all(dir).map_err(|e| RdbError::CreateFolderFail(e.to_string()))?;

        let _guard = self
            .file_lock
            .lock()
            .map_err(|_| RdbError::lock_poisoned("key file"))?;
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data.encode().as_slice())?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_key_file(&self, path: &Path) -> RdbResult<SecretKeyData> {
        let bytes = {
            let _guard = self
                .file_lock
                .lock()
                .map_err(|_| RdbError::lock_poisoned("key file"))?;
            Zeroizing::new(fs::read(path)?)
        };
        SecretKeyData::decode(&bytes)
    }

    /// Generates a fresh work key and persists it as the `file_type` key
    /// file of `db_path`, replacing any existing one.
    pub fn save_secret_key_to_file(&self, db_path: &Path, file_type: KeyFileType) -> RdbResult<()> {
        let alias = self.root_key_alias(db_path);
        self.ensure_root_key(&alias)?;

        let mut key = Zeroizing::new(vec![0_u8; RDB_KEY_SIZE]);
        OsRng.fill_bytes(key.as_mut_slice());
        let wrapped = self.encrypt_work_key(db_path, &key)?;

        let data = SecretKeyData {
            distributed: UNDISTRIBUTED,
            time_value: now_secs(),
            secret_key: Zeroizing::new(wrapped),
        };
        let path = Self::key_file_path(db_path, file_type);
        self.write_key_file(&path, &data)?;
        log::info!("saved key file for {}", anonymous_path(db_path));
        Ok(())
    }

    /// Loads and unwraps the `file_type` key of `db_path`.
    ///
    /// # Errors
    ///
    /// [`RdbError::Key`] when the file is missing, truncated, or does not
    /// unwrap. No partial key is ever returned.
    pub fn load_secret_key_from_file(&self, db_path: &Path, file_type: KeyFileType) -> RdbResult<RdbPassword> {
        let path = Self::key_file_path(db_path, file_type);
        if !path.exists() {
            return Err(RdbError::Key("key file does not exist".to_string()));
        }
        let data = self.read_key_file(&path)?;
        let key = self.decrypt_work_key(db_path, &data.secret_key)?;

        let mut password = RdbPassword::default();
        password.set_value(&key)?;
        password.is_key_expired = is_key_expired(data.time_value);
        Ok(password)
    }

    /// Returns the `file_type` key of `db_path`, generating and persisting
    /// one first when no key file exists.
    pub fn get_rdb_password(&self, db_path: &Path, file_type: KeyFileType) -> RdbResult<RdbPassword> {
        if !self.is_key_file_exists(db_path, file_type) {
            self.save_secret_key_to_file(db_path, file_type)?;
        }
        self.load_secret_key_from_file(db_path, file_type)
    }

    /// Whether the `file_type` key file of `db_path` exists.
    #[must_use]
    pub fn is_key_file_exists(&self, db_path: &Path, file_type: KeyFileType) -> bool {
        Self::key_file_path(db_path, file_type).exists()
    }

    /// Whether the key was marked as shared with the sync service.
    pub fn get_key_distributed_status(&self, db_path: &Path, file_type: KeyFileType) -> RdbResult<bool> {
        let data = self.read_key_file(&Self::key_file_path(db_path, file_type))?;
        Ok(data.distributed == DISTRIBUTED)
    }

    /// Rewrites the distributed flag of the key file.
    pub fn set_key_distributed_status(
        &self,
        db_path: &Path,
        file_type: KeyFileType,
        distributed: bool,
    ) -> RdbResult<()> {
        let path = Self::key_file_path(db_path, file_type);
        let mut data = self.read_key_file(&path)?;
        data.distributed = if distributed { DISTRIBUTED } else { UNDISTRIBUTED };
        self.write_key_file(&path, &data)
    }

    /// Promotes the `_new` key file to the primary key file.
    pub fn update_key_file(&self, db_path: &Path) -> RdbResult<()> {
        let _guard = self
            .file_lock
            .lock()
            .map_err(|_| RdbError::lock_poisoned("key file"))?;
        fs::rename(
            Self::key_file_path(db_path, KeyFileType::New),
            Self::key_file_path(db_path, KeyFileType::Pub),
        )?;
        Ok(())
    }

    /// Deletes one key file of `db_path`. A missing file is not an error.
    pub fn del_key_file(&self, db_path: &Path, file_type: KeyFileType) -> RdbResult<()> {
        let _guard = self
            .file_lock
            .lock()
            .map_err(|_| RdbError::lock_poisoned("key file"))?;
        match fs::remove_file(Self::key_file_path(db_path, file_type)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(RdbError::RemoveFile(err.to_string())),
        }
    }

    /// Deletes both key files of `db_path`.
    pub fn del_rdb_secret_data_file(&self, db_path: &Path) -> RdbResult<()> {
        log::info!("deleting key files of {}", anonymous_path(db_path));
        self.del_key_file(db_path, KeyFileType::Pub)?;
        self.del_key_file(db_path, KeyFileType::New)
    }
}
