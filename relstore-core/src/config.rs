//! Store configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use zeroize::Zeroizing;

use crate::error::{RdbError, RdbResult};
use crate::sql_utils::anonymous_path;

/// Default number of read-only connections.
pub const DEFAULT_READ_CONNECTION_COUNT: usize = 4;
/// Upper bound accepted for `read_connection_count`.
pub const MAX_READ_CONNECTION_COUNT: usize = 64;
/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

/// Where the database lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Private in-memory database. Only a single (write) connection exists.
    Memory,
    /// On-disk database file.
    #[default]
    Disk,
}

/// Engine journal mode applied on the write connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalMode {
    /// Rollback journal, deleted at commit.
    Delete,
    /// Rollback journal, truncated at commit.
    Truncate,
    /// Rollback journal, header zeroed at commit.
    Persist,
    /// Rollback journal kept in memory.
    Memory,
    /// Write-ahead log.
    #[default]
    Wal,
    /// No journal.
    Off,
}

/// Data protection class of the store. Forwarded to the sync backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, Display, EnumString)]
pub enum SecurityLevel {
    /// Lowest protection.
    #[default]
    S1,
    /// Low protection.
    S2,
    /// High protection.
    S3,
    /// Highest protection.
    S4,
}

/// How tables of this store are distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DistributedType {
    /// Device-to-device replication.
    #[default]
    Device,
    /// Cloud replication.
    Cloud,
}

/// Configuration consumed when a store is opened.
///
/// Unknown JSON fields are rejected; missing ones take their defaults.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RdbStoreConfig {
    /// Store name, used for logging and as the sync identity.
    pub name: String,
    /// Database file path. Ignored for [`StorageMode::Memory`].
    pub path: PathBuf,
    /// Memory or disk.
    pub storage_mode: StorageMode,
    /// Journal mode for the write connection.
    pub journal_mode: JournalMode,
    /// Open every connection read-only and reject mutations.
    pub read_only: bool,
    /// Distribution kind forwarded to the sync backend.
    pub distributed_type: DistributedType,
    /// Protection class forwarded to the sync backend.
    pub security_level: SecurityLevel,
    /// Encrypt with a key managed by the security manager.
    pub encrypt: bool,
    /// Number of read-only connections (0 routes reads to the writer).
    pub read_connection_count: usize,
    /// Page size applied before the first table is created.
    pub page_size: u32,
    /// Application bundle, part of the root key alias.
    pub bundle_name: String,
    /// Engine busy-handler timeout.
    pub busy_timeout_ms: u64,
    /// Bounded wait for a connection or the transaction token.
    pub acquire_timeout_ms: u64,
    /// Cloud-sync debounce interval.
    pub sync_interval_ms: u64,
    /// Caller-supplied raw key. Never serialized.
    #[serde(skip)]
    pub encrypt_key: Option<Zeroizing<Vec<u8>>>,
}

impl Default for RdbStoreConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: PathBuf::new(),
            storage_mode: StorageMode::Disk,
            journal_mode: JournalMode::Wal,
            read_only: false,
            distributed_type: DistributedType::Device,
            security_level: SecurityLevel::S1,
            encrypt: false,
            read_connection_count: DEFAULT_READ_CONNECTION_COUNT,
            page_size: DEFAULT_PAGE_SIZE,
            bundle_name: String::new(),
            busy_timeout_ms: 2_000,
            acquire_timeout_ms: 2_000,
            sync_interval_ms: 2_000,
            encrypt_key: None,
        }
    }
}

impl RdbStoreConfig {
    /// On-disk store at `path`; the name defaults to the file name.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path,
            ..Self::default()
        }
    }

    /// In-memory store.
    #[must_use]
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: PathBuf::from(relstore_db::IN_MEMORY_PATH),
            storage_mode: StorageMode::Memory,
            read_connection_count: 0,
            ..Self::default()
        }
    }

    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`RdbError::InvalidArgs`] on malformed JSON or unknown fields.
    pub fn from_json(json: &str) -> RdbResult<Self> {
        serde_json::from_str(json).map_err(|e| RdbError::InvalidArgs(e.to_string()))
    }

    /// Sets the journal mode.
    #[must_use]
    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Sets the read connection count.
    #[must_use]
    pub fn with_read_connection_count(mut self, count: usize) -> Self {
        self.read_connection_count = count;
        self
    }

    /// Opens the store read-only.
    #[must_use]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Enables managed encryption.
    #[must_use]
    pub fn with_encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    /// Uses a caller-supplied raw key.
    #[must_use]
    pub fn with_encrypt_key(mut self, key: Vec<u8>) -> Self {
        self.encrypt_key = Some(Zeroizing::new(key));
        self
    }

    /// Sets the security level.
    #[must_use]
    pub fn with_security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = level;
        self
    }

    /// Sets the bundle name.
    #[must_use]
    pub fn with_bundle_name(mut self, bundle_name: impl Into<String>) -> Self {
        self.bundle_name = bundle_name.into();
        self
    }

    /// Sets the connection / transaction-token acquisition timeout.
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = duration_to_millis(timeout);
        self
    }

    /// Sets the engine busy timeout.
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = duration_to_millis(timeout);
        self
    }

    /// Sets the cloud-sync debounce interval.
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_ms = duration_to_millis(interval);
        self
    }

    /// Whether the store lives in memory.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.storage_mode == StorageMode::Memory
    }

    /// Whether the store is encrypted (managed or caller key).
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.encrypt || self.encrypt_key.as_ref().is_some_and(|k| !k.is_empty())
    }

    /// Read connections the pool will create.
    #[must_use]
    pub fn effective_read_connection_count(&self) -> usize {
        if self.is_memory() {
            0
        } else {
            self.read_connection_count
        }
    }

    /// Directory holding the database file.
    #[must_use]
    pub fn db_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Engine busy timeout.
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Acquisition timeout.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Debounce interval.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Rejects unusable configurations before any file is touched.
    ///
    /// # Errors
    ///
    /// [`RdbError::EmptyFileName`] / [`RdbError::InvalidFilePath`] for bad
    /// paths, [`RdbError::InvalidArgs`] for out-of-range sizes.
    pub fn validate(&self) -> RdbResult<()> {
        if !self.is_memory() {
            if self.path.as_os_str().is_empty() {
                return Err(RdbError::EmptyFileName);
            }
            if !self.path.is_absolute() || self.path.file_name().is_none() {
                return Err(RdbError::InvalidFilePath);
            }
        }
        if self.read_connection_count > MAX_READ_CONNECTION_COUNT {
            return Err(RdbError::InvalidArgs(format!(
                "read_connection_count {} exceeds {MAX_READ_CONNECTION_COUNT}",
                self.read_connection_count
            )));
        }
        if !self.page_size.is_power_of_two() || !(512..=65_536).contains(&self.page_size) {
            return Err(RdbError::InvalidArgs(format!(
                "page_size {} is not a power of two in 512..=65536",
                self.page_size
            )));
        }
        if self.is_memory() && self.is_encrypted() {
            return Err(RdbError::NotSupport("encrypted in-memory store".to_string()));
        }
        Ok(())
    }
}

const fn duration_to_millis(d: Duration) -> u64 {
    let millis = d.as_millis();
    if millis > u64::MAX as u128 {
        u64::MAX
    } else {
        millis as u64
    }
}

impl fmt::Debug for RdbStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RdbStoreConfig")
            .field("name", &self.name)
            .field("path", &anonymous_path(&self.path))
            .field("storage_mode", &self.storage_mode)
            .field("journal_mode", &self.journal_mode)
            .field("read_only", &self.read_only)
            .field("security_level", &self.security_level)
            .field("encrypt", &self.encrypt)
            .field("encrypt_key", &self.encrypt_key.as_ref().map(|_| "<redacted>"))
            .field("read_connection_count", &self.read_connection_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RdbStoreConfig::new("/data/app/store.db");
        assert_eq!(config.name, "store.db");
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert_eq!(config.read_connection_count, DEFAULT_READ_CONNECTION_COUNT);
        assert_eq!(config.db_dir(), Path::new("/data/app"));
        assert!(!config.is_encrypted());
        config.validate().expect("valid");
    }

    #[test]
    fn test_memory_has_no_readers() {
        let config = RdbStoreConfig::memory("mem").with_read_connection_count(8);
        assert_eq!(config.effective_read_connection_count(), 0);
        config.validate().expect("valid");
    }

    #[test]
    fn test_from_json_applies_defaults() {
        let config = RdbStoreConfig::from_json(
            r#"{"name":"notes","path":"/tmp/notes.db","journal_mode":"DELETE","security_level":"S3"}"#,
        )
        .expect("parse");
        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert_eq!(config.security_level, SecurityLevel::S3);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.encrypt_key.is_none());
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        match RdbStoreConfig::from_json(r#"{"path":"/tmp/x.db","bogus":1}"#) {
            Err(RdbError::InvalidArgs(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_paths() {
        match RdbStoreConfig::default().validate() {
            Err(RdbError::EmptyFileName) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        match RdbStoreConfig::new("relative.db").validate() {
            Err(RdbError::InvalidFilePath) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_journal_mode_strings() {
        assert_eq!(JournalMode::Wal.to_string(), "WAL");
        assert_eq!("delete".parse::<JournalMode>().expect("parse"), JournalMode::Delete);
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = RdbStoreConfig::new("/data/app/store.db").with_encrypt_key(vec![1, 2, 3]);
        let rendered = format!("{config:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("/data/app"));
    }
}
