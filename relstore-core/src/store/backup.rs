use std::fs;
use std::path::{Path, PathBuf};

use relstore_db::{cipher, Connection};
use zeroize::Zeroizing;

use super::{optional_key, RdbStore};
use crate::connection::{attach, Attachment};
use crate::error::{RdbError, RdbResult};
use crate::security::KeyFileType;
use crate::sql_utils::anonymous_path;

const BACKUP_ALIAS: &str = "backup";

impl RdbStore {
    /// Resolves a backup file name: a bare name lands next to the store,
    /// anything else must name a file in an existing directory.
    fn resolve_backup_path(&self, path: &Path) -> RdbResult<PathBuf> {
        let text = path.to_string_lossy();
        if text.is_empty() {
            return Err(RdbError::EmptyFileName);
        }
        if text.ends_with('/') || text.ends_with(std::path::MAIN_SEPARATOR) {
            return Err(RdbError::InvalidFilePath);
        }
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                if !parent.is_dir() {
                    return Err(RdbError::InvalidFilePath);
                }
                Ok(path.to_path_buf())
            }
            _ => Ok(self.config.db_dir().join(path)),
        }
    }

    /// Writes a full copy of the database to `path`.
    ///
    /// The copy is encrypted with `dest_key` when given, otherwise with the
    /// store's own key. An existing file at `path` is kept aside and put back
    /// if the backup fails.
    ///
    /// # Errors
    ///
    /// [`RdbError::EmptyFileName`] / [`RdbError::InvalidFilePath`] for bad
    /// targets, [`RdbError::NotSupport`] for a keyed backup on a build
    /// without page encryption, or the engine error of the copy.
    pub fn backup(&self, path: &Path, dest_key: Option<&[u8]>) -> RdbResult<()> {
        let target = self.resolve_backup_path(path)?;
        if target == self.config.path {
            return Err(RdbError::InvalidFilePath);
        }

        let kept = if target.exists() {
            let mut name = target.clone().into_os_string();
            name.push("temp");
            let kept = PathBuf::from(name);
            fs::rename(&target, &kept)?;
            Some(kept)
        } else {
            None
        };

        let result = self.inner_backup(&target, dest_key);
        match (&result, kept) {
            (Ok(()), Some(kept)) => {
                if let Err(err) = fs::remove_file(&kept) {
                    log::warn!("failed to remove previous backup: {err}");
                }
            }
            (Err(err), kept) => {
                log::error!("backup to {} failed: {err}", anonymous_path(&target));
                if target.exists() {
                    if let Err(err) = fs::remove_file(&target) {
                        log::warn!(
                            "failed to remove partial backup {}: {err}",
                            anonymous_path(&target)
                        );
                    }
                }
                if let Some(kept) = kept {
                    fs::rename(&kept, &target)?;
                }
            }
            (Ok(()), None) => {}
        }
        result
    }

    fn inner_backup(&self, target: &Path, dest_key: Option<&[u8]>) -> RdbResult<()> {
        let store_key = self.pool.current_key()?;
        let export_key = optional_key(dest_key).or(store_key);

        let lease = self.pool.acquire_write()?;
        let Some(key) = export_key else {
            let dest = Connection::open(target, false)?;
            lease.raw().backup_to(&dest)?;
            log::info!("backed up to {}", anonymous_path(target));
            return Ok(());
        };

        if !cipher::cipher_available(lease.raw())? {
            return Err(RdbError::NotSupport("encrypted backup".to_string()));
        }
        attach(lease.raw(), BACKUP_ALIAS, target, Some(&key))?;
        let exported = lease
            .raw()
            .execute_batch(&format!("SELECT sqlcipher_export('{BACKUP_ALIAS}')"));
        let detached = lease
            .raw()
            .execute_batch(&format!("DETACH DATABASE {BACKUP_ALIAS}"));
        exported?;
        detached?;
        log::info!("exported encrypted backup to {}", anonymous_path(target));
        Ok(())
    }

    /// Replaces the database with the backup at `path` and reopens every
    /// connection on it. `key` is the backup's key; `None` assumes the
    /// store's current key.
    ///
    /// # Errors
    ///
    /// [`RdbError::NotSupport`] for in-memory stores,
    /// [`RdbError::InvalidFilePath`] for a missing backup or the store's own
    /// file, [`RdbError::TransactionInExecute`] while a transaction is open.
    /// On failure the original database stays in place.
    pub fn restore(&self, path: &Path, key: Option<&[u8]>) -> RdbResult<()> {
        if self.config.is_memory() {
            return Err(RdbError::NotSupport("restore of an in-memory store".to_string()));
        }
        self.check_writable()?;
        let backup = self.resolve_backup_path(path)?;
        if !backup.exists() || backup == self.config.path {
            return Err(RdbError::InvalidFilePath);
        }
        self.pool
            .change_db_file_for_restore(&self.config.path, &backup, optional_key(key))
    }

    /// Attaches the database at `path` as `alias` on every connection.
    ///
    /// # Errors
    ///
    /// [`RdbError::NotSupportedAttachInWalMode`] on a WAL store, or the
    /// engine error of the `ATTACH`.
    pub fn attach(&self, alias: &str, path: &Path, key: Option<&[u8]>) -> RdbResult<()> {
        if alias.trim().is_empty() {
            return Err(RdbError::InvalidArgs("attach alias is empty".to_string()));
        }
        if path.as_os_str().is_empty() {
            return Err(RdbError::EmptyFileName);
        }
        self.check_attach()?;
        {
            let lease = self.pool.acquire_write()?;
            attach(lease.raw(), alias, path, key)?;
        }
        self.pool.record_attachment(Attachment {
            alias: alias.to_string(),
            path: path.to_path_buf(),
            key: key.map(|k| Zeroizing::new(k.to_vec())),
        })?;
        log::info!("attached {} as {alias}", anonymous_path(path));
        Ok(())
    }

    /// Re-encrypts a managed store under a freshly generated key.
    ///
    /// The new key is persisted as the pending key file first and promoted
    /// once the database is rekeyed; on failure the old key stays active.
    ///
    /// # Errors
    ///
    /// [`RdbError::NotSupport`] for stores whose key is not managed by the
    /// security manager.
    pub fn rotate_encrypt_key(&self) -> RdbResult<()> {
        let caller_key = self.config.encrypt_key.as_ref().is_some_and(|k| !k.is_empty());
        let security = match &self.security {
            Some(security) if self.config.encrypt && !caller_key => security,
            _ => return Err(RdbError::NotSupport("store key is not managed".to_string())),
        };

        let path = &self.config.path;
        security.save_secret_key_to_file(path, KeyFileType::New)?;
        let rotated = security.load_secret_key_from_file(path, KeyFileType::New)?;
        if let Err(err) = self.pool.change_encrypt_key(rotated.to_key()) {
            if let Err(cleanup) = security.del_key_file(path, KeyFileType::New) {
                log::warn!("failed to delete pending key file: {cleanup}");
            }
            return Err(err);
        }
        security.update_key_file(path)
    }

    /// Re-encrypts a store opened with a caller-supplied key.
    ///
    /// # Errors
    ///
    /// [`RdbError::InvalidArgs`] for an empty key, [`RdbError::NotSupport`]
    /// when the store is not encrypted.
    pub fn change_encrypt_key(&self, new_key: &[u8]) -> RdbResult<()> {
        if new_key.is_empty() {
            return Err(RdbError::InvalidArgs("encryption key is empty".to_string()));
        }
        if self.pool.current_key()?.is_none() {
            return Err(RdbError::NotSupport("store is not encrypted".to_string()));
        }
        self.pool.change_encrypt_key(Zeroizing::new(new_key.to_vec()))
    }
}
