use crate::{
    archive::{cache_archive::CacheArchive, ArchiveError},
    djb2::djb2_hash,
    options::CacheOptions,
    store::{store_open, Store, StoreError},
    xtea::XteaKey,
    Cache,
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, trace};

/// Broad class of a failure, independent of the module that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The cache, archive, group or file does not exist.
    NotFound,
    /// Stored bytes contradict the cache structure.
    Corruption,
    /// Bytes that cannot be parsed as the expected format.
    Format,
    /// The handle was used after `close`.
    State,
    Io,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache is closed")]
    ClosedHandle,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::ClosedHandle => ErrorKind::State,
            CacheError::Store(err) => err.kind(),
            CacheError::Archive(err) => err.kind(),
        }
    }
}

impl Cache {
    /// Open a cache from a path
    ///
    /// # Arguments
    ///
    /// * `path` - The directory holding the cache files
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Cache, CacheError> {
        Self::open_with_options(path, CacheOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        options: CacheOptions,
    ) -> Result<Cache, CacheError> {
        let store = store_open(path, &options)?;
        Ok(Self::open_with_store(store, options))
    }

    /// Open a cache from a store
    ///
    /// # Arguments
    ///
    /// * `store` - The store to use
    /// * `options` - How groups are verified
    pub fn open_with_store(store: Box<dyn Store>, options: CacheOptions) -> Cache {
        Cache {
            store: RwLock::new(Some(store)),
            archives: RwLock::new(HashMap::new()),
            options,
        }
    }

    /// Read a file from the cache
    ///
    /// # Arguments
    ///
    /// * `archive` - The archive to read from
    /// * `group` - The group to read from
    /// * `file` - The file to read, ignored for single-file groups
    /// * `xtea_keys` - The XTEA keys to use for decryption. If None, the group is not decrypted
    pub fn read(
        &self,
        archive: u8,
        group: u32,
        file: u16,
        xtea_keys: Option<XteaKey>,
    ) -> Result<Vec<u8>, CacheError> {
        self.with_archive(archive, |cache_archive, store| {
            cache_archive.read(group, file, xtea_keys, store)
        })
    }

    /// Read a file from the cache using a named group
    ///
    /// # Arguments
    ///
    /// * `archive` - The archive to read from
    /// * `group` - The name of the group, looked up by its djb2 hash
    /// * `file` - The file to read
    /// * `xtea_keys` - The XTEA keys to use for decryption. If None, the group is not decrypted
    pub fn read_named_group(
        &self,
        archive: u8,
        group: &str,
        file: u16,
        xtea_keys: Option<XteaKey>,
    ) -> Result<Vec<u8>, CacheError> {
        let name_hash = djb2_hash(group);
        self.with_archive(archive, |cache_archive, store| {
            cache_archive.read_named_group(name_hash, file, xtea_keys, store)
        })
    }

    /// Read every file of a group, keyed by file id.
    pub fn read_group(
        &self,
        archive: u8,
        group: u32,
        xtea_keys: Option<XteaKey>,
    ) -> Result<BTreeMap<u32, Vec<u8>>, CacheError> {
        self.with_archive(archive, |cache_archive, store| {
            cache_archive.read_group(group, xtea_keys, store)
        })
    }

    /// Group ids present in the index file of `archive`.
    pub fn list(&self, archive: u8) -> Result<Vec<u32>, CacheError> {
        let store = self.store.read();
        let store = store.as_deref().ok_or(CacheError::ClosedHandle)?;

        let groups = store.list(archive)?;
        trace!("archive {} lists {} groups", archive, groups.len());
        Ok(groups)
    }

    /// Release the store and every loaded reference index.
    ///
    /// Waits for in-flight reads. Any later call, including another `close`,
    /// fails with [`CacheError::ClosedHandle`].
    pub fn close(&self) -> Result<(), CacheError> {
        let mut store = self.store.write();
        if store.take().is_none() {
            return Err(CacheError::ClosedHandle);
        }
        self.archives.write().clear();

        debug!("closed cache");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.store.read().is_none()
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    // Holds the store read lock for the whole read so `close` cannot unmap under it.
    fn with_archive<T, F>(&self, archive: u8, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&CacheArchive, &dyn Store) -> Result<T, ArchiveError>,
    {
        let store = self.store.read();
        let store = store.as_deref().ok_or(CacheError::ClosedHandle)?;

        let cache_archive = self.archive(archive, store)?;
        Ok(f(&*cache_archive, store)?)
    }

    fn archive(&self, archive: u8, store: &dyn Store) -> Result<Arc<CacheArchive>, CacheError> {
        if let Some(cache_archive) = self.archives.read().get(&archive) {
            return Ok(Arc::clone(cache_archive));
        }

        // Loaded without holding the lock; a concurrent loader may win the insert.
        let loaded = Arc::new(CacheArchive::load(archive, store, &self.options)?);
        let mut archives = self.archives.write();
        Ok(Arc::clone(archives.entry(archive).or_insert(loaded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_cache_is_send_sync() {
        assert_send_sync::<Cache>();
    }

    #[test]
    fn test_closed_handle_kind() {
        assert_eq!(ErrorKind::State, CacheError::ClosedHandle.kind());
        assert_eq!(
            ErrorKind::NotFound,
            CacheError::from(StoreError::UnknownArchive(3)).kind()
        );
        assert_eq!(
            ErrorKind::Corruption,
            CacheError::from(ArchiveError::ChecksumMismatch {
                archive: 2,
                group: 10,
                field: "checksum",
                expected: 1,
                actual: 2,
            })
            .kind()
        );
    }
}
