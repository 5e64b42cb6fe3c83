use super::{StoreError, INDEX_PATH};
use crate::byte_reader::ByteReader;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, trace};

pub const INDEX_ENTRY_SIZE: usize = 6;

/// Where a group starts in the data file and how many bytes it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub sector: u32,
    pub length: u32,
}

impl IndexEntry {
    /// Sector 0 is never part of a chain, so a record pointing at it holds no group.
    pub fn is_unused(&self) -> bool {
        self.sector == 0
    }
}

/// The decoded contents of one `main_file_cache.idxN` file.
#[derive(Debug, Default)]
pub struct ArchiveIndex {
    entries: Vec<IndexEntry>,
}

impl ArchiveIndex {
    pub fn parse(archive: u8, buf: &[u8]) -> Result<ArchiveIndex, StoreError> {
        if buf.len() % INDEX_ENTRY_SIZE != 0 {
            return Err(StoreError::InvalidFormat(format!(
                "index of archive {archive} is {} bytes, not a multiple of {INDEX_ENTRY_SIZE}",
                buf.len()
            )));
        }

        let mut reader = ByteReader::new(buf);
        let mut entries = Vec::with_capacity(buf.len() / INDEX_ENTRY_SIZE);
        while reader.remaining() > 0 {
            let length = reader.read_u24()?;
            let sector = reader.read_u24()?;
            entries.push(IndexEntry { sector, length });
        }

        Ok(ArchiveIndex { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, group: u32) -> Option<IndexEntry> {
        self.entries
            .get(group as usize)
            .copied()
            .filter(|entry| !entry.is_unused())
    }

    pub fn groups(&self) -> Vec<u32> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.is_unused())
            .map(|(group, _)| group as u32)
            .collect()
    }
}

/// Lazily loads and memoizes the index file of each archive.
pub struct IndexStore {
    root: PathBuf,
    indexes: RwLock<HashMap<u8, Arc<ArchiveIndex>>>,
}

impl IndexStore {
    pub fn new<P: AsRef<Path>>(root: P) -> IndexStore {
        IndexStore {
            root: root.as_ref().to_path_buf(),
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub fn path(&self, archive: u8) -> PathBuf {
        self.root.join(format!("{INDEX_PATH}{archive}"))
    }

    pub fn has_archive(&self, archive: u8) -> bool {
        self.indexes.read().contains_key(&archive) || self.path(archive).is_file()
    }

    pub fn load_index(&self, archive: u8) -> Result<Arc<ArchiveIndex>, StoreError> {
        if let Some(index) = self.indexes.read().get(&archive) {
            return Ok(Arc::clone(index));
        }

        let buf = match fs::read(self.path(archive)) {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::UnknownArchive(archive))
            }
            Err(e) => return Err(e.into()),
        };
        let index = Arc::new(ArchiveIndex::parse(archive, &buf)?);
        debug!("loaded index of archive {} ({} entries)", archive, index.len());

        // Another reader may have won the race; keep whichever copy landed first.
        let mut indexes = self.indexes.write();
        Ok(Arc::clone(indexes.entry(archive).or_insert(index)))
    }

    pub fn lookup(&self, archive: u8, group: u32) -> Result<IndexEntry, StoreError> {
        let entry = self
            .load_index(archive)?
            .get(group)
            .ok_or(StoreError::UnknownGroup { archive, group })?;

        trace!("index ({}, {}) -> {:?}", archive, group, entry);
        Ok(entry)
    }

    pub fn list(&self, archive: u8) -> Result<Vec<u32>, StoreError> {
        let groups = self.load_index(archive)?.groups();

        trace!("list archive {} -> {:?}", archive, groups);
        Ok(groups)
    }
}
