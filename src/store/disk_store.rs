use super::{
    index_store::{IndexEntry, IndexStore},
    sector::{SectorLayout, SECTOR_SIZE},
    Store, StoreError, ARCHIVESET, DATA_PATH, LEGACY_DATA_PATH, MUSIC_ARCHIVE, MUSIC_DATA_PATH,
};
use crate::options::CacheOptions;
use memmap2::Mmap;
use std::{
    cmp,
    fs::File,
    path::{Path, PathBuf},
};
use tracing::{debug, trace};

/// A cache stored as one sector-chained data file plus one index file per archive.
pub struct DiskStore {
    root: PathBuf,
    data: Option<Mmap>,
    music_data: Option<Mmap>,
    index: IndexStore,
    layout: SectorLayout,
}

// Zero-length files cannot be mapped; they simply hold no sectors.
fn map_file(path: &Path) -> Result<Option<Mmap>, StoreError> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }

    Ok(Some(unsafe { Mmap::map(&file)? }))
}

impl DiskStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DiskStore, StoreError> {
        Self::open_with_options(path, &CacheOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        options: &CacheOptions,
    ) -> Result<DiskStore, StoreError> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(StoreError::CacheNotFound(root));
        }

        let js5_data_path = root.join(DATA_PATH);
        let legacy_data_path = root.join(LEGACY_DATA_PATH);

        // We check for js5_data_path first as it takes precedence.
        let (layout, data_path) = if js5_data_path.is_file() {
            (SectorLayout::Js5, js5_data_path)
        } else if legacy_data_path.is_file() {
            (SectorLayout::Legacy, legacy_data_path)
        } else {
            return Err(StoreError::CacheNotFound(root));
        };

        let index = IndexStore::new(&root);
        if layout == SectorLayout::Js5 {
            match index.load_index(ARCHIVESET) {
                Err(StoreError::UnknownArchive(_)) => {
                    return Err(StoreError::CacheNotFound(root));
                }
                result => {
                    result?;
                }
            }
        }

        let data = map_file(&data_path)?;

        let music_data_path = root.join(MUSIC_DATA_PATH);
        let music_data = if options.music_data && music_data_path.is_file() {
            map_file(&music_data_path)?
        } else {
            None
        };

        debug!(
            "opened {:?} cache at {:?} (music data: {})",
            layout,
            root,
            music_data.is_some()
        );

        Ok(DiskStore {
            root,
            data,
            music_data,
            index,
            layout,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    fn data_for(&self, archive: u8) -> &[u8] {
        let data = match &self.music_data {
            Some(music_data) if archive == MUSIC_ARCHIVE => Some(music_data),
            _ => self.data.as_ref(),
        };

        data.map(|data| &data[..]).unwrap_or(&[])
    }

    /// Reassembles the bytes of `entry` by walking its sector chain.
    pub fn read_entry(
        &self,
        archive: u8,
        group: u32,
        entry: IndexEntry,
    ) -> Result<Vec<u8>, StoreError> {
        let data = self.data_for(archive);
        let length = entry.length as usize;
        let header_size = self.layout.header_size(group);
        let payload_size = self.layout.payload_size(group);

        let mut buf = Vec::with_capacity(length);
        let mut sector = entry.sector;
        let mut chunk: u16 = 0;

        while buf.len() < length {
            if sector == 0 {
                return Err(StoreError::TruncatedChain {
                    archive,
                    group,
                    expected: length,
                    actual: buf.len(),
                });
            }

            let len = cmp::min(length - buf.len(), payload_size);
            let pos = sector as usize * SECTOR_SIZE;
            if pos + header_size + len > data.len() {
                return Err(StoreError::SectorOutOfBounds {
                    archive,
                    group,
                    sector,
                });
            }

            let header = self
                .layout
                .read_header(&data[pos..pos + header_size], group)?;

            let mismatch = |field, expected: u32, actual: u32| StoreError::SectorMismatch {
                archive,
                group,
                sector,
                field,
                expected,
                actual,
            };
            if header.group != group {
                return Err(mismatch("group", group, header.group));
            }
            if header.chunk != chunk {
                return Err(mismatch("chunk", chunk as u32, header.chunk as u32));
            }
            if header.archive != archive {
                return Err(mismatch("archive", archive as u32, header.archive as u32));
            }

            buf.extend_from_slice(&data[pos + header_size..pos + header_size + len]);

            // advance to next sector
            sector = header.next_sector;
            chunk = chunk.wrapping_add(1);
        }

        if length > 0 && sector != 0 {
            return Err(StoreError::UnterminatedChain {
                archive,
                group,
                next: sector,
            });
        }

        trace!(
            "read ({}, {}) -> {} bytes over {} sectors",
            archive,
            group,
            buf.len(),
            chunk
        );
        Ok(buf)
    }
}

impl Store for DiskStore {
    fn layout(&self) -> SectorLayout {
        self.layout
    }

    fn has_archive(&self, archive: u8) -> bool {
        self.index.has_archive(archive)
    }

    fn list(&self, archive: u8) -> Result<Vec<u32>, StoreError> {
        self.index.list(archive)
    }

    fn read(&self, archive: u8, group: u32) -> Result<Vec<u8>, StoreError> {
        let entry = self.index.lookup(archive, group)?;
        self.read_entry(archive, group, entry)
    }
}
