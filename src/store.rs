use self::{disk_store::DiskStore, sector::SectorLayout};
use crate::{byte_reader::ByteReaderError, cache::ErrorKind, options::CacheOptions};
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub mod disk_store;
pub mod index_store;
pub mod sector;

pub const DATA_PATH: &str = "main_file_cache.dat2";
pub const LEGACY_DATA_PATH: &str = "main_file_cache.dat";
pub const MUSIC_DATA_PATH: &str = "main_file_cache.dat2m";
pub const INDEX_PATH: &str = "main_file_cache.idx";

/// The archive whose groups are the reference indexes of every other archive.
pub const ARCHIVESET: u8 = 255;
pub const MUSIC_ARCHIVE: u8 = 40;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no cache found at {0}")]
    CacheNotFound(PathBuf),
    #[error("invalid cache format: {0}")]
    InvalidFormat(String),
    #[error("archive {0} not found")]
    UnknownArchive(u8),
    #[error("group {group} not found in archive {archive}")]
    UnknownGroup { archive: u8, group: u32 },
    #[error("sector {sector} of group ({archive}, {group}) has {field} {actual}, expected {expected}")]
    SectorMismatch {
        archive: u8,
        group: u32,
        sector: u32,
        field: &'static str,
        expected: u32,
        actual: u32,
    },
    #[error("sector {sector} of group ({archive}, {group}) is outside the data file")]
    SectorOutOfBounds { archive: u8, group: u32, sector: u32 },
    #[error("sector chain of group ({archive}, {group}) ended after {actual} of {expected} bytes")]
    TruncatedChain {
        archive: u8,
        group: u32,
        expected: usize,
        actual: usize,
    },
    #[error("sector chain of group ({archive}, {group}) continues to sector {next} past its length")]
    UnterminatedChain { archive: u8, group: u32, next: u32 },
    #[error(transparent)]
    ByteReader(#[from] ByteReaderError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::CacheNotFound(_)
            | StoreError::UnknownArchive(_)
            | StoreError::UnknownGroup { .. } => ErrorKind::NotFound,
            StoreError::InvalidFormat(_) | StoreError::ByteReader(_) => ErrorKind::Format,
            StoreError::SectorMismatch { .. }
            | StoreError::SectorOutOfBounds { .. }
            | StoreError::TruncatedChain { .. }
            | StoreError::UnterminatedChain { .. } => ErrorKind::Corruption,
            StoreError::Io(_) => ErrorKind::Io,
        }
    }
}

/// The store is responsible for reading the raw (still compressed) groups of the various RS2 formats.
pub trait Store: Send + Sync {
    fn layout(&self) -> SectorLayout;
    fn has_archive(&self, archive: u8) -> bool;
    fn list(&self, archive: u8) -> Result<Vec<u32>, StoreError>;
    fn read(&self, archive: u8, group: u32) -> Result<Vec<u8>, StoreError>;
}

pub fn store_open<P: AsRef<Path>>(
    path: P,
    options: &CacheOptions,
) -> Result<Box<dyn Store>, StoreError> {
    Ok(Box::new(DiskStore::open_with_options(path, options)?))
}
