use crate::{
    cache::ErrorKind, group::GroupError, js5_compression::Js5CompressionError,
    js5_index::Js5IndexError, store::StoreError,
};
use thiserror::Error;

pub mod cache_archive;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive {0} has no reference index")]
    UnknownArchive(u8),
    #[error("group {group} is not in the reference index of archive {archive}")]
    UnknownGroup { archive: u8, group: u32 },
    #[error("no group named {name_hash:#010x} in archive {archive}")]
    UnknownName { archive: u8, name_hash: u32 },
    #[error("group ({archive}, {group}) has {field} {actual:#010x}, expected {expected:#010x}")]
    ChecksumMismatch {
        archive: u8,
        group: u32,
        field: &'static str,
        expected: u32,
        actual: u32,
    },
    #[error("group ({archive}, {group}) is {actual} bytes, expected {expected}")]
    LengthMismatch {
        archive: u8,
        group: u32,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Js5Compression(#[from] Js5CompressionError),
    #[error(transparent)]
    Js5Index(#[from] Js5IndexError),
    #[error(transparent)]
    Group(#[from] GroupError),
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::UnknownArchive(_)
            | ArchiveError::UnknownGroup { .. }
            | ArchiveError::UnknownName { .. } => ErrorKind::NotFound,
            ArchiveError::ChecksumMismatch { .. } | ArchiveError::LengthMismatch { .. } => {
                ErrorKind::Corruption
            }
            ArchiveError::Store(err) => err.kind(),
            ArchiveError::Js5Compression(err) => err.kind(),
            ArchiveError::Js5Index(_) => ErrorKind::Format,
            ArchiveError::Group(err) => err.kind(),
        }
    }
}
