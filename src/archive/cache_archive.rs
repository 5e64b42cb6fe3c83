use super::ArchiveError;
use crate::{
    group::Group,
    js5_compression::Js5Compression,
    js5_index::{Js5Index, Js5IndexEntry},
    options::CacheOptions,
    store::{sector::SectorLayout, Store, StoreError, ARCHIVESET},
    xtea::XteaKey,
};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// One archive of a cache: its reference index plus the read pipeline from
/// packed group to file bytes.
///
/// Archive 255 and every archive of a legacy cache have no reference index;
/// their groups are read as single-file groups.
pub struct CacheArchive {
    archive: u8,
    index: Option<Js5Index>,
    verify_checksums: bool,
}

impl CacheArchive {
    pub fn load(
        archive: u8,
        store: &dyn Store,
        options: &CacheOptions,
    ) -> Result<CacheArchive, ArchiveError> {
        if !store.has_archive(archive) {
            return Err(StoreError::UnknownArchive(archive).into());
        }

        let index = if archive == ARCHIVESET || store.layout() == SectorLayout::Legacy {
            None
        } else {
            let compressed = match store.read(ARCHIVESET, archive as u32) {
                Ok(compressed) => compressed,
                Err(StoreError::UnknownGroup { .. }) => {
                    return Err(ArchiveError::UnknownArchive(archive))
                }
                Err(err) => return Err(err.into()),
            };
            let buf = Js5Compression::uncompress(compressed, None)?;
            let index = Js5Index::read(buf)?;

            debug!(
                "loaded reference index of archive {} ({} groups, version {})",
                archive,
                index.groups.len(),
                index.version
            );
            Some(index)
        };

        Ok(CacheArchive {
            archive,
            index,
            verify_checksums: options.verify_checksums,
        })
    }

    pub fn archive(&self) -> u8 {
        self.archive
    }

    pub fn index(&self) -> Option<&Js5Index> {
        self.index.as_ref()
    }

    pub fn read(
        &self,
        group: u32,
        file: u16,
        key: Option<XteaKey>,
        store: &dyn Store,
    ) -> Result<Vec<u8>, ArchiveError> {
        let buf = self.read_unpacked(group, key, store)?;
        match self.entry(group)? {
            Some(entry) => Ok(Group::extract(&buf, &entry.files, file as u32)?),
            None => Ok(buf),
        }
    }

    pub fn read_named_group(
        &self,
        name_hash: u32,
        file: u16,
        key: Option<XteaKey>,
        store: &dyn Store,
    ) -> Result<Vec<u8>, ArchiveError> {
        let group = self.group_by_name(name_hash)?;
        self.read(group, file, key, store)
    }

    /// Every file of a group, keyed by file id.
    pub fn read_group(
        &self,
        group: u32,
        key: Option<XteaKey>,
        store: &dyn Store,
    ) -> Result<BTreeMap<u32, Vec<u8>>, ArchiveError> {
        let buf = self.read_unpacked(group, key, store)?;
        match self.entry(group)? {
            Some(entry) => Ok(Group::unpack(buf, &entry.files)?),
            None => Ok(BTreeMap::from([(0, buf)])),
        }
    }

    pub fn group_by_name(&self, name_hash: u32) -> Result<u32, ArchiveError> {
        self.index
            .as_ref()
            .and_then(|index| index.get_named(name_hash))
            .ok_or(ArchiveError::UnknownName {
                archive: self.archive,
                name_hash,
            })
    }

    // None when the archive carries no reference index.
    fn entry(&self, group: u32) -> Result<Option<&Js5IndexEntry>, ArchiveError> {
        match &self.index {
            None => Ok(None),
            Some(index) => index
                .get(group)
                .map(Some)
                .ok_or(ArchiveError::UnknownGroup {
                    archive: self.archive,
                    group,
                }),
        }
    }

    fn read_unpacked(
        &self,
        group: u32,
        key: Option<XteaKey>,
        store: &dyn Store,
    ) -> Result<Vec<u8>, ArchiveError> {
        let entry = self.entry(group)?;
        let compressed = self.read_packed(group, store)?;

        if let Some(entry) = entry {
            self.verify_compressed(&compressed, group, entry)?;
        }

        let buf = Js5Compression::uncompress(compressed, key)?;

        if let Some(entry) = entry {
            self.verify_uncompressed(&buf, group, entry)?;
        }

        trace!(
            "unpacked group ({}, {}) to {} bytes",
            self.archive,
            group,
            buf.len()
        );
        Ok(buf)
    }

    fn read_packed(&self, group: u32, store: &dyn Store) -> Result<Vec<u8>, ArchiveError> {
        Ok(store.read(self.archive, group)?)
    }

    // The checksum covers the envelope without its version trailer.
    fn verify_compressed(
        &self,
        buf: &[u8],
        group: u32,
        entry: &Js5IndexEntry,
    ) -> Result<(), ArchiveError> {
        if !self.verify_checksums {
            return Ok(());
        }

        let checksum = crc32fast::hash(&buf[..Js5Compression::packed_len(buf)]);
        self.check_checksum(group, "checksum", entry.checksum, checksum)
    }

    fn verify_uncompressed(
        &self,
        buf: &[u8],
        group: u32,
        entry: &Js5IndexEntry,
    ) -> Result<(), ArchiveError> {
        let index = match &self.index {
            Some(index) if self.verify_checksums => index,
            _ => return Ok(()),
        };

        if index.has_lengths && entry.uncompressed_length as usize != buf.len() {
            return Err(ArchiveError::LengthMismatch {
                archive: self.archive,
                group,
                expected: entry.uncompressed_length as usize,
                actual: buf.len(),
            });
        }

        if index.has_uncompressed_checksums {
            let checksum = crc32fast::hash(buf);
            self.check_checksum(
                group,
                "uncompressed checksum",
                entry.uncompressed_checksum,
                checksum,
            )?;
        }

        Ok(())
    }

    fn check_checksum(
        &self,
        group: u32,
        field: &'static str,
        expected: u32,
        actual: u32,
    ) -> Result<(), ArchiveError> {
        if expected == actual {
            return Ok(());
        }

        warn!(
            "group ({}, {}) {} mismatch: expected {:#010x}, got {:#010x}",
            self.archive, group, field, expected, actual
        );
        Err(ArchiveError::ChecksumMismatch {
            archive: self.archive,
            group,
            field,
            expected,
            actual,
        })
    }
}
