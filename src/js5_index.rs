use crate::byte_reader::{ByteReader, ByteReaderError};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum Js5IndexError {
    #[error("unsupported reference index protocol {0}")]
    UnsupportedProtocol(u8),
    #[error("group id overflows after group {0}")]
    IdOverflow(u32),
    #[error(transparent)]
    ByteReader(#[from] ByteReaderError),
}

pub enum Js5Protocol {
    Original = 5,
    Versioned = 6,
    Smart = 7,
}

enum Js5IndexFlags {
    Names = 0x1,
    Digests = 0x2,
    Lengths = 0x4,
    UncompressedChecksums = 0x8,
}

const DIGEST_BYTES: usize = 64;

#[derive(Debug, PartialEq, Eq)]
pub struct Js5IndexFile {
    pub name_hash: i32,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Js5IndexEntry {
    pub name_hash: i32,
    pub version: u32,
    pub checksum: u32,
    pub uncompressed_checksum: u32,
    pub length: u32,
    pub uncompressed_length: u32,
    pub digest: Vec<u8>,
    /// One past the highest file id.
    pub capacity: u32,
    pub files: BTreeMap<u32, Js5IndexFile>,
}

impl Js5IndexEntry {
    fn new() -> Js5IndexEntry {
        Js5IndexEntry {
            name_hash: -1,
            version: 0,
            checksum: 0,
            uncompressed_checksum: 0,
            length: 0,
            uncompressed_length: 0,
            digest: Vec::new(),
            capacity: 0,
            files: BTreeMap::new(),
        }
    }
}

/// The reference index of an archive, stored as a group of archive 255.
#[derive(Debug, PartialEq, Eq)]
pub struct Js5Index {
    pub protocol: u8,
    pub version: i32,
    pub has_names: bool,
    pub has_digests: bool,
    pub has_lengths: bool,
    pub has_uncompressed_checksums: bool,
    pub groups: BTreeMap<u32, Js5IndexEntry>,
    pub name_hash_table: HashMap<u32, u32>,
}

fn read_id(reader: &mut ByteReader, smart: bool) -> Result<u32, ByteReaderError> {
    if smart {
        reader.read_u32_smart()
    } else {
        Ok(reader.read_u16()? as u32)
    }
}

// Ids are stored as deltas from the previous id. Every id takes at least two
// bytes, which bounds the reservation for a corrupt count.
fn read_ids(reader: &mut ByteReader, smart: bool, count: u32) -> Result<Vec<u32>, Js5IndexError> {
    let mut ids = Vec::with_capacity((count as usize).min(reader.remaining() / 2));
    let mut prev_id: u32 = 0;
    for _ in 0..count {
        let delta = read_id(reader, smart)?;
        prev_id = prev_id
            .checked_add(delta)
            .ok_or(Js5IndexError::IdOverflow(prev_id))?;
        ids.push(prev_id);
    }
    Ok(ids)
}

impl Js5Index {
    pub fn read<T: AsRef<[u8]>>(buf: T) -> Result<Js5Index, Js5IndexError> {
        let mut reader = ByteReader::new(buf.as_ref());

        let protocol = reader.read_u8()?;
        if protocol < Js5Protocol::Original as u8 || protocol > Js5Protocol::Smart as u8 {
            return Err(Js5IndexError::UnsupportedProtocol(protocol));
        }
        let smart = protocol >= Js5Protocol::Smart as u8;

        let version = if protocol >= Js5Protocol::Versioned as u8 {
            reader.read_i32()?
        } else {
            0
        };
        let flags = reader.read_u8()?;
        let size = read_id(&mut reader, smart)?;

        trace!(
            "js5 index protocol {} version {} flags {:#x} groups {}",
            protocol,
            version,
            flags,
            size
        );

        let mut index = Js5Index {
            protocol,
            version,
            has_names: (flags & Js5IndexFlags::Names as u8) != 0,
            has_digests: (flags & Js5IndexFlags::Digests as u8) != 0,
            has_lengths: (flags & Js5IndexFlags::Lengths as u8) != 0,
            has_uncompressed_checksums: (flags & Js5IndexFlags::UncompressedChecksums as u8) != 0,
            groups: BTreeMap::new(),
            name_hash_table: HashMap::new(),
        };

        for id in read_ids(&mut reader, smart, size)? {
            index.groups.insert(id, Js5IndexEntry::new());
        }

        if index.has_names {
            for (id, group) in index.groups.iter_mut() {
                group.name_hash = reader.read_i32()?;
                index.name_hash_table.insert(group.name_hash as u32, *id);
            }
        }

        for group in index.groups.values_mut() {
            group.checksum = reader.read_u32()?;
        }

        if index.has_uncompressed_checksums {
            for group in index.groups.values_mut() {
                group.uncompressed_checksum = reader.read_u32()?;
            }
        }

        if index.has_digests {
            for group in index.groups.values_mut() {
                group.digest = reader.read_slice(DIGEST_BYTES)?.to_vec();
            }
        }

        if index.has_lengths {
            for group in index.groups.values_mut() {
                group.length = reader.read_u32()?;
                group.uncompressed_length = reader.read_u32()?;
            }
        }

        for group in index.groups.values_mut() {
            group.version = reader.read_u32()?;
        }

        let mut group_sizes = Vec::with_capacity(index.groups.len());
        for _ in 0..index.groups.len() {
            group_sizes.push(read_id(&mut reader, smart)?);
        }

        for (group, group_size) in index.groups.values_mut().zip(group_sizes) {
            for id in read_ids(&mut reader, smart, group_size)? {
                group.files.insert(id, Js5IndexFile { name_hash: -1 });
            }
            group.capacity = group.files.keys().next_back().map_or(0, |id| id + 1);
        }

        if index.has_names {
            for group in index.groups.values_mut() {
                for file in group.files.values_mut() {
                    file.name_hash = reader.read_i32()?;
                }
            }
        }

        Ok(index)
    }

    pub fn get(&self, group: u32) -> Option<&Js5IndexEntry> {
        self.groups.get(&group)
    }

    pub fn get_named(&self, name_hash: u32) -> Option<u32> {
        self.name_hash_table.get(&name_hash).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn empty(protocol: u8) -> Js5Index {
        Js5Index {
            protocol,
            version: 0,
            has_names: false,
            has_digests: false,
            has_lengths: false,
            has_uncompressed_checksums: false,
            groups: BTreeMap::new(),
            name_hash_table: HashMap::new(),
        }
    }

    #[test]
    fn test_read_empty() {
        let index = Js5Index::read([5, 0, 0, 0]).unwrap();
        assert_eq!(empty(Js5Protocol::Original as u8), index);
    }

    #[test]
    fn test_read_versioned() {
        let index = Js5Index::read([6, 0x12, 0x34, 0x56, 0x78, 0, 0, 0]).unwrap();

        let mut expected = empty(Js5Protocol::Versioned as u8);
        expected.version = 0x12345678;
        assert_eq!(expected, index);
    }

    #[test]
    fn test_read_no_flags() {
        #[rustfmt::skip]
        let buf = [
            5, 0,
            0, 2, // groups
            0, 0, 0, 5, // group ids 0, 5
            0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, // checksums
            0, 0, 0, 0, 0, 0, 0, 10, // versions
            0, 1, 0, 2, // file counts
            0, 0, // group 0: file 0
            0, 1, 0, 2, // group 5: files 1, 3
        ];
        let index = Js5Index::read(buf).unwrap();

        assert_eq!(vec![0, 5], index.groups.keys().copied().collect::<Vec<_>>());

        let group = index.get(0).unwrap();
        assert_eq!(0x01234567, group.checksum);
        assert_eq!(1, group.capacity);
        assert_eq!(vec![0], group.files.keys().copied().collect::<Vec<_>>());

        let group = index.get(5).unwrap();
        assert_eq!(0x89ABCDEF, group.checksum);
        assert_eq!(10, group.version);
        assert_eq!(4, group.capacity);
        assert_eq!(-1, group.name_hash);
        assert_eq!(vec![1, 3], group.files.keys().copied().collect::<Vec<_>>());
    }

    #[test]
    fn test_read_named_with_lengths() {
        #[rustfmt::skip]
        let buf = [
            6, 0, 0, 0, 1, 0x5,
            0, 1, // groups
            0, 3, // group id 3
            0x00, 0x00, 0x30, 0x39, // name hash 12345
            0, 0, 0, 1, // checksum
            0, 0, 0, 7, 0, 0, 0, 9, // lengths
            0, 0, 0, 2, // version
            0, 1, // file count
            0, 0, // file 0
            0xFF, 0xFF, 0xFF, 0xFE, // file name hash -2
        ];
        let index = Js5Index::read(buf).unwrap();

        assert!(index.has_names);
        assert!(index.has_lengths);
        assert_eq!(Some(3), index.get_named(12345));
        assert_eq!(None, index.get_named(1));

        let group = index.get(3).unwrap();
        assert_eq!(12345, group.name_hash);
        assert_eq!((7, 9), (group.length, group.uncompressed_length));
        assert_eq!(-2, group.files[&0].name_hash);
    }

    #[test]
    fn test_read_smart() {
        #[rustfmt::skip]
        let buf = [
            7, 0, 0, 0, 0, 0,
            0, 1, // groups
            0x80, 0x01, 0x00, 0x00, // group id 65536
            0, 0, 0, 0, // checksum
            0, 0, 0, 0, // version
            0, 1, // file count
            0, 0, // file 0
        ];
        let index = Js5Index::read(buf).unwrap();

        assert!(index.get(65536).is_some());
    }

    #[test]
    fn test_unsupported_protocol() {
        assert!(matches!(
            Js5Index::read([8, 0, 0, 0]),
            Err(Js5IndexError::UnsupportedProtocol(8))
        ));
    }

    #[test]
    fn test_huge_group_count() {
        assert!(matches!(
            Js5Index::read([7, 0, 0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]),
            Err(Js5IndexError::ByteReader(ByteReaderError::OutOfBounds { .. }))
        ));
    }

    #[test]
    fn test_huge_file_count() {
        #[rustfmt::skip]
        let buf = [
            7, 0, 0, 0, 0, 0,
            0, 1, // groups
            0, 0, // group id 0
            0, 0, 0, 0, // checksum
            0, 0, 0, 0, // version
            0xFF, 0xFF, 0xFF, 0xFF, // file count
        ];
        assert!(matches!(
            Js5Index::read(buf),
            Err(Js5IndexError::ByteReader(ByteReaderError::OutOfBounds { .. }))
        ));
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            Js5Index::read([5, 0, 0, 1]),
            Err(Js5IndexError::ByteReader(ByteReaderError::OutOfBounds { .. }))
        ));
    }
}
