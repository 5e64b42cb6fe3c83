use crate::byte_reader::{ByteReader, ByteReaderError};

pub const SECTOR_SIZE: usize = 520;

const HEADER_SIZE: usize = 8;
const EXTENDED_HEADER_SIZE: usize = 10;
const DATA_SIZE: usize = SECTOR_SIZE - HEADER_SIZE;
const EXTENDED_DATA_SIZE: usize = SECTOR_SIZE - EXTENDED_HEADER_SIZE;

/// Groups with ids at or above this use the extended (4-byte group id) header.
const EXTENDED_GROUP_THRESHOLD: u32 = 65536;

/// On-disk flavour of the data file, fixed when the cache is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorLayout {
    /// `main_file_cache.dat2` with a reference-index archive.
    Js5,
    /// `main_file_cache.dat`; the archive byte is stored as `archive + 1`.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorHeader {
    pub group: u32,
    pub chunk: u16,
    pub next_sector: u32,
    pub archive: u8,
}

impl SectorLayout {
    pub fn is_extended(group: u32) -> bool {
        group >= EXTENDED_GROUP_THRESHOLD
    }

    pub fn header_size(self, group: u32) -> usize {
        if Self::is_extended(group) {
            EXTENDED_HEADER_SIZE
        } else {
            HEADER_SIZE
        }
    }

    pub fn payload_size(self, group: u32) -> usize {
        if Self::is_extended(group) {
            EXTENDED_DATA_SIZE
        } else {
            DATA_SIZE
        }
    }

    fn archive_offset(self) -> u8 {
        match self {
            SectorLayout::Js5 => 0,
            SectorLayout::Legacy => 1,
        }
    }

    /// Decodes the header at the start of `sector` for a read of `group`.
    pub fn read_header(self, sector: &[u8], group: u32) -> Result<SectorHeader, ByteReaderError> {
        let mut reader = ByteReader::new(sector);

        let group = if Self::is_extended(group) {
            reader.read_u32()?
        } else {
            reader.read_u16()? as u32
        };
        let chunk = reader.read_u16()?;
        let next_sector = reader.read_u24()?;
        let archive = reader.read_u8()?.wrapping_sub(self.archive_offset());

        Ok(SectorHeader {
            group,
            chunk,
            next_sector,
            archive,
        })
    }
}
