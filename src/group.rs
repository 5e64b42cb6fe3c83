use crate::{
    byte_reader::{ByteReader, ByteReaderError},
    cache::ErrorKind,
    js5_index::Js5IndexFile,
};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroupError {
    #[error("group is empty")]
    Empty,
    #[error("file {file} is not one of the {files} files in the group")]
    FileIndexOutOfRange { file: u32, files: usize },
    #[error("group is missing its stripe count")]
    MissingTrailer,
    #[error("trailer of {stripes} stripes for {files} files does not fit in {len} bytes")]
    TrailerTooLarge { stripes: u8, files: usize, len: usize },
    #[error("stripe {stripe} of file {file} has invalid length {length}")]
    InvalidChunkLength { stripe: usize, file: u32, length: i64 },
    #[error("stripe {stripe} of file {file} ends at {end}, past the trailer at {limit}")]
    ChunkOverrun {
        stripe: usize,
        file: u32,
        end: usize,
        limit: usize,
    },
    #[error(transparent)]
    ByteReader(#[from] ByteReaderError),
}

impl GroupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GroupError::FileIndexOutOfRange { .. } => ErrorKind::NotFound,
            GroupError::Empty => ErrorKind::Format,
            _ => ErrorKind::Corruption,
        }
    }
}

/// Splits decompressed groups into their files.
///
/// A group holding more than one file ends with a trailer: for every stripe,
/// one delta-encoded big-endian `i32` chunk length per file, followed by a
/// single byte holding the stripe count. The data before the trailer is the
/// chunks laid out stripe by stripe, file by file.
pub struct Group {}

impl Group {
    /// Returns every file of the group keyed by file id.
    pub fn unpack(
        input: Vec<u8>,
        group: &BTreeMap<u32, Js5IndexFile>,
    ) -> Result<BTreeMap<u32, Vec<u8>>, GroupError> {
        if group.is_empty() {
            return Err(GroupError::Empty);
        }

        if group.len() == 1 {
            let mut files = BTreeMap::new();
            if let Some(single_entry) = group.keys().next() {
                files.insert(*single_entry, input);
            }
            return Ok(files);
        }

        let ids: Vec<u32> = group.keys().copied().collect();
        let lengths = read_chunk_lengths(&input, &ids)?;

        let mut files: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
        let mut data_index = 0;
        for (i, len) in lengths.into_iter().enumerate() {
            files
                .entry(ids[i % ids.len()])
                .or_default()
                .extend_from_slice(&input[data_index..data_index + len]);
            data_index += len;
        }

        // Files without any chunk (zero stripes) are still present, just empty.
        for id in ids {
            files.entry(id).or_default();
        }

        Ok(files)
    }

    /// Returns the bytes of a single file. A single-file group is returned
    /// whole, whatever `file` is.
    pub fn extract(
        input: &[u8],
        group: &BTreeMap<u32, Js5IndexFile>,
        file: u32,
    ) -> Result<Vec<u8>, GroupError> {
        if group.is_empty() {
            return Err(GroupError::Empty);
        }

        if group.len() == 1 {
            return Ok(input.to_vec());
        }

        let ids: Vec<u32> = group.keys().copied().collect();
        let position = ids
            .iter()
            .position(|id| *id == file)
            .ok_or(GroupError::FileIndexOutOfRange {
                file,
                files: ids.len(),
            })?;

        let lengths = read_chunk_lengths(input, &ids)?;

        let mut data = Vec::new();
        let mut data_index = 0;
        for (i, len) in lengths.into_iter().enumerate() {
            if i % ids.len() == position {
                data.extend_from_slice(&input[data_index..data_index + len]);
            }
            data_index += len;
        }

        Ok(data)
    }
}

// Chunk lengths in storage order (stripe-major), validated against the data region.
fn read_chunk_lengths(input: &[u8], ids: &[u32]) -> Result<Vec<usize>, GroupError> {
    let stripes = *input.last().ok_or(GroupError::MissingTrailer)?;

    let trailer_len = stripes as usize * ids.len() * 4 + 1;
    if trailer_len > input.len() {
        return Err(GroupError::TrailerTooLarge {
            stripes,
            files: ids.len(),
            len: input.len(),
        });
    }
    let trailer_index = input.len() - trailer_len;

    let mut reader = ByteReader::new_at(input, trailer_index)?;
    let mut lengths = Vec::with_capacity(stripes as usize * ids.len());
    let mut end = 0;

    for stripe in 0..stripes as usize {
        let mut chunk_len: i64 = 0;
        for id in ids {
            chunk_len += reader.read_i32()? as i64;
            if chunk_len < 0 || chunk_len > i32::MAX as i64 {
                return Err(GroupError::InvalidChunkLength {
                    stripe,
                    file: *id,
                    length: chunk_len,
                });
            }

            end += chunk_len as usize;
            if end > trailer_index {
                return Err(GroupError::ChunkOverrun {
                    stripe,
                    file: *id,
                    end,
                    limit: trailer_index,
                });
            }
            lengths.push(chunk_len as usize);
        }
    }

    Ok(lengths)
}
