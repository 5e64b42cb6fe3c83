use crate::{
    byte_reader::{ByteReader, ByteReaderError},
    cache::ErrorKind,
    xtea::{is_zero_key, xtea_decipher, XteaKey},
};
use bzip2::read::BzDecoder;
use flate2::bufread::GzDecoder;
use lzma_rs::{decompress, lzma_decompress_with_options};
use std::{
    borrow::Cow,
    io::{self, Read},
};
use thiserror::Error;

const COMPRESSION_TYPE_NONE: u8 = 0;
const COMPRESSION_TYPE_BZIP: u8 = 1;
const COMPRESSION_TYPE_GZIP: u8 = 2;
const COMPRESSION_TYPE_LZMA: u8 = 3;

const HEADER_SIZE: usize = 5;
const BZIP2_HEADER: &[u8] = b"BZh1";
// Upper bound on the up-front allocation for a declared length.
const MAX_PREALLOCATION: usize = 1 << 20;

#[derive(Error, Debug)]
pub enum Js5CompressionError {
    #[error("data truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("unsupported compression type {0}")]
    UnsupportedCompression(u8),
    #[error("length is negative: {0}")]
    NegativeLength(i32),
    #[error("{compression:?} decompression failed: {reason}")]
    DecompressionError {
        compression: Compression,
        reason: DecompressionFailure,
    },
    #[error(transparent)]
    ByteReader(#[from] ByteReaderError),
}

impl Js5CompressionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Js5CompressionError::DecompressionError { .. } => ErrorKind::Corruption,
            _ => ErrorKind::Format,
        }
    }
}

#[derive(Error, Debug)]
pub enum DecompressionFailure {
    #[error("decompressed to {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("{0}")]
    Codec(String),
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Compression {
    None,
    Bzip2,
    Gzip,
    Lzma,
}

impl TryFrom<u8> for Compression {
    type Error = Js5CompressionError;

    fn try_from(type_id: u8) -> Result<Self, Self::Error> {
        match type_id {
            COMPRESSION_TYPE_NONE => Ok(Compression::None),
            COMPRESSION_TYPE_BZIP => Ok(Compression::Bzip2),
            COMPRESSION_TYPE_GZIP => Ok(Compression::Gzip),
            COMPRESSION_TYPE_LZMA => Ok(Compression::Lzma),
            _ => Err(Js5CompressionError::UnsupportedCompression(type_id)),
        }
    }
}

/// Header of a packed group.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct CompressionEnvelope {
    pub compression: Compression,
    pub compressed_length: usize,
    pub uncompressed_length: usize,
    /// Trailing group version, present when two bytes follow the payload.
    pub version: Option<u16>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Decoded {
    pub envelope: CompressionEnvelope,
    pub data: Vec<u8>,
}

pub struct Js5Compression {}

impl Js5Compression {
    pub fn uncompress<T: AsRef<[u8]>>(
        input: T,
        xtea_keys: Option<XteaKey>,
    ) -> Result<Vec<u8>, Js5CompressionError> {
        Ok(Self::decode(input, xtea_keys)?.data)
    }

    /// Length of the envelope without its version trailer. Falls back to the
    /// whole input when the header can't be read.
    pub fn packed_len(input: &[u8]) -> usize {
        let mut reader = ByteReader::new(input);
        let (Ok(type_id), Ok(len)) = (reader.read_u8(), reader.read_i32()) else {
            return input.len();
        };

        let uncompressed_len_size = if type_id == COMPRESSION_TYPE_NONE { 0 } else { 4 };
        let packed_len = HEADER_SIZE + len.max(0) as usize + uncompressed_len_size;
        packed_len.min(input.len())
    }

    pub fn decode<T: AsRef<[u8]>>(
        input: T,
        xtea_keys: Option<XteaKey>,
    ) -> Result<Decoded, Js5CompressionError> {
        let input = input.as_ref();
        if input.len() < HEADER_SIZE {
            return Err(Js5CompressionError::Truncated {
                needed: HEADER_SIZE,
                available: input.len(),
            });
        }

        let mut reader = ByteReader::new(input);
        let compression = Compression::try_from(reader.read_u8()?)?;

        let len = reader.read_i32()?;
        if len < 0 {
            return Err(Js5CompressionError::NegativeLength(len));
        }
        let len = len as usize;

        // The uncompressed length is enciphered along with the payload.
        let enciphered_len = match compression {
            Compression::None => len,
            _ => len + 4,
        };
        let body = reader.read_remaining();
        if body.len() < enciphered_len {
            return Err(Js5CompressionError::Truncated {
                needed: enciphered_len,
                available: body.len(),
            });
        }

        let version = match &body[enciphered_len..] {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        };

        let plain_text = match xtea_keys.filter(|key| !is_zero_key(key)) {
            Some(key) => Cow::Owned(xtea_decipher(&body[..enciphered_len], &key)?),
            None => Cow::Borrowed(&body[..enciphered_len]),
        };

        if compression == Compression::None {
            return Ok(Decoded {
                envelope: CompressionEnvelope {
                    compression,
                    compressed_length: len,
                    uncompressed_length: len,
                    version,
                },
                data: plain_text.into_owned(),
            });
        }

        let mut plain_text_reader = ByteReader::new(&plain_text);
        let uncompressed_len = plain_text_reader.read_i32()?;
        if uncompressed_len < 0 {
            return Err(Js5CompressionError::NegativeLength(uncompressed_len));
        }
        let uncompressed_len = uncompressed_len as usize;
        let payload = plain_text_reader.read_remaining();

        let data = decompress(compression, payload, uncompressed_len)?;

        Ok(Decoded {
            envelope: CompressionEnvelope {
                compression,
                compressed_length: len,
                uncompressed_length: uncompressed_len,
                version,
            },
            data,
        })
    }
}

fn decompress(
    compression: Compression,
    payload: &[u8],
    expected: usize,
) -> Result<Vec<u8>, Js5CompressionError> {
    match compression {
        Compression::None => check_length(compression, payload.to_vec(), expected),
        Compression::Bzip2 => decompress_bzip2(payload, expected),
        Compression::Gzip => decompress_gzip(payload, expected),
        Compression::Lzma => decompress_lzma(payload, expected),
    }
}

fn check_length(
    compression: Compression,
    data: Vec<u8>,
    expected: usize,
) -> Result<Vec<u8>, Js5CompressionError> {
    if data.len() != expected {
        return Err(Js5CompressionError::DecompressionError {
            compression,
            reason: DecompressionFailure::LengthMismatch {
                expected,
                actual: data.len(),
            },
        });
    }
    Ok(data)
}

// Reads at most one byte past the declared length so overlong streams are caught.
fn read_bounded<R: Read>(
    compression: Compression,
    decoder: R,
    expected: usize,
) -> Result<Vec<u8>, Js5CompressionError> {
    let mut data = Vec::with_capacity(expected.min(MAX_PREALLOCATION));
    decoder
        .take(expected as u64 + 1)
        .read_to_end(&mut data)
        .map_err(|e: io::Error| Js5CompressionError::DecompressionError {
            compression,
            reason: DecompressionFailure::Codec(e.to_string()),
        })?;

    check_length(compression, data, expected)
}

// The bzip2 header is stripped on disk, so it is put back before decoding.
fn decompress_bzip2(payload: &[u8], expected: usize) -> Result<Vec<u8>, Js5CompressionError> {
    let mut compressed_data = Vec::with_capacity(payload.len() + BZIP2_HEADER.len());
    compressed_data.extend(BZIP2_HEADER);
    compressed_data.extend(payload);

    read_bounded(
        Compression::Bzip2,
        BzDecoder::new(compressed_data.as_slice()),
        expected,
    )
}

fn decompress_gzip(payload: &[u8], expected: usize) -> Result<Vec<u8>, Js5CompressionError> {
    read_bounded(Compression::Gzip, GzDecoder::new(payload), expected)
}

// LZMA groups carry the 5-byte properties header but no size field.
fn decompress_lzma(payload: &[u8], expected: usize) -> Result<Vec<u8>, Js5CompressionError> {
    let mut data = Vec::with_capacity(expected.min(MAX_PREALLOCATION));
    lzma_decompress_with_options(
        &mut &payload[..],
        &mut data,
        &decompress::Options {
            unpacked_size: decompress::UnpackedSize::UseProvided(Some(expected as u64)),
            memlimit: None,
            allow_incomplete: false,
        },
    )
    .map_err(|e| Js5CompressionError::DecompressionError {
        compression: Compression::Lzma,
        reason: DecompressionFailure::Codec(e.to_string()),
    })?;

    check_length(Compression::Lzma, data, expected)
}
