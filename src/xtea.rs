//! XTEA block decipher used for encrypted groups (map regions and the like).

use crate::byte_reader::{ByteReader, ByteReaderError};

pub type XteaKey = [u32; 4];

const GOLDEN_RATIO: u32 = 0x9E37_79B9;
const ROUNDS: u32 = 32;
const BLOCK_SIZE: usize = 8;

/// An all-zero key means "not encrypted".
pub fn is_zero_key(key: &XteaKey) -> bool {
    key.iter().all(|k| *k == 0)
}

/// Deciphers every whole 8-byte block of `input`; a trailing partial block
/// is copied through unchanged.
pub fn xtea_decipher(input: &[u8], key: &XteaKey) -> Result<Vec<u8>, ByteReaderError> {
    let mut output = Vec::with_capacity(input.len());
    let blocks = input.len() / BLOCK_SIZE;

    let mut reader = ByteReader::new(input);
    for _ in 0..blocks {
        let mut v0 = reader.read_u32()?;
        let mut v1 = reader.read_u32()?;
        let mut sum = GOLDEN_RATIO.wrapping_mul(ROUNDS);

        for _ in 0..ROUNDS {
            v1 = v1.wrapping_sub(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ (sum.wrapping_add(key[((sum >> 11) & 3) as usize])),
            );
            sum = sum.wrapping_sub(GOLDEN_RATIO);
            v0 = v0.wrapping_sub(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ (sum.wrapping_add(key[(sum & 3) as usize])),
            );
        }

        output.extend_from_slice(&v0.to_be_bytes());
        output.extend_from_slice(&v1.to_be_bytes());
    }
    output.extend_from_slice(reader.read_remaining());

    Ok(output)
}

/// Inverse of [`xtea_decipher`], for building encrypted groups in tests.
#[cfg(any(test, feature = "test-util"))]
pub fn xtea_encipher(input: &[u8], key: &XteaKey) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    let whole = input.len() - input.len() % BLOCK_SIZE;

    for block in input[..whole].chunks_exact(BLOCK_SIZE) {
        let mut v0 = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
        let mut v1 = u32::from_be_bytes([block[4], block[5], block[6], block[7]]);
        let mut sum: u32 = 0;

        for _ in 0..ROUNDS {
            v0 = v0.wrapping_add(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ (sum.wrapping_add(key[(sum & 3) as usize])),
            );
            sum = sum.wrapping_add(GOLDEN_RATIO);
            v1 = v1.wrapping_add(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ (sum.wrapping_add(key[((sum >> 11) & 3) as usize])),
            );
        }

        output.extend_from_slice(&v0.to_be_bytes());
        output.extend_from_slice(&v1.to_be_bytes());
    }
    output.extend_from_slice(&input[whole..]);
    output
}
