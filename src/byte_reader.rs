//! Big-endian cursor over a borrowed byte slice.
//!
//! Every on-disk structure of the cache (index records, sector headers,
//! compression envelopes, reference indexes and group trailers) is decoded
//! through [`ByteReader`]. Reads never go past the end of the slice: they fail
//! with [`ByteReaderError::OutOfBounds`] and leave the cursor untouched.

use osrs_bytes::ReadExt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ByteReaderError {
    #[error("read of {needed} bytes at position {position} is out of bounds ({available} available)")]
    OutOfBounds {
        position: usize,
        needed: usize,
        available: usize,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Creates a reader positioned at `position`; fails if it lies past the end.
    pub fn new_at(data: &'a [u8], position: usize) -> Result<Self, ByteReaderError> {
        let mut reader = Self::new(data);
        reader.seek(position)?;
        Ok(reader)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn seek(&mut self, position: usize) -> Result<(), ByteReaderError> {
        if position > self.data.len() {
            return Err(ByteReaderError::OutOfBounds {
                position,
                needed: 0,
                available: 0,
            });
        }
        self.position = position;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ByteReaderError> {
        self.take(n).map(|_| ())
    }

    /// Borrows the next `n` bytes and advances past them.
    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8], ByteReaderError> {
        self.take(n)
    }

    /// Borrows everything after the cursor and moves the cursor to the end.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let rest = &self.data[self.position..];
        self.position = self.data.len();
        rest
    }

    pub fn peek_u8(&self) -> Result<u8, ByteReaderError> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(ByteReaderError::OutOfBounds {
                position: self.position,
                needed: 1,
                available: 0,
            })
    }

    pub fn read_u8(&mut self) -> Result<u8, ByteReaderError> {
        Ok(self.take(1)?.read_u8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16, ByteReaderError> {
        Ok(self.take(2)?.read_u16()?)
    }

    pub fn read_u24(&mut self) -> Result<u32, ByteReaderError> {
        Ok(self.take(3)?.read_u24()?)
    }

    pub fn read_u32(&mut self) -> Result<u32, ByteReaderError> {
        Ok(self.take(4)?.read_u32()?)
    }

    pub fn read_i32(&mut self) -> Result<i32, ByteReaderError> {
        Ok(self.take(4)?.read_i32()?)
    }

    /// Reads a u16, or a u32 with the top bit masked off when the high bit of
    /// the first byte is set.
    pub fn read_u32_smart(&mut self) -> Result<u32, ByteReaderError> {
        if self.peek_u8()? & 0x80 != 0 {
            Ok(self.read_u32()? & 0x7FFF_FFFF)
        } else {
            Ok(self.read_u16()? as u32)
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ByteReaderError> {
        let available = self.remaining();
        if n > available {
            return Err(ByteReaderError::OutOfBounds {
                position: self.position,
                needed: n,
                available,
            });
        }

        let slice = &self.data[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }
}
