//! Bounds-checked little-endian cursor.

use crate::core::error::{ContainerError, ContainerResult};

/// Cursor over a container byte slice. Every read names what it is reading so
/// truncation errors point at the broken record.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a reader positioned at `offset`.
    pub fn at(data: &'a [u8], offset: usize, what: &'static str) -> ContainerResult<Self> {
        if offset > data.len() {
            return Err(ContainerError::Truncated {
                what,
                offset,
                needed: 0,
                len: data.len(),
            });
        }
        Ok(Self { data, pos: offset })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn bytes(&mut self, len: usize, what: &'static str) -> ContainerResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(ContainerError::Truncated {
                what,
                offset: self.pos,
                needed: len,
                len: self.data.len(),
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self, what: &'static str) -> ContainerResult<u8> {
        Ok(self.bytes(1, what)?[0])
    }

    pub fn u16(&mut self, what: &'static str) -> ContainerResult<u16> {
        let b = self.bytes(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self, what: &'static str) -> ContainerResult<u32> {
        let b = self.bytes(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self, what: &'static str) -> ContainerResult<i32> {
        Ok(self.u32(what)? as i32)
    }

    /// Read a `u32` length followed by that many UTF-8 bytes.
    pub fn string(&mut self, what: &'static str) -> ContainerResult<String> {
        let len = self.u32(what)? as usize;
        let raw = self.bytes(len, what)?;
        String::from_utf8(raw.to_vec()).map_err(|e| ContainerError::Invalid {
            what,
            reason: e.to_string(),
        })
    }

    /// Read a `u32` offset where `0` means absent.
    pub fn optional_offset(&mut self, what: &'static str) -> ContainerResult<Option<u32>> {
        let offset = self.u32(what)?;
        Ok((offset != 0).then_some(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_fields() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0x02, 0, 0, 0, b'h', b'i'];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.u16("a").unwrap(), 0x1234);
        assert_eq!(reader.u32("b").unwrap(), 0x1234_5678);
        assert_eq!(reader.string("c").unwrap(), "hi");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn truncation_reports_offset() {
        let data = [1, 2, 3];
        let mut reader = ByteReader::new(&data);
        reader.u16("first").unwrap();
        match reader.u32("second") {
            Err(ContainerError::Truncated { what, offset, needed, len }) => {
                assert_eq!((what, offset, needed, len), ("second", 2, 4, 3));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn zero_offset_is_absent() {
        let data = [0, 0, 0, 0, 8, 0, 0, 0];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.optional_offset("x").unwrap(), None);
        assert_eq!(reader.optional_offset("y").unwrap(), Some(8));
    }
}
