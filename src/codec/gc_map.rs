//! GC maps: live virtual registers at each safepoint.
//!
//! A 4-byte header precedes the entries:
//! - byte 0, bits 0..3: width in bytes of each native PC offset
//! - byte 0, bits 3..8 and byte 1: register bitmap width in bytes
//! - bytes 2..4: entry count
//!
//! Each entry is the native PC offset (little endian, `offset width` bytes)
//! followed by the bitmap, bit `r` set meaning virtual register `r` is live.

use crate::core::error::{DecodeError, DecodeResult};

const HEADER_SIZE: usize = 4;

/// One safepoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveMapEntry {
    /// Offset from the start of the method's code.
    pub native_pc_offset: u32,
    pub bitmap: Vec<u8>,
}

impl LiveMapEntry {
    /// Virtual registers whose bit is set, ascending.
    pub fn live_registers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.bitmap.len() * 8).filter(move |&reg| (self.bitmap[reg / 8] >> (reg % 8)) & 1 != 0)
    }
}

/// Decoded GC map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveRegisterMap {
    pub native_offset_width: usize,
    pub reg_width: usize,
    pub entries: Vec<LiveMapEntry>,
}

impl LiveRegisterMap {
    /// Number of registers described by each bitmap.
    pub fn num_registers(&self) -> usize {
        self.reg_width * 8
    }
}

/// Decode a raw GC map.
pub fn decode_gc_map(raw: &[u8]) -> DecodeResult<LiveRegisterMap> {
    let header = raw.get(..HEADER_SIZE).ok_or_else(|| DecodeError::MalformedLiveMap {
        reason: format!("{} bytes is too short for the header", raw.len()),
    })?;
    let native_offset_width = (header[0] & 0x7) as usize;
    let reg_width = ((header[0] >> 3) as usize) | ((header[1] as usize) << 5);
    let num_entries = header[2] as usize | (header[3] as usize) << 8;
    if native_offset_width > 4 {
        return Err(DecodeError::MalformedLiveMap {
            reason: format!("native offset width {native_offset_width} exceeds 4 bytes"),
        });
    }

    let entry_size = native_offset_width + reg_width;
    if entry_size == 0 && num_entries > 0 {
        return Err(DecodeError::MalformedLiveMap {
            reason: format!("{num_entries} entries of zero width"),
        });
    }
    let needed = HEADER_SIZE + entry_size * num_entries;
    if needed > raw.len() {
        return Err(DecodeError::MalformedLiveMap {
            reason: format!(
                "{num_entries} entries of {entry_size} bytes need {needed} bytes, map has {}",
                raw.len()
            ),
        });
    }

    let entries = raw[HEADER_SIZE..needed]
        .chunks_exact(entry_size.max(1))
        .take(num_entries)
        .map(|chunk| {
            let (offset_bytes, bitmap) = chunk.split_at(native_offset_width);
            let native_pc_offset = offset_bytes
                .iter()
                .rev()
                .fold(0u32, |acc, &b| (acc << 8) | b as u32);
            LiveMapEntry {
                native_pc_offset,
                bitmap: bitmap.to_vec(),
            }
        })
        .collect();
    Ok(LiveRegisterMap {
        native_offset_width,
        reg_width,
        entries,
    })
}

/// Encode a GC map. Every bitmap must be `reg_width` bytes long and every
/// offset must fit in `native_offset_width` bytes.
pub fn encode_gc_map(native_offset_width: u8, reg_width: u16, entries: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut raw = vec![
        (native_offset_width & 0x7) | ((reg_width as u8) << 3),
        (reg_width >> 5) as u8,
        entries.len() as u8,
        (entries.len() >> 8) as u8,
    ];
    for (native_pc_offset, bitmap) in entries {
        raw.extend_from_slice(&native_pc_offset.to_le_bytes()[..native_offset_width as usize]);
        raw.extend_from_slice(bitmap);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(offset_width: u8, reg_width: u16, entries: u16) -> Vec<u8> {
        vec![
            offset_width | ((reg_width as u8) << 3),
            (reg_width >> 5) as u8,
            entries as u8,
            (entries >> 8) as u8,
        ]
    }

    #[test]
    fn encoder_matches_layout() {
        let raw = encode_gc_map(1, 1, &[(0x20, vec![0b11])]);
        let mut expected = header(1, 1, 1);
        expected.extend_from_slice(&[0x20, 0b11]);
        assert_eq!(raw, expected);
        let map = decode_gc_map(&raw).unwrap();
        assert_eq!(map.entries[0].live_registers().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn decodes_entries() {
        let mut raw = header(2, 2, 2);
        raw.extend_from_slice(&[0x10, 0x00, 0b0000_0101, 0b1000_0000]);
        raw.extend_from_slice(&[0x34, 0x12, 0x00, 0x00]);
        let map = decode_gc_map(&raw).unwrap();
        assert_eq!(map.num_registers(), 16);
        assert_eq!(map.entries.len(), 2);
        assert_eq!(map.entries[0].native_pc_offset, 0x10);
        assert_eq!(map.entries[0].live_registers().collect::<Vec<_>>(), vec![0, 2, 15]);
        assert_eq!(map.entries[1].native_pc_offset, 0x1234);
        assert_eq!(map.entries[1].live_registers().count(), 0);
    }

    #[test]
    fn wide_register_width_spans_two_header_bytes() {
        let mut raw = header(1, 40, 1);
        raw.push(0x08);
        raw.extend(std::iter::repeat(0).take(40));
        let map = decode_gc_map(&raw).unwrap();
        assert_eq!(map.reg_width, 40);
        assert_eq!(map.entries[0].bitmap.len(), 40);
    }

    #[test]
    fn truncated_entries_are_malformed() {
        let mut raw = header(1, 1, 3);
        raw.extend_from_slice(&[0, 1, 4, 2]);
        assert!(matches!(
            decode_gc_map(&raw),
            Err(DecodeError::MalformedLiveMap { .. })
        ));
        assert!(decode_gc_map(&[1, 2]).is_err());
    }

    #[test]
    fn empty_map() {
        let map = decode_gc_map(&header(1, 1, 0)).unwrap();
        assert!(map.entries.is_empty());
    }
}
