//! Mapping tables: native PC <-> source PC correspondence.
//!
//! Layout: `u32 total_pairs, u32 forward_pairs`, then `total_pairs` pairs of
//! `u32`. The first `forward_pairs` pairs map native PC offsets to source PCs
//! (ascending native PC); the rest map source PCs back to native PC offsets
//! (ascending source PC). Nothing but the count separates the two halves.

use crate::core::error::{DecodeError, DecodeResult};

/// Size of the two count fields.
const HEADER_SIZE: usize = 8;

/// Decoded mapping table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    /// `(native_pc_offset, source_pc)` pairs.
    pub forward: Vec<(u32, u32)>,
    /// `(source_pc, native_pc_offset)` pairs.
    pub reverse: Vec<(u32, u32)>,
}

impl MappingTable {
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty()
    }

    /// Source PC of the closest forward entry at or before `native_pc_offset`.
    pub fn source_pc_for(&self, native_pc_offset: u32) -> Option<u32> {
        let idx = self
            .forward
            .partition_point(|&(native, _)| native <= native_pc_offset);
        idx.checked_sub(1).map(|i| self.forward[i].1)
    }
}

/// Decode a raw mapping table.
pub fn decode_mapping_table(raw: &[u8]) -> DecodeResult<MappingTable> {
    let total = read_u32(raw, 0)? as usize;
    let forward = read_u32(raw, 4)? as usize;
    if forward > total {
        return Err(DecodeError::MalformedMappingTable {
            reason: format!("forward pair count {forward} exceeds total pair count {total}"),
        });
    }
    let needed = total
        .checked_mul(8)
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .filter(|&n| n <= raw.len())
        .ok_or_else(|| DecodeError::MalformedMappingTable {
            reason: format!("{total} pairs do not fit in {} bytes", raw.len()),
        })?;
    let pairs: Vec<(u32, u32)> = raw[HEADER_SIZE..needed]
        .chunks_exact(8)
        .map(|c| {
            (
                u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                u32::from_le_bytes([c[4], c[5], c[6], c[7]]),
            )
        })
        .collect();
    let (head, tail) = pairs.split_at(forward);
    Ok(MappingTable {
        forward: head.to_vec(),
        reverse: tail.to_vec(),
    })
}

/// Encode a mapping table from its two halves.
pub fn encode_mapping_table(forward: &[(u32, u32)], reverse: &[(u32, u32)]) -> Vec<u8> {
    let total = forward.len() + reverse.len();
    let mut raw = Vec::with_capacity(HEADER_SIZE + total * 8);
    raw.extend_from_slice(&(total as u32).to_le_bytes());
    raw.extend_from_slice(&(forward.len() as u32).to_le_bytes());
    for (a, b) in forward.iter().chain(reverse) {
        raw.extend_from_slice(&a.to_le_bytes());
        raw.extend_from_slice(&b.to_le_bytes());
    }
    raw
}

fn read_u32(raw: &[u8], at: usize) -> DecodeResult<u32> {
    match raw.get(at..at + 4) {
        Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(DecodeError::MalformedMappingTable {
            reason: format!("table of {} bytes has no count field at byte {at}", raw.len()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(total: u32, forward: u32, pairs: &[(u32, u32)]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&total.to_le_bytes());
        raw.extend_from_slice(&forward.to_le_bytes());
        for (a, b) in pairs {
            raw.extend_from_slice(&a.to_le_bytes());
            raw.extend_from_slice(&b.to_le_bytes());
        }
        raw
    }

    #[test]
    fn splits_at_forward_count() {
        let raw = table(4, 2, &[(0x10, 3), (0x20, 5), (3, 0x10), (5, 0x20)]);
        let decoded = decode_mapping_table(&raw).unwrap();
        assert_eq!(decoded.forward, vec![(0x10, 3), (0x20, 5)]);
        assert_eq!(decoded.reverse, vec![(3, 0x10), (5, 0x20)]);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut raw = table(1, 1, &[(4, 1)]);
        raw.extend_from_slice(&[0xAA; 6]);
        let decoded = decode_mapping_table(&raw).unwrap();
        assert_eq!(decoded.forward, vec![(4, 1)]);
        assert!(decoded.reverse.is_empty());
    }

    #[test]
    fn short_pair_array_is_malformed() {
        let raw = table(3, 1, &[(4, 1), (8, 2)]);
        assert!(matches!(
            decode_mapping_table(&raw),
            Err(DecodeError::MalformedMappingTable { .. })
        ));
    }

    #[test]
    fn forward_count_beyond_total_is_malformed() {
        let raw = table(1, 2, &[(4, 1)]);
        assert!(decode_mapping_table(&raw).is_err());
        assert!(decode_mapping_table(&[1, 0]).is_err());
    }

    #[test]
    fn encoder_writes_pair_counts() {
        let raw = encode_mapping_table(&[(0x10, 3)], &[(3, 0x10), (4, 0x14)]);
        assert_eq!(raw, table(3, 1, &[(0x10, 3), (3, 0x10), (4, 0x14)]));
    }

    #[test]
    fn source_pc_lookup() {
        let raw = table(2, 2, &[(0x10, 3), (0x20, 5)]);
        let decoded = decode_mapping_table(&raw).unwrap();
        assert_eq!(decoded.source_pc_for(0x08), None);
        assert_eq!(decoded.source_pc_for(0x10), Some(3));
        assert_eq!(decoded.source_pc_for(0x1f), Some(3));
        assert_eq!(decoded.source_pc_for(0x40), Some(5));
    }
}
