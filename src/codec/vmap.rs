//! Vmap tables: which virtual register lives in which spilled physical register.
//!
//! The table is a `u16` count followed by that many `u16` virtual register
//! numbers. Entry `i` names the register held in the `i`-th spill slot, where
//! spill slots are the set bits of the core spill mask followed by the set
//! bits of the FP spill mask, low bit first.

use crate::core::error::{DecodeError, DecodeResult};
use crate::core::registers::{PhysicalSlot, SpillMasks};
use std::fmt;

/// One vmap table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmapEntry {
    pub vreg: u16,
    pub slot: PhysicalSlot,
}

impl fmt::Display for VmapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}/{}", self.vreg, self.slot)
    }
}

/// Decode a raw vmap table against the method's spill masks.
pub fn decode_vmap_table(raw: &[u8], masks: SpillMasks) -> DecodeResult<Vec<VmapEntry>> {
    let count = read_u16(raw, 0)? as usize;
    let mut slots = masks.slots();
    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let vreg = read_u16(raw, 2 + index * 2)?;
        let slot = slots.next().ok_or_else(|| DecodeError::MalformedRegisterTable {
            reason: format!(
                "entry {index} (v{vreg}) needs {} spill slots, masks 0x{:08x}/0x{:08x} have {}",
                index + 1,
                masks.core,
                masks.fp,
                masks.count()
            ),
        })?;
        entries.push(VmapEntry { vreg, slot });
    }
    Ok(entries)
}

fn read_u16(raw: &[u8], at: usize) -> DecodeResult<u16> {
    match raw.get(at..at + 2) {
        Some(b) => Ok(u16::from_le_bytes([b[0], b[1]])),
        None => Err(DecodeError::MalformedRegisterTable {
            reason: format!("table ends at byte {} before entry at byte {at}", raw.len()),
        }),
    }
}

/// Encode a vmap table from virtual register numbers in spill-slot order.
pub fn encode_vmap_table(vregs: &[u16]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(2 + vregs.len() * 2);
    raw.extend_from_slice(&(vregs.len() as u16).to_le_bytes());
    for vreg in vregs {
        raw.extend_from_slice(&vreg.to_le_bytes());
    }
    raw
}

/// Render entries as `v5/r0, v7/r1`.
pub fn format_vmap(entries: &[VmapEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
