//! Physical register naming and spill-mask scanning.
//!
//! A method's frame records which callee-save registers it spilled as two 32-bit
//! masks, one for the general-purpose bank and one for the floating-point bank.
//! Vmap tables refer to those spill slots purely by position, so decoding them
//! needs a way to walk the set bits of both masks as a single stream.

use std::fmt;

/// Number of registers covered by one spill mask.
pub const REGISTERS_PER_BANK: usize = 32;

/// Type for register bank indices.
pub type RegBank = u8;

/// General-purpose register bank.
pub const BANK_GP: RegBank = 0;

/// Floating-point register bank.
pub const BANK_FP: RegBank = 1;

/// A physical register that holds a spilled virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalSlot {
    Gp(u8),
    Fp(u8),
}

impl PhysicalSlot {
    /// Build a slot from its position in the concatenated GP/FP bitstream.
    pub fn from_linear_index(index: usize) -> Self {
        if index < REGISTERS_PER_BANK {
            PhysicalSlot::Gp(index as u8)
        } else {
            PhysicalSlot::Fp((index - REGISTERS_PER_BANK) as u8)
        }
    }

    /// Position in the concatenated GP/FP bitstream.
    pub fn linear_index(&self) -> usize {
        match *self {
            PhysicalSlot::Gp(id) => id as usize,
            PhysicalSlot::Fp(id) => REGISTERS_PER_BANK + id as usize,
        }
    }

    pub fn bank(&self) -> RegBank {
        match self {
            PhysicalSlot::Gp(_) => BANK_GP,
            PhysicalSlot::Fp(_) => BANK_FP,
        }
    }
}

impl fmt::Display for PhysicalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalSlot::Gp(id) => write!(f, "r{id}"),
            PhysicalSlot::Fp(id) => write!(f, "fr{id}"),
        }
    }
}

/// Pair of spill masks saved by a method prologue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpillMasks {
    pub core: u32,
    pub fp: u32,
}

impl SpillMasks {
    pub const fn new(core: u32, fp: u32) -> Self {
        Self { core, fp }
    }

    /// Iterate the spilled registers, GP bank first, each bank low bit first.
    pub fn slots(&self) -> SpillSlots {
        SpillSlots {
            bits: (self.fp as u64) << REGISTERS_PER_BANK | self.core as u64,
        }
    }

    /// Total number of spilled registers across both banks.
    pub fn count(&self) -> u32 {
        self.core.count_ones() + self.fp.count_ones()
    }
}

/// Iterator over the set bits of the virtual concatenation `core ++ fp`.
#[derive(Debug, Clone)]
pub struct SpillSlots {
    bits: u64,
}

impl Iterator for SpillSlots {
    type Item = PhysicalSlot;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bits == 0 {
            return None;
        }
        let index = self.bits.trailing_zeros() as usize;
        // Clear the lowest set bit.
        self.bits &= self.bits - 1;
        Some(PhysicalSlot::from_linear_index(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.bits.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for SpillSlots {}

/// Render a spill mask as ` (r0, r5)`, or nothing when the mask is empty.
pub fn format_spill_mask(mask: u32, is_float: bool) -> String {
    if mask == 0 {
        return String::new();
    }
    let masks = if is_float {
        SpillMasks::new(0, mask)
    } else {
        SpillMasks::new(mask, 0)
    };
    let names: Vec<String> = masks.slots().map(|slot| slot.to_string()).collect();
    format!(" ({})", names.join(", "))
}
