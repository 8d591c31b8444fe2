//! Container header and instruction set tags.

use super::reader::ByteReader;
use crate::core::error::{ContainerError, ContainerResult};
use std::fmt;

/// Leading magic of every oat container.
pub const OAT_MAGIC: &[u8; 4] = b"oat\n";

/// Instruction set the container's code was compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionSet {
    None,
    Arm,
    Thumb2,
    X86,
    X86_64,
    Arm64,
    Mips,
}

impl InstructionSet {
    pub fn from_tag(tag: u32) -> ContainerResult<Self> {
        Ok(match tag {
            0 => InstructionSet::None,
            1 => InstructionSet::Arm,
            2 => InstructionSet::Thumb2,
            3 => InstructionSet::X86,
            4 => InstructionSet::X86_64,
            5 => InstructionSet::Arm64,
            6 => InstructionSet::Mips,
            other => {
                return Err(ContainerError::Invalid {
                    what: "instruction set",
                    reason: format!("unknown tag {other}"),
                })
            }
        })
    }

    pub fn tag(&self) -> u32 {
        match self {
            InstructionSet::None => 0,
            InstructionSet::Arm => 1,
            InstructionSet::Thumb2 => 2,
            InstructionSet::X86 => 3,
            InstructionSet::X86_64 => 4,
            InstructionSet::Arm64 => 5,
            InstructionSet::Mips => 6,
        }
    }

    /// Thumb2 code pointers carry the ISA mode in bit 0.
    pub fn code_offset(&self, raw: u32) -> u32 {
        match self {
            InstructionSet::Thumb2 => raw & !0x1,
            _ => raw,
        }
    }
}

impl fmt::Display for InstructionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstructionSet::None => "None",
            InstructionSet::Arm => "Arm",
            InstructionSet::Thumb2 => "Thumb2",
            InstructionSet::X86 => "X86",
            InstructionSet::X86_64 => "X86_64",
            InstructionSet::Arm64 => "Arm64",
            InstructionSet::Mips => "Mips",
        };
        f.write_str(name)
    }
}

/// Fixed-position header at the start of the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OatHeader {
    pub version: [u8; 4],
    pub checksum: u32,
    pub instruction_set: InstructionSet,
    pub dex_file_count: u32,
    pub executable_offset: u32,
    pub image_file_location_checksum: u32,
    pub image_file_location: String,
}

impl OatHeader {
    pub fn parse(reader: &mut ByteReader<'_>) -> ContainerResult<Self> {
        let magic = reader.bytes(4, "oat magic")?;
        if magic != OAT_MAGIC {
            return Err(ContainerError::BadMagic {
                expected: OAT_MAGIC,
                found: magic.to_vec(),
            });
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(reader.bytes(4, "oat version")?);
        let checksum = reader.u32("oat checksum")?;
        let instruction_set = InstructionSet::from_tag(reader.u32("instruction set")?)?;
        let dex_file_count = reader.u32("dex file count")?;
        let executable_offset = reader.u32("executable offset")?;
        let image_file_location_checksum = reader.u32("image file location checksum")?;
        let image_file_location = reader.string("image file location")?;
        Ok(Self {
            version,
            checksum,
            instruction_set,
            dex_file_count,
            executable_offset,
            image_file_location_checksum,
            image_file_location,
        })
    }

    /// Magic and version as printed by the report, e.g. `"oat\n007"`.
    pub fn magic(&self) -> String {
        let mut raw = OAT_MAGIC.to_vec();
        raw.extend(self.version.iter().take_while(|&&b| b != 0));
        String::from_utf8_lossy(&raw).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumb2_clears_mode_bit() {
        assert_eq!(InstructionSet::Thumb2.code_offset(0x1001), 0x1000);
        assert_eq!(InstructionSet::Arm.code_offset(0x1001), 0x1001);
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(InstructionSet::from_tag(42).is_err());
        assert_eq!(InstructionSet::from_tag(4).unwrap(), InstructionSet::X86_64);
    }

    #[test]
    fn rejects_bad_magic() {
        let data = b"dex\n035\0";
        let err = OatHeader::parse(&mut ByteReader::new(data)).unwrap_err();
        assert!(matches!(err, ContainerError::BadMagic { .. }));
    }
}
