//! Compiled units and the per-class / per-source-file records that hold them.

use super::dex::DexSource;
use super::header::InstructionSet;
use super::reader::ByteReader;
use crate::core::error::{ContainerError, ContainerResult};
use crate::core::registers::SpillMasks;
use std::fmt;

/// Size in bytes of one method record inside a class record.
pub const METHOD_RECORD_SIZE: usize = 32;

/// Initialization state recorded for a class at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassStatus {
    Error,
    NotReady,
    Idx,
    Loaded,
    Resolved,
    Verifying,
    RetryVerificationAtRuntime,
    Verified,
    Initializing,
    Initialized,
    Unknown(i32),
}

impl From<i32> for ClassStatus {
    fn from(raw: i32) -> Self {
        match raw {
            -1 => ClassStatus::Error,
            0 => ClassStatus::NotReady,
            1 => ClassStatus::Idx,
            2 => ClassStatus::Loaded,
            3 => ClassStatus::Resolved,
            4 => ClassStatus::Verifying,
            5 => ClassStatus::RetryVerificationAtRuntime,
            6 => ClassStatus::Verified,
            7 => ClassStatus::Initializing,
            8 => ClassStatus::Initialized,
            other => ClassStatus::Unknown(other),
        }
    }
}

impl fmt::Display for ClassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassStatus::Unknown(raw) => write!(f, "Status{raw}"),
            other => write!(f, "Status{other:?}"),
        }
    }
}

/// One compiled method: its code and the offsets of its metadata tables.
///
/// Only the code carries an explicit length; every table offset is the start
/// of an implicit-length region whose extent is inferred by the
/// [`ExtentRegistry`](crate::core::ExtentRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledUnit {
    /// Code offset as stored, including a Thumb2 mode bit if any.
    pub raw_code_offset: u32,
    /// Code start with the mode bit cleared; `None` for units without code.
    pub code_offset: Option<u32>,
    pub code_size: u32,
    pub frame_size_in_bytes: u32,
    pub spill_masks: SpillMasks,
    pub mapping_table_offset: Option<u32>,
    pub vmap_table_offset: Option<u32>,
    pub gc_map_offset: Option<u32>,
    pub invoke_stub_offset: Option<u32>,
    pub invoke_stub_size: u32,
}

impl CompiledUnit {
    fn parse(
        data: &[u8],
        reader: &mut ByteReader<'_>,
        isa: InstructionSet,
    ) -> ContainerResult<Self> {
        let raw_code_offset = reader.u32("code offset")?;
        let frame_size_in_bytes = reader.u32("frame size")?;
        let core = reader.u32("core spill mask")?;
        let fp = reader.u32("fp spill mask")?;
        let mapping_table_offset = reader.optional_offset("mapping table offset")?;
        let vmap_table_offset = reader.optional_offset("vmap table offset")?;
        let gc_map_offset = reader.optional_offset("gc map offset")?;
        let invoke_stub_offset = reader.optional_offset("invoke stub offset")?;

        let code_offset = (raw_code_offset != 0).then(|| isa.code_offset(raw_code_offset));
        let code_size = match code_offset {
            Some(offset) => read_length_prefix(data, offset, "code size")?,
            None => 0,
        };
        let invoke_stub_size = match invoke_stub_offset {
            Some(offset) => read_length_prefix(data, offset, "invoke stub size")?,
            None => 0,
        };

        Ok(Self {
            raw_code_offset,
            code_offset,
            code_size,
            frame_size_in_bytes,
            spill_masks: SpillMasks::new(core, fp),
            mapping_table_offset,
            vmap_table_offset,
            gc_map_offset,
            invoke_stub_offset,
            invoke_stub_size,
        })
    }
}

/// The u32 preceding a code region holds its byte length.
fn read_length_prefix(data: &[u8], offset: u32, what: &'static str) -> ContainerResult<u32> {
    let offset = offset as usize;
    if offset < 4 {
        return Err(ContainerError::Invalid {
            what,
            reason: format!("region at 0x{offset:08x} has no room for a length prefix"),
        });
    }
    let size = ByteReader::at(data, offset - 4, what)?.u32(what)?;
    if offset + size as usize > data.len() {
        return Err(ContainerError::Truncated {
            what,
            offset,
            needed: size as usize,
            len: data.len(),
        });
    }
    Ok(size)
}

/// Compiled units of one class, in class-method order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OatClass {
    pub status: ClassStatus,
    pub methods: Vec<CompiledUnit>,
}

impl OatClass {
    pub fn parse(data: &[u8], offset: u32, isa: InstructionSet) -> ContainerResult<Self> {
        let mut reader = ByteReader::at(data, offset as usize, "oat class")?;
        let status = ClassStatus::from(reader.i32("class status")?);
        let method_count = reader.u32("class method count")? as usize;
        if method_count.saturating_mul(METHOD_RECORD_SIZE) > reader.remaining() {
            return Err(ContainerError::Truncated {
                what: "oat class methods",
                offset: reader.position(),
                needed: method_count.saturating_mul(METHOD_RECORD_SIZE),
                len: data.len(),
            });
        }
        let methods = (0..method_count)
            .map(|_| CompiledUnit::parse(data, &mut reader, isa))
            .collect::<ContainerResult<Vec<_>>>()?;
        Ok(Self { status, methods })
    }
}

/// Per-source-file record: where its dictionary lives and its classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OatDexFile {
    pub location: String,
    pub location_checksum: u32,
    pub dex_file_offset: Option<u32>,
    pub classes: Vec<OatClass>,
    /// `None` when the dictionary is absent from the container or unreadable.
    pub source: Option<DexSource>,
}

impl OatDexFile {
    pub fn parse(
        data: &[u8],
        reader: &mut ByteReader<'_>,
        isa: InstructionSet,
    ) -> ContainerResult<Self> {
        let location = reader.string("dex file location")?;
        let location_checksum = reader.u32("dex file location checksum")?;
        let dex_file_offset = reader.optional_offset("dex file offset")?;
        let class_count = reader.u32("dex file class count")?;
        let mut classes = Vec::with_capacity(class_count.min(4096) as usize);
        for _ in 0..class_count {
            let class_offset = reader.u32("oat class offset")?;
            classes.push(OatClass::parse(data, class_offset, isa)?);
        }
        let source = dex_file_offset.and_then(|offset| {
            match DexSource::parse(data, offset) {
                Ok(source) if source.classes.len() == classes.len() => Some(source),
                Ok(source) => {
                    log::warn!(
                        "{location}: dictionary has {} classes, container has {}; treating it as missing",
                        source.classes.len(),
                        classes.len()
                    );
                    None
                }
                Err(e) => {
                    log::warn!("{location}: unreadable dictionary at 0x{offset:08x}: {e}");
                    None
                }
            }
        });
        Ok(Self {
            location,
            location_checksum,
            dex_file_offset,
            classes,
            source,
        })
    }

    /// Iterate every compiled unit of this source file.
    pub fn units(&self) -> impl Iterator<Item = &CompiledUnit> + '_ {
        self.classes.iter().flat_map(|class| class.methods.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_status_names() {
        assert_eq!(ClassStatus::from(8).to_string(), "StatusInitialized");
        assert_eq!(ClassStatus::from(-1).to_string(), "StatusError");
        assert_eq!(ClassStatus::from(77).to_string(), "Status77");
    }

    #[test]
    fn length_prefix_needs_room() {
        let data = [0u8; 16];
        assert!(read_length_prefix(&data, 2, "code size").is_err());
        assert_eq!(read_length_prefix(&data, 8, "code size").unwrap(), 0);
    }
}
