// This module parses oat containers into an immutable, borrowed view. A container packs,
// for every compiled method, its native code plus the tables describing frame layout,
// register liveness and native-to-source PC correspondence. Only code and invoke stubs
// carry an explicit length (a u32 just before the region); every other table is located
// by offset alone and its extent is inferred later by the ExtentRegistry. Containers are
// read either as raw bytes starting with the oat magic or from an ELF file whose
// `oatdata` symbol delimits the container, using the object crate. All offsets handed
// out by this module are relative to the container start; `address` adds the mapping
// base for display.

//! Oat container parsing.

pub mod dex;
pub mod elf;
pub mod header;
pub mod reader;
pub mod unit;
pub mod writer;

pub use dex::{
    pretty_descriptor, ClassDef, DexSource, MethodDef, ACC_ABSTRACT, ACC_CONSTRUCTOR, ACC_NATIVE,
    ACC_STATIC,
};
pub use elf::{locate_oatdata, ElfOatData, OATDATA_SYMBOL};
pub use header::{InstructionSet, OatHeader, OAT_MAGIC};
pub use reader::ByteReader;
pub use unit::{ClassStatus, CompiledUnit, OatClass, OatDexFile};
pub use writer::{ClassLayout, ContainerWriter, DexFileLayout, MethodLayout};

use crate::core::error::{ContainerError, ContainerResult};

/// Parsed, read-only view of one oat container.
#[derive(Debug, Clone)]
pub struct Container<'a> {
    data: &'a [u8],
    base_address: u64,
    header: OatHeader,
    dex_files: Vec<OatDexFile>,
}

impl<'a> Container<'a> {
    /// Parse a container from bytes that start with the oat header.
    pub fn parse(data: &'a [u8]) -> ContainerResult<Self> {
        if u32::try_from(data.len()).is_err() {
            return Err(ContainerError::Invalid {
                what: "container",
                reason: format!("{} bytes exceeds the 32-bit offset space", data.len()),
            });
        }
        let mut reader = ByteReader::new(data);
        let header = OatHeader::parse(&mut reader)?;
        let isa = header.instruction_set;
        let dex_files = (0..header.dex_file_count)
            .map(|_| OatDexFile::parse(data, &mut reader, isa))
            .collect::<ContainerResult<Vec<_>>>()?;
        log::debug!(
            "parsed oat container: {} bytes, {} dex files, isa {}",
            data.len(),
            dex_files.len(),
            isa
        );
        Ok(Self {
            data,
            base_address: 0,
            header,
            dex_files,
        })
    }

    /// Parse the container delimited by the `oatdata` symbol of an ELF file.
    pub fn from_elf(file_data: &'a [u8]) -> ContainerResult<Self> {
        let oatdata = locate_oatdata(file_data)?;
        Ok(Self::parse(oatdata.data)?.with_base_address(oatdata.address))
    }

    /// Accept either a bare container or an ELF-wrapped one.
    pub fn load(file_data: &'a [u8]) -> ContainerResult<Self> {
        if file_data.starts_with(OAT_MAGIC) {
            Self::parse(file_data)
        } else {
            Self::from_elf(file_data)
        }
    }

    /// Set the address the container is mapped at; only affects display.
    pub fn with_base_address(mut self, base_address: u64) -> Self {
        self.base_address = base_address;
        self
    }

    pub fn header(&self) -> &OatHeader {
        &self.header
    }

    pub fn instruction_set(&self) -> InstructionSet {
        self.header.instruction_set
    }

    pub fn dex_files(&self) -> &[OatDexFile] {
        &self.dex_files
    }

    /// Every compiled unit in container order.
    pub fn units(&self) -> impl Iterator<Item = &CompiledUnit> + '_ {
        self.dex_files.iter().flat_map(|dex| dex.units())
    }

    /// Offset of the first byte; always 0.
    pub fn begin(&self) -> u32 {
        0
    }

    /// Offset one past the last byte.
    pub fn end(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Mapped address of a container offset.
    pub fn address(&self, offset: u32) -> u64 {
        self.base_address + offset as u64
    }

    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.begin() && offset <= self.end()
    }

    /// Borrow `len` bytes at `offset`.
    pub fn bytes(&self, offset: u32, len: usize) -> ContainerResult<&'a [u8]> {
        let data = self.data;
        let start = offset as usize;
        start
            .checked_add(len)
            .and_then(|end| data.get(start..end))
            .ok_or(ContainerError::Truncated {
                what: "region",
                offset: start,
                needed: len,
                len: data.len(),
            })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
