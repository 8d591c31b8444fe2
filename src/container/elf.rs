//! Locating an oat container inside an ELF file.
//!
//! Oat containers are usually shipped wrapped in an ELF shared object whose
//! dynamic symbol `oatdata` marks the start of the container. The symbol size
//! gives its length; a zero-sized symbol extends to the end of its section.

use crate::core::error::{ContainerError, ContainerResult};
use object::{Object, ObjectSection, ObjectSymbol};

/// Name of the symbol that marks the container start.
pub const OATDATA_SYMBOL: &str = "oatdata";

/// The container bytes plus the address they are mapped at.
#[derive(Debug, Clone, Copy)]
pub struct ElfOatData<'a> {
    pub data: &'a [u8],
    pub address: u64,
}

/// Find the `oatdata` region of an ELF file.
pub fn locate_oatdata(file_data: &[u8]) -> ContainerResult<ElfOatData<'_>> {
    let file = object::File::parse(file_data)?;
    let symbol = file
        .symbol_by_name(OATDATA_SYMBOL)
        .ok_or(ContainerError::SymbolNotFound {
            name: OATDATA_SYMBOL,
        })?;
    let section_index = symbol.section_index().ok_or_else(|| ContainerError::Invalid {
        what: "oatdata symbol",
        reason: "symbol is not defined in a section".to_string(),
    })?;
    let section = file.section_by_index(section_index)?;
    let section_data = section.data()?;

    let start = symbol
        .address()
        .checked_sub(section.address())
        .ok_or_else(|| ContainerError::Invalid {
            what: "oatdata symbol",
            reason: format!(
                "symbol address 0x{:x} precedes section address 0x{:x}",
                symbol.address(),
                section.address()
            ),
        })? as usize;
    let len = match symbol.size() {
        0 => section_data.len().saturating_sub(start),
        size => size as usize,
    };
    let data = section_data
        .get(start..start.saturating_add(len))
        .ok_or(ContainerError::Truncated {
            what: "oatdata section",
            offset: start,
            needed: len,
            len: section_data.len(),
        })?;

    log::debug!(
        "oatdata found in section {:?}: {} bytes at 0x{:x}",
        section.name().unwrap_or("<unnamed>"),
        data.len(),
        symbol.address()
    );
    Ok(ElfOatData {
        data,
        address: symbol.address(),
    })
}
