//! Writing synthetic oat containers.
//!
//! [`ContainerWriter`] lays out a container in the same shape the compiler
//! does: header, dex file records, class records, source dictionaries and then
//! the per-method regions, each aligned to four bytes. Identical regions of the
//! same kind are written once and shared, so the output exercises the same
//! deduplication the size report accounts for. Used to build fixtures; the
//! report side never writes.

use super::dex::{MethodDef, DEX_MAGIC};
use super::header::{InstructionSet, OAT_MAGIC};
use super::unit::METHOD_RECORD_SIZE;
use super::elf::OATDATA_SYMBOL;
use crate::core::extent::RegionKind;
use crate::core::registers::SpillMasks;
use hashbrown::HashMap;

const REGION_ALIGNMENT: usize = 4;

/// One method: its source description plus the regions to emit for it.
#[derive(Debug, Clone)]
pub struct MethodLayout {
    pub def: MethodDef,
    pub frame_size_in_bytes: u32,
    pub spill_masks: SpillMasks,
    pub code: Option<Vec<u8>>,
    pub mapping_table: Option<Vec<u8>>,
    pub vmap_table: Option<Vec<u8>>,
    pub gc_map: Option<Vec<u8>>,
    pub invoke_stub: Option<Vec<u8>>,
}

impl MethodLayout {
    pub fn new(name: &str, dex_method_idx: u32, insns_size_in_code_units: u32, access_flags: u32) -> Self {
        Self {
            def: MethodDef {
                name: name.to_string(),
                dex_method_idx,
                insns_size_in_code_units,
                access_flags,
            },
            frame_size_in_bytes: 0,
            spill_masks: SpillMasks::default(),
            code: None,
            mapping_table: None,
            vmap_table: None,
            gc_map: None,
            invoke_stub: None,
        }
    }

    pub fn frame(mut self, frame_size_in_bytes: u32, spill_masks: SpillMasks) -> Self {
        self.frame_size_in_bytes = frame_size_in_bytes;
        self.spill_masks = spill_masks;
        self
    }

    pub fn code(mut self, code: impl Into<Vec<u8>>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn mapping_table(mut self, raw: Vec<u8>) -> Self {
        self.mapping_table = Some(raw);
        self
    }

    pub fn vmap_table(mut self, raw: Vec<u8>) -> Self {
        self.vmap_table = Some(raw);
        self
    }

    pub fn gc_map(mut self, raw: Vec<u8>) -> Self {
        self.gc_map = Some(raw);
        self
    }

    pub fn invoke_stub(mut self, stub: impl Into<Vec<u8>>) -> Self {
        self.invoke_stub = Some(stub.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClassLayout {
    pub descriptor: String,
    pub type_idx: u32,
    pub status: i32,
    pub methods: Vec<MethodLayout>,
}

impl ClassLayout {
    pub fn new(descriptor: &str, type_idx: u32) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            type_idx,
            status: 8,
            methods: Vec::new(),
        }
    }

    pub fn status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    pub fn method(mut self, method: MethodLayout) -> Self {
        self.methods.push(method);
        self
    }
}

#[derive(Debug, Clone)]
pub struct DexFileLayout {
    pub location: String,
    pub location_checksum: u32,
    /// Whether the source dictionary is embedded.
    pub with_source: bool,
    pub classes: Vec<ClassLayout>,
}

impl DexFileLayout {
    pub fn new(location: &str, location_checksum: u32) -> Self {
        Self {
            location: location.to_string(),
            location_checksum,
            with_source: true,
            classes: Vec::new(),
        }
    }

    /// Leave the dictionary out; readers see a missing source.
    pub fn without_source(mut self) -> Self {
        self.with_source = false;
        self
    }

    pub fn class(mut self, class: ClassLayout) -> Self {
        self.classes.push(class);
        self
    }
}

/// Lays out a complete container.
#[derive(Debug, Clone)]
pub struct ContainerWriter {
    pub instruction_set: InstructionSet,
    pub version: [u8; 4],
    pub checksum: u32,
    pub image_file_location_checksum: u32,
    pub image_file_location: String,
    pub dex_files: Vec<DexFileLayout>,
}

impl ContainerWriter {
    pub fn new(instruction_set: InstructionSet) -> Self {
        Self {
            instruction_set,
            version: *b"007\0",
            checksum: 0,
            image_file_location_checksum: 0,
            image_file_location: String::new(),
            dex_files: Vec::new(),
        }
    }

    pub fn checksum(mut self, checksum: u32) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn image_file_location(mut self, location: &str, checksum: u32) -> Self {
        self.image_file_location = location.to_string();
        self.image_file_location_checksum = checksum;
        self
    }

    pub fn dex_file(mut self, dex_file: DexFileLayout) -> Self {
        self.dex_files.push(dex_file);
        self
    }

    /// Serialize the container.
    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(OAT_MAGIC);
        out.extend_from_slice(&self.version);
        put_u32(&mut out, self.checksum);
        put_u32(&mut out, self.instruction_set.tag());
        put_u32(&mut out, self.dex_files.len() as u32);
        let executable_offset_at = out.len();
        put_u32(&mut out, 0);
        put_u32(&mut out, self.image_file_location_checksum);
        put_str(&mut out, &self.image_file_location);

        let mut dex_offset_slots = Vec::with_capacity(self.dex_files.len());
        let mut class_offset_slots = Vec::with_capacity(self.dex_files.len());
        for dex in &self.dex_files {
            put_str(&mut out, &dex.location);
            put_u32(&mut out, dex.location_checksum);
            dex_offset_slots.push(out.len());
            put_u32(&mut out, 0);
            put_u32(&mut out, dex.classes.len() as u32);
            let slots: Vec<usize> = dex
                .classes
                .iter()
                .map(|_| {
                    let at = out.len();
                    put_u32(&mut out, 0);
                    at
                })
                .collect();
            class_offset_slots.push(slots);
        }

        let mut method_records = Vec::new();
        for (dex, slots) in self.dex_files.iter().zip(&class_offset_slots) {
            for (class, &slot) in dex.classes.iter().zip(slots) {
                let class_offset = out.len() as u32;
                patch_u32(&mut out, slot, class_offset);
                out.extend_from_slice(&class.status.to_le_bytes());
                put_u32(&mut out, class.methods.len() as u32);
                for method in &class.methods {
                    method_records.push((out.len(), method));
                    out.resize(out.len() + METHOD_RECORD_SIZE, 0);
                }
            }
        }

        for (dex, &slot) in self.dex_files.iter().zip(&dex_offset_slots) {
            if dex.with_source {
                align(&mut out);
                let dex_offset = out.len() as u32;
                patch_u32(&mut out, slot, dex_offset);
                write_dictionary(&mut out, dex);
            }
        }

        let mut placed = HashMap::new();
        let mut executable_offset = None;
        for (record, method) in method_records {
            let code = method
                .code
                .as_deref()
                .map(|code| place(&mut out, &mut placed, RegionKind::Code, code, true));
            executable_offset = executable_offset.or(code);
            let mapping = method
                .mapping_table
                .as_deref()
                .map(|raw| place(&mut out, &mut placed, RegionKind::MappingTable, raw, false));
            let vmap = method
                .vmap_table
                .as_deref()
                .map(|raw| place(&mut out, &mut placed, RegionKind::VmapTable, raw, false));
            let gc_map = method
                .gc_map
                .as_deref()
                .map(|raw| place(&mut out, &mut placed, RegionKind::GcMap, raw, false));
            let stub = method
                .invoke_stub
                .as_deref()
                .map(|raw| place(&mut out, &mut placed, RegionKind::InvokeStub, raw, true));

            let raw_code_offset = match (code, self.instruction_set) {
                (Some(offset), InstructionSet::Thumb2) => offset | 1,
                (Some(offset), _) => offset,
                (None, _) => 0,
            };
            let fields = [
                raw_code_offset,
                method.frame_size_in_bytes,
                method.spill_masks.core,
                method.spill_masks.fp,
                mapping.unwrap_or(0),
                vmap.unwrap_or(0),
                gc_map.unwrap_or(0),
                stub.unwrap_or(0),
            ];
            for (i, value) in fields.into_iter().enumerate() {
                patch_u32(&mut out, record + i * 4, value);
            }
        }
        if let Some(offset) = executable_offset {
            patch_u32(&mut out, executable_offset_at, offset);
        }
        log::trace!(
            "wrote container: {} bytes, {} distinct regions",
            out.len(),
            placed.len()
        );
        out
    }

    /// Serialize the container wrapped in a relocatable ELF object whose
    /// `oatdata` symbol spans it.
    pub fn write_elf(&self) -> Result<Vec<u8>, object::write::Error> {
        use object::write::{Object, StandardSection, Symbol, SymbolSection};
        use object::{BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};

        let data = self.write();
        let mut obj = Object::new(
            BinaryFormat::Elf,
            elf_architecture(self.instruction_set),
            Endianness::Little,
        );
        let section = obj.section_id(StandardSection::ReadOnlyData);
        let offset = obj.append_section_data(section, &data, 16);
        obj.add_symbol(Symbol {
            name: OATDATA_SYMBOL.as_bytes().to_vec(),
            value: offset,
            size: data.len() as u64,
            kind: SymbolKind::Data,
            scope: SymbolScope::Dynamic,
            weak: false,
            section: SymbolSection::Section(section),
            flags: SymbolFlags::None,
        });
        obj.write()
    }
}

fn elf_architecture(isa: InstructionSet) -> object::Architecture {
    match isa {
        InstructionSet::Arm | InstructionSet::Thumb2 => object::Architecture::Arm,
        InstructionSet::Arm64 => object::Architecture::Aarch64,
        InstructionSet::X86 => object::Architecture::I386,
        InstructionSet::Mips => object::Architecture::Mips,
        InstructionSet::X86_64 | InstructionSet::None => object::Architecture::X86_64,
    }
}

fn write_dictionary(out: &mut Vec<u8>, dex: &DexFileLayout) {
    out.extend_from_slice(DEX_MAGIC);
    put_u32(out, dex.classes.len() as u32);
    for class in &dex.classes {
        put_str(out, &class.descriptor);
        put_u32(out, class.type_idx);
        put_u32(out, class.methods.len() as u32);
        for method in &class.methods {
            put_str(out, &method.def.name);
            put_u32(out, method.def.dex_method_idx);
            put_u32(out, method.def.insns_size_in_code_units);
            put_u32(out, method.def.access_flags);
        }
    }
}

/// Append a region, or return the offset of an identical one already placed.
fn place(
    out: &mut Vec<u8>,
    placed: &mut HashMap<(RegionKind, Vec<u8>), u32>,
    kind: RegionKind,
    bytes: &[u8],
    length_prefixed: bool,
) -> u32 {
    if let Some(&offset) = placed.get(&(kind, bytes.to_vec())) {
        return offset;
    }
    align(out);
    if length_prefixed {
        put_u32(out, bytes.len() as u32);
    }
    let offset = out.len() as u32;
    out.extend_from_slice(bytes);
    placed.insert((kind, bytes.to_vec()), offset);
    offset
}

fn align(out: &mut Vec<u8>) {
    let padded = (out.len() + REGION_ALIGNMENT - 1) & !(REGION_ALIGNMENT - 1);
    out.resize(padded, 0);
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn patch_u32(out: &mut [u8], at: usize, value: u32) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
