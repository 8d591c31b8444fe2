// This module implements the archive report: a textual dump of one oat container. The
// header block comes first, then every dex file record with its classes and, per
// compiled method, its frame layout, decoded tables, code and invoke stub. Tables have
// no stored length, so every table is sliced out of the container using the extent the
// ExtentRegistry infers for it; the registry is built once, up front, from every region
// start the container references. A table that fails to decode is logged and marked
// inline, and the dump moves on; a failed extent lookup aborts the whole report since
// every later size would be built on it. With `stats` enabled the dump ends with the
// same code size attribution and outlier summary the artifact report prints, computed
// over the container's own method records.

//! Archive (oat container) report.

use super::attribution::{attribute_method, write_code_stats, MethodObject};
use crate::codec::{decode_gc_map, decode_mapping_table, decode_vmap_table, format_vmap};
use crate::container::{ClassDef, CompiledUnit, Container, DexSource, MethodDef, OatDexFile};
use crate::core::{
    format_spill_mask, DecodeError, ExtentRegistry, ReportError, ReportResult, ReportSession,
};
use crate::disasm::{create_disassembler, Disassembler};
use bumpalo::Bump;
use std::io::Write;

/// Knobs of the archive report.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Prefix prepended to on-device paths to find them on the host.
    pub host_prefix: Option<String>,
    /// Disassemble code and invoke stubs.
    pub disassemble: bool,
    /// Append size attribution and outliers.
    pub stats: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            host_prefix: None,
            disassemble: true,
            stats: false,
        }
    }
}

/// Dumps one container.
pub struct OatDumper<'c, 'a> {
    container: &'c Container<'a>,
    registry: ExtentRegistry,
    options: DumpOptions,
    disassembler: Box<dyn Disassembler>,
}

impl<'c, 'a> OatDumper<'c, 'a> {
    pub fn new(container: &'c Container<'a>, options: DumpOptions) -> ReportResult<Self> {
        let registry = ExtentRegistry::for_container(container)?;
        Ok(Self {
            container,
            registry,
            options,
            disassembler: create_disassembler(container.instruction_set()),
        })
    }

    pub fn registry(&self) -> &ExtentRegistry {
        &self.registry
    }

    pub fn dump(&self, out: &mut dyn Write) -> ReportResult<()> {
        self.dump_header(out)?;
        for dex_file in self.container.dex_files() {
            self.dump_dex_file(out, dex_file)?;
        }
        if self.options.stats {
            self.dump_stats(out)?;
        }
        out.flush()?;
        Ok(())
    }

    fn dump_header(&self, out: &mut dyn Write) -> ReportResult<()> {
        let header = self.container.header();
        write!(out, "MAGIC:\n{}\n\n", header.magic())?;
        write!(out, "CHECKSUM:\n0x{:08x}\n\n", header.checksum)?;
        write!(out, "INSTRUCTION SET:\n{}\n\n", header.instruction_set)?;
        write!(out, "DEX FILE COUNT:\n{}\n\n", header.dex_file_count)?;
        write!(out, "EXECUTABLE OFFSET:\n0x{:08x}\n\n", header.executable_offset)?;
        write!(
            out,
            "IMAGE FILE LOCATION CHECKSUM:\n0x{:08x}\n\n",
            header.image_file_location_checksum
        )?;

        write!(out, "IMAGE FILE LOCATION:\n{}", header.image_file_location)?;
        if let Some(prefix) = self.options.host_prefix.as_deref() {
            if !header.image_file_location.is_empty() && !prefix.is_empty() {
                write!(out, " ({}{})", prefix, header.image_file_location)?;
            }
        }
        write!(out, "\n\n")?;

        let begin = self.container.address(self.container.begin());
        let end = self.container.address(self.container.end());
        write!(out, "BEGIN:\n0x{begin:x}\n\nEND:\n0x{end:x}\n\n")?;
        Ok(())
    }

    fn dump_dex_file(&self, out: &mut dyn Write, dex_file: &OatDexFile) -> ReportResult<()> {
        writeln!(out, "OAT DEX FILE:")?;
        writeln!(out, "location: {}", dex_file.location)?;
        writeln!(out, "checksum: 0x{:08x}", dex_file.location_checksum)?;
        let source = match source_of(dex_file) {
            Ok(source) => source,
            Err(ReportError::MissingSource { what }) => {
                log::warn!("{what} not found, skipping its classes");
                write!(out, "NOT FOUND\n\n")?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for (index, (class_def, oat_class)) in source.classes.iter().zip(&dex_file.classes).enumerate() {
            writeln!(
                out,
                "{}: {} (type_idx={}) ({})",
                index, class_def.descriptor, class_def.type_idx, oat_class.status
            )?;
            if class_def.methods.len() != oat_class.methods.len() {
                log::warn!(
                    "{}: {} methods in the dictionary, {} compiled",
                    class_def.descriptor,
                    class_def.methods.len(),
                    oat_class.methods.len()
                );
            }
            for (method_index, (def, unit)) in class_def.methods.iter().zip(&oat_class.methods).enumerate() {
                self.dump_method(out, method_index, class_def, def, unit)?;
            }
        }
        Ok(())
    }

    fn dump_method(
        &self,
        out: &mut dyn Write,
        index: usize,
        class_def: &ClassDef,
        def: &MethodDef,
        unit: &CompiledUnit,
    ) -> ReportResult<()> {
        log::trace!("dumping {}", class_def.pretty_method(def));
        writeln!(
            out,
            "\t{}: {} (dex_method_idx={})",
            index,
            class_def.pretty_method(def),
            def.dex_method_idx
        )?;
        writeln!(out, "\t\tframe_size_in_bytes: {}", unit.frame_size_in_bytes)?;
        let masks = unit.spill_masks;
        writeln!(
            out,
            "\t\tcore_spill_mask: 0x{:08x}{}",
            masks.core,
            format_spill_mask(masks.core, false)
        )?;
        writeln!(
            out,
            "\t\tfp_spill_mask: 0x{:08x}{}",
            masks.fp,
            format_spill_mask(masks.fp, true)
        )?;

        writeln!(
            out,
            "\t\tmapping_table: {} (offset=0x{:08x})",
            self.address(unit.mapping_table_offset),
            unit.mapping_table_offset.unwrap_or(0)
        )?;
        self.dump_mapping_table(out, unit)?;

        writeln!(
            out,
            "\t\tvmap_table: {} (offset=0x{:08x})",
            self.address(unit.vmap_table_offset),
            unit.vmap_table_offset.unwrap_or(0)
        )?;
        self.dump_vmap_table(out, unit)?;

        writeln!(
            out,
            "\t\tgc_map: {} (offset=0x{:08x})",
            self.address(unit.gc_map_offset),
            unit.gc_map_offset.unwrap_or(0)
        )?;
        self.dump_gc_map(out, unit)?;

        writeln!(
            out,
            "\t\tCODE: {} (offset=0x{:08x} size={}){}",
            self.address(unit.code_offset),
            unit.raw_code_offset,
            unit.code_size,
            if unit.code_offset.is_some() { "..." } else { "" }
        )?;
        self.dump_code(out, unit.code_offset, unit.code_size)?;

        writeln!(
            out,
            "\t\tINVOKE STUB: {} (offset=0x{:08x} size={}){}",
            self.address(unit.invoke_stub_offset),
            unit.invoke_stub_offset.unwrap_or(0),
            unit.invoke_stub_size,
            if unit.invoke_stub_offset.is_some() { "..." } else { "" }
        )?;
        self.dump_code(out, unit.invoke_stub_offset, unit.invoke_stub_size)?;
        Ok(())
    }

    fn dump_mapping_table(&self, out: &mut dyn Write, unit: &CompiledUnit) -> ReportResult<()> {
        let (Some(offset), Some(code)) = (unit.mapping_table_offset, unit.code_offset) else {
            return Ok(());
        };
        let table = match decode_mapping_table(self.table_bytes(offset)?) {
            Ok(table) => table,
            Err(e) => return malformed(out, offset, e),
        };
        let code = self.container.address(code);
        let forward: Vec<String> = table
            .forward
            .iter()
            .map(|&(native, source)| format!("0x{:x} -> 0x{:04x}", code + native as u64, source))
            .collect();
        let reverse: Vec<String> = table
            .reverse
            .iter()
            .map(|&(source, native)| format!("0x{:04x} -> 0x{:x}", source, code + native as u64))
            .collect();
        writeln!(out, "\t\t{{{}}}", forward.join(", "))?;
        writeln!(out, "\t\t{{{}}}", reverse.join(", "))?;
        Ok(())
    }

    fn dump_vmap_table(&self, out: &mut dyn Write, unit: &CompiledUnit) -> ReportResult<()> {
        let Some(offset) = unit.vmap_table_offset else {
            return Ok(());
        };
        match decode_vmap_table(self.table_bytes(offset)?, unit.spill_masks) {
            Ok(entries) => {
                writeln!(out, "\t\t\t{}", format_vmap(&entries))?;
                Ok(())
            }
            Err(e) => malformed(out, offset, e),
        }
    }

    fn dump_gc_map(&self, out: &mut dyn Write, unit: &CompiledUnit) -> ReportResult<()> {
        let Some(offset) = unit.gc_map_offset else {
            return Ok(());
        };
        let map = match decode_gc_map(self.table_bytes(offset)?) {
            Ok(map) => map,
            Err(e) => return malformed(out, offset, e),
        };
        let code = unit.code_offset.map_or(0, |code| self.container.address(code));
        for entry in &map.entries {
            let live: Vec<String> = entry.live_registers().map(|reg| format!("v{reg}")).collect();
            write!(out, "\t\t\t0x{:x}", code + entry.native_pc_offset as u64)?;
            if !live.is_empty() {
                write!(out, "  {}", live.join(", "))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn dump_code(&self, out: &mut dyn Write, offset: Option<u32>, size: u32) -> ReportResult<()> {
        let Some(offset) = offset else {
            return Ok(());
        };
        if size == 0 || !self.options.disassemble {
            return Ok(());
        }
        let code = self.container.bytes(offset, size as usize)?;
        let text = self
            .disassembler
            .disassemble(code, self.container.address(offset));
        for line in text.lines() {
            writeln!(out, "\t\t\t{line}")?;
        }
        Ok(())
    }

    fn dump_stats(&self, out: &mut dyn Write) -> ReportResult<()> {
        let arena = Bump::new();
        let mut session = ReportSession::new(&arena, &self.registry);
        for dex_file in self.container.dex_files() {
            let Ok(source) = source_of(dex_file) else {
                continue;
            };
            for (class_def, oat_class) in source.classes.iter().zip(&dex_file.classes) {
                for (def, unit) in class_def.methods.iter().zip(&oat_class.methods) {
                    let method = MethodObject::from_definition(class_def, def, *unit);
                    attribute_method(&mut session, &method, 0)?;
                }
            }
        }

        let (ledger, mut outliers, stats) = session.finish();
        writeln!(out, "STATS:")?;
        write_code_stats(out, &ledger, stats.dex_instruction_bytes, self.container.size())?;
        write!(out, "{}", outliers.finalize())?;
        log::info!(
            "attributed {} methods over {} distinct regions",
            stats.methods_sampled,
            ledger.distinct_regions()
        );
        Ok(())
    }

    /// The inferred extent of the table at `offset`.
    fn table_bytes(&self, offset: u32) -> ReportResult<&'a [u8]> {
        let size = self.registry.size_of(offset)?;
        Ok(self.container.bytes(offset, size)?)
    }

    fn address(&self, offset: Option<u32>) -> String {
        match offset {
            Some(offset) => format!("0x{:x}", self.container.address(offset)),
            None => "(nil)".to_string(),
        }
    }
}

fn source_of(dex_file: &OatDexFile) -> ReportResult<&DexSource> {
    dex_file.source.as_ref().ok_or_else(|| ReportError::MissingSource {
        what: format!("source dictionary of {}", dex_file.location),
    })
}

fn malformed(out: &mut dyn Write, offset: u32, error: DecodeError) -> ReportResult<()> {
    log::warn!("table at 0x{offset:08x}: {error}");
    writeln!(out, "\t\t\t<malformed: {error}>")?;
    Ok(())
}
