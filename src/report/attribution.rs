//! Charging a method's regions to size categories.
//!
//! Both reports attribute methods the same way; they differ only in where the
//! methods come from (the container's own records, or method objects found by
//! an object walk).

use crate::container::{ClassDef, CompiledUnit, MethodDef};
use crate::core::{
    percent, pretty_size, RegionKind, ReportResult, ReportSession, SizeCategory, SizeLedger,
};
use std::io::Write;

/// Dex bytes above which an instance constructor counts as large.
pub const LARGE_CONSTRUCTOR_DEX_BYTES: usize = 4000;

/// Dex bytes above which any other method counts as large.
pub const LARGE_METHOD_DEX_BYTES: usize = 16000;

/// How a method's compiled regions are charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Compiled from source instructions.
    Managed,
    /// Implemented natively; its code is the native bridge.
    Native,
    Abstract,
    /// Runtime-internal method (callee-save frame setup, resolution).
    Runtime,
}

impl MethodKind {
    pub fn from_access_flags(def: &MethodDef) -> Self {
        if def.is_native() {
            MethodKind::Native
        } else if def.is_abstract() {
            MethodKind::Abstract
        } else {
            MethodKind::Managed
        }
    }
}

/// A method together with the compiled unit it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodObject {
    /// Source-level name, e.g. `java.lang.String.length`.
    pub name: String,
    pub kind: MethodKind,
    pub is_constructor: bool,
    pub is_static: bool,
    pub dex_instruction_bytes: usize,
    pub unit: CompiledUnit,
}

impl MethodObject {
    pub fn from_definition(class: &ClassDef, def: &MethodDef, unit: CompiledUnit) -> Self {
        Self {
            name: class.pretty_method(def),
            kind: MethodKind::from_access_flags(def),
            is_constructor: def.is_constructor(),
            is_static: def.is_static(),
            dex_instruction_bytes: def.dex_instruction_bytes(),
            unit,
        }
    }

    /// Extra category the method's code is charged to, beyond managed code.
    fn code_category(&self) -> Option<SizeCategory> {
        if self.is_constructor {
            if self.is_static {
                Some(SizeCategory::ClassInitializerCode)
            } else if self.dex_instruction_bytes > LARGE_CONSTRUCTOR_DEX_BYTES {
                Some(SizeCategory::LargeInitializerCode)
            } else {
                None
            }
        } else if self.dex_instruction_bytes > LARGE_METHOD_DEX_BYTES {
            Some(SizeCategory::LargeMethodCode)
        } else {
            None
        }
    }
}

/// Per-region sizes of one managed method, shared regions included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodFootprint {
    pub dex_instruction_bytes: usize,
    pub gc_map_bytes: usize,
    pub mapping_table_bytes: usize,
    pub vmap_table_bytes: usize,
    pub invoke_stub_bytes: usize,
    pub code_bytes: usize,
    /// All of the above plus the method object itself.
    pub total_bytes: usize,
    /// Code bytes per dex instruction byte; 0 without dex instructions.
    pub expansion: f64,
}

/// Charge a method's regions and, for managed methods, record an outlier
/// sample. Returns the footprint of managed methods only.
pub fn attribute_method(
    session: &mut ReportSession<'_, '_>,
    method: &MethodObject,
    object_bytes: usize,
) -> ReportResult<Option<MethodFootprint>> {
    let unit = &method.unit;
    match method.kind {
        MethodKind::Native => {
            let ledger = session.ledger_mut();
            ledger.charge_sized(
                SizeCategory::ManagedToNativeCode,
                RegionKind::InvokeStub,
                unit.invoke_stub_offset,
                unit.invoke_stub_size as usize,
            )?;
            ledger.charge_sized(
                SizeCategory::NativeToManagedCode,
                RegionKind::Code,
                unit.code_offset,
                unit.code_size as usize,
            )?;
            Ok(None)
        }
        MethodKind::Abstract | MethodKind::Runtime => Ok(None),
        MethodKind::Managed => {
            let dex_instruction_bytes = method.dex_instruction_bytes;
            let ledger = session.ledger_mut();
            let gc_map_bytes =
                ledger.charge(SizeCategory::GcMap, RegionKind::GcMap, unit.gc_map_offset)?;
            let mapping_table_bytes = ledger.charge(
                SizeCategory::MappingTable,
                RegionKind::MappingTable,
                unit.mapping_table_offset,
            )?;
            let vmap_table_bytes = ledger.charge(
                SizeCategory::VmapTable,
                RegionKind::VmapTable,
                unit.vmap_table_offset,
            )?;

            let invoke_stub_bytes = unit.invoke_stub_size as usize;
            ledger.charge_sized(
                SizeCategory::NativeToManagedCode,
                RegionKind::InvokeStub,
                unit.invoke_stub_offset,
                invoke_stub_bytes,
            )?;

            let code_bytes = unit.code_size as usize;
            if ledger.charge_sized(
                SizeCategory::ManagedCode,
                RegionKind::Code,
                unit.code_offset,
                code_bytes,
            )? {
                if let Some(category) = method.code_category() {
                    ledger.add(category, code_bytes);
                }
            }
            ledger.add_code_reference(code_bytes);

            let total_bytes = dex_instruction_bytes
                + gc_map_bytes
                + mapping_table_bytes
                + vmap_table_bytes
                + invoke_stub_bytes
                + code_bytes
                + object_bytes;
            let expansion = ratio(code_bytes, dex_instruction_bytes);

            let stats = session.stats_mut();
            stats.dex_instruction_bytes += dex_instruction_bytes;
            stats.methods_sampled += 1;
            session
                .outliers_mut()
                .add_sample(method.name.clone(), total_bytes, expansion);
            log::trace!(
                "{}: {} bytes total, expansion {:.2}",
                method.name,
                total_bytes,
                expansion
            );

            Ok(Some(MethodFootprint {
                dex_instruction_bytes,
                gc_map_bytes,
                mapping_table_bytes,
                vmap_table_bytes,
                invoke_stub_bytes,
                code_bytes,
                total_bytes,
                expansion,
            }))
        }
    }
}

/// `a / b`, or 0 when `b` is 0.
pub fn ratio(a: usize, b: usize) -> f64 {
    if b == 0 {
        0.0
    } else {
        a as f64 / b as f64
    }
}

/// Write the code and table totals, relative to the container size.
pub fn write_code_stats(
    out: &mut dyn Write,
    ledger: &SizeLedger<'_>,
    dex_instruction_bytes: usize,
    oat_file_bytes: usize,
) -> ReportResult<()> {
    let line = |category: SizeCategory| {
        let bytes = ledger.total(category);
        (bytes, percent(bytes, oat_file_bytes))
    };

    writeln!(out, "\toat_file_bytes               = {:8} ({})", oat_file_bytes, pretty_size(oat_file_bytes))?;
    for (i, category) in [
        SizeCategory::ManagedCode,
        SizeCategory::ManagedToNativeCode,
        SizeCategory::NativeToManagedCode,
        SizeCategory::ClassInitializerCode,
        SizeCategory::LargeInitializerCode,
        SizeCategory::LargeMethodCode,
    ]
    .into_iter()
    .enumerate()
    {
        let (bytes, pct) = line(category);
        writeln!(
            out,
            "\t{:<28} = {:8} ({:2.0}% of oat file bytes)",
            category.name(),
            bytes,
            pct
        )?;
        if i == 2 || i == 5 {
            writeln!(out)?;
        }
    }

    for category in [
        SizeCategory::GcMap,
        SizeCategory::MappingTable,
        SizeCategory::VmapTable,
    ] {
        let (bytes, pct) = line(category);
        writeln!(
            out,
            "\t{:<22} = {:7} ({:2.0}% of oat file bytes)",
            category.name(),
            bytes,
            pct
        )?;
    }
    writeln!(out)?;

    writeln!(out, "\tdex_instruction_bytes = {dex_instruction_bytes}")?;
    writeln!(
        out,
        "\tmanaged_code_bytes expansion = {:.2} (ignoring deduplication {:.2})\n",
        ratio(ledger.total(SizeCategory::ManagedCode), dex_instruction_bytes),
        ratio(ledger.code_bytes_ignoring_dedup(), dex_instruction_bytes)
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::core::test_utils::test::{sample_writer, TestContext};
    use crate::core::ExtentRegistry;

    fn methods(container: &Container<'_>) -> Vec<MethodObject> {
        let mut methods = Vec::new();
        for dex in container.dex_files() {
            let source = dex.source.as_ref().unwrap();
            for (class_def, class) in source.classes.iter().zip(&dex.classes) {
                for (def, unit) in class_def.methods.iter().zip(&class.methods) {
                    methods.push(MethodObject::from_definition(class_def, def, *unit));
                }
            }
        }
        methods
    }

    #[test]
    fn kinds_follow_access_flags() {
        let data = sample_writer().write();
        let container = Container::parse(&data).unwrap();
        let kinds: Vec<_> = methods(&container).iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MethodKind::Managed,
                MethodKind::Managed,
                MethodKind::Native,
                MethodKind::Abstract,
                MethodKind::Managed,
            ]
        );
    }

    #[test]
    fn shared_regions_are_charged_once_but_sampled_twice() {
        let _ = env_logger::builder().is_test(true).try_init();
        let data = sample_writer().write();
        let container = Container::parse(&data).unwrap();
        let ctx = TestContext::with_registry(ExtentRegistry::for_container(&container).unwrap());
        let mut session = ctx.create_session();
        let methods = methods(&container);

        let init = attribute_method(&mut session, &methods[0], 40).unwrap().unwrap();
        let get = attribute_method(&mut session, &methods[1], 40).unwrap().unwrap();
        assert_eq!(init.code_bytes, 8);
        assert_eq!(get.code_bytes, 8);
        assert_eq!(init.vmap_table_bytes, get.vmap_table_bytes);
        assert_eq!(init.dex_instruction_bytes, 8);
        assert_eq!(init.expansion, 1.0);
        assert_eq!(
            init.total_bytes,
            8 + init.gc_map_bytes + init.mapping_table_bytes + init.vmap_table_bytes + 4 + 8 + 40
        );

        let ledger = session.ledger();
        assert_eq!(ledger.total(SizeCategory::ManagedCode), 8);
        assert_eq!(ledger.code_bytes_ignoring_dedup(), 16);
        assert_eq!(ledger.total(SizeCategory::VmapTable), init.vmap_table_bytes);
        assert_eq!(ledger.total(SizeCategory::NativeToManagedCode), 4);
        assert_eq!(session.stats().methods_sampled, 2);
    }

    #[test]
    fn native_and_abstract_methods() {
        let data = sample_writer().write();
        let container = Container::parse(&data).unwrap();
        let ctx = TestContext::with_registry(ExtentRegistry::for_container(&container).unwrap());
        let mut session = ctx.create_session();
        let methods = methods(&container);

        assert_eq!(attribute_method(&mut session, &methods[2], 40).unwrap(), None);
        assert_eq!(attribute_method(&mut session, &methods[3], 40).unwrap(), None);
        let ledger = session.ledger();
        assert_eq!(ledger.total(SizeCategory::ManagedToNativeCode), 8);
        assert_eq!(ledger.total(SizeCategory::NativeToManagedCode), 12);
        assert_eq!(ledger.code_bytes_ignoring_dedup(), 0);
        assert_eq!(session.stats().dex_instruction_bytes, 0);
    }

    #[test]
    fn code_categories() {
        let data = sample_writer().write();
        let container = Container::parse(&data).unwrap();
        let clinit = &methods(&container)[4];
        assert_eq!(clinit.code_category(), Some(SizeCategory::ClassInitializerCode));

        let mut big_init = clinit.clone();
        big_init.is_static = false;
        assert_eq!(big_init.code_category(), None);
        big_init.dex_instruction_bytes = LARGE_CONSTRUCTOR_DEX_BYTES + 2;
        assert_eq!(big_init.code_category(), Some(SizeCategory::LargeInitializerCode));

        let mut big_method = big_init.clone();
        big_method.is_constructor = false;
        assert_eq!(big_method.code_category(), None);
        big_method.dex_instruction_bytes = LARGE_METHOD_DEX_BYTES + 2;
        assert_eq!(big_method.code_category(), Some(SizeCategory::LargeMethodCode));
    }

    #[test]
    fn stats_lines() {
        let ctx = TestContext::new(0x1000);
        let mut session = ctx.create_session();
        session.ledger_mut().add(SizeCategory::ManagedCode, 0x100);
        session.ledger_mut().add_code_reference(0x200);
        let mut out = Vec::new();
        write_code_stats(&mut out, session.ledger(), 0x80, 0x1000).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\tmanaged_code_bytes           =      256 ( 6% of oat file bytes)\n"));
        assert!(text.contains("\tgc_map_bytes           =       0 ( 0% of oat file bytes)\n"));
        assert!(text.contains("\tmanaged_code_bytes expansion = 2.00 (ignoring deduplication 4.00)\n"));
    }
}
