// This module implements the artifact report: size statistics for an image of objects
// whose methods point into an oat container. Objects come from an ObjectWalker, the
// boundary to whatever owns the heap. Every object is charged to the file accounting
// (its bytes plus padding to the object alignment) and to its descriptor's row of the
// breakdown table; method objects additionally have their compiled regions attributed
// through the shared SizeLedger, so code and tables shared between methods are counted
// once. A walker over a live heap is wrapped in an RwLock and the read guard is held for
// the entire walk, so the report sees one consistent snapshot. `finish` checks both
// accounting identities before rendering anything and fails on a mismatch.

//! Artifact (image) size report.

use super::attribution::{attribute_method, write_code_stats, MethodKind, MethodObject};
use crate::container::pretty_descriptor;
use crate::core::{
    percent, pretty_size, OutlierSummary, ReportError, ReportResult, ReportSession,
    SessionStats, SizeCategory, OBJECT_ALIGNMENT,
};
use crate::core::session::round_up;
use hashbrown::HashMap;
use std::io::Write;
use std::sync::RwLock;

/// One live object as seen by a walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapObject {
    pub address: u64,
    /// Type descriptor of the object's class, e.g. `Ljava/lang/String;`.
    pub descriptor: String,
    pub byte_size: usize,
    /// Set for method objects.
    pub method: Option<MethodObject>,
}

/// Source of heap objects.
pub trait ObjectWalker {
    /// Call `visit` once per object, stopping at the first error.
    fn walk(&self, visit: &mut dyn FnMut(&HeapObject) -> ReportResult<()>) -> ReportResult<()>;
}

impl<W: ObjectWalker> ObjectWalker for RwLock<W> {
    fn walk(&self, visit: &mut dyn FnMut(&HeapObject) -> ReportResult<()>) -> ReportResult<()> {
        let heap = self.read().map_err(|_| ReportError::Walker {
            reason: "heap lock poisoned by a panicking writer".to_string(),
        })?;
        heap.walk(visit)
    }
}

/// In-memory object graph, laid out in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    objects: Vec<HeapObject>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: HeapObject) {
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[HeapObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Size of a file holding a `header_bytes` header followed by every
    /// object, each starting on the object alignment.
    pub fn file_bytes(&self, header_bytes: usize) -> usize {
        self.objects
            .iter()
            .fold(round_up(header_bytes, OBJECT_ALIGNMENT), |acc, object| {
                acc + round_up(object.byte_size, OBJECT_ALIGNMENT)
            })
    }
}

impl ObjectWalker for ObjectGraph {
    fn walk(&self, visit: &mut dyn FnMut(&HeapObject) -> ReportResult<()>) -> ReportResult<()> {
        self.objects.iter().try_for_each(|object| visit(object))
    }
}

/// What [`ArtifactReport::finish`] found.
#[derive(Debug, Clone)]
pub struct ArtifactSummary {
    pub stats: SessionStats,
    pub category_totals: HashMap<SizeCategory, usize>,
    pub code_bytes_ignoring_dedup: usize,
    pub outliers: OutlierSummary,
}

impl ArtifactSummary {
    pub fn total(&self, category: SizeCategory) -> usize {
        self.category_totals.get(&category).copied().unwrap_or(0)
    }
}

/// Size report over one object walk.
pub struct ArtifactReport<'arena, 'r> {
    session: ReportSession<'arena, 'r>,
}

impl<'arena, 'r> ArtifactReport<'arena, 'r> {
    /// Start a report for a file of `file_bytes` bytes whose header takes
    /// `header_bytes`. The session's registry describes the oat container the
    /// methods refer to; an inverted range is rejected.
    pub fn new(
        mut session: ReportSession<'arena, 'r>,
        file_bytes: usize,
        header_bytes: usize,
    ) -> ReportResult<Self> {
        let registry = session.ledger().registry();
        let (begin, end) = (registry.begin(), registry.end());
        let oat_file_bytes = end
            .checked_sub(begin)
            .ok_or(ReportError::OutOfContainer { offset: end, begin, end })?
            as usize;
        session.record_header(header_bytes);
        let stats = session.stats_mut();
        stats.accounting.file_bytes = file_bytes;
        stats.oat_file_bytes = oat_file_bytes;
        Ok(Self { session })
    }

    /// Walk every object, writing one summary line per object.
    pub fn walk(&mut self, walker: &dyn ObjectWalker, out: &mut dyn Write) -> ReportResult<()> {
        writeln!(out, "OBJECTS:")?;
        walker.walk(&mut |object| self.visit(object, &mut *out))?;
        writeln!(out)?;
        log::debug!(
            "walked {} objects, {} object bytes",
            self.session.stats().objects_visited,
            self.session.stats().accounting.object_bytes
        );
        Ok(())
    }

    /// Account for one object.
    pub fn visit(&mut self, object: &HeapObject, out: &mut dyn Write) -> ReportResult<()> {
        self.session.record_object(&object.descriptor, object.byte_size);
        let Some(method) = &object.method else {
            writeln!(out, "0x{:08x}: {}", object.address, pretty_descriptor(&object.descriptor))?;
            return Ok(());
        };

        writeln!(out, "0x{:08x}: java.lang.reflect.Method {}", object.address, method.name)?;
        let footprint = attribute_method(&mut self.session, method, object.byte_size)?;
        let unit = &method.unit;
        match (method.kind, footprint) {
            (MethodKind::Managed, Some(footprint)) => {
                let begin = unit.code_offset.unwrap_or(0);
                let registry = self.session.ledger().registry();
                let end = begin.checked_add(unit.code_size).ok_or(ReportError::OutOfContainer {
                    offset: begin,
                    begin: registry.begin(),
                    end: registry.end(),
                })?;
                writeln!(out, "\t\tOAT CODE: 0x{begin:08x}-0x{end:08x}")?;
                writeln!(
                    out,
                    "\t\tSIZE: Dex Instructions={} GC={} Mapping={}",
                    footprint.dex_instruction_bytes,
                    footprint.gc_map_bytes,
                    footprint.mapping_table_bytes
                )?;
            }
            (MethodKind::Native, _) => {
                if let Some(code) = unit.code_offset {
                    writeln!(out, "\t\tOAT CODE: 0x{code:08x}")?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn session(&self) -> &ReportSession<'arena, 'r> {
        &self.session
    }

    /// Check the accounting and write the `STATS:` block and outliers.
    pub fn finish(self, out: &mut dyn Write) -> ReportResult<ArtifactSummary> {
        self.session.check_accounting()?;
        let descriptors = self.session.descriptor_table();
        let (ledger, mut outliers, stats) = self.session.finish();
        let accounting = stats.accounting;

        writeln!(out, "STATS:")?;
        write!(out, "\tart_file_bytes = {}\n\n", pretty_size(accounting.file_bytes))?;
        writeln!(out, "\tart_file_bytes = header_bytes + object_bytes + alignment_bytes")?;
        for (name, bytes) in [
            ("header_bytes", accounting.header_bytes),
            ("object_bytes", accounting.object_bytes),
            ("alignment_bytes", accounting.alignment_bytes),
        ] {
            writeln!(
                out,
                "\t{:<15} =  {:8} ({:2.0}% of art file bytes)",
                name,
                bytes,
                accounting.percent_of_file(bytes)
            )?;
        }
        writeln!(out)?;

        writeln!(out, "\tobject_bytes breakdown:")?;
        for (descriptor, size) in &descriptors {
            writeln!(
                out,
                "\t{:>32} {:8} bytes {:6} instances ({:4.0} bytes/instance) {:2.0}% of object_bytes",
                descriptor,
                size.bytes,
                size.count,
                size.average(),
                percent(size.bytes, accounting.object_bytes)
            )?;
        }
        writeln!(out)?;

        write_code_stats(out, &ledger, stats.dex_instruction_bytes, stats.oat_file_bytes)?;
        let outliers = outliers.finalize();
        write!(out, "{outliers}")?;
        out.flush()?;

        Ok(ArtifactSummary {
            category_totals: SizeCategory::ALL
                .into_iter()
                .map(|category| (category, ledger.total(category)))
                .collect(),
            code_bytes_ignoring_dedup: ledger.code_bytes_ignoring_dedup(),
            stats,
            outliers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::core::test_utils::test::{sample_writer, TestContext};
    use crate::core::ExtentRegistry;

    const HEADER_BYTES: usize = 12;

    fn graph(container: &Container<'_>) -> ObjectGraph {
        let mut graph = ObjectGraph::new();
        let mut address = 0x7000_0000u64;
        for dex in container.dex_files() {
            let source = dex.source.as_ref().unwrap();
            for (class_def, class) in source.classes.iter().zip(&dex.classes) {
                graph.push(HeapObject {
                    address,
                    descriptor: "Ljava/lang/Class;".to_string(),
                    byte_size: 85,
                    method: None,
                });
                address += 88;
                for (def, unit) in class_def.methods.iter().zip(&class.methods) {
                    graph.push(HeapObject {
                        address,
                        descriptor: "Ljava/lang/reflect/Method;".to_string(),
                        byte_size: 60,
                        method: Some(MethodObject::from_definition(class_def, def, *unit)),
                    });
                    address += 64;
                }
            }
        }
        graph
    }

    #[test]
    fn object_graph_layout() {
        let data = sample_writer().write();
        let container = Container::parse(&data).unwrap();
        let graph = graph(&container);
        assert_eq!(graph.len(), 7);
        assert_eq!(graph.file_bytes(HEADER_BYTES), 16 + 2 * 88 + 5 * 64);
    }

    #[test]
    fn report_reconciles_file_bytes() {
        let _ = env_logger::builder().is_test(true).try_init();
        let data = sample_writer().write();
        let container = Container::parse(&data).unwrap();
        let graph = graph(&container);
        let ctx = TestContext::with_registry(ExtentRegistry::for_container(&container).unwrap());
        let mut report = ArtifactReport::new(
            ctx.create_session(),
            graph.file_bytes(HEADER_BYTES),
            HEADER_BYTES,
        )
        .unwrap();

        let mut out = Vec::new();
        report.walk(&graph, &mut out).unwrap();
        let summary = report.finish(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let accounting = summary.stats.accounting;
        assert_eq!(accounting.header_bytes, HEADER_BYTES);
        assert_eq!(accounting.object_bytes, 2 * 85 + 5 * 60);
        assert_eq!(accounting.alignment_bytes, 4 + 2 * 3 + 5 * 4);
        assert_eq!(summary.stats.objects_visited, 7);
        assert_eq!(summary.stats.methods_sampled, 3);
        assert_eq!(summary.total(SizeCategory::ManagedCode), 12);
        assert_eq!(summary.total(SizeCategory::ManagedToNativeCode), 8);
        assert_eq!(summary.code_bytes_ignoring_dedup, 20);

        assert!(text.starts_with("OBJECTS:\n0x70000000: java.lang.Class\n"));
        assert!(text.contains(": java.lang.reflect.Method Foo.<init>\n\t\tOAT CODE: 0x"));
        assert!(text.contains("\t\tSIZE: Dex Instructions=8 GC="));
        assert!(text.contains("\tart_file_bytes = header_bytes + object_bytes + alignment_bytes\n"));
        assert!(text.contains("\theader_bytes    =        12 ( 2% of art file bytes)\n"));
        assert!(text.contains(
            "\t               Ljava/lang/Class;      170 bytes      2 instances (  85 bytes/instance) 36% of object_bytes\n"
        ));
    }

    #[test]
    fn mismatched_file_size_is_fatal() {
        let ctx = TestContext::new(0x100);
        let mut report = ArtifactReport::new(ctx.create_session(), 1000, HEADER_BYTES).unwrap();
        let mut graph = ObjectGraph::new();
        graph.push(HeapObject {
            address: 0x1000,
            descriptor: "[I".to_string(),
            byte_size: 24,
            method: None,
        });
        let mut out = Vec::new();
        report.walk(&graph, &mut out).unwrap();
        assert!(matches!(
            report.finish(&mut out),
            Err(ReportError::AccountingInvariant { lhs_value: 1000, rhs_value: 40, .. })
        ));
    }

    #[test]
    fn inverted_registry_is_rejected() {
        let ctx = TestContext::with_registry(ExtentRegistry::new(0x100, 0x40));
        assert!(matches!(
            ArtifactReport::new(ctx.create_session(), 0, HEADER_BYTES),
            Err(ReportError::OutOfContainer { offset: 0x40, begin: 0x100, end: 0x40 })
        ));
    }

    #[test]
    fn code_range_past_u32_is_an_error() {
        let _ = env_logger::builder().is_test(true).try_init();
        let data = sample_writer().write();
        let container = Container::parse(&data).unwrap();
        let ctx = TestContext::with_registry(ExtentRegistry::for_container(&container).unwrap());
        let mut graph = graph(&container);
        let mut method = graph
            .objects()
            .iter()
            .filter_map(|object| object.method.clone())
            .find(|method| method.kind == MethodKind::Managed && method.unit.code_offset.is_some())
            .unwrap();
        method.unit.code_size = u32::MAX;
        graph.push(HeapObject {
            address: 0x7fff_0000,
            descriptor: "Ljava/lang/reflect/Method;".to_string(),
            byte_size: 60,
            method: Some(method),
        });

        let mut report =
            ArtifactReport::new(ctx.create_session(), graph.file_bytes(HEADER_BYTES), HEADER_BYTES)
                .unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            report.walk(&graph, &mut out),
            Err(ReportError::OutOfContainer { .. })
        ));
    }

    #[test]
    fn locked_walker_holds_read_guard() {
        let mut graph = ObjectGraph::new();
        graph.push(HeapObject {
            address: 0x10,
            descriptor: "Ljava/lang/Object;".to_string(),
            byte_size: 8,
            method: None,
        });
        let heap = RwLock::new(graph);
        let mut seen = 0;
        heap.walk(&mut |_| {
            assert!(heap.try_write().is_err());
            seen += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn visitor_errors_stop_the_walk() {
        let mut graph = ObjectGraph::new();
        for address in 0..3 {
            graph.push(HeapObject {
                address,
                descriptor: "LX;".to_string(),
                byte_size: 8,
                method: None,
            });
        }
        let mut seen = 0;
        let result = graph.walk(&mut |_| {
            seen += 1;
            Err(ReportError::Walker {
                reason: "stop".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }
}
