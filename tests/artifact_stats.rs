//! Artifact report over an object graph whose methods point into a written container.

use bumpalo::Bump;
use oatdump::container::{ClassLayout, Container, ContainerWriter, DexFileLayout, InstructionSet, MethodLayout};
use oatdump::core::{ExtentRegistry, OutlierMetric, ReportError, ReportSession, SizeCategory};
use oatdump::report::{ArtifactReport, HeapObject, MethodObject, ObjectGraph, ObjectWalker};
use std::sync::RwLock;

const HEADER_BYTES: usize = 16;
const METHOD_OBJECT_BYTES: usize = 40;

/// Nine small methods and one whose code is a hundred times larger.
fn container_bytes() -> Vec<u8> {
    let mut class = ClassLayout::new("Lcom/example/Big;", 1);
    for i in 0..9u8 {
        class = class.method(
            MethodLayout::new(&format!("small{i}"), i as u32, 2, 0).code(vec![i, 0xc3, 0x90, 0x90]),
        );
    }
    class = class.method(MethodLayout::new("huge", 9, 2, 0).code(vec![0x90; 400]));
    ContainerWriter::new(InstructionSet::X86_64)
        .dex_file(DexFileLayout::new("/data/app/Big.apk", 1).class(class))
        .write()
}

fn object_graph(container: &Container<'_>) -> ObjectGraph {
    let mut graph = ObjectGraph::new();
    let mut address = 0x6000_0000u64;
    for dex in container.dex_files() {
        let source = dex.source.as_ref().unwrap();
        for (class_def, class) in source.classes.iter().zip(&dex.classes) {
            graph.push(HeapObject {
                address,
                descriptor: "Ljava/lang/Class;".to_string(),
                byte_size: 96,
                method: None,
            });
            address += 96;
            for (def, unit) in class_def.methods.iter().zip(&class.methods) {
                graph.push(HeapObject {
                    address,
                    descriptor: "Ljava/lang/reflect/Method;".to_string(),
                    byte_size: METHOD_OBJECT_BYTES,
                    method: Some(MethodObject::from_definition(class_def, def, *unit)),
                });
                address += METHOD_OBJECT_BYTES as u64;
            }
        }
    }
    graph
}

#[test]
fn huge_method_is_an_outlier_on_both_metrics() {
    let _ = env_logger::builder().is_test(true).try_init();
    let data = container_bytes();
    let container = Container::parse(&data).unwrap();
    let registry = ExtentRegistry::for_container(&container).unwrap();
    let graph = object_graph(&container);
    let arena = Bump::new();

    let mut report = ArtifactReport::new(
        ReportSession::new(&arena, &registry),
        graph.file_bytes(HEADER_BYTES),
        HEADER_BYTES,
    )
    .unwrap();
    let mut out = Vec::new();
    report.walk(&graph, &mut out).unwrap();
    let summary = report.finish(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(summary.stats.methods_sampled, 10);
    assert_eq!(summary.stats.dex_instruction_bytes, 40);
    assert_eq!(summary.total(SizeCategory::ManagedCode), 9 * 4 + 400);
    assert_eq!(summary.code_bytes_ignoring_dedup, 9 * 4 + 400);
    assert_eq!(summary.stats.oat_file_bytes, data.len());

    // sizes are 48 (x9) and 444; the 444 sits between 2 and 3 deviations
    let size = &summary.outliers.size;
    assert_eq!(size.metric, OutlierMetric::Size);
    assert_eq!(size.reported.len(), 1);
    assert_eq!(size.reported[0].name, "com.example.Big.huge");
    assert_eq!(size.reported[0].deviations, 2);
    assert_eq!(size.reported[0].value, 444.0);

    let expansion = &summary.outliers.expansion;
    assert_eq!(expansion.reported.len(), 1);
    assert_eq!(expansion.reported[0].deviations, 2);
    assert_eq!(expansion.reported[0].value, 100.0);

    assert!(text.contains("\nBig methods (size > 2 standard deviations the norm):\n"));
    assert!(text.contains("\tcom.example.Big.huge requires storage of 444B\n"));
    assert!(text.contains("\tcom.example.Big.huge expanded code by 100.00\n"));
    assert!(text.contains("\tdex_instruction_bytes = 40\n"));
}

#[test]
fn wrong_file_size_stops_before_stats() {
    let data = container_bytes();
    let container = Container::parse(&data).unwrap();
    let registry = ExtentRegistry::for_container(&container).unwrap();
    let graph = object_graph(&container);
    let arena = Bump::new();

    let file_bytes = graph.file_bytes(HEADER_BYTES) + 8;
    let mut report = ArtifactReport::new(
        ReportSession::new(&arena, &registry),
        file_bytes,
        HEADER_BYTES,
    )
    .unwrap();
    let mut out = Vec::new();
    report.walk(&graph, &mut out).unwrap();
    let err = report.finish(&mut out).unwrap_err();
    assert!(matches!(
        err,
        ReportError::AccountingInvariant { lhs: "file_bytes", .. }
    ));
    assert!(!String::from_utf8(out).unwrap().contains("STATS:"));
}

#[test]
fn walk_through_a_read_locked_heap() {
    let data = container_bytes();
    let container = Container::parse(&data).unwrap();
    let registry = ExtentRegistry::for_container(&container).unwrap();
    let heap = RwLock::new(object_graph(&container));
    let file_bytes = heap.read().unwrap().file_bytes(HEADER_BYTES);
    let arena = Bump::new();

    let mut report =
        ArtifactReport::new(ReportSession::new(&arena, &registry), file_bytes, HEADER_BYTES)
            .unwrap();
    let walker: &dyn ObjectWalker = &heap;
    let mut out = Vec::new();
    report.walk(walker, &mut out).unwrap();
    assert_eq!(report.session().stats().objects_visited, 11);

    let summary = report.finish(&mut out).unwrap();
    assert_eq!(summary.stats.accounting.object_bytes, 96 + 10 * METHOD_OBJECT_BYTES);
    assert_eq!(summary.stats.accounting.alignment_bytes, 0);
}
