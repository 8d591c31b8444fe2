// This module holds the two report orchestrators. The archive report (`oat`) walks one
// container and dumps its header, dex files, classes and compiled methods. The artifact
// report (`image`) walks an object graph whose method objects point into a container
// and produces the size statistics. Both charge method regions through `attribution`,
// so the dedup rules and the code statistics block are identical in both reports.

//! Archive and artifact reports.

pub mod attribution;
pub mod image;
pub mod oat;

pub use attribution::{
    attribute_method, write_code_stats, MethodFootprint, MethodKind, MethodObject,
    LARGE_CONSTRUCTOR_DEX_BYTES, LARGE_METHOD_DEX_BYTES,
};
pub use image::{ArtifactReport, ArtifactSummary, HeapObject, ObjectGraph, ObjectWalker};
pub use oat::{DumpOptions, OatDumper};
