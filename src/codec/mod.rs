//! Decoders for the per-method metadata tables.
//!
//! Every decoder is a pure function of its input bytes. The slice handed in is
//! usually the region's inferred extent, so decoders tolerate trailing bytes but
//! fail with a [`DecodeError`](crate::core::DecodeError) when the table claims
//! more data than the slice holds. Absent tables never reach a decoder.
//!
//! - [`vmap`] - virtual register to spill slot tables
//! - [`mapping`] - split native/source PC mapping tables
//! - [`gc_map`] - live register bitmaps per safepoint

pub mod gc_map;
pub mod mapping;
pub mod vmap;

pub use gc_map::{decode_gc_map, encode_gc_map, LiveMapEntry, LiveRegisterMap};
pub use mapping::{decode_mapping_table, encode_mapping_table, MappingTable};
pub use vmap::{decode_vmap_table, encode_vmap_table, format_vmap, VmapEntry};
