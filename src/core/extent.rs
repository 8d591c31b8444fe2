//! Region extent inference.
//!
//! Regions in an oat container are laid out back to back with no length field.
//! The registry collects the start offset of every known region and defines the
//! size of a region as the distance to the next registered start. That is exact
//! as long as every region start is registered, which is why registration walks
//! every table of every compiled unit and closes with the container end.

use super::error::{ReportError, ReportResult};
use crate::container::{CompiledUnit, Container};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Bound;

/// Kind of region a registered offset starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegionKind {
    /// Container header; always at offset 0.
    Header,
    /// Embedded source dictionary of one dex file.
    SourceDictionary,
    Code,
    MappingTable,
    VmapTable,
    GcMap,
    InvokeStub,
    /// Closing sentinel at the container end.
    End,
}

impl RegionKind {
    pub const ALL: [RegionKind; 8] = [
        RegionKind::Header,
        RegionKind::SourceDictionary,
        RegionKind::Code,
        RegionKind::MappingTable,
        RegionKind::VmapTable,
        RegionKind::GcMap,
        RegionKind::InvokeStub,
        RegionKind::End,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RegionKind::Header => "header",
            RegionKind::SourceDictionary => "source_dictionary",
            RegionKind::Code => "code",
            RegionKind::MappingTable => "mapping_table",
            RegionKind::VmapTable => "vmap_table",
            RegionKind::GcMap => "gc_map",
            RegionKind::InvokeStub => "invoke_stub",
            RegionKind::End => "end",
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered set of region starts within `[begin, end]`.
#[derive(Debug, Clone)]
pub struct ExtentRegistry {
    begin: u32,
    end: u32,
    offsets: BTreeSet<u32>,
}

impl ExtentRegistry {
    /// Create an empty registry for the range `[begin, end]`.
    ///
    /// Nothing is registered yet, not even the end sentinel; call
    /// [`close`](Self::close) once all region starts are in.
    pub fn new(begin: u32, end: u32) -> Self {
        Self {
            begin,
            end,
            offsets: BTreeSet::new(),
        }
    }

    /// Register every region start of a container and close the registry.
    pub fn for_container(container: &Container<'_>) -> ReportResult<Self> {
        let mut registry = Self::new(container.begin(), container.end());
        registry.register(RegionKind::Header, container.begin())?;
        for dex_file in container.dex_files() {
            if let Some(offset) = dex_file.dex_file_offset {
                registry.register(RegionKind::SourceDictionary, offset)?;
            }
            for unit in dex_file.units() {
                registry.register_unit(unit)?;
            }
        }
        registry.close();
        log::debug!(
            "extent registry: {} boundaries in [0x{:08x}, 0x{:08x}]",
            registry.len(),
            registry.begin,
            registry.end
        );
        Ok(registry)
    }

    /// Insert a region start. Registering the same offset twice is a no-op.
    pub fn register(&mut self, kind: RegionKind, offset: u32) -> ReportResult<()> {
        if offset < self.begin || offset > self.end {
            return Err(ReportError::OutOfContainer {
                offset,
                begin: self.begin,
                end: self.end,
            });
        }
        if self.offsets.insert(offset) {
            log::trace!("registered {kind} boundary at 0x{offset:08x}");
        }
        Ok(())
    }

    /// Register the starts of all regions a compiled unit references.
    pub fn register_unit(&mut self, unit: &CompiledUnit) -> ReportResult<()> {
        let regions = [
            (RegionKind::Code, unit.code_offset),
            (RegionKind::MappingTable, unit.mapping_table_offset),
            (RegionKind::VmapTable, unit.vmap_table_offset),
            (RegionKind::GcMap, unit.gc_map_offset),
            (RegionKind::InvokeStub, unit.invoke_stub_offset),
        ];
        for (kind, offset) in regions {
            if let Some(offset) = offset {
                self.register(kind, offset)?;
            }
        }
        Ok(())
    }

    /// Register the end sentinel so the last region has a successor.
    pub fn close(&mut self) {
        self.offsets.insert(self.end);
    }

    /// Size of the region starting at `offset`.
    pub fn size_of(&self, offset: u32) -> ReportResult<usize> {
        if offset < self.begin || offset > self.end {
            return Err(ReportError::OutOfContainer {
                offset,
                begin: self.begin,
                end: self.end,
            });
        }
        let next = self
            .next_boundary(offset)
            .ok_or(ReportError::BoundaryInference { offset })?;
        Ok((next - offset) as usize)
    }

    /// First registered offset strictly greater than `offset`.
    pub fn next_boundary(&self, offset: u32) -> Option<u32> {
        self.offsets
            .range((Bound::Excluded(offset), Bound::Unbounded))
            .next()
            .copied()
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.offsets.contains(&offset)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn begin(&self) -> u32 {
        self.begin
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Registered offsets in ascending order.
    pub fn boundaries(&self) -> impl Iterator<Item = u32> + '_ {
        self.offsets.iter().copied()
    }
}
