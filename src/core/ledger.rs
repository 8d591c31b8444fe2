//! Deduplicated size accounting.
//!
//! Several methods can point at the same bytes: deduplicated code, shared
//! invoke stubs, identical tables. The ledger remembers every region start it
//! has been asked about, so each region is charged to a category only once,
//! while a separate counter still sums every reference to code.

use super::error::{ReportError, ReportResult};
use super::extent::{ExtentRegistry, RegionKind};
use hashbrown::{HashMap, HashSet};
use std::fmt;

/// Category a region's bytes are charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeCategory {
    /// Compiled code of managed methods.
    ManagedCode,
    /// Invoke stubs of native methods.
    ManagedToNativeCode,
    /// Invoke stubs of managed methods and code of native methods.
    NativeToManagedCode,
    /// Managed code of static constructors.
    ClassInitializerCode,
    /// Managed code of large instance constructors.
    LargeInitializerCode,
    /// Managed code of large methods.
    LargeMethodCode,
    GcMap,
    MappingTable,
    VmapTable,
}

impl SizeCategory {
    pub const ALL: [SizeCategory; 9] = [
        SizeCategory::ManagedCode,
        SizeCategory::ManagedToNativeCode,
        SizeCategory::NativeToManagedCode,
        SizeCategory::ClassInitializerCode,
        SizeCategory::LargeInitializerCode,
        SizeCategory::LargeMethodCode,
        SizeCategory::GcMap,
        SizeCategory::MappingTable,
        SizeCategory::VmapTable,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SizeCategory::ManagedCode => "managed_code_bytes",
            SizeCategory::ManagedToNativeCode => "managed_to_native_code_bytes",
            SizeCategory::NativeToManagedCode => "native_to_managed_code_bytes",
            SizeCategory::ClassInitializerCode => "class_initializer_code_bytes",
            SizeCategory::LargeInitializerCode => "large_initializer_code_bytes",
            SizeCategory::LargeMethodCode => "large_method_code_bytes",
            SizeCategory::GcMap => "gc_map_bytes",
            SizeCategory::MappingTable => "pc_mapping_table_bytes",
            SizeCategory::VmapTable => "vmap_table_bytes",
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a ledger lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub bytes: usize,
    /// True the first time this start offset is looked up in the session.
    pub first_occurrence: bool,
}

/// Seen-set plus per-category totals for one report session.
#[derive(Debug)]
pub struct SizeLedger<'r> {
    registry: &'r ExtentRegistry,
    seen: HashSet<u32>,
    totals: HashMap<SizeCategory, usize>,
    /// Distinct inferred bytes per region kind.
    region_totals: HashMap<RegionKind, usize>,
    code_bytes_ignoring_dedup: usize,
}

impl<'r> SizeLedger<'r> {
    pub fn new(registry: &'r ExtentRegistry) -> Self {
        Self {
            registry,
            seen: HashSet::new(),
            totals: HashMap::new(),
            region_totals: HashMap::new(),
            code_bytes_ignoring_dedup: 0,
        }
    }

    pub fn registry(&self) -> &'r ExtentRegistry {
        self.registry
    }

    /// Inferred size of the `kind` region at `offset` and whether it is new.
    ///
    /// Dedup is keyed by the start offset alone; the kind of the first
    /// lookup decides which region total the inferred bytes land in.
    pub fn size_and_dedup(&mut self, kind: RegionKind, offset: u32) -> ReportResult<Lookup> {
        let bytes = self.registry.size_of(offset)?;
        let first_occurrence = self.seen.insert(offset);
        if first_occurrence {
            *self.region_totals.entry(kind).or_insert(0) += bytes;
        } else {
            log::trace!("{kind} region at 0x{offset:08x} already charged");
        }
        Ok(Lookup {
            bytes,
            first_occurrence,
        })
    }

    /// Look up an optional region and charge its inferred size on first use.
    ///
    /// Returns the region size whether or not it was charged; absent regions
    /// are zero bytes.
    pub fn charge(
        &mut self,
        category: SizeCategory,
        kind: RegionKind,
        offset: Option<u32>,
    ) -> ReportResult<usize> {
        let Some(offset) = offset else {
            return Ok(0);
        };
        let lookup = self.size_and_dedup(kind, offset)?;
        if lookup.first_occurrence {
            self.add(category, lookup.bytes);
        }
        Ok(lookup.bytes)
    }

    /// Like [`charge`](Self::charge) for regions whose size is known
    /// explicitly. Returns whether the bytes were charged.
    pub fn charge_sized(
        &mut self,
        category: SizeCategory,
        kind: RegionKind,
        offset: Option<u32>,
        bytes: usize,
    ) -> ReportResult<bool> {
        let Some(offset) = offset else {
            return Ok(false);
        };
        let lookup = self.size_and_dedup(kind, offset)?;
        if lookup.first_occurrence {
            self.add(category, bytes);
        }
        Ok(lookup.first_occurrence)
    }

    /// Charge bytes to a category without a lookup.
    pub fn add(&mut self, category: SizeCategory, bytes: usize) {
        *self.totals.entry(category).or_insert(0) += bytes;
    }

    /// Count a code reference regardless of deduplication.
    pub fn add_code_reference(&mut self, bytes: usize) {
        self.code_bytes_ignoring_dedup += bytes;
    }

    pub fn total(&self, category: SizeCategory) -> usize {
        self.totals.get(&category).copied().unwrap_or(0)
    }

    /// Distinct inferred bytes of every region first looked up as `kind`.
    pub fn region_total(&self, kind: RegionKind) -> usize {
        self.region_totals.get(&kind).copied().unwrap_or(0)
    }

    pub fn code_bytes_ignoring_dedup(&self) -> usize {
        self.code_bytes_ignoring_dedup
    }

    /// Number of distinct region starts looked up so far.
    pub fn distinct_regions(&self) -> usize {
        self.seen.len()
    }
}

/// Byte accounting of an artifact file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAccounting {
    pub file_bytes: usize,
    pub header_bytes: usize,
    pub object_bytes: usize,
    pub alignment_bytes: usize,
}

impl FileAccounting {
    /// Verify `header_bytes + object_bytes + alignment_bytes == file_bytes`.
    pub fn check(&self) -> ReportResult<()> {
        let sum = self.header_bytes + self.object_bytes + self.alignment_bytes;
        if sum != self.file_bytes {
            return Err(ReportError::AccountingInvariant {
                lhs: "file_bytes",
                lhs_value: self.file_bytes,
                rhs: "header_bytes + object_bytes + alignment_bytes",
                rhs_value: sum,
            });
        }
        Ok(())
    }

    pub fn percent_of_file(&self, bytes: usize) -> f64 {
        percent(bytes, self.file_bytes)
    }
}

/// `part` as a percentage of `whole`; 0 when `whole` is 0.
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
