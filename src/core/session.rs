// This module provides the report session, the single owner of all mutable state of one
// report run. It owns the SizeLedger (the seen-set and per-category totals), the
// OutlierDetector samples, the per-descriptor size table and the file accounting.
// Descriptor strings are interned in a bumpalo arena so the descriptor table can key
// on borrowed `&'arena str` without cloning a String per object. A session is built
// fresh per report and is never shared between reports; nothing in it is global.

//! Arena-based report session.
//!
//! All state accumulated while walking a container or an object graph lives
//! here and shares the session lifetime.

use super::error::{ReportError, ReportResult};
use super::extent::ExtentRegistry;
use super::ledger::{FileAccounting, SizeLedger};
use super::outlier::OutlierDetector;
use bumpalo::Bump;
use hashbrown::{HashMap, HashSet};

/// Objects are laid out on this alignment.
pub const OBJECT_ALIGNMENT: usize = 8;

/// Round `value` up to a multiple of `alignment` (a power of two).
pub fn round_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Bytes and instance count of one type descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeAndCount {
    pub bytes: usize,
    pub count: usize,
}

impl SizeAndCount {
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.bytes as f64 / self.count as f64
        }
    }
}

/// Counters that are not per-category byte totals.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub accounting: FileAccounting,
    /// Size of the code container the objects refer to.
    pub oat_file_bytes: usize,
    pub dex_instruction_bytes: usize,
    pub objects_visited: usize,
    pub methods_sampled: usize,
}

/// State of one report run.
pub struct ReportSession<'arena, 'r> {
    /// Arena for interned descriptors.
    arena: &'arena Bump,

    ledger: SizeLedger<'r>,

    outliers: OutlierDetector,

    descriptors: HashMap<&'arena str, SizeAndCount>,

    interned_strings: HashSet<&'arena str>,

    stats: SessionStats,
}

impl<'arena, 'r> ReportSession<'arena, 'r> {
    /// Create a session over a closed extent registry.
    pub fn new(arena: &'arena Bump, registry: &'r ExtentRegistry) -> Self {
        Self {
            arena,
            ledger: SizeLedger::new(registry),
            outliers: OutlierDetector::new(),
            descriptors: HashMap::new(),
            interned_strings: HashSet::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Intern a string in the arena.
    pub fn intern_str(&mut self, s: &str) -> &'arena str {
        if let Some(&interned) = self.interned_strings.get(s) {
            return interned;
        }
        let interned: &'arena str = self.arena.alloc_str(s);
        self.interned_strings.insert(interned);
        interned
    }

    pub fn ledger(&self) -> &SizeLedger<'r> {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut SizeLedger<'r> {
        &mut self.ledger
    }

    pub fn outliers_mut(&mut self) -> &mut OutlierDetector {
        &mut self.outliers
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut SessionStats {
        &mut self.stats
    }

    /// Record the file header and the padding after it.
    pub fn record_header(&mut self, header_bytes: usize) {
        self.stats.accounting.header_bytes = header_bytes;
        self.stats.accounting.alignment_bytes +=
            round_up(header_bytes, OBJECT_ALIGNMENT) - header_bytes;
    }

    /// Record one object of `object_bytes` bytes with the given descriptor.
    pub fn record_object(&mut self, descriptor: &str, object_bytes: usize) {
        let alignment_bytes = round_up(object_bytes, OBJECT_ALIGNMENT) - object_bytes;
        self.stats.accounting.object_bytes += object_bytes;
        self.stats.accounting.alignment_bytes += alignment_bytes;
        self.stats.objects_visited += 1;

        let descriptor = self.intern_str(descriptor);
        let entry = self.descriptors.entry(descriptor).or_default();
        entry.bytes += object_bytes;
        entry.count += 1;
    }

    /// Descriptor table sorted by descriptor.
    pub fn descriptor_table(&self) -> Vec<(&'arena str, SizeAndCount)> {
        let mut table: Vec<_> = self.descriptors.iter().map(|(&d, &s)| (d, s)).collect();
        table.sort_unstable_by(|a, b| a.0.cmp(b.0));
        table
    }

    /// Check both accounting identities: the file decomposes into header,
    /// objects and alignment, and the descriptor table sums to the objects.
    pub fn check_accounting(&self) -> ReportResult<()> {
        self.stats.accounting.check()?;
        let table_total: usize = self.descriptors.values().map(|s| s.bytes).sum();
        if table_total != self.stats.accounting.object_bytes {
            return Err(ReportError::AccountingInvariant {
                lhs: "object_bytes",
                lhs_value: self.stats.accounting.object_bytes,
                rhs: "sum of descriptor bytes",
                rhs_value: table_total,
            });
        }
        Ok(())
    }

    /// Split the session into the parts the final report reads.
    pub fn finish(self) -> (SizeLedger<'r>, OutlierDetector, SessionStats) {
        (self.ledger, self.outliers, self.stats)
    }
}
