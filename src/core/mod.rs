// This module is the core of oatdump: the pieces that reconstruct structure from a
// container whose regions carry no length and turn it into deduplicated size figures.
// The ExtentRegistry infers every region's extent from the next known boundary, the
// SizeLedger charges each distinct region once while still counting every reference,
// and the OutlierDetector sweeps the per-method samples for unusually large or
// expansive methods. A ReportSession owns the mutable parts of one report run and
// interns descriptor strings in a bumpalo arena. Errors for the whole crate live in
// `error`; register naming shared by the decoders and the report lives in `registers`.

//! Core oatdump infrastructure
//!
//! # Key Components
//!
//! ## Boundary inference (`extent`)
//! - Ordered set of region starts closed by the container end
//! - `size_of` is the distance to the next boundary, never a guess
//!
//! ## Size accounting (`ledger`)
//! - First-occurrence dedup keyed by region start
//! - Per-category totals plus an "ignoring dedup" code counter
//! - File accounting identity checks
//!
//! ## Outliers (`outlier`)
//! - Mean/variance sweeps over method size and code expansion
//!
//! ## Session (`session`)
//! - Single owner of the ledger, outlier samples and descriptor table

pub mod error;
pub mod extent;
pub mod ledger;
pub mod outlier;
pub mod registers;
pub mod session;
pub mod test_utils;

pub use error::{
    ContainerError, ContainerResult, DecodeError, DecodeResult, ReportError, ReportResult,
};
pub use extent::{ExtentRegistry, RegionKind};
pub use ledger::{percent, FileAccounting, Lookup, SizeCategory, SizeLedger};
pub use outlier::{
    pretty_size, MetricOutliers, Outlier, OutlierDetector, OutlierMetric, OutlierSummary,
};
pub use registers::{format_spill_mask, PhysicalSlot, SpillMasks};
pub use session::{ReportSession, SessionStats, SizeAndCount, OBJECT_ALIGNMENT};
