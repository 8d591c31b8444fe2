//! oatdump - inspector for compiled-code (oat) containers.
//!
//! A container holds compiled methods together with metadata tables that
//! carry no stored length. oatdump recovers every table's extent from the
//! relative order of all region starts, decodes the tables, and attributes
//! sizes with first-occurrence deduplication.
//!
//! # Primary Usage
//!
//! ```no_run
//! use oatdump::container::Container;
//! use oatdump::report::{DumpOptions, OatDumper};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("boot.oat")?;
//! let container = Container::load(&data)?;
//! let dumper = OatDumper::new(&container, DumpOptions::default())?;
//! dumper.dump(&mut std::io::stdout().lock())?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`container`] - Container parsing, ELF unwrapping and a writer for fixtures
//! - [`codec`] - Mapping table, vmap table and GC map codecs
//! - [`core`] - Extent registry, size ledger, outliers and the report session
//! - [`disasm`] - Code disassembly per instruction set
//! - [`report`] - Archive and artifact reports

pub mod codec;
pub mod container;
pub mod core;
pub mod disasm;
pub mod report;

pub use core::{
    ContainerError, DecodeError, ExtentRegistry, OutlierDetector, ReportError, ReportResult,
    ReportSession, SizeCategory, SizeLedger,
};
pub use container::Container;
pub use report::{ArtifactReport, DumpOptions, OatDumper};
