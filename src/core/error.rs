// This module defines the error types for oatdump using the thiserror crate. Errors are
// split by how far they propagate. DecodeError covers the per-method table decoders
// (vmap tables, mapping tables, GC maps) and is unit-scoped: the report prints a marker
// for the broken table and moves on to the next method. ContainerError covers parsing
// the container itself (headers, records, ELF wrapping). ReportError is what the report
// orchestrators return; boundary inference and accounting failures are fatal because a
// guessed size would make every total after it wrong. MissingSource is recoverable and
// only fatal when it names the top-level target.

//! Error types for oatdump.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Errors raised while decoding a single method's metadata tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed vmap table: {reason}")]
    MalformedRegisterTable {
        reason: String,
    },

    #[error("Malformed mapping table: {reason}")]
    MalformedMappingTable {
        reason: String,
    },

    #[error("Malformed GC map: {reason}")]
    MalformedLiveMap {
        reason: String,
    },
}

/// Errors raised while parsing the container structure.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Truncated {what} at offset 0x{offset:08x} (need {needed} bytes, container has {len})")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("Bad magic: expected {expected:?}, found {found:?}")]
    BadMagic {
        expected: &'static [u8],
        found: Vec<u8>,
    },

    #[error("Invalid {what}: {reason}")]
    Invalid {
        what: &'static str,
        reason: String,
    },

    #[error("ELF symbol not found: {name}")]
    SymbolNotFound {
        name: &'static str,
    },

    #[error("ELF parse error: {0}")]
    Elf(#[from] object::Error),
}

/// Errors returned by the report orchestrators.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("No region boundary after offset 0x{offset:08x}; container is malformed or the end sentinel was never registered")]
    BoundaryInference {
        offset: u32,
    },

    #[error("Offset 0x{offset:08x} lies outside the container [0x{begin:08x}, 0x{end:08x}]")]
    OutOfContainer {
        offset: u32,
        begin: u32,
        end: u32,
    },

    #[error("Accounting invariant violated: {lhs} = {lhs_value} but {rhs} = {rhs_value}")]
    AccountingInvariant {
        lhs: &'static str,
        lhs_value: usize,
        rhs: &'static str,
        rhs_value: usize,
    },

    #[error("Not found: {what}")]
    MissingSource {
        what: String,
    },

    #[error("Object walk failed: {reason}")]
    Walker {
        reason: String,
    },

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for table decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type alias for container parsing.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Result type alias for report operations.
pub type ReportResult<T> = Result<T, ReportError>;
