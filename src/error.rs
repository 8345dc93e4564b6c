//! Loader error types.

use thiserror::Error;

/// Errors raised while extracting or inserting a relocation bit-field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("bit field of width {width} at offset {offset} is not representable")]
    BadGeometry { width: u32, offset: u32 },
    #[error("bit field at AU {au} spans past the end of a {len}-AU window")]
    OutOfBounds { au: usize, len: usize },
    #[error("value {value:#x} overflows {width}-bit field")]
    Overflow { value: i32, width: u32 },
}

/// Errors raised by the relocation value stack.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    #[error("relocation expression stack overflow (depth {0})")]
    Overflow(usize),
    #[error("relocation expression stack underflow")]
    Underflow,
}

/// Every failure the loader reports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("required collaborator missing: {0}")]
    MissingCollaborator(&'static str),
    #[error("host allocation of {0} bytes refused")]
    AllocationFailure(usize),
    #[error("set file position to {0:#x} failed")]
    SeekFailure(u32),
    #[error("short read of {what}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        what: &'static str,
        wanted: usize,
        got: usize,
    },
    #[error("bad byte order marker {0:#010x} in file header")]
    BadByteOrder(u32),
    #[error("unsupported DOFF version {0:#x}")]
    UnsupportedVersion(u16),
    #[error("bad target id {found:#x}, expected {expected:#x}")]
    BadTargetId { found: u16, expected: u16 },
    #[error("input endianness disagrees with the target configuration")]
    EndiannessMismatch,
    #[error("excessive {what} {value}, limit is {limit}")]
    Implausible {
        what: &'static str,
        value: u32,
        limit: u32,
    },
    #[error("bad image packet size {0}")]
    BadPacketSize(i32),
    #[error("destination buffer of {len} bytes cannot hold {needed} bytes")]
    DestinationTooSmall { needed: usize, len: usize },
    #[error("checksum failed on {0}")]
    ChecksumFailure(&'static str),
    #[error("bad string table offset {0:#x}")]
    BadStringTableOffset(u32),
    #[error("cannot copy sections containing relocation entries ({0} relocations)")]
    UnsupportedRelocatedPacket(i32),
    #[error("bad relocation type {0:#x}")]
    BadRelocationType(u16),
    #[error("relocation in {section} at offset {offset:#x}: {source}")]
    Field {
        section: String,
        offset: u32,
        source: FieldError,
    },
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error("division by zero in relocation expression")]
    DivideByZero,
    #[error("bad symbol index {0}")]
    BadSymbolIndex(i32),
    #[error("undefined symbol {0}")]
    UndefinedSymbol(String),
    #[error("symbol {symbol} refers to missing section {section}")]
    BadSymbolSection { symbol: String, section: i16 },
    #[error("target allocation failed for section {0}")]
    TargetAllocationFailed(String),
    #[error("target write of {len} bytes at {addr:#x} failed")]
    TargetWriteFailed { addr: u32, len: usize },
    #[error("unaligned reference in {section} at offset {offset:#x}")]
    UnalignedReference { section: String, offset: u32 },
    #[error("global BSS base referenced in {0} but not defined")]
    MissingBssBase(String),
}

pub type Result<T> = std::result::Result<T, LoadError>;
