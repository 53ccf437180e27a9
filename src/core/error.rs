//! Error types for butterfly-cells library
//!
//! Internal invariants (level bounds, child indices, sorted covering levels)
//! are asserted and panic when violated. The variants below are reserved for
//! boundaries that read data produced elsewhere: persisted integer keys, digit
//! strings from map-data files, and externally generated index streams.

use thiserror::Error;

/// Main error type for butterfly-cells operations
#[derive(Error, Debug)]
pub enum Error {
    /// Digit string is too long or contains something other than `0..=3`
    #[error("Invalid cell id string '{0}'")]
    InvalidCellString(String),

    /// Integer key does not fit the pre-order numbering of the requested depth
    #[error("Cell key {key} out of range for depth {depth}")]
    KeyOutOfRange { key: i64, depth: u32 },

    /// Key depth outside `1..=DEPTH`
    #[error("Invalid key depth {depth} (expected 1..={max})")]
    InvalidDepth { depth: u32, max: u32 },

    /// Cell level outside `0..DEPTH`
    #[error("Invalid cell level {level} (expected 0..{max})")]
    InvalidLevel { level: u32, max: u32 },

    /// Integer coordinates beyond the edge of the cell square
    #[error("Coordinates ({x}, {y}) outside the cell square [0, {max}]")]
    CoordinateOutOfRange { x: u32, y: u32, max: u32 },

    /// Stream input that is not strictly increasing
    #[error("Unordered input: id {next} after id {previous}")]
    UnorderedInput { previous: i64, next: i64 },

    /// Invalid configuration or malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for butterfly-cells operations
pub type Result<T> = std::result::Result<T, Error>;
