//! # Storage Error Types
//!
//! All errors that can occur while reading or writing a world file.
//! None of them are retried internally; a corrupt or mismatched file
//! must stop the world from loading.

use thiserror::Error;

/// Errors that can occur in the world store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The file does not start with the expected magic number or revision.
    #[error("format mismatch: expected magic {expected_magic:#010x} rev {expected_revision}, found magic {found_magic:#010x} rev {found_revision}")]
    FormatMismatch {
        /// Magic number this build understands.
        expected_magic: u32,
        /// Revision this build understands.
        expected_revision: u32,
        /// Magic number found in the file.
        found_magic: u32,
        /// Revision found in the file.
        found_revision: u32,
    },

    /// A directory slot on disk holds data that cannot be valid.
    #[error("corrupt directory at page {page}: {reason}")]
    CorruptDirectory {
        /// Page of the table or record that failed validation.
        page: u32,
        /// What was wrong with it.
        reason: String,
    },

    /// Linear probing visited every slot of a table without finding room.
    #[error("directory table full: {tier} node ({x}, {z}) has no free slot")]
    DirectoryFull {
        /// Tier name of the full node.
        tier: &'static str,
        /// Node X.
        x: i32,
        /// Node Z.
        z: i32,
    },

    /// A chunk payload exceeds a size ceiling: the uncompressed limit the
    /// decoder accepts, or the compressed bytes one record can address.
    #[error("payload too large: {size} bytes exceeds the {limit} byte ceiling")]
    PayloadTooLarge {
        /// Offending payload size.
        size: usize,
        /// Ceiling that was exceeded.
        limit: usize,
    },

    /// DEFLATE encode/decode failed or produced an unexpected length.
    #[error("compression error: {0}")]
    Compression(String),

    /// A decoded payload is structurally invalid.
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    /// A read ran past the end of its buffer.
    #[error("truncated data: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// Every inline layer slot is taken.
    #[error("layer table full: {capacity} entries in use")]
    LayerTableFull {
        /// Inline table capacity.
        capacity: usize,
    },

    /// Layer names must be 1 to 32 bytes long.
    #[error("invalid layer name {0:?}")]
    InvalidLayerName(String),

    /// The store has no open file.
    #[error("world store is not open")]
    NotOpen,

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Underlying file I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
