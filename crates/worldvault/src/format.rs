//! # File Layout
//!
//! Fixed constants of the world file format.
//!
//! ```text
//! page 0        WorldInfo header (zero padded)
//! pages 1..=12  Global directory table (4096 slots x 12 bytes)
//! page 13       Layer table (continuation + 64 entries x 40 bytes)
//! pages 14..    directory tables, chunk records, sectors, layer pages
//! ```
//!
//! All offsets stored in the file are page numbers (`u32`).

/// Magic number at byte 0 (`"WXVT"` when read as little-endian bytes).
pub const FORMAT_MAGIC: u32 = 0x5456_5857;

/// On-disk layout revision. Any layout change bumps this.
pub const FORMAT_REVISION: u32 = 1;

/// Size of a page (directory/layer storage unit) in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Size of a sector (chunk payload unit) in bytes.
pub const SECTOR_SIZE: usize = PAGE_SIZE;

/// Page holding the world header.
pub const HEADER_PAGE: u32 = 0;

/// First page of the Global directory table.
pub const GLOBAL_TABLE_PAGE: u32 = 1;

/// Bytes per directory slot: x (i32), z (i32), offset (u32).
pub const SLOT_SIZE: usize = 12;

/// Slot capacity of the Global (tier 0) table.
pub const GLOBAL_CAPACITY: usize = 4096;

/// Pages spanned by the Global table.
pub const GLOBAL_TABLE_PAGES: u32 = pages_for(GLOBAL_CAPACITY * SLOT_SIZE);

/// Page holding the inline layer table.
pub const LAYER_TABLE_PAGE: u32 = GLOBAL_TABLE_PAGE + GLOBAL_TABLE_PAGES;

/// First page that may be handed out by end-of-file allocation.
pub const FIRST_DATA_PAGE: u32 = LAYER_TABLE_PAGE + 1;

/// Sector slots per chunk record.
pub const RECORD_SECTORS: usize = 256;

/// Largest compressed payload a chunk record can address.
pub const MAX_RECORD_PAYLOAD: usize = RECORD_SECTORS * SECTOR_SIZE;

/// Inline layer table entries.
pub const LAYER_CAPACITY: usize = 64;

/// Maximum layer name length in bytes.
pub const LAYER_NAME_LEN: usize = 32;

/// Bytes of payload per layer page (the rest is the next-page pointer).
pub const LAYER_PAGE_PAYLOAD: usize = PAGE_SIZE - 4;

/// Offset value meaning "no page". Page 0 is the header, so it is never a child.
pub const NO_PAGE: u32 = 0;

/// Number of pages needed to hold `bytes`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn pages_for(bytes: usize) -> u32 {
    bytes.div_ceil(PAGE_SIZE) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets() {
        assert_eq!(GLOBAL_TABLE_PAGES, 12);
        assert_eq!(LAYER_TABLE_PAGE, 13);
        assert_eq!(FIRST_DATA_PAGE, 14);
        assert_eq!(MAX_RECORD_PAYLOAD, 1024 * 1024);
    }

    #[test]
    fn test_layer_table_fits_one_page() {
        assert!(4 + LAYER_CAPACITY * (8 + LAYER_NAME_LEN) <= PAGE_SIZE);
    }

    #[test]
    fn test_magic_bytes() {
        assert_eq!(&FORMAT_MAGIC.to_le_bytes(), b"WXVT");
    }
}
