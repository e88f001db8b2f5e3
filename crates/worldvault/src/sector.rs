//! # Sector Store
//!
//! Chunk payloads are split into 4 KiB sectors. Each chunk record owns a
//! 256-entry table of sector pages, so one record addresses at most 1 MiB
//! of compressed payload.
//!
//! ## Record page
//!
//! ```text
//! [4 bytes: chunk x]
//! [4 bytes: chunk z]
//! [4 bytes: compressed size]
//! [4 bytes: uncompressed length]
//! [256 x 4 bytes: sector pages, 0 = unallocated]
//! ```
//!
//! Sectors are overwritten in place when already allocated and appended at
//! end-of-file otherwise. Sectors past the current size stay allocated for
//! later growth; nothing is ever returned to the file.

use crate::chunk::ChunkCoord;
use crate::codec::{ByteReader, ByteWriter};
use crate::error::{StoreError, StoreResult};
use crate::format::{FIRST_DATA_PAGE, MAX_RECORD_PAYLOAD, NO_PAGE, PAGE_SIZE, RECORD_SECTORS, SECTOR_SIZE};
use crate::page::{Backing, PageFile};

/// Byte offset of the size field within a record page.
const SIZE_OFFSET: usize = 8;
/// Byte offset of the uncompressed length field, directly after the size.
const RAW_LEN_OFFSET: usize = 12;
/// Byte offset of the sector table.
const TABLE_OFFSET: usize = 16;
/// Bytes of a record before padding.
const RECORD_BYTES: usize = TABLE_OFFSET + RECORD_SECTORS * 4;

/// Leaf of the directory: where a chunk's payload lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Chunk this record belongs to.
    pub coord: ChunkCoord,
    /// Page holding the record itself.
    pub page: u32,
    /// Compressed payload size in bytes.
    pub size: u32,
    /// Uncompressed payload length in bytes.
    pub raw_len: u32,
    sectors: Box<[u32; RECORD_SECTORS]>,
}

impl ChunkRecord {
    /// Encodes an empty record page for `coord`.
    #[must_use]
    pub fn blank_page(coord: ChunkCoord) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(PAGE_SIZE);
        w.put_i32(coord.x);
        w.put_i32(coord.z);
        w.put_u32(0);
        w.put_u32(0);
        w.put_zeros(RECORD_SECTORS * 4);
        w.pad_to(PAGE_SIZE);
        w.into_inner()
    }

    /// Sector pages, in payload order.
    #[must_use]
    pub fn sectors(&self) -> &[u32] {
        &self.sectors[..]
    }

    /// Sectors holding the current payload: `ceil(size / SECTOR_SIZE)`.
    #[must_use]
    pub fn sectors_in_use(&self) -> usize {
        (self.size as usize).div_ceil(SECTOR_SIZE)
    }

    /// Sectors allocated, including ones past the current payload.
    #[must_use]
    pub fn sectors_allocated(&self) -> usize {
        self.sectors.iter().filter(|&&p| p != NO_PAGE).count()
    }
}

/// Sector operations over an open page file.
pub struct SectorStore<'a, B: Backing> {
    file: &'a mut PageFile<B>,
}

impl<'a, B: Backing> SectorStore<'a, B> {
    /// Borrows `file` for sector I/O.
    pub fn new(file: &'a mut PageFile<B>) -> Self {
        Self { file }
    }

    fn corrupt(page: u32, reason: String) -> StoreError {
        StoreError::CorruptDirectory { page, reason }
    }

    /// Reads and validates the record at `page`, which must belong to `coord`.
    ///
    /// # Errors
    ///
    /// [`StoreError::CorruptDirectory`] if the record is malformed or
    /// belongs to another chunk; I/O errors otherwise.
    pub fn load_record(&mut self, page: u32, coord: ChunkCoord) -> StoreResult<ChunkRecord> {
        let mut bytes = vec![0u8; RECORD_BYTES];
        self.file.read_at(page, 0, &mut bytes)?;
        let mut r = ByteReader::new(&bytes);

        let x = r.get_i32()?;
        let z = r.get_i32()?;
        if x != coord.x || z != coord.z {
            return Err(Self::corrupt(
                page,
                format!("record for ({x}, {z}) found where ({}, {}) was expected", coord.x, coord.z),
            ));
        }

        let size = r.get_u32()?;
        let raw_len = r.get_u32()?;
        if size as usize > MAX_RECORD_PAYLOAD {
            return Err(Self::corrupt(page, format!("record size {size} exceeds the sector table")));
        }

        let mut sectors = Box::new([NO_PAGE; RECORD_SECTORS]);
        for entry in sectors.iter_mut() {
            *entry = r.get_u32()?;
        }

        let record = ChunkRecord {
            coord,
            page,
            size,
            raw_len,
            sectors,
        };

        let page_count = self.file.page_count();
        for (i, &sector) in record.sectors.iter().enumerate() {
            if sector == NO_PAGE {
                if i < record.sectors_in_use() {
                    return Err(Self::corrupt(page, format!("sector {i} of a {size} byte payload is missing")));
                }
            } else if sector < FIRST_DATA_PAGE || sector >= page_count {
                return Err(Self::corrupt(page, format!("sector {i} points at invalid page {sector}")));
            }
        }

        Ok(record)
    }

    /// Writes one sector of `record`, allocating it at end-of-file if needed.
    ///
    /// # Errors
    ///
    /// [`StoreError::PayloadTooLarge`] if `index` is past the table or
    /// `bytes` exceeds one sector; I/O errors otherwise.
    pub fn write_sector(&mut self, record: &mut ChunkRecord, index: usize, bytes: &[u8]) -> StoreResult<()> {
        if index >= RECORD_SECTORS || bytes.len() > SECTOR_SIZE {
            return Err(StoreError::PayloadTooLarge {
                size: index * SECTOR_SIZE + bytes.len(),
                limit: MAX_RECORD_PAYLOAD,
            });
        }

        let existing = record.sectors[index];
        if existing != NO_PAGE {
            let mut padded = [0u8; SECTOR_SIZE];
            padded[..bytes.len()].copy_from_slice(bytes);
            return self.file.write_at(existing, 0, &padded);
        }

        let page = self.file.append(bytes)?;
        self.file.write_at(record.page, TABLE_OFFSET + index * 4, &page.to_le_bytes())?;
        record.sectors[index] = page;
        Ok(())
    }

    /// Replaces the payload of `record` with `bytes`, whose uncompressed
    /// length is `raw_len`.
    ///
    /// Sectors are written first. The size and raw length fields are adjacent
    /// and go out together in one 8-byte write, so a record never pairs a new
    /// size with a stale raw length.
    ///
    /// # Errors
    ///
    /// [`StoreError::PayloadTooLarge`] above 256 sectors; I/O errors otherwise.
    pub fn write_spanning(
        &mut self,
        record: &mut ChunkRecord,
        bytes: &[u8],
        raw_len: u32,
    ) -> StoreResult<()> {
        if bytes.len() > MAX_RECORD_PAYLOAD {
            return Err(StoreError::PayloadTooLarge {
                size: bytes.len(),
                limit: MAX_RECORD_PAYLOAD,
            });
        }

        for (index, piece) in bytes.chunks(SECTOR_SIZE).enumerate() {
            self.write_sector(record, index, piece)?;
        }

        let size = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        if record.size != size || record.raw_len != raw_len {
            let mut lengths = [0u8; RAW_LEN_OFFSET + 4 - SIZE_OFFSET];
            lengths[..4].copy_from_slice(&size.to_le_bytes());
            lengths[RAW_LEN_OFFSET - SIZE_OFFSET..].copy_from_slice(&raw_len.to_le_bytes());
            self.file.write_at(record.page, SIZE_OFFSET, &lengths)?;
            record.size = size;
            record.raw_len = raw_len;
        }
        self.file.barrier()
    }

    /// Reads the payload of `record`: its sectors in table order, cut at `size`.
    ///
    /// # Errors
    ///
    /// [`StoreError::CorruptDirectory`] on a missing sector; I/O errors otherwise.
    pub fn read_spanning(&mut self, record: &ChunkRecord) -> StoreResult<Vec<u8>> {
        let size = record.size as usize;
        let mut out = Vec::with_capacity(record.sectors_in_use() * SECTOR_SIZE);

        for (i, &sector) in record.sectors[..record.sectors_in_use()].iter().enumerate() {
            if sector == NO_PAGE {
                return Err(Self::corrupt(record.page, format!("sector {i} is unallocated")));
            }
            let start = out.len();
            out.resize(start + SECTOR_SIZE, 0);
            self.file.read_at(sector, 0, &mut out[start..])?;
        }

        out.truncate(size);
        Ok(out)
    }
}
