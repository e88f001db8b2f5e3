//! # Layer Store
//!
//! Named byte blobs (security, portals, plugin data) kept as singly linked
//! page chains.
//!
//! ## Table page
//!
//! ```text
//! [4 bytes: continuation page, always 0]
//! 64 x entry:
//!   [4 bytes:  first page, 0 = free entry]
//!   [4 bytes:  total size]
//!   [32 bytes: name, zero padded]
//! ```
//!
//! Each chain page is `[4 bytes: next page][4092 bytes: payload]`.
//!
//! Rewriting a layer reuses its pages in place and appends whatever it is
//! short. Appended pages are written before anything links to them. A
//! shorter layer terminates the chain early; the tail pages are abandoned.

use tracing::debug;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{StoreError, StoreResult};
use crate::format::{
    FIRST_DATA_PAGE, LAYER_CAPACITY, LAYER_NAME_LEN, LAYER_PAGE_PAYLOAD, LAYER_TABLE_PAGE, NO_PAGE, PAGE_SIZE,
};
use crate::page::{Backing, PageFile};

/// Bytes per table entry.
const ENTRY_SIZE: usize = 8 + LAYER_NAME_LEN;

/// Offset of the first entry (after the continuation field).
const ENTRIES_OFFSET: usize = 4;

/// One named layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerEntry {
    /// Layer name.
    pub name: String,
    /// First page of the chain.
    pub first_page: u32,
    /// Payload length in bytes.
    pub size: u32,
}

impl LayerEntry {
    fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut w = ByteWriter::with_capacity(ENTRY_SIZE);
        w.put_u32(self.first_page);
        w.put_u32(self.size);
        w.put_fixed_str(&self.name, LAYER_NAME_LEN)?;
        Ok(w.into_inner())
    }
}

/// Checks that `name` can be stored in an entry.
///
/// # Errors
///
/// [`StoreError::InvalidLayerName`] unless the name is 1 to 32 bytes
/// without NUL bytes.
pub fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.len() > LAYER_NAME_LEN || name.contains('\0') {
        return Err(StoreError::InvalidLayerName(name.to_string()));
    }
    Ok(())
}

/// In-memory copy of the layer table.
#[derive(Clone, Debug, Default)]
pub struct LayerTable {
    slots: Vec<Option<LayerEntry>>,
}

impl LayerTable {
    /// Encodes an empty table page.
    #[must_use]
    pub fn blank_page() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    /// Reads the table page.
    ///
    /// # Errors
    ///
    /// [`StoreError::CorruptDirectory`] if an entry points outside the data
    /// area; I/O errors otherwise.
    pub fn load<B: Backing>(file: &mut PageFile<B>) -> StoreResult<Self> {
        let page = file.read_pages(LAYER_TABLE_PAGE, 1)?;
        let mut r = ByteReader::new(&page);
        // Continuation is reserved; the inline table is all there is
        let _continuation = r.get_u32()?;

        let mut slots = Vec::with_capacity(LAYER_CAPACITY);
        for index in 0..LAYER_CAPACITY {
            let first_page = r.get_u32()?;
            let size = r.get_u32()?;
            let name = r.get_fixed_str(LAYER_NAME_LEN)?;

            if first_page == NO_PAGE {
                slots.push(None);
                continue;
            }
            if first_page < FIRST_DATA_PAGE || first_page >= file.page_count() || name.is_empty() {
                return Err(StoreError::CorruptDirectory {
                    page: LAYER_TABLE_PAGE,
                    reason: format!("layer entry {index} ({name:?}) points at page {first_page}"),
                });
            }
            slots.push(Some(LayerEntry { name, first_page, size }));
        }

        Ok(Self { slots })
    }

    /// Names of all stored layers, in table order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().flatten().map(|e| e.name.as_str())
    }

    /// Number of stored layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// True if no layer has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry for `name`.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&LayerEntry> {
        self.slots.iter().flatten().find(|e| e.name == name)
    }

    fn slot_of(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|e| e.name == name))
    }

    /// Reads the full payload of `name`, or `None` if it was never written.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidLayerName`] for a bad name,
    /// [`StoreError::CorruptDirectory`] if the chain is broken.
    pub fn read_layer<B: Backing>(&self, file: &mut PageFile<B>, name: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_name(name)?;
        let Some(entry) = self.entry(name) else {
            return Ok(None);
        };

        let size = entry.size as usize;
        let mut out = Vec::with_capacity(size);
        let mut page = entry.first_page;

        while out.len() < size {
            if page < FIRST_DATA_PAGE || page >= file.page_count() {
                return Err(StoreError::CorruptDirectory {
                    page,
                    reason: format!("layer {name:?} chain ends after {} of {size} bytes", out.len()),
                });
            }
            let bytes = file.read_pages(page, 1)?;
            let mut r = ByteReader::new(&bytes);
            let next = r.get_u32()?;
            let take = (size - out.len()).min(LAYER_PAGE_PAYLOAD);
            out.extend_from_slice(r.take(take)?);
            page = next;
        }

        Ok(Some(out))
    }

    /// Follows the chain of `entry` for at most `limit` pages.
    fn existing_chain<B: Backing>(file: &mut PageFile<B>, entry: &LayerEntry, limit: usize) -> StoreResult<Vec<u32>> {
        let mut pages = Vec::with_capacity(limit);
        let mut page = entry.first_page;
        while pages.len() < limit && page != NO_PAGE {
            if page < FIRST_DATA_PAGE || page >= file.page_count() || pages.contains(&page) {
                return Err(StoreError::CorruptDirectory {
                    page,
                    reason: format!("layer {:?} chain points at invalid page {page}", entry.name),
                });
            }
            pages.push(page);
            let mut next = [0u8; 4];
            file.read_at(page, 0, &mut next)?;
            page = u32::from_le_bytes(next);
        }
        Ok(pages)
    }

    /// Stores `bytes` under `name`, creating the entry if needed.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidLayerName`], [`StoreError::LayerTableFull`] when
    /// a new name finds no free entry, [`StoreError::PayloadTooLarge`] past
    /// `u32::MAX` bytes, or I/O errors.
    pub fn write_layer<B: Backing>(&mut self, file: &mut PageFile<B>, name: &str, bytes: &[u8]) -> StoreResult<()> {
        validate_name(name)?;
        let size = u32::try_from(bytes.len()).map_err(|_| StoreError::PayloadTooLarge {
            size: bytes.len(),
            limit: u32::MAX as usize,
        })?;

        if self.slots.len() < LAYER_CAPACITY {
            self.slots.resize(LAYER_CAPACITY, None);
        }
        let index = match self.slot_of(name) {
            Some(index) => index,
            None => self
                .slots
                .iter()
                .position(Option::is_none)
                .ok_or(StoreError::LayerTableFull { capacity: LAYER_CAPACITY })?,
        };

        let pieces: Vec<&[u8]> = if bytes.is_empty() {
            vec![bytes]
        } else {
            bytes.chunks(LAYER_PAGE_PAYLOAD).collect()
        };

        let mut chain = match &self.slots[index] {
            Some(entry) => Self::existing_chain(file, entry, pieces.len())?,
            None => Vec::new(),
        };
        let reused = chain.len();

        // Missing pages go on as one contiguous run, already linked
        if reused < pieces.len() {
            let first_new = file.page_count();
            let fresh = pieces.len() - reused;
            let mut run = ByteWriter::with_capacity(fresh * PAGE_SIZE);
            for (k, piece) in pieces[reused..].iter().enumerate() {
                let next = if k + 1 < fresh { page_after(first_new, k + 1)? } else { NO_PAGE };
                run.put_u32(next);
                run.put_bytes(piece);
                run.pad_to(PAGE_SIZE);
            }
            let appended = file.append(run.as_slice())?;
            debug_assert_eq!(appended, first_new);
            for k in 0..fresh {
                chain.push(page_after(first_new, k)?);
            }
            file.barrier()?;
        }

        for (k, piece) in pieces[..reused].iter().enumerate() {
            let next = chain.get(k + 1).copied().unwrap_or(NO_PAGE);
            let mut page = ByteWriter::with_capacity(PAGE_SIZE);
            page.put_u32(next);
            page.put_bytes(piece);
            page.pad_to(PAGE_SIZE);
            file.write_at(chain[k], 0, page.as_slice())?;
        }
        file.barrier()?;

        let entry = LayerEntry {
            name: name.to_string(),
            first_page: chain[0],
            size,
        };
        file.write_at(LAYER_TABLE_PAGE, ENTRIES_OFFSET + index * ENTRY_SIZE, &entry.encode()?)?;
        file.barrier()?;

        debug!(layer = name, size, pages = chain.len(), reused, "wrote layer");
        self.slots[index] = Some(entry);
        Ok(())
    }
}

/// Page number `offset` pages after `first`.
fn page_after(first: u32, offset: usize) -> StoreResult<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|o| first.checked_add(o))
        .ok_or(StoreError::CorruptDirectory {
            page: first,
            reason: "page space exhausted".to_string(),
        })
}
