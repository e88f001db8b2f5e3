//! # Page File
//!
//! Page-addressed access to the byte device behind a world.
//!
//! Every structure in the file lives at a page number. New pages are only
//! ever appended at end-of-file; nothing is freed. [`PageFile::barrier`] is
//! the ordering point used between writing a child page and publishing a
//! reference to it.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::error::{StoreError, StoreResult};
use crate::format::PAGE_SIZE;

/// A seekable byte device that can be made durable.
pub trait Backing: Read + Write + Seek {
    /// Pushes written data to stable storage.
    fn sync(&mut self) -> io::Result<()>;
}

impl Backing for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

impl Backing for Cursor<Vec<u8>> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Page-granular view over a [`Backing`] device.
#[derive(Debug)]
pub struct PageFile<B: Backing> {
    inner: B,
    page_count: u32,
    sync_writes: bool,
}

impl<B: Backing> PageFile<B> {
    /// Wraps a device, deriving the page count from its current length.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the device cannot be measured, or
    /// [`StoreError::CorruptDirectory`] if it is beyond `u32` pages.
    pub fn new(mut inner: B, sync_writes: bool) -> StoreResult<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        let pages = len.div_ceil(PAGE_SIZE as u64);
        let page_count = u32::try_from(pages).map_err(|_| StoreError::CorruptDirectory {
            page: u32::MAX,
            reason: format!("file of {len} bytes exceeds addressable pages"),
        })?;
        Ok(Self {
            inner,
            page_count,
            sync_writes,
        })
    }

    /// Number of pages currently in the file.
    #[inline]
    #[must_use]
    pub const fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Borrows the underlying device.
    #[must_use]
    pub const fn get_ref(&self) -> &B {
        &self.inner
    }

    /// Consumes the page file, returning the device.
    #[must_use]
    pub fn into_inner(self) -> B {
        self.inner
    }

    fn seek_to(&mut self, page: u32, offset: usize) -> io::Result<()> {
        let pos = u64::from(page) * PAGE_SIZE as u64 + offset as u64;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Reads `buf.len()` bytes starting `offset` bytes into `page`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on short reads.
    pub fn read_at(&mut self, page: u32, offset: usize, buf: &mut [u8]) -> StoreResult<()> {
        self.seek_to(page, offset)?;
        self.inner.read_exact(buf)?;
        Ok(())
    }

    /// Reads `count` whole pages starting at `page`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on short reads.
    pub fn read_pages(&mut self, page: u32, count: u32) -> StoreResult<Vec<u8>> {
        let mut buf = vec![0u8; count as usize * PAGE_SIZE];
        self.read_at(page, 0, &mut buf)?;
        Ok(buf)
    }

    /// Writes `bytes` starting `offset` bytes into `page`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the write fails.
    pub fn write_at(&mut self, page: u32, offset: usize, bytes: &[u8]) -> StoreResult<()> {
        self.seek_to(page, offset)?;
        self.inner.write_all(bytes)?;
        Ok(())
    }

    /// Appends `bytes` at end-of-file, zero-padded to whole pages.
    ///
    /// Returns the first page of the new run. An empty slice still takes one page.
    ///
    /// # Errors
    ///
    /// Returns an I/O error, or [`StoreError::CorruptDirectory`] when the
    /// file would exceed `u32` pages.
    pub fn append(&mut self, bytes: &[u8]) -> StoreResult<u32> {
        let pages = crate::format::pages_for(bytes.len()).max(1);
        let first = self.page_count;
        let end = first.checked_add(pages).ok_or(StoreError::CorruptDirectory {
            page: first,
            reason: "page space exhausted".to_string(),
        })?;

        let mut padded = Vec::with_capacity(pages as usize * PAGE_SIZE);
        padded.extend_from_slice(bytes);
        padded.resize(pages as usize * PAGE_SIZE, 0);

        self.write_at(first, 0, &padded)?;
        self.page_count = end;
        Ok(first)
    }

    /// Flushes buffered writes and, when configured, syncs to disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the flush or sync fails.
    pub fn barrier(&mut self) -> StoreResult<()> {
        self.inner.flush()?;
        if self.sync_writes {
            self.inner.sync()?;
        }
        Ok(())
    }

    /// Flushes and always syncs, regardless of configuration.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the flush or sync fails.
    pub fn sync_all(&mut self) -> StoreResult<()> {
        self.inner.flush()?;
        self.inner.sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> PageFile<Cursor<Vec<u8>>> {
        PageFile::new(Cursor::new(Vec::new()), false).unwrap()
    }

    #[test]
    fn test_append_pads_to_page() {
        let mut file = memory();
        let first = file.append(&[1, 2, 3]).unwrap();
        let second = file.append(&vec![9u8; PAGE_SIZE + 1]).unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(file.page_count(), 3);
        assert_eq!(file.get_ref().get_ref().len(), 3 * PAGE_SIZE);
    }

    #[test]
    fn test_empty_append_takes_a_page() {
        let mut file = memory();
        assert_eq!(file.append(&[]).unwrap(), 0);
        assert_eq!(file.page_count(), 1);
    }

    #[test]
    fn test_write_then_read_in_page() {
        let mut file = memory();
        file.append(&[]).unwrap();
        file.append(&[]).unwrap();
        file.write_at(1, 100, b"hello").unwrap();

        let mut buf = [0u8; 5];
        file.read_at(1, 100, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_page_count_rounds_up_partial_tail() {
        let file = PageFile::new(Cursor::new(vec![0u8; PAGE_SIZE + 10]), false).unwrap();
        assert_eq!(file.page_count(), 2);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut file = memory();
        file.append(&[]).unwrap();
        assert!(file.read_pages(1, 1).is_err());
    }
}
