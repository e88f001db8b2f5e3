//! # World Store
//!
//! One [`WorldStore`] owns one world file and everything cached from it:
//! the directory cache, the layer table and the header.
//!
//! ## Lifecycle
//!
//! ```text
//! WorldStore::new(path, config)   closed, nothing touched on disk
//!   open()                        creates or validates the file
//!   save_* / load_*               NotOpen while closed
//!   close() / drop                syncs and releases the handle
//! ```
//!
//! A file that fails validation is never half-opened: the store stays
//! closed and every chunk operation keeps returning [`StoreError::NotOpen`].
//!
//! ## Threading
//!
//! All methods take `&mut self`. Share a store between threads through
//! [`SharedWorldStore`], which holds the lock for each whole call.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::chunk::{ChunkColumn, ChunkCoord};
use crate::chunk_codec;
use crate::config::StoreConfig;
use crate::directory::Directory;
use crate::error::{StoreError, StoreResult};
use crate::format::{
    FIRST_DATA_PAGE, FORMAT_MAGIC, FORMAT_REVISION, GLOBAL_TABLE_PAGES, HEADER_PAGE, MAX_RECORD_PAYLOAD, PAGE_SIZE,
};
use crate::layer::LayerTable;
use crate::page::PageFile;
use crate::sector::SectorStore;
use crate::world::{PortalList, SecurityRecord, WorldInfo, CHUNK_COUNT_OFFSET};

/// Layer holding the encoded [`SecurityRecord`].
pub const SECURITY_LAYER: &str = "security";

/// Layer holding the encoded [`PortalList`].
pub const PORTALS_LAYER: &str = "portals";

/// A store behind a lock, for use from several threads.
pub type SharedWorldStore = Arc<Mutex<WorldStore>>;

/// State that exists only while the file is open.
struct OpenWorld {
    file: PageFile<File>,
    directory: Directory,
    layers: LayerTable,
    info: WorldInfo,
}

/// Persistent storage for one world.
pub struct WorldStore {
    path: PathBuf,
    config: StoreConfig,
    open: Option<OpenWorld>,
}

impl WorldStore {
    /// Creates a closed store for the file at `path`.
    pub fn new(path: impl AsRef<Path>, config: StoreConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            open: None,
        }
    }

    /// Returns true if the file at `path` starts with this format's magic number.
    ///
    /// Reads four bytes and nothing else; unreadable files are not claimed.
    pub fn claims(path: impl AsRef<Path>) -> bool {
        let mut magic = [0u8; 4];
        File::open(path)
            .and_then(|mut f| f.read_exact(&mut magic))
            .is_ok()
            && u32::from_le_bytes(magic) == FORMAT_MAGIC
    }

    /// Path of the world file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// True between a successful `open()` and `close()`.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Wraps the store for shared use.
    #[must_use]
    pub fn into_shared(self) -> SharedWorldStore {
        Arc::new(Mutex::new(self))
    }

    /// Opens the world file, creating an empty world when allowed.
    ///
    /// Does nothing if the store is already open.
    ///
    /// # Errors
    ///
    /// [`StoreError::FormatMismatch`] for a foreign or newer file, or an empty
    /// file when `create_if_missing` is off,
    /// [`StoreError::CorruptDirectory`] for a damaged one,
    /// [`StoreError::Config`] for an invalid configuration, or I/O errors
    /// (including a missing file when `create_if_missing` is off).
    pub fn open(&mut self) -> StoreResult<()> {
        if self.open.is_some() {
            return Ok(());
        }

        match self.open_world() {
            Ok(world) => {
                info!(
                    path = %self.path.display(),
                    pages = world.file.page_count(),
                    chunks = world.info.chunk_count,
                    layers = world.layers.len(),
                    "opened world"
                );
                self.open = Some(world);
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "refusing to open world");
                Err(e)
            }
        }
    }

    fn open_world(&self) -> StoreResult<OpenWorld> {
        self.config.validate()?;

        let handle = OpenOptions::new()
            .read(true)
            .write(true)
            .create(self.config.create_if_missing)
            .truncate(false)
            .open(&self.path)?;
        let mut file = PageFile::new(handle, self.config.sync_writes)?;

        // An empty file only becomes a world when creation is allowed
        let info = if file.page_count() == 0 && self.config.create_if_missing {
            Self::initialize(&mut file)?
        } else if file.page_count() == 0 {
            return Err(StoreError::FormatMismatch {
                expected_magic: FORMAT_MAGIC,
                expected_revision: FORMAT_REVISION,
                found_magic: 0,
                found_revision: 0,
            });
        } else {
            Self::validate(&mut file)?
        };
        let layers = LayerTable::load(&mut file)?;

        Ok(OpenWorld {
            file,
            directory: Directory::new(self.config.cache_capacity()),
            layers,
            info,
        })
    }

    /// Lays out an empty world: header, Global table and layer table.
    fn initialize(file: &mut PageFile<File>) -> StoreResult<WorldInfo> {
        let info = WorldInfo::default();
        file.append(&info.encode()?)?;
        file.append(&vec![0u8; GLOBAL_TABLE_PAGES as usize * PAGE_SIZE])?;
        file.append(&LayerTable::blank_page())?;
        file.sync_all()?;
        info!(pages = file.page_count(), "initialized empty world file");
        Ok(info)
    }

    fn validate(file: &mut PageFile<File>) -> StoreResult<WorldInfo> {
        let mut head = [0u8; 8];
        file.read_at(HEADER_PAGE, 0, &mut head)?;
        let magic = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        let revision = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
        if magic != FORMAT_MAGIC || revision != FORMAT_REVISION {
            return Err(StoreError::FormatMismatch {
                expected_magic: FORMAT_MAGIC,
                expected_revision: FORMAT_REVISION,
                found_magic: magic,
                found_revision: revision,
            });
        }
        if file.page_count() < FIRST_DATA_PAGE {
            return Err(StoreError::CorruptDirectory {
                page: file.page_count(),
                reason: format!("file ends inside the first {FIRST_DATA_PAGE} reserved pages"),
            });
        }
        WorldInfo::decode(&file.read_pages(HEADER_PAGE, 1)?)
    }

    /// Syncs and releases the file. Closing a closed store does nothing.
    ///
    /// # Errors
    ///
    /// I/O errors from the final sync. The store is closed either way.
    pub fn close(&mut self) -> StoreResult<()> {
        let Some(mut world) = self.open.take() else {
            return Ok(());
        };
        world.file.sync_all()?;
        info!(path = %self.path.display(), chunks = world.info.chunk_count, "closed world");
        Ok(())
    }

    fn world_mut(&mut self) -> StoreResult<&mut OpenWorld> {
        self.open.as_mut().ok_or(StoreError::NotOpen)
    }

    /// Pushes all writes to disk.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotOpen`] or I/O errors.
    pub fn flush(&mut self) -> StoreResult<()> {
        self.world_mut()?.file.sync_all()
    }

    /// Stores `chunk` at chunk coordinates `(x, z)`.
    ///
    /// The first save of a coordinate creates its record and bumps the
    /// persisted chunk counter; later saves overwrite in place.
    ///
    /// # Errors
    ///
    /// [`StoreError::PayloadTooLarge`] if the uncompressed chunk exceeds
    /// what `load_chunk` accepts or the compressed chunk exceeds one record, [`StoreError::DirectoryFull`], [`StoreError::NotOpen`], or
    /// codec and I/O errors.
    pub fn save_chunk(&mut self, chunk: &ChunkColumn, x: i32, z: i32) -> StoreResult<()> {
        let level = self.config.compression_level;
        let world = self.world_mut()?;

        let encoded = chunk_codec::encode(chunk, level)?;
        if encoded.bytes.len() > MAX_RECORD_PAYLOAD {
            return Err(StoreError::PayloadTooLarge {
                size: encoded.bytes.len(),
                limit: MAX_RECORD_PAYLOAD,
            });
        }

        let coord = ChunkCoord::new(x, z);
        let slot = world
            .directory
            .find_or_create_record(&mut world.file, coord, true)?
            .ok_or_else(|| StoreError::CorruptDirectory {
                page: HEADER_PAGE,
                reason: format!("record for ({x}, {z}) was not created"),
            })?;

        if slot.created {
            world.info.chunk_count = world.info.chunk_count.saturating_add(1);
            world
                .file
                .write_at(HEADER_PAGE, CHUNK_COUNT_OFFSET, &world.info.chunk_count.to_le_bytes())?;
        }

        let mut sectors = SectorStore::new(&mut world.file);
        let mut record = sectors.load_record(slot.page, coord)?;
        sectors.write_spanning(&mut record, &encoded.bytes, encoded.raw_len)?;

        debug!(
            x,
            z,
            size = encoded.bytes.len(),
            raw_len = encoded.raw_len,
            sectors = record.sectors_in_use(),
            created = slot.created,
            "saved chunk"
        );
        Ok(())
    }

    /// Loads the chunk at `(x, z)`, or `None` if it was never saved.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotOpen`], [`StoreError::CorruptDirectory`], or
    /// decompression and decode errors.
    pub fn load_chunk(&mut self, x: i32, z: i32) -> StoreResult<Option<ChunkColumn>> {
        let world = self.world_mut()?;
        let coord = ChunkCoord::new(x, z);
        let Some(slot) = world.directory.find_or_create_record(&mut world.file, coord, false)? else {
            return Ok(None);
        };

        let mut sectors = SectorStore::new(&mut world.file);
        let record = sectors.load_record(slot.page, coord)?;
        // A record whose payload was never written is treated as absent
        if record.size == 0 {
            return Ok(None);
        }
        let compressed = sectors.read_spanning(&record)?;
        chunk_codec::decode(&compressed, record.raw_len).map(Some)
    }

    /// True if a chunk has been saved at `(x, z)`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotOpen`] or directory errors.
    pub fn chunk_exists(&mut self, x: i32, z: i32) -> StoreResult<bool> {
        let world = self.world_mut()?;
        let coord = ChunkCoord::new(x, z);
        let Some(slot) = world.directory.find_or_create_record(&mut world.file, coord, false)? else {
            return Ok(false);
        };
        let record = SectorStore::new(&mut world.file).load_record(slot.page, coord)?;
        Ok(record.size != 0)
    }

    /// Number of chunk records in the world.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotOpen`].
    pub fn chunk_count(&mut self) -> StoreResult<u32> {
        Ok(self.world_mut()?.info.chunk_count)
    }

    /// Rewrites the header from `info`.
    ///
    /// The chunk counter belongs to the store; the value in `info` is ignored.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotOpen`], [`StoreError::CorruptPayload`] for an
    /// over-long generator name, or I/O errors.
    pub fn save_info(&mut self, info: &WorldInfo) -> StoreResult<()> {
        let world = self.world_mut()?;
        let stored = WorldInfo {
            chunk_count: world.info.chunk_count,
            ..info.clone()
        };
        world.file.write_at(HEADER_PAGE, 0, &stored.encode()?)?;
        world.file.barrier()?;
        debug!(generator = %stored.generator, seed = stored.seed, "saved world info");
        world.info = stored;
        Ok(())
    }

    /// Current header contents.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotOpen`].
    pub fn load_info(&mut self) -> StoreResult<WorldInfo> {
        Ok(self.world_mut()?.info.clone())
    }

    /// Stores a named blob.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotOpen`], [`StoreError::InvalidLayerName`],
    /// [`StoreError::LayerTableFull`], or I/O errors.
    pub fn save_layer(&mut self, name: &str, bytes: &[u8]) -> StoreResult<()> {
        let world = self.world_mut()?;
        world.layers.write_layer(&mut world.file, name, bytes)
    }

    /// Loads a named blob, or `None` if it was never written.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotOpen`], [`StoreError::InvalidLayerName`], or
    /// [`StoreError::CorruptDirectory`] for a broken chain.
    pub fn load_layer(&mut self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let world = self.world_mut()?;
        world.layers.read_layer(&mut world.file, name)
    }

    /// Names of all stored layers.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotOpen`].
    pub fn layer_names(&mut self) -> StoreResult<Vec<String>> {
        Ok(self.world_mut()?.layers.names().map(str::to_string).collect())
    }

    /// Stores the security record.
    ///
    /// # Errors
    ///
    /// As [`WorldStore::save_layer`], plus encode errors.
    pub fn save_security(&mut self, record: &SecurityRecord) -> StoreResult<()> {
        self.save_layer(SECURITY_LAYER, &record.encode()?)
    }

    /// Loads the security record, if one was saved.
    ///
    /// # Errors
    ///
    /// As [`WorldStore::load_layer`], plus decode errors.
    pub fn load_security(&mut self) -> StoreResult<Option<SecurityRecord>> {
        self.load_layer(SECURITY_LAYER)?
            .map(|bytes| SecurityRecord::decode(&bytes))
            .transpose()
    }

    /// Stores the portal list.
    ///
    /// # Errors
    ///
    /// As [`WorldStore::save_layer`], plus encode errors.
    pub fn save_portals(&mut self, portals: &PortalList) -> StoreResult<()> {
        self.save_layer(PORTALS_LAYER, &portals.encode()?)
    }

    /// Loads the portal list, if one was saved.
    ///
    /// # Errors
    ///
    /// As [`WorldStore::load_layer`], plus decode errors.
    pub fn load_portals(&mut self) -> StoreResult<Option<PortalList>> {
        self.load_layer(PORTALS_LAYER)?
            .map(|bytes| PortalList::decode(&bytes))
            .transpose()
    }
}

impl Drop for WorldStore {
    fn drop(&mut self) {
        if let Some(mut world) = self.open.take() {
            if let Err(e) = world.file.sync_all() {
                warn!(path = %self.path.display(), error = %e, "sync on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for WorldStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(tag: &str) -> PathBuf {
        let id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("test_world_{tag}_{id}.wvt"))
    }

    fn fast_config() -> StoreConfig {
        StoreConfig {
            sync_writes: false,
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let path = temp_path("closed");
        let mut store = WorldStore::new(&path, fast_config());
        assert!(matches!(store.load_chunk(0, 0), Err(StoreError::NotOpen)));
        assert!(matches!(store.load_info(), Err(StoreError::NotOpen)));
        assert!(!path.exists());
    }

    #[test]
    fn test_open_creates_reserved_layout() {
        let path = temp_path("create");
        let mut store = WorldStore::new(&path, fast_config());
        store.open().unwrap();
        store.open().unwrap();
        store.close().unwrap();

        let len = fs::metadata(&path).unwrap().len();
        assert_eq!(len, u64::from(FIRST_DATA_PAGE) * PAGE_SIZE as u64);
        assert!(WorldStore::claims(&path));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_without_create() {
        let path = temp_path("nocreate");
        let config = StoreConfig {
            create_if_missing: false,
            ..fast_config()
        };
        let mut store = WorldStore::new(&path, config);
        assert!(matches!(store.open(), Err(StoreError::Io(_))));
        assert!(!store.is_open());
    }

    #[test]
    fn test_empty_file_without_create_left_untouched() {
        let path = temp_path("emptynocreate");
        fs::write(&path, b"").unwrap();
        let config = StoreConfig {
            create_if_missing: false,
            ..fast_config()
        };
        let mut store = WorldStore::new(&path, config);
        assert!(matches!(
            store.open(),
            Err(StoreError::FormatMismatch { found_magic: 0, found_revision: 0, .. })
        ));
        assert!(!store.is_open());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);

        // With creation allowed the same file becomes a world
        let mut store = WorldStore::new(&path, fast_config());
        store.open().unwrap();
        store.close().unwrap();
        assert!(WorldStore::claims(&path));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_chunk_counter_counts_creations_only() {
        let path = temp_path("counter");
        let mut store = WorldStore::new(&path, fast_config());
        store.open().unwrap();

        let mut chunk = ChunkColumn::new();
        chunk.set_block_id(1, 2, 3, 4);
        store.save_chunk(&chunk, 0, 0).unwrap();
        store.save_chunk(&chunk, 0, 0).unwrap();
        store.save_chunk(&chunk, -1, 0).unwrap();
        assert_eq!(store.chunk_count().unwrap(), 2);

        // save_info cannot overwrite the counter
        let info = WorldInfo {
            chunk_count: 99,
            ..WorldInfo::default()
        };
        store.save_info(&info).unwrap();
        assert_eq!(store.load_info().unwrap().chunk_count, 2);

        drop(store);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_claims_rejects_foreign_files() {
        let path = temp_path("foreign");
        fs::write(&path, b"PK\x03\x04 not a world").unwrap();
        assert!(!WorldStore::claims(&path));
        assert!(!WorldStore::claims(temp_path("absent")));
        fs::remove_file(&path).ok();
    }
}
