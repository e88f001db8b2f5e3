//! # Spatial Hash Directory
//!
//! Four nested on-disk hash tables map a chunk coordinate to the page of
//! its [`ChunkRecord`](crate::sector::ChunkRecord).
//!
//! ## Tiers
//!
//! ```text
//! Global (1 table, 4096 slots)  keyed by macro id
//!   Macro  (64 slots)           keyed by meso id   (macro = meso / 8)
//!     Meso  (1024 slots)        keyed by micro id  (meso = micro / 32)
//!       Micro (1024 slots)      keyed by chunk     (micro = chunk / 32)
//! ```
//!
//! Each slot is `(x: i32, z: i32, page: u32)`; page 0 marks an empty slot.
//! The slot for a key is `hash(x, z) mod capacity`, resolved by forward
//! linear probing with wrap-around. Because each table's capacity is the
//! square of its grouping factor, keys under one node never collide; only
//! the Global table can see collisions.
//!
//! ## Crash ordering
//!
//! A new child table is appended and synced before the parent slot that
//! references it is written. A crash in between leaves an orphan page,
//! never a dangling slot.

use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::debug;

use crate::chunk::ChunkCoord;
use crate::codec::{ByteReader, ByteWriter};
use crate::error::{StoreError, StoreResult};
use crate::format::{
    pages_for, FIRST_DATA_PAGE, GLOBAL_CAPACITY, GLOBAL_TABLE_PAGE, NO_PAGE, PAGE_SIZE, SLOT_SIZE,
};
use crate::page::{Backing, PageFile};
use crate::sector::ChunkRecord;

/// Chunks per micro node edge.
pub const MICRO_GROUP: i32 = 32;
/// Micro nodes per meso node edge.
pub const MESO_GROUP: i32 = 32;
/// Meso nodes per macro node edge.
pub const MACRO_GROUP: i32 = 8;

/// Directory tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Root table at a fixed file offset.
    Global,
    /// Groups 8x8 meso nodes.
    Macro,
    /// Groups 32x32 micro nodes.
    Meso,
    /// Groups 32x32 chunks.
    Micro,
}

impl Tier {
    /// Slot capacity of this tier's table.
    #[must_use]
    pub const fn capacity(self) -> usize {
        match self {
            Self::Global => GLOBAL_CAPACITY,
            Self::Macro => 64,
            Self::Meso | Self::Micro => 1024,
        }
    }

    /// Edge length of the key grid one table covers without collisions.
    const fn side(self) -> u32 {
        match self {
            Self::Global => 64,
            Self::Macro => 8,
            Self::Meso | Self::Micro => 32,
        }
    }

    /// Pages occupied by one table of this tier.
    #[must_use]
    pub const fn table_pages(self) -> u32 {
        pages_for(self.capacity() * SLOT_SIZE)
    }

    /// Tier that holds this tier's nodes in its table.
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Global => None,
            Self::Macro => Some(Self::Global),
            Self::Meso => Some(Self::Macro),
            Self::Micro => Some(Self::Meso),
        }
    }

    /// Human-readable tier name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Macro => "macro",
            Self::Meso => "meso",
            Self::Micro => "micro",
        }
    }

    /// Id of the parent node containing node `id` of this tier.
    #[must_use]
    pub const fn parent_id(self, id: NodeId) -> NodeId {
        match self {
            Self::Global | Self::Macro => NodeId::ROOT,
            Self::Meso => id.group(MACRO_GROUP),
            Self::Micro => id.group(MESO_GROUP),
        }
    }

    /// Id of the node of this tier that contains `chunk`.
    #[must_use]
    pub const fn node_for_chunk(self, chunk: ChunkCoord) -> NodeId {
        let micro = NodeId::new(chunk.x, chunk.z).group(MICRO_GROUP);
        match self {
            Self::Global => NodeId::ROOT,
            Self::Micro => micro,
            Self::Meso => micro.group(MESO_GROUP),
            Self::Macro => micro.group(MESO_GROUP).group(MACRO_GROUP),
        }
    }
}

/// Identity coordinate of a directory node within its tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Grouped X.
    pub x: i32,
    /// Grouped Z.
    pub z: i32,
}

impl NodeId {
    /// Id of the single Global node.
    pub const ROOT: Self = Self { x: 0, z: 0 };

    /// Creates a node id.
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Floor-divides both components by `factor`.
    #[must_use]
    pub const fn group(self, factor: i32) -> Self {
        Self {
            x: self.x.div_euclid(factor),
            z: self.z.div_euclid(factor),
        }
    }
}

/// A resolved directory node: where its slot table lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectoryNode {
    /// Tier of this node.
    pub tier: Tier,
    /// Node identity.
    pub id: NodeId,
    /// First page of the node's slot table.
    pub table_page: u32,
}

impl DirectoryNode {
    /// The fixed Global root.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            tier: Tier::Global,
            id: NodeId::ROOT,
            table_page: GLOBAL_TABLE_PAGE,
        }
    }
}

/// Result of a chunk record lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordSlot {
    /// Page of the chunk record.
    pub page: u32,
    /// True if this call created the record.
    pub created: bool,
}

/// Slot hash: `x + z * side`, reduced mod `capacity`.
///
/// Wrapping u32 arithmetic keeps negative coordinates consistent because
/// every capacity divides 2^32.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn slot_hash(x: i32, z: i32, side: u32, capacity: usize) -> usize {
    let h = (x as u32).wrapping_add((z as u32).wrapping_mul(side));
    h as usize % capacity
}

/// One decoded slot of a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Never written.
    Empty,
    /// Points at a child page.
    Occupied {
        /// Key X.
        x: i32,
        /// Key Z.
        z: i32,
        /// Child page.
        page: u32,
    },
}

impl Slot {
    fn decode(bytes: &[u8], table_page: u32) -> StoreResult<Self> {
        let mut r = ByteReader::new(bytes);
        let x = r.get_i32()?;
        let z = r.get_i32()?;
        let page = r.get_u32()?;
        if page != NO_PAGE {
            return Ok(Self::Occupied { x, z, page });
        }
        if x != 0 || z != 0 {
            return Err(StoreError::CorruptDirectory {
                page: table_page,
                reason: format!("slot ({x}, {z}) has coordinates but no page"),
            });
        }
        Ok(Self::Empty)
    }

    fn encode(self) -> [u8; SLOT_SIZE] {
        let mut w = ByteWriter::with_capacity(SLOT_SIZE);
        if let Self::Occupied { x, z, page } = self {
            w.put_i32(x);
            w.put_i32(z);
            w.put_u32(page);
        } else {
            w.put_zeros(SLOT_SIZE);
        }
        let mut out = [0u8; SLOT_SIZE];
        out.copy_from_slice(w.as_slice());
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum CacheKey {
    Node(Tier, NodeId),
    Record(ChunkCoord),
}

/// In-memory front of the on-disk directory.
///
/// Resolved node and record pages are kept in an LRU cache; a miss walks
/// the tables on disk.
pub struct Directory {
    cache: LruCache<CacheKey, u32>,
}

impl Directory {
    /// Creates a directory cache holding at most `cache_capacity` entries.
    #[must_use]
    pub fn new(cache_capacity: NonZeroUsize) -> Self {
        Self {
            cache: LruCache::new(cache_capacity),
        }
    }

    /// Number of cached node/record pages.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Forgets every cached page.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Resolves the node `id` of `tier`, optionally creating it and any
    /// missing ancestors.
    ///
    /// Returns `None` if the node does not exist and `create` is false.
    ///
    /// # Errors
    ///
    /// [`StoreError::DirectoryFull`] when a table has no room,
    /// [`StoreError::CorruptDirectory`] on malformed slots, or I/O errors.
    pub fn find_or_create<B: Backing>(
        &mut self,
        file: &mut PageFile<B>,
        tier: Tier,
        id: NodeId,
        create: bool,
    ) -> StoreResult<Option<DirectoryNode>> {
        let Some(parent_tier) = tier.parent() else {
            return Ok(Some(DirectoryNode::root()));
        };

        let key = CacheKey::Node(tier, id);
        if let Some(&table_page) = self.cache.get(&key) {
            return Ok(Some(DirectoryNode { tier, id, table_page }));
        }

        let Some(parent) = self.find_or_create(file, parent_tier, tier.parent_id(id), create)? else {
            return Ok(None);
        };

        let table = create.then(|| blank_table(tier));
        let belongs = |x: i32, z: i32| tier.parent_id(NodeId::new(x, z)) == parent.id;
        let found = probe(file, &parent, id.x, id.z, belongs, table.as_deref())?;

        Ok(found.map(|(table_page, created)| {
            if created {
                debug!(tier = tier.name(), x = id.x, z = id.z, table_page, "created directory node");
            }
            self.cache.put(key, table_page);
            DirectoryNode { tier, id, table_page }
        }))
    }

    /// Resolves the chunk record for `coord`, optionally creating it and
    /// the directory path above it.
    ///
    /// # Errors
    ///
    /// Same as [`Directory::find_or_create`].
    pub fn find_or_create_record<B: Backing>(
        &mut self,
        file: &mut PageFile<B>,
        coord: ChunkCoord,
        create: bool,
    ) -> StoreResult<Option<RecordSlot>> {
        let key = CacheKey::Record(coord);
        if let Some(&page) = self.cache.get(&key) {
            return Ok(Some(RecordSlot { page, created: false }));
        }

        let micro_id = Tier::Micro.node_for_chunk(coord);
        let Some(micro) = self.find_or_create(file, Tier::Micro, micro_id, create)? else {
            return Ok(None);
        };

        let blank = create.then(|| ChunkRecord::blank_page(coord));
        let belongs = |x: i32, z: i32| Tier::Micro.node_for_chunk(ChunkCoord::new(x, z)) == micro.id;
        let found = probe(file, &micro, coord.x, coord.z, belongs, blank.as_deref())?;

        Ok(found.map(|(page, created)| {
            self.cache.put(key, page);
            RecordSlot { page, created }
        }))
    }
}

/// Zeroed slot table for a new node of `tier`, padded to whole pages.
fn blank_table(tier: Tier) -> Vec<u8> {
    let mut table = ByteWriter::with_capacity(tier.table_pages() as usize * PAGE_SIZE);
    table.put_zeros(tier.capacity() * SLOT_SIZE);
    table.pad_to(PAGE_SIZE);
    table.into_inner()
}

/// Probes `parent`'s table for key `(x, z)`.
///
/// With `child` set, an empty slot is claimed by appending `child` at
/// end-of-file. Returns the child page and whether it was created.
fn probe<B: Backing>(
    file: &mut PageFile<B>,
    parent: &DirectoryNode,
    x: i32,
    z: i32,
    belongs: impl Fn(i32, i32) -> bool,
    child: Option<&[u8]>,
) -> StoreResult<Option<(u32, bool)>> {
    let capacity = parent.tier.capacity();
    let table = file.read_pages(parent.table_page, parent.tier.table_pages())?;
    let start = slot_hash(x, z, parent.tier.side(), capacity);

    for step in 0..capacity {
        let index = (start + step) % capacity;
        let at = index * SLOT_SIZE;

        match Slot::decode(&table[at..at + SLOT_SIZE], parent.table_page)? {
            Slot::Empty => {
                let Some(child) = child else {
                    return Ok(None);
                };
                let page = file.append(child)?;
                file.barrier()?;
                let slot = Slot::Occupied { x, z, page };
                file.write_at(parent.table_page, at, &slot.encode())?;
                file.barrier()?;
                return Ok(Some((page, true)));
            }
            Slot::Occupied { x: sx, z: sz, page } => {
                if page < FIRST_DATA_PAGE || page >= file.page_count() {
                    return Err(StoreError::CorruptDirectory {
                        page: parent.table_page,
                        reason: format!("slot {index} points at page {page} outside the data area"),
                    });
                }
                if !belongs(sx, sz) {
                    return Err(StoreError::CorruptDirectory {
                        page: parent.table_page,
                        reason: format!(
                            "slot {index} key ({sx}, {sz}) does not belong to {} node ({}, {})",
                            parent.tier.name(),
                            parent.id.x,
                            parent.id.z
                        ),
                    });
                }
                if sx == x && sz == z {
                    return Ok(Some((page, false)));
                }
            }
        }
    }

    if child.is_some() {
        return Err(StoreError::DirectoryFull {
            tier: parent.tier.name(),
            x: parent.id.x,
            z: parent.id.z,
        });
    }
    Ok(None)
}
