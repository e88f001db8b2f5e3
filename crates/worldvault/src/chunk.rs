//! # Chunk Columns
//!
//! The in-memory chunk shape exchanged with the simulation layer.
//!
//! ## Layout
//!
//! A column is 16x256x16 voxels split into 16 vertical subslices of
//! 16x16x16. Each subslice carries a byte id array plus nibble arrays for
//! metadata, block light, sky light and extra data, and optionally an
//! "add" nibble array extending ids past 255. Absent subslices read as
//! all-zero.

use std::collections::BTreeMap;
use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Chunk width/depth in voxels.
pub const CHUNK_SIZE: usize = 16;

/// Vertical subslices per column.
pub const SUBSLICE_COUNT: usize = 16;

/// Voxels per subslice.
pub const SUBSLICE_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;

/// Bytes in a nibble array covering one subslice.
pub const NIBBLE_LEN: usize = SUBSLICE_VOLUME / 2;

/// Biome bytes per column (one per x/z).
pub const BIOME_LEN: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Column height in voxels.
pub const COLUMN_HEIGHT: usize = CHUNK_SIZE * SUBSLICE_COUNT;

/// Terrain generation has completed for this column.
pub const FLAG_GENERATED: u8 = 0x01;

/// Stored light arrays are up to date.
pub const FLAG_LIGHT_VALID: u8 = 0x02;

/// Chunk coordinate (identifies a chunk in the world grid).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkCoord {
    /// X coordinate (in chunks, not blocks).
    pub x: i32,
    /// Z coordinate (in chunks, not blocks).
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Converts world block coordinates to chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn from_block_pos(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_x.div_euclid(CHUNK_SIZE as i32),
            z: block_z.div_euclid(CHUNK_SIZE as i32),
        }
    }
}

/// Fixed-size voxel arrays of one subslice.
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct VoxelArrays {
    /// Block ids, indexed `(y * 16 + z) * 16 + x`.
    pub ids: [u8; SUBSLICE_VOLUME],
    /// Block metadata nibbles.
    pub meta: [u8; NIBBLE_LEN],
    /// Block light nibbles.
    pub block_light: [u8; NIBBLE_LEN],
    /// Sky light nibbles.
    pub sky_light: [u8; NIBBLE_LEN],
    /// Extra per-voxel nibbles.
    pub extra: [u8; NIBBLE_LEN],
}

/// One 16x16x16 vertical section of a column.
#[derive(Clone, PartialEq, Eq)]
pub struct Subslice {
    arrays: Box<VoxelArrays>,
    add: Option<Box<[u8; NIBBLE_LEN]>>,
    air_count: u16,
}

#[inline]
const fn voxel_index(x: usize, y: usize, z: usize) -> usize {
    (y * CHUNK_SIZE + z) * CHUNK_SIZE + x
}

#[inline]
fn get_nibble(array: &[u8; NIBBLE_LEN], index: usize) -> u8 {
    let byte = array[index >> 1];
    if index & 1 == 0 {
        byte & 0x0F
    } else {
        byte >> 4
    }
}

#[inline]
fn set_nibble(array: &mut [u8; NIBBLE_LEN], index: usize, value: u8) {
    let byte = &mut array[index >> 1];
    if index & 1 == 0 {
        *byte = (*byte & 0xF0) | (value & 0x0F);
    } else {
        *byte = (*byte & 0x0F) | (value << 4);
    }
}

impl Subslice {
    /// Creates an all-air subslice.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new() -> Self {
        Self {
            arrays: Box::new(VoxelArrays::zeroed()),
            add: None,
            air_count: SUBSLICE_VOLUME as u16,
        }
    }

    /// Read-only access to the fixed arrays.
    #[inline]
    #[must_use]
    pub fn arrays(&self) -> &VoxelArrays {
        &self.arrays
    }

    /// Mutable access to the fixed arrays.
    ///
    /// Call [`Subslice::recount_air`] after editing ids directly.
    #[inline]
    pub fn arrays_mut(&mut self) -> &mut VoxelArrays {
        &mut self.arrays
    }

    /// The add-nibble array, if this subslice has one.
    #[inline]
    #[must_use]
    pub fn add(&self) -> Option<&[u8; NIBBLE_LEN]> {
        self.add.as_deref()
    }

    /// The add-nibble array, created zeroed if missing.
    pub fn add_mut(&mut self) -> &mut [u8; NIBBLE_LEN] {
        self.add.get_or_insert_with(|| Box::new([0u8; NIBBLE_LEN]))
    }

    /// Drops the add-nibble array.
    pub fn clear_add(&mut self) {
        self.add = None;
    }

    /// Number of voxels whose full id is zero.
    #[inline]
    #[must_use]
    pub const fn air_count(&self) -> u16 {
        self.air_count
    }

    /// Full block id (add nibble << 8 | id byte) at local coordinates.
    #[must_use]
    pub fn id(&self, x: usize, y: usize, z: usize) -> u16 {
        let i = voxel_index(x, y, z);
        let high = self.add.as_deref().map_or(0, |a| get_nibble(a, i));
        u16::from(high) << 8 | u16::from(self.arrays.ids[i])
    }

    /// Sets the full block id at local coordinates. Ids above 255 create the add array.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_id(&mut self, x: usize, y: usize, z: usize, id: u16) {
        let i = voxel_index(x, y, z);
        let was_air = self.id(x, y, z) == 0;
        self.arrays.ids[i] = id as u8;
        let high = ((id >> 8) & 0x0F) as u8;
        if high != 0 {
            set_nibble(self.add_mut(), i, high);
        } else if let Some(add) = self.add.as_deref_mut() {
            set_nibble(add, i, 0);
        }
        match (was_air, self.id(x, y, z) == 0) {
            (true, false) => self.air_count = self.air_count.saturating_sub(1),
            (false, true) => self.air_count = self.air_count.saturating_add(1),
            _ => {}
        }
    }

    /// Metadata nibble at local coordinates.
    #[must_use]
    pub fn meta(&self, x: usize, y: usize, z: usize) -> u8 {
        get_nibble(&self.arrays.meta, voxel_index(x, y, z))
    }

    /// Sets the metadata nibble.
    pub fn set_meta(&mut self, x: usize, y: usize, z: usize, value: u8) {
        set_nibble(&mut self.arrays.meta, voxel_index(x, y, z), value);
    }

    /// Block light nibble at local coordinates.
    #[must_use]
    pub fn block_light(&self, x: usize, y: usize, z: usize) -> u8 {
        get_nibble(&self.arrays.block_light, voxel_index(x, y, z))
    }

    /// Sets the block light nibble.
    pub fn set_block_light(&mut self, x: usize, y: usize, z: usize, value: u8) {
        set_nibble(&mut self.arrays.block_light, voxel_index(x, y, z), value);
    }

    /// Sky light nibble at local coordinates.
    #[must_use]
    pub fn sky_light(&self, x: usize, y: usize, z: usize) -> u8 {
        get_nibble(&self.arrays.sky_light, voxel_index(x, y, z))
    }

    /// Sets the sky light nibble.
    pub fn set_sky_light(&mut self, x: usize, y: usize, z: usize, value: u8) {
        set_nibble(&mut self.arrays.sky_light, voxel_index(x, y, z), value);
    }

    /// Extra nibble at local coordinates.
    #[must_use]
    pub fn extra(&self, x: usize, y: usize, z: usize) -> u8 {
        get_nibble(&self.arrays.extra, voxel_index(x, y, z))
    }

    /// Sets the extra nibble.
    pub fn set_extra(&mut self, x: usize, y: usize, z: usize, value: u8) {
        set_nibble(&mut self.arrays.extra, voxel_index(x, y, z), value);
    }

    /// True if every array is zero and there is no add array.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.add.is_none() && bytemuck::bytes_of(&*self.arrays).iter().all(|&b| b == 0)
    }

    /// Recomputes the air counter by scanning ids.
    #[allow(clippy::cast_possible_truncation)]
    pub fn recount_air(&mut self) {
        let add = self.add.as_deref();
        let air = (0..SUBSLICE_VOLUME)
            .filter(|&i| self.arrays.ids[i] == 0 && add.map_or(true, |a| get_nibble(a, i) == 0))
            .count();
        self.air_count = air as u16;
    }
}

impl Default for Subslice {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Subslice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subslice")
            .field("air_count", &self.air_count)
            .field("has_add", &self.add.is_some())
            .finish_non_exhaustive()
    }
}

/// Text sign attached to a column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sign {
    /// World block X.
    pub x: i32,
    /// Block Y.
    pub y: u8,
    /// World block Z.
    pub z: i32,
    /// The four text lines.
    pub lines: [String; 4],
}

impl Sign {
    /// Creates a sign at the given block position.
    #[must_use]
    pub fn new(x: i32, y: u8, z: i32, lines: [String; 4]) -> Self {
        Self { x, y, z, lines }
    }

    /// Map key (ordered by x, y, z).
    #[must_use]
    pub const fn key(&self) -> (i32, u8, i32) {
        (self.x, self.y, self.z)
    }
}

/// A full chunk column as the simulation hands it to storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkColumn {
    subslices: [Option<Subslice>; SUBSLICE_COUNT],
    /// Biome id per x/z column, indexed `z * 16 + x`.
    pub biomes: [u8; BIOME_LEN],
    signs: BTreeMap<(i32, u8, i32), Sign>,
    /// `FLAG_*` bits.
    pub flags: u8,
}

impl ChunkColumn {
    /// Creates an empty column.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subslices: std::array::from_fn(|_| None),
            biomes: [0; BIOME_LEN],
            signs: BTreeMap::new(),
            flags: 0,
        }
    }

    /// Subslice `index` (0 = bottom), if allocated.
    #[must_use]
    pub fn subslice(&self, index: usize) -> Option<&Subslice> {
        self.subslices.get(index).and_then(Option::as_ref)
    }

    /// Subslice `index`, allocated on demand.
    ///
    /// # Panics
    ///
    /// Panics if `index >= SUBSLICE_COUNT`.
    pub fn subslice_mut(&mut self, index: usize) -> &mut Subslice {
        self.subslices[index].get_or_insert_with(Subslice::new)
    }

    /// Replaces subslice `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= SUBSLICE_COUNT`.
    pub fn set_subslice(&mut self, index: usize, subslice: Option<Subslice>) {
        self.subslices[index] = subslice;
    }

    /// Iterates allocated subslices with their index.
    pub fn subslices(&self) -> impl Iterator<Item = (usize, &Subslice)> {
        self.subslices
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
    }

    /// Full block id at column-local coordinates (y in 0..256).
    #[must_use]
    pub fn block_id(&self, x: usize, y: usize, z: usize) -> u16 {
        self.subslice(y / CHUNK_SIZE)
            .map_or(0, |s| s.id(x, y % CHUNK_SIZE, z))
    }

    /// Sets a block id, allocating the subslice when needed.
    pub fn set_block_id(&mut self, x: usize, y: usize, z: usize, id: u16) {
        if y >= COLUMN_HEIGHT {
            return;
        }
        if id == 0 && self.subslice(y / CHUNK_SIZE).is_none() {
            return;
        }
        self.subslice_mut(y / CHUNK_SIZE).set_id(x, y % CHUNK_SIZE, z, id);
    }

    /// Attaches or replaces a sign.
    pub fn put_sign(&mut self, sign: Sign) {
        self.signs.insert(sign.key(), sign);
    }

    /// Removes the sign at a block position.
    pub fn remove_sign(&mut self, x: i32, y: u8, z: i32) -> Option<Sign> {
        self.signs.remove(&(x, y, z))
    }

    /// Sign at a block position.
    #[must_use]
    pub fn sign_at(&self, x: i32, y: u8, z: i32) -> Option<&Sign> {
        self.signs.get(&(x, y, z))
    }

    /// Signs in position order.
    pub fn signs(&self) -> impl Iterator<Item = &Sign> {
        self.signs.values()
    }

    /// Number of attached signs.
    #[must_use]
    pub fn sign_count(&self) -> usize {
        self.signs.len()
    }
}

impl Default for ChunkColumn {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_coord_from_block_pos() {
        assert_eq!(ChunkCoord::from_block_pos(0, 0), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_block_pos(15, 16), ChunkCoord::new(0, 1));
        assert_eq!(ChunkCoord::from_block_pos(-1, -16), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::from_block_pos(-17, 0), ChunkCoord::new(-2, 0));
    }

    #[test]
    fn test_new_subslice_is_air() {
        let s = Subslice::new();
        assert_eq!(s.air_count(), 4096);
        assert!(s.is_default());
        assert_eq!(s.id(3, 4, 5), 0);
    }

    #[test]
    fn test_set_id_tracks_air_and_add() {
        let mut s = Subslice::new();
        s.set_id(1, 2, 3, 0x1A5);
        assert_eq!(s.id(1, 2, 3), 0x1A5);
        assert!(s.add().is_some());
        assert_eq!(s.air_count(), 4095);

        s.set_id(1, 2, 3, 0);
        assert_eq!(s.air_count(), 4096);
        // Add array stays allocated once created
        assert!(!s.is_default());
    }

    #[test]
    fn test_stale_air_count_saturates() {
        let mut s = Subslice::new();
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    s.set_id(x, y, z, 1);
                }
            }
        }
        assert_eq!(s.air_count(), 0);

        // Raw edit without recount leaves the counter at zero
        s.arrays_mut().ids.fill(0);
        s.set_id(0, 0, 0, 5);
        assert_eq!(s.air_count(), 0);

        s.recount_air();
        assert_eq!(s.air_count(), 4095);
    }

    #[test]
    fn test_nibbles_are_independent() {
        let mut s = Subslice::new();
        s.set_meta(0, 0, 0, 0xA);
        s.set_meta(1, 0, 0, 0x5);
        s.set_sky_light(1, 0, 0, 15);
        s.set_block_light(0, 0, 0, 7);
        s.set_extra(15, 15, 15, 3);

        assert_eq!(s.meta(0, 0, 0), 0xA);
        assert_eq!(s.meta(1, 0, 0), 0x5);
        assert_eq!(s.sky_light(1, 0, 0), 15);
        assert_eq!(s.sky_light(0, 0, 0), 0);
        assert_eq!(s.block_light(0, 0, 0), 7);
        assert_eq!(s.extra(15, 15, 15), 3);
    }

    #[test]
    fn test_recount_air_matches_incremental() {
        let mut s = Subslice::new();
        for x in 0..16 {
            s.set_id(x, 0, 0, 1);
        }
        let tracked = s.air_count();
        s.recount_air();
        assert_eq!(s.air_count(), tracked);
        assert_eq!(tracked, 4096 - 16);
    }

    #[test]
    fn test_column_block_access() {
        let mut c = ChunkColumn::new();
        c.set_block_id(4, 200, 9, 42);
        assert_eq!(c.block_id(4, 200, 9), 42);
        assert!(c.subslice(12).is_some());
        assert!(c.subslice(0).is_none());

        // Setting air into an absent subslice does not allocate it
        c.set_block_id(0, 0, 0, 0);
        assert!(c.subslice(0).is_none());
    }

    #[test]
    fn test_signs_are_ordered() {
        let mut c = ChunkColumn::new();
        let lines = || [String::from("a"), String::new(), String::new(), String::new()];
        c.put_sign(Sign::new(5, 10, 1, lines()));
        c.put_sign(Sign::new(-3, 70, 2, lines()));
        let xs: Vec<i32> = c.signs().map(|s| s.x).collect();
        assert_eq!(xs, vec![-3, 5]);
        assert!(c.remove_sign(5, 10, 1).is_some());
        assert_eq!(c.sign_count(), 1);
    }
}
