//! # World Records
//!
//! The world header and the fixed-schema records the provider stores in
//! reserved layers.
//!
//! ## Header (page 0)
//!
//! ```text
//! [4 bytes:  magic]              offset 0
//! [4 bytes:  revision]           offset 4
//! [4 bytes:  width]              offset 8
//! [4 bytes:  depth]              offset 12
//! [8 x 3:    spawn x, y, z]      offset 16
//! [4 x 2:    spawn yaw, pitch]   offset 40
//! [4 bytes:  chunk count]        offset 48
//! [32 bytes: generator name]     offset 52
//! [8 bytes:  generator seed]     offset 84
//! [1 byte:   world type]         offset 92
//! ```

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{StoreError, StoreResult};
use crate::format::{FORMAT_MAGIC, FORMAT_REVISION, PAGE_SIZE};

/// Byte offset of the chunk counter inside the header page.
pub const CHUNK_COUNT_OFFSET: usize = 48;

/// Capacity of the generator name field.
pub const GENERATOR_NAME_LEN: usize = 32;

/// Encoding version of security and portal records.
const RECORD_VERSION: u8 = 1;

/// Position and facing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    /// X position.
    pub x: f64,
    /// Y position.
    pub y: f64,
    /// Z position.
    pub z: f64,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
}

impl Pose {
    /// Creates a pose.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64, yaw: f32, pitch: f32) -> Self {
        Self { x, y, z, yaw, pitch }
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_f64(self.x);
        w.put_f64(self.y);
        w.put_f64(self.z);
        w.put_f32(self.yaw);
        w.put_f32(self.pitch);
    }

    fn read(r: &mut ByteReader<'_>) -> StoreResult<Self> {
        Ok(Self {
            x: r.get_f64()?,
            y: r.get_f64()?,
            z: r.get_f64()?,
            yaw: r.get_f32()?,
            pitch: r.get_f32()?,
        })
    }
}

/// Terrain style of a world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum WorldType {
    /// Generated terrain.
    #[default]
    Normal = 0,
    /// Flat layers.
    Flat = 1,
    /// Nothing but air.
    Void = 2,
}

impl WorldType {
    /// Converts from the stored tag.
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::Flat),
            2 => Some(Self::Void),
            _ => None,
        }
    }
}

/// World metadata stored in the header page.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldInfo {
    /// World width in blocks.
    pub width: i32,
    /// World depth in blocks.
    pub depth: i32,
    /// Spawn pose.
    pub spawn: Pose,
    /// Chunk records created so far. Maintained by the store.
    pub chunk_count: u32,
    /// Terrain generator name (at most 32 bytes).
    pub generator: String,
    /// Terrain generator seed.
    pub seed: i64,
    /// World type tag.
    pub world_type: WorldType,
}

impl Default for WorldInfo {
    fn default() -> Self {
        Self {
            width: 0,
            depth: 0,
            spawn: Pose::new(0.0, 64.0, 0.0, 0.0, 0.0),
            chunk_count: 0,
            generator: String::new(),
            seed: 0,
            world_type: WorldType::Normal,
        }
    }
}

impl WorldInfo {
    /// Encodes the full header page.
    ///
    /// # Errors
    ///
    /// [`StoreError::CorruptPayload`] if the generator name is longer than 32 bytes.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut w = ByteWriter::with_capacity(PAGE_SIZE);
        w.put_u32(FORMAT_MAGIC);
        w.put_u32(FORMAT_REVISION);
        w.put_i32(self.width);
        w.put_i32(self.depth);
        self.spawn.write(&mut w);
        w.put_u32(self.chunk_count);
        w.put_fixed_str(&self.generator, GENERATOR_NAME_LEN)?;
        w.put_i64(self.seed);
        w.put_u8(self.world_type as u8);
        w.pad_to(PAGE_SIZE);
        Ok(w.into_inner())
    }

    /// Decodes a header page, checking magic and revision first.
    ///
    /// # Errors
    ///
    /// [`StoreError::FormatMismatch`] for a foreign or newer file,
    /// [`StoreError::Truncated`] or [`StoreError::CorruptPayload`] otherwise.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let mut r = ByteReader::new(bytes);
        let magic = r.get_u32()?;
        let revision = r.get_u32()?;
        if magic != FORMAT_MAGIC || revision != FORMAT_REVISION {
            return Err(StoreError::FormatMismatch {
                expected_magic: FORMAT_MAGIC,
                expected_revision: FORMAT_REVISION,
                found_magic: magic,
                found_revision: revision,
            });
        }

        let width = r.get_i32()?;
        let depth = r.get_i32()?;
        let spawn = Pose::read(&mut r)?;
        let chunk_count = r.get_u32()?;
        let generator = r.get_fixed_str(GENERATOR_NAME_LEN)?;
        let seed = r.get_i64()?;
        let tag = r.get_u8()?;
        let world_type = WorldType::from_u8(tag)
            .ok_or_else(|| StoreError::CorruptPayload(format!("unknown world type {tag}")))?;

        Ok(Self {
            width,
            depth,
            spawn,
            chunk_count,
            generator,
            seed,
            world_type,
        })
    }
}

fn put_ids(w: &mut ByteWriter, ids: &[u32]) -> StoreResult<()> {
    let count = u32::try_from(ids.len())
        .map_err(|_| StoreError::CorruptPayload(format!("{} ids in one list", ids.len())))?;
    w.put_u32(count);
    for &id in ids {
        w.put_u32(id);
    }
    Ok(())
}

fn get_ids(r: &mut ByteReader<'_>) -> StoreResult<Vec<u32>> {
    let count = r.get_u32()? as usize;
    if count > r.remaining() / 4 {
        return Err(StoreError::Truncated {
            needed: count.saturating_mul(4),
            remaining: r.remaining(),
        });
    }
    (0..count).map(|_| r.get_u32()).collect()
}

fn check_version(r: &mut ByteReader<'_>, what: &str) -> StoreResult<()> {
    let version = r.get_u8()?;
    if version != RECORD_VERSION {
        return Err(StoreError::CorruptPayload(format!("{what} record version {version}")));
    }
    Ok(())
}

fn check_consumed(r: &ByteReader<'_>, what: &str) -> StoreResult<()> {
    if r.remaining() != 0 {
        return Err(StoreError::CorruptPayload(format!(
            "{} trailing bytes after {what} record",
            r.remaining()
        )));
    }
    Ok(())
}

/// Ownership and permissions of a world.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityRecord {
    /// Player ids that own the world.
    pub owners: Vec<u32>,
    /// Player ids that are members.
    pub members: Vec<u32>,
    /// Permission required to join.
    pub join_perms: String,
    /// Permission required to build.
    pub build_perms: String,
}

impl SecurityRecord {
    /// Encodes the record.
    ///
    /// # Errors
    ///
    /// [`StoreError::CorruptPayload`] if a list or string is too long to encode.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut w = ByteWriter::new();
        w.put_u8(RECORD_VERSION);
        put_ids(&mut w, &self.owners)?;
        put_ids(&mut w, &self.members)?;
        w.put_str(&self.join_perms)?;
        w.put_str(&self.build_perms)?;
        Ok(w.into_inner())
    }

    /// Decodes a record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Truncated`] or [`StoreError::CorruptPayload`] on malformed bytes.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let mut r = ByteReader::new(bytes);
        check_version(&mut r, "security")?;
        let record = Self {
            owners: get_ids(&mut r)?,
            members: get_ids(&mut r)?,
            join_perms: r.get_str()?,
            build_perms: r.get_str()?,
        };
        check_consumed(&r, "security")?;
        Ok(record)
    }
}

/// Block position.
pub type BlockPos = (i32, i32, i32);

/// A cuboid that teleports players into another world.
#[derive(Clone, Debug, PartialEq)]
pub struct Portal {
    /// Portal name.
    pub name: String,
    /// Minimum corner (inclusive).
    pub min: BlockPos,
    /// Maximum corner (inclusive).
    pub max: BlockPos,
    /// Destination world name.
    pub destination: String,
    /// Pose players arrive at.
    pub arrival: Pose,
}

impl Portal {
    /// True if the block at `pos` lies inside the portal.
    #[must_use]
    pub fn contains(&self, pos: BlockPos) -> bool {
        (self.min.0..=self.max.0).contains(&pos.0)
            && (self.min.1..=self.max.1).contains(&pos.1)
            && (self.min.2..=self.max.2).contains(&pos.2)
    }
}

/// Every portal of a world.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortalList {
    /// Portals in insertion order.
    pub portals: Vec<Portal>,
}

impl PortalList {
    /// Encodes the list.
    ///
    /// # Errors
    ///
    /// [`StoreError::CorruptPayload`] if a string is too long to encode.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut w = ByteWriter::new();
        w.put_u8(RECORD_VERSION);
        let count = u32::try_from(self.portals.len())
            .map_err(|_| StoreError::CorruptPayload("too many portals".to_string()))?;
        w.put_u32(count);
        for p in &self.portals {
            w.put_str(&p.name)?;
            for (x, y, z) in [p.min, p.max] {
                w.put_i32(x);
                w.put_i32(y);
                w.put_i32(z);
            }
            w.put_str(&p.destination)?;
            p.arrival.write(&mut w);
        }
        Ok(w.into_inner())
    }

    /// Decodes a list.
    ///
    /// # Errors
    ///
    /// [`StoreError::Truncated`] or [`StoreError::CorruptPayload`] on malformed bytes.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let mut r = ByteReader::new(bytes);
        check_version(&mut r, "portal")?;
        let count = r.get_u32()? as usize;

        let mut portals = Vec::new();
        for _ in 0..count {
            let name = r.get_str()?;
            let min = (r.get_i32()?, r.get_i32()?, r.get_i32()?);
            let max = (r.get_i32()?, r.get_i32()?, r.get_i32()?);
            let destination = r.get_str()?;
            let arrival = Pose::read(&mut r)?;
            portals.push(Portal {
                name,
                min,
                max,
                destination,
                arrival,
            });
        }
        check_consumed(&r, "portal")?;
        Ok(Self { portals })
    }
}
