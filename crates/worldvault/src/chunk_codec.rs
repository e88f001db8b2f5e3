//! # Chunk Codec
//!
//! Turns a [`ChunkColumn`] into one compressed buffer and back.
//!
//! ## Payload (before compression)
//!
//! ```text
//! [1 byte:  flags]
//! [2 bytes: populated subslice bitmap]
//! [2 bytes: add-array subslice bitmap]
//! [ids        x populated]   4096 bytes each
//! [meta       x populated]   2048 bytes each
//! [block light x populated]  2048 bytes each
//! [sky light  x populated]   2048 bytes each
//! [add        x has_add]     2048 bytes each
//! [extra      x populated]   2048 bytes each
//! [256 bytes: biomes]
//! [4 bytes: sign count]
//! per sign: [x i32][y u8][z i32][4 x u16-prefixed line]
//! ```
//!
//! The whole buffer is zlib (DEFLATE) compressed. The uncompressed length
//! is stored in the chunk record so decoding allocates exactly once.
//! Air counters are never stored; they are recomputed from the ids.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::chunk::{ChunkColumn, Sign, Subslice, BIOME_LEN, NIBBLE_LEN, SUBSLICE_COUNT, SUBSLICE_VOLUME};
use crate::codec::{ByteReader, ByteWriter};
use crate::error::{StoreError, StoreResult};

/// Upper bound on an uncompressed chunk payload.
pub const MAX_RAW_CHUNK_BYTES: usize = 16 * 1024 * 1024;

/// Smallest encoding of one sign: coordinates plus four empty lines.
const MIN_SIGN_BYTES: usize = 4 + 1 + 4 + 4 * 2;

/// Compressed chunk ready for the sector store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Compressed bytes.
    pub bytes: Vec<u8>,
    /// Length of the payload before compression.
    pub raw_len: u32,
}

/// Per-subslice array kinds, in serialization order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArrayKind {
    Id,
    Meta,
    BlockLight,
    SkyLight,
    Add,
    Extra,
}

impl ArrayKind {
    const ORDER: [Self; 6] = [
        Self::Id,
        Self::Meta,
        Self::BlockLight,
        Self::SkyLight,
        Self::Add,
        Self::Extra,
    ];

    fn bytes(self, s: &Subslice) -> Option<&[u8]> {
        let a = s.arrays();
        match self {
            Self::Id => Some(&a.ids[..]),
            Self::Meta => Some(&a.meta[..]),
            Self::BlockLight => Some(&a.block_light[..]),
            Self::SkyLight => Some(&a.sky_light[..]),
            Self::Add => s.add().map(|add| &add[..]),
            Self::Extra => Some(&a.extra[..]),
        }
    }

    fn bytes_mut(self, s: &mut Subslice) -> &mut [u8] {
        match self {
            Self::Id => &mut s.arrays_mut().ids[..],
            Self::Meta => &mut s.arrays_mut().meta[..],
            Self::BlockLight => &mut s.arrays_mut().block_light[..],
            Self::SkyLight => &mut s.arrays_mut().sky_light[..],
            Self::Add => &mut s.add_mut()[..],
            Self::Extra => &mut s.arrays_mut().extra[..],
        }
    }
}

/// Computes the `(populated, has_add)` bitmaps of a column.
#[must_use]
pub fn subslice_bitmaps(chunk: &ChunkColumn) -> (u16, u16) {
    let mut populated = 0u16;
    let mut has_add = 0u16;
    for (i, s) in chunk.subslices() {
        if !s.is_default() {
            populated |= 1 << i;
            if s.add().is_some() {
                has_add |= 1 << i;
            }
        }
    }
    (populated, has_add)
}

/// Serializes `chunk` to its uncompressed payload.
///
/// # Errors
///
/// [`StoreError::CorruptPayload`] if a sign line exceeds `u16::MAX` bytes.
pub fn serialize(chunk: &ChunkColumn) -> StoreResult<Vec<u8>> {
    let (populated, has_add) = subslice_bitmaps(chunk);
    let full = populated.count_ones() as usize;
    let adds = has_add.count_ones() as usize;

    let mut w = ByteWriter::with_capacity(
        5 + full * (SUBSLICE_VOLUME + 4 * NIBBLE_LEN) + adds * NIBBLE_LEN + BIOME_LEN + 4,
    );
    w.put_u8(chunk.flags);
    w.put_u16(populated);
    w.put_u16(has_add);

    for kind in ArrayKind::ORDER {
        let mask = if kind == ArrayKind::Add { has_add } else { populated };
        for (i, s) in chunk.subslices() {
            if mask & (1 << i) == 0 {
                continue;
            }
            if let Some(bytes) = kind.bytes(s) {
                w.put_bytes(bytes);
            }
        }
    }

    w.put_bytes(&chunk.biomes);

    let count = u32::try_from(chunk.sign_count())
        .map_err(|_| StoreError::CorruptPayload("too many signs".to_string()))?;
    w.put_u32(count);
    for sign in chunk.signs() {
        w.put_i32(sign.x);
        w.put_u8(sign.y);
        w.put_i32(sign.z);
        for line in &sign.lines {
            w.put_str(line)?;
        }
    }

    Ok(w.into_inner())
}

/// Parses an uncompressed payload back into a column.
///
/// # Errors
///
/// [`StoreError::Truncated`] or [`StoreError::CorruptPayload`] on malformed input.
pub fn deserialize(raw: &[u8]) -> StoreResult<ChunkColumn> {
    let mut r = ByteReader::new(raw);
    let mut chunk = ChunkColumn::new();

    chunk.flags = r.get_u8()?;
    let populated = r.get_u16()?;
    let has_add = r.get_u16()?;
    if has_add & !populated != 0 {
        return Err(StoreError::CorruptPayload(format!(
            "add bitmap {has_add:#06x} flags subslices missing from populated bitmap {populated:#06x}"
        )));
    }

    for i in 0..SUBSLICE_COUNT {
        if populated & (1 << i) != 0 {
            chunk.set_subslice(i, Some(Subslice::new()));
        }
    }

    for kind in ArrayKind::ORDER {
        let mask = if kind == ArrayKind::Add { has_add } else { populated };
        for i in 0..SUBSLICE_COUNT {
            if mask & (1 << i) != 0 {
                r.get_into(kind.bytes_mut(chunk.subslice_mut(i)))?;
            }
        }
    }

    r.get_into(&mut chunk.biomes)?;

    let count = r.get_u32()? as usize;
    if count > r.remaining() / MIN_SIGN_BYTES {
        return Err(StoreError::CorruptPayload(format!(
            "sign count {count} cannot fit in {} remaining bytes",
            r.remaining()
        )));
    }
    for _ in 0..count {
        let x = r.get_i32()?;
        let y = r.get_u8()?;
        let z = r.get_i32()?;
        let lines = [r.get_str()?, r.get_str()?, r.get_str()?, r.get_str()?];
        chunk.put_sign(Sign::new(x, y, z, lines));
    }

    if r.remaining() != 0 {
        return Err(StoreError::CorruptPayload(format!(
            "{} trailing bytes after chunk payload",
            r.remaining()
        )));
    }

    for i in 0..SUBSLICE_COUNT {
        if populated & (1 << i) != 0 {
            chunk.subslice_mut(i).recount_air();
        }
    }

    Ok(chunk)
}

/// Serializes and compresses `chunk` at `level` (0-9).
///
/// # Errors
///
/// [`StoreError::PayloadTooLarge`] if the payload exceeds
/// [`MAX_RAW_CHUNK_BYTES`], which [`decode`] would refuse;
/// [`StoreError::Compression`] if the encoder fails, or serialization errors.
pub fn encode(chunk: &ChunkColumn, level: u32) -> StoreResult<EncodedChunk> {
    let raw = serialize(chunk)?;
    if raw.len() > MAX_RAW_CHUNK_BYTES {
        return Err(StoreError::PayloadTooLarge {
            size: raw.len(),
            limit: MAX_RAW_CHUNK_BYTES,
        });
    }
    let raw_len = u32::try_from(raw.len())
        .map_err(|_| StoreError::CorruptPayload(format!("payload of {} bytes", raw.len())))?;

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 4), Compression::new(level));
    encoder
        .write_all(&raw)
        .map_err(|e| StoreError::Compression(format!("deflate failed: {e}")))?;
    let bytes = encoder
        .finish()
        .map_err(|e| StoreError::Compression(format!("deflate finish failed: {e}")))?;

    Ok(EncodedChunk { bytes, raw_len })
}

/// Decompresses and parses a chunk whose payload was `raw_len` bytes.
///
/// # Errors
///
/// [`StoreError::Compression`] if inflation fails or yields a different
/// length; [`StoreError::CorruptPayload`] if `raw_len` is implausible.
pub fn decode(compressed: &[u8], raw_len: u32) -> StoreResult<ChunkColumn> {
    let raw_len = raw_len as usize;
    if raw_len > MAX_RAW_CHUNK_BYTES {
        return Err(StoreError::CorruptPayload(format!(
            "uncompressed length {raw_len} exceeds {MAX_RAW_CHUNK_BYTES}"
        )));
    }

    let mut raw = Vec::with_capacity(raw_len);
    // One byte of slack to detect payloads longer than recorded
    ZlibDecoder::new(compressed)
        .take(raw_len as u64 + 1)
        .read_to_end(&mut raw)
        .map_err(|e| StoreError::Compression(format!("inflate failed: {e}")))?;

    if raw.len() != raw_len {
        return Err(StoreError::Compression(format!(
            "inflated {} bytes, record says {raw_len}",
            raw.len()
        )));
    }

    deserialize(&raw)
}
