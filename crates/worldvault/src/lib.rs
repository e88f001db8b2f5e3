//! # WORLDVAULT World Storage
//!
//! Persistent storage for voxel worlds: sparse, unbounded chunk
//! coordinates mapped to compressed chunk payloads through a hashed
//! on-disk directory, plus a small store of named metadata blobs.
//!
//! ## Design Principles
//!
//! 1. **Pages, not offsets** - Every structure lives at a 4 KiB page number
//! 2. **Append-only growth** - New pages go at end-of-file; nothing is freed
//! 3. **Ordered publication** - A child page is durable before its parent slot names it
//! 4. **Fail closed** - A foreign, newer or damaged file never opens
//!
//! ## Thread Safety
//!
//! A [`WorldStore`] has a single owner. Use [`SharedWorldStore`] to call it
//! from several threads.
//!
//! ## Example
//!
//! ```rust,ignore
//! use worldvault::{ChunkColumn, StoreConfig, WorldStore};
//!
//! let mut store = WorldStore::new("worlds/main.wvt", StoreConfig::default());
//! store.open()?;
//!
//! let mut chunk = ChunkColumn::new();
//! chunk.set_block_id(0, 64, 0, 1);
//! store.save_chunk(&chunk, 3, -5)?;
//!
//! assert!(store.load_chunk(3, -4)?.is_none());
//! store.close()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod chunk;
pub mod chunk_codec;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod format;
pub mod layer;
pub mod page;
pub mod provider;
pub mod sector;
pub mod world;

pub use chunk::{ChunkColumn, ChunkCoord, Sign, Subslice};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use provider::{SharedWorldStore, WorldStore};
pub use world::{Portal, PortalList, Pose, SecurityRecord, WorldInfo, WorldType};
