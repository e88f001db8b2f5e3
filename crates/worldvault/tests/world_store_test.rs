//! Integration tests for the world store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use worldvault::format::{FIRST_DATA_PAGE, PAGE_SIZE};
use worldvault::{
    ChunkColumn, Portal, PortalList, Pose, SecurityRecord, Sign, StoreConfig, StoreError, WorldInfo,
    WorldStore, WorldType,
};

fn temp_world_path() -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("test_world_{id}.wvt"))
}

fn config() -> StoreConfig {
    StoreConfig {
        sync_writes: false,
        node_cache_capacity: 64,
        ..StoreConfig::default()
    }
}

fn open_store(path: &Path) -> WorldStore {
    let mut store = WorldStore::new(path, config());
    store.open().unwrap();
    store
}

/// A chunk whose content depends on `seed`, with a few populated subslices.
fn terrain_chunk(seed: u16) -> ChunkColumn {
    let mut chunk = ChunkColumn::new();
    chunk.flags = 0x03;
    for x in 0..16 {
        for z in 0..16 {
            let height = 60 + (x + z + usize::from(seed)) % 8;
            for y in 0..height {
                let id = if y + 1 == height { 2 } else { 1 + seed % 3 };
                chunk.set_block_id(x, y, z, id);
            }
        }
    }
    chunk.subslice_mut(3).set_sky_light(4, 5, 6, 15);
    chunk.biomes[17] = 4;
    chunk.put_sign(Sign::new(
        3,
        70,
        -5,
        ["Town".to_string(), "Hall".to_string(), String::new(), String::new()],
    ));
    chunk
}

/// A chunk full of poorly compressible ids, spanning many sectors.
fn noisy_chunk(subslices: usize) -> ChunkColumn {
    let mut chunk = ChunkColumn::new();
    let mut state: u32 = 0x9E37_79B9;
    for index in 0..subslices {
        let s = chunk.subslice_mut(index);
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    s.set_id(x, y, z, (state & 0x0FFF) as u16 | 1);
                    s.set_meta(x, y, z, (state >> 12) as u8 & 0x0F);
                }
            }
        }
    }
    chunk
}

#[test]
fn test_info_round_trip_on_empty_target() {
    let path = temp_world_path();
    let mut store = open_store(&path);

    let info = WorldInfo {
        width: 64,
        depth: 64,
        seed: 42,
        generator: "plains".to_string(),
        ..WorldInfo::default()
    };
    store.save_info(&info).unwrap();
    assert_eq!(store.load_info().unwrap(), info);

    drop(store);
    fs::remove_file(&path).ok();
}

#[test]
fn test_chunk_save_load_and_absent_neighbour() {
    let path = temp_world_path();
    let mut store = open_store(&path);

    let chunk = terrain_chunk(1);
    store.save_chunk(&chunk, 3, -5).unwrap();

    let loaded = store.load_chunk(3, -5).unwrap().expect("chunk was saved");
    assert_eq!(loaded, chunk);
    assert!(store.load_chunk(3, -4).unwrap().is_none());
    assert!(store.chunk_exists(3, -5).unwrap());
    assert!(!store.chunk_exists(3, -4).unwrap());

    drop(store);
    fs::remove_file(&path).ok();
}

#[test]
fn test_global_slot_collisions_stay_independent() {
    let path = temp_world_path();
    let mut store = open_store(&path);

    // Macro ids 64 apart share a Global slot
    let colliding = [
        (3, 5),
        (3, 5 + 524_288),
        (3, -5),
        (3, -5 - 524_288),
        (524_288, 0),
        (0, 8192),
    ];
    for (i, &(x, z)) in colliding.iter().enumerate() {
        store.save_chunk(&terrain_chunk(i as u16), x, z).unwrap();
    }
    for (i, &(x, z)) in colliding.iter().enumerate() {
        let loaded = store.load_chunk(x, z).unwrap().expect("chunk was saved");
        assert_eq!(loaded, terrain_chunk(i as u16), "chunk ({x}, {z})");
    }
    assert_eq!(store.chunk_count().unwrap(), colliding.len() as u32);

    drop(store);
    fs::remove_file(&path).ok();
}

#[test]
fn test_security_round_trip() {
    let path = temp_world_path();
    let mut store = open_store(&path);

    assert_eq!(store.load_security().unwrap(), None);
    let security = SecurityRecord {
        owners: vec![1, 2, 3],
        build_perms: "@builder".to_string(),
        ..SecurityRecord::default()
    };
    store.save_security(&security).unwrap();

    let loaded = store.load_security().unwrap().expect("security was saved");
    assert_eq!(loaded.owners, vec![1, 2, 3]);
    assert_eq!(loaded.build_perms, "@builder");

    drop(store);
    fs::remove_file(&path).ok();
}

#[test]
fn test_corrupt_magic_fails_closed() {
    let path = temp_world_path();
    {
        let mut store = open_store(&path);
        store.save_chunk(&terrain_chunk(0), 0, 0).unwrap();
        store.close().unwrap();
    }

    let mut bytes = fs::read(&path).unwrap();
    bytes[0..4].copy_from_slice(b"ZZZZ");
    fs::write(&path, &bytes).unwrap();
    assert!(!WorldStore::claims(&path));

    let mut store = WorldStore::new(&path, config());
    assert!(matches!(store.open(), Err(StoreError::FormatMismatch { .. })));
    assert!(!store.is_open());
    assert!(matches!(store.load_chunk(0, 0), Err(StoreError::NotOpen)));
    assert!(matches!(
        store.save_chunk(&terrain_chunk(0), 0, 0),
        Err(StoreError::NotOpen)
    ));

    drop(store);
    fs::remove_file(&path).ok();
}

#[test]
fn test_truncated_file_rejected() {
    let path = temp_world_path();
    fs::write(&path, WorldInfo::default().encode().unwrap()).unwrap();

    let mut store = WorldStore::new(&path, config());
    assert!(matches!(store.open(), Err(StoreError::CorruptDirectory { .. })));

    drop(store);
    fs::remove_file(&path).ok();
}

#[test]
fn test_reopen_preserves_everything() {
    let path = temp_world_path();
    let info = WorldInfo {
        width: 1024,
        depth: 2048,
        spawn: Pose::new(8.5, 71.0, -8.5, 45.0, 10.0),
        generator: "archipelago".to_string(),
        seed: -77,
        world_type: WorldType::Void,
        ..WorldInfo::default()
    };
    let portals = PortalList {
        portals: vec![Portal {
            name: "gate".to_string(),
            min: (0, 64, 0),
            max: (1, 66, 0),
            destination: "spawn".to_string(),
            arrival: Pose::new(0.5, 65.0, 0.5, 0.0, 0.0),
        }],
    };

    {
        let mut store = open_store(&path);
        store.save_info(&info).unwrap();
        for i in 0..10 {
            store.save_chunk(&terrain_chunk(i), i32::from(i) - 5, i32::from(i) * 40).unwrap();
        }
        store.save_portals(&portals).unwrap();
        store.save_layer("plugin.homes", b"alice=1,2,3").unwrap();
        store.close().unwrap();
    }

    let mut store = open_store(&path);
    let loaded = store.load_info().unwrap();
    assert_eq!(loaded.chunk_count, 10);
    assert_eq!(WorldInfo { chunk_count: 0, ..loaded }, info);
    for i in 0..10 {
        let chunk = store.load_chunk(i32::from(i) - 5, i32::from(i) * 40).unwrap();
        assert_eq!(chunk, Some(terrain_chunk(i)));
    }
    assert_eq!(store.load_portals().unwrap(), Some(portals));
    assert_eq!(store.load_layer("plugin.homes").unwrap(), Some(b"alice=1,2,3".to_vec()));
    let mut names = store.layer_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["plugin.homes".to_string(), "portals".to_string()]);

    drop(store);
    fs::remove_file(&path).ok();
}

#[test]
fn test_chunk_grow_then_shrink() {
    let path = temp_world_path();
    let mut store = open_store(&path);

    let small = terrain_chunk(2);
    let big = noisy_chunk(12);
    store.save_chunk(&small, 7, 7).unwrap();
    store.save_chunk(&big, 7, 7).unwrap();
    assert_eq!(store.load_chunk(7, 7).unwrap(), Some(big));

    let pages_after_big = fs::metadata(&path).unwrap().len();
    store.save_chunk(&small, 7, 7).unwrap();
    assert_eq!(store.load_chunk(7, 7).unwrap(), Some(small));

    // Shrinking reuses sectors in place
    assert_eq!(fs::metadata(&path).unwrap().len(), pages_after_big);
    assert_eq!(store.chunk_count().unwrap(), 1);

    drop(store);
    fs::remove_file(&path).ok();
}

#[test]
fn test_oversized_sign_text_rejected_before_writing() {
    let path = temp_world_path();
    let mut store = open_store(&path);
    store.flush().unwrap();
    let len_before = fs::metadata(&path).unwrap().len();

    let long = "a".repeat(16_000);
    let mut chunk = ChunkColumn::new();
    for i in 0..300 {
        chunk.put_sign(Sign::new(
            i % 16,
            (i / 16) as u8,
            0,
            [long.clone(), long.clone(), long.clone(), long.clone()],
        ));
    }

    assert!(matches!(
        store.save_chunk(&chunk, 4, 4),
        Err(StoreError::PayloadTooLarge { .. })
    ));
    assert!(!store.chunk_exists(4, 4).unwrap());
    assert_eq!(store.chunk_count().unwrap(), 0);
    store.flush().unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), len_before);

    // The store stays usable
    store.save_chunk(&terrain_chunk(0), 4, 4).unwrap();
    assert_eq!(store.load_chunk(4, 4).unwrap(), Some(terrain_chunk(0)));

    drop(store);
    fs::remove_file(&path).ok();
}

#[test]
fn test_first_chunk_allocates_directory_path() {
    let path = temp_world_path();
    let mut store = open_store(&path);
    store.save_chunk(&ChunkColumn::new(), 0, 0).unwrap();
    store.flush().unwrap();

    // Macro table (1 page), meso and micro tables (3 pages each), record, one sector
    let pages = fs::metadata(&path).unwrap().len() / PAGE_SIZE as u64;
    assert_eq!(pages, u64::from(FIRST_DATA_PAGE) + 1 + 3 + 3 + 1 + 1);

    drop(store);
    fs::remove_file(&path).ok();
}

#[test]
fn test_shared_store_across_threads() {
    let path = temp_world_path();
    let shared = open_store(&path).into_shared();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&shared);
            thread::spawn(move || {
                for i in 0..8 {
                    store.lock().save_chunk(&terrain_chunk(i), t * 100 + i32::from(i), -t).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut store = shared.lock();
    assert_eq!(store.chunk_count().unwrap(), 32);
    for t in 0..4 {
        for i in 0..8 {
            let chunk = store.load_chunk(t * 100 + i32::from(i), -t).unwrap();
            assert_eq!(chunk, Some(terrain_chunk(i)));
        }
    }
    store.close().unwrap();
    drop(store);

    fs::remove_file(&path).ok();
}
