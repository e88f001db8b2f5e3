//! Benchmark for chunk encode/decode and store round trips.
//!
//! Run with: cargo bench --package worldvault --bench chunk_codec_benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use worldvault::chunk_codec;
use worldvault::{ChunkColumn, StoreConfig, WorldStore};

/// Terrain-like column: stone up to y=60, grass on top, sky light above.
fn terrain_column() -> ChunkColumn {
    let mut chunk = ChunkColumn::new();
    for x in 0..16 {
        for z in 0..16 {
            for y in 0..60 {
                chunk.set_block_id(x, y, z, 1);
            }
            chunk.set_block_id(x, 60, z, 2);
        }
    }
    for index in 0..4 {
        let s = chunk.subslice_mut(index);
        for y in 0..16 {
            s.set_sky_light(0, y, 0, 15);
        }
    }
    chunk
}

fn benchmark_codec(c: &mut Criterion) {
    let chunk = terrain_column();
    let raw_len = chunk_codec::serialize(&chunk).map_or(0, |raw| raw.len() as u64);

    let mut group = c.benchmark_group("chunk_codec");
    group.throughput(Throughput::Bytes(raw_len));

    for level in [1u32, 6, 9] {
        group.bench_function(format!("encode_level_{level}"), |b| {
            b.iter(|| black_box(chunk_codec::encode(black_box(&chunk), level)));
        });
    }

    if let Ok(encoded) = chunk_codec::encode(&chunk, 9) {
        group.bench_function("decode", |b| {
            b.iter(|| black_box(chunk_codec::decode(black_box(&encoded.bytes), encoded.raw_len)));
        });
    }

    group.finish();
}

fn benchmark_store(c: &mut Criterion) {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let path = std::env::temp_dir().join(format!("bench_world_{id}.wvt"));
    let config = StoreConfig {
        sync_writes: false,
        ..StoreConfig::default()
    };
    let mut store = WorldStore::new(&path, config);
    if store.open().is_err() {
        return;
    }
    let chunk = terrain_column();

    let mut group = c.benchmark_group("world_store");
    group.throughput(Throughput::Elements(1));

    group.bench_function("save_new_chunk", |b| {
        let mut x = 0i32;
        b.iter(|| {
            x = x.wrapping_add(1);
            black_box(store.save_chunk(&chunk, x, x / 7))
        });
    });

    group.bench_function("load_chunk", |b| {
        let mut x = 0i32;
        b.iter(|| {
            x = x % 1000 + 1;
            black_box(store.load_chunk(x, x / 7))
        });
    });

    group.finish();
    drop(store);
    std::fs::remove_file(&path).ok();
}

criterion_group!(benches, benchmark_codec, benchmark_store);
criterion_main!(benches);
