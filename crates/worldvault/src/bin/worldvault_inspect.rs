//! # World Inspector
//!
//! Command-line tool to look inside a world file without modifying it.

use worldvault::{StoreConfig, WorldStore};

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         WORLDVAULT INSPECTOR                                     ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        println!("Usage: worldvault_inspect <world_file.wvt>");
        println!();
        println!("Options:");
        println!("  --chunk <x> <z>   Probe one chunk");
        println!("  --config <file>   Store settings (TOML)");
        return;
    }

    let world_path = &args[1];
    let chunk_probe: Option<(i32, i32)> = args
        .iter()
        .position(|a| a == "--chunk")
        .and_then(|i| Some((args.get(i + 1)?.parse().ok()?, args.get(i + 2)?.parse().ok()?)));
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1));

    if !WorldStore::claims(world_path) {
        println!("Error: {world_path} is not a world file");
        return;
    }

    let mut config = match config_path {
        Some(path) => match StoreConfig::from_toml_file(path) {
            Ok(c) => c,
            Err(e) => {
                println!("Error: Could not load config: {e}");
                return;
            }
        },
        None => StoreConfig::default(),
    };
    config.create_if_missing = false;

    let mut store = WorldStore::new(world_path, config);
    if let Err(e) = store.open() {
        println!("Error: Could not open world: {e}");
        return;
    }

    let info = match store.load_info() {
        Ok(info) => info,
        Err(e) => {
            println!("Error: Could not read header: {e}");
            return;
        }
    };

    println!("┌─ WORLD INFO ─────────────────────────────────────────────────────┐");
    println!("│ Size:               {} x {}", info.width, info.depth);
    println!(
        "│ Spawn:              ({:.2}, {:.2}, {:.2}) yaw {:.1} pitch {:.1}",
        info.spawn.x, info.spawn.y, info.spawn.z, info.spawn.yaw, info.spawn.pitch
    );
    println!("│ Generator:          {} (seed {})", info.generator, info.seed);
    println!("│ World Type:         {:?}", info.world_type);
    println!("│ Chunks:             {}", info.chunk_count);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    println!("┌─ LAYERS ─────────────────────────────────────────────────────────┐");
    match store.layer_names() {
        Ok(names) if names.is_empty() => println!("│ (none)"),
        Ok(names) => {
            for name in names {
                let size = store.load_layer(&name).ok().flatten().map_or(0, |b| b.len());
                println!("│  - {name:<32} {size} bytes");
            }
        }
        Err(e) => println!("│ Error: {e}"),
    }
    match store.load_security() {
        Ok(Some(security)) => println!(
            "│ Security:           {} owners, {} members, build \"{}\"",
            security.owners.len(),
            security.members.len(),
            security.build_perms
        ),
        Ok(None) => {}
        Err(e) => println!("│ Security:           unreadable ({e})"),
    }
    match store.load_portals() {
        Ok(Some(list)) => {
            for p in &list.portals {
                println!("│ Portal {:<12} -> {}", p.name, p.destination);
            }
        }
        Ok(None) => {}
        Err(e) => println!("│ Portals:            unreadable ({e})"),
    }
    println!("└──────────────────────────────────────────────────────────────────┘");

    if let Some((x, z)) = chunk_probe {
        println!();
        println!("┌─ CHUNK ({x}, {z}) ──────────────────────────────────────────────");
        match store.load_chunk(x, z) {
            Ok(Some(chunk)) => {
                let subslices: Vec<usize> = chunk.subslices().map(|(i, _)| i).collect();
                let solid: usize = chunk
                    .subslices()
                    .map(|(_, s)| 4096 - usize::from(s.air_count()))
                    .sum();
                println!("│ Subslices:          {subslices:?}");
                println!("│ Solid Voxels:       {solid}");
                println!("│ Signs:              {}", chunk.sign_count());
                println!("│ Flags:              {:#04x}", chunk.flags);
            }
            Ok(None) => println!("│ Not present"),
            Err(e) => println!("│ Error: {e}"),
        }
        println!("└──────────────────────────────────────────────────────────────────┘");
    }

    if let Err(e) = store.close() {
        println!("Error: Close failed: {e}");
    }
}
