//! Mesh sync simulator - drives volumes against the in-memory engine.
//!
//! Usage: cargo run --release --bin simulate_sync -- [OPTIONS]
//!
//! Options:
//!   --budget <N>      Mesh refreshes per tick (default: from config, else 4)
//!   --depth <D>       Octree depth per volume (default: 3)
//!   --volumes <N>     Number of volumes (default: 1)
//!   --edits <N>       Nodes touched after the initial sync (default: 32)
//!   --layer <L>       Placement marker applied after the edits (default: unchanged)
//!   --config <PATH>   Load sync settings from a JSON file
//!   --save-config <PATH>  Write the effective settings to a JSON file

use std::path::PathBuf;
use std::time::Instant;

use voxsync::core::{IVec3, SyncConfig};
use voxsync::engine::memory::cube_mesh;
use voxsync::engine::{MemoryEngine, NodeHandle};
use voxsync::sync::{SyncEvent, VolumeRegistry};
use voxsync::voxel::{ColoredCubesVertex, QuantizedColor};

/// Ticks allowed before the simulation gives up on converging.
const MAX_TICKS: usize = 100_000;

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let depth = parse_u32_arg(&args, "--depth").unwrap_or(3);
    let volume_count = parse_usize_arg(&args, "--volumes").unwrap_or(1);
    let edits = parse_usize_arg(&args, "--edits").unwrap_or(32);
    let layer = parse_u32_arg(&args, "--layer");

    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => match SyncConfig::load(&PathBuf::from(&path)) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Failed to load config {}: {}", path, err);
                std::process::exit(1);
            }
        },
        None => SyncConfig::default(),
    };
    if let Some(budget) = parse_usize_arg(&args, "--budget") {
        config.max_nodes_per_sync = budget;
    }

    if let Some(path) = parse_str_arg(&args, "--save-config") {
        if let Err(err) = config.save(&PathBuf::from(&path)) {
            eprintln!("Failed to save config {}: {}", path, err);
            std::process::exit(1);
        }
        println!("Saved config to {}", path);
    }

    println!("=== Mesh Sync Simulator ===");
    println!("Volumes: {}", volume_count);
    println!("Depth:   {} ({} nodes per volume)", depth, octree_node_count(depth));
    println!("Budget:  {} refreshes per tick", config.max_nodes_per_sync);
    println!("Edits:   {}", edits);
    println!();

    let mut engine = MemoryEngine::new();
    let mut registry = VolumeRegistry::new();
    let mut trees: Vec<Vec<NodeHandle>> = Vec::with_capacity(volume_count);

    for _ in 0..volume_count {
        let data = engine.create_volume();
        let nodes = match engine.build_octree(data, depth, 16, colored_cube) {
            Ok(nodes) => nodes,
            Err(err) => {
                eprintln!("Failed to build octree: {}", err);
                std::process::exit(1);
            }
        };
        trees.push(nodes);

        let id = match registry.create(&engine, Some(data), config.clone()) {
            Ok(id) => id,
            Err(err) => {
                eprintln!("Failed to create volume: {}", err);
                std::process::exit(1);
            }
        };
        if let Some(volume) = registry.get_mut(id) {
            volume.on_sync_event(move |event| match event {
                SyncEvent::Complete => log::info!("{:?}: mesh sync complete", id),
                SyncEvent::Lost => log::info!("{:?}: mesh sync lost", id),
            });
        }
    }

    // Phase 1: initial synchronization
    let ticks = run_until_synchronized(&mut registry, &engine, "initial sync");

    // Phase 2: edit scattered nodes and resynchronize
    let mut touched = 0;
    for nodes in &trees {
        for handle in scattered(nodes, edits) {
            if engine.touch(handle).is_ok() {
                touched += 1;
            }
        }
    }
    println!("Touched {} nodes", touched);

    if let Some(layer) = layer {
        let ids: Vec<_> = registry.iter().map(|(id, _)| id).collect();
        for id in ids {
            if let Some(volume) = registry.get_mut(id) {
                volume.set_layer(layer);
            }
        }
        println!("Moved volumes to layer {}", layer);
    }

    let edit_ticks = run_until_synchronized(&mut registry, &engine, "resync after edits");

    println!();
    println!("=== Done ===");
    println!("Initial sync:  {} ticks", ticks);
    println!("Edit resync:   {} ticks", edit_ticks);
    println!("Engine calls:  {}", engine.call_count());
}

/// Tick until every volume is synchronized, printing progress.
fn run_until_synchronized(
    registry: &mut VolumeRegistry<ColoredCubesVertex>,
    engine: &MemoryEngine,
    phase: &str,
) -> usize {
    let start = Instant::now();
    let mut refreshed = 0;

    for tick in 1..=MAX_TICKS {
        let summary = registry.tick_all(engine);
        refreshed += summary.refreshed;

        if !summary.is_clean() {
            eprintln!("{}: {} volumes failed on tick {}", phase, summary.failures.len(), tick);
            std::process::exit(1);
        }

        if tick % 100 == 0 {
            println!(
                "  [{}] tick {}: {} refreshed, {}/{} synchronized",
                phase,
                tick,
                refreshed,
                summary.synchronized,
                registry.len()
            );
        }

        if registry.all_synchronized() {
            println!(
                "{}: {} ticks, {} meshes refreshed in {:.2}ms",
                phase,
                tick,
                refreshed,
                start.elapsed().as_secs_f64() * 1000.0
            );
            return tick;
        }
    }

    eprintln!("{}: did not converge within {} ticks", phase, MAX_TICKS);
    std::process::exit(1);
}

fn colored_cube(position: IVec3) -> (Vec<ColoredCubesVertex>, Vec<u32>) {
    let color = QuantizedColor::from_rgba_f32([
        (position.x & 0xFF) as f32 / 255.0,
        (position.y & 0xFF) as f32 / 255.0,
        (position.z & 0xFF) as f32 / 255.0,
        1.0,
    ]);
    cube_mesh(16.0, color)
}

/// Pick up to `count` nodes spread evenly through the tree.
fn scattered(nodes: &[NodeHandle], count: usize) -> Vec<NodeHandle> {
    if nodes.is_empty() || count == 0 {
        return Vec::new();
    }
    let step = (nodes.len() / count.min(nodes.len())).max(1);
    nodes.iter().step_by(step).take(count).copied().collect()
}

fn octree_node_count(depth: u32) -> usize {
    (0..=depth).map(|level| 8usize.pow(level)).sum()
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.clone())
}
