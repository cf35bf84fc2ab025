use criterion::{criterion_group, criterion_main, Criterion, black_box};

use voxsync::core::{IVec3, SyncConfig};
use voxsync::engine::memory::cube_mesh;
use voxsync::engine::{MemoryEngine, NodeHandle};
use voxsync::sync::{reconcile, MirrorTree, ReconcileOptions, Volume};
use voxsync::voxel::{Channel, ColoredCubesVertex, QuantizedColor};

fn unit_mesh(_: IVec3) -> (Vec<ColoredCubesVertex>, Vec<u32>) {
    cube_mesh(1.0, QuantizedColor::WHITE)
}

fn octree(depth: u32) -> (MemoryEngine, voxsync::engine::VolumeHandle, Vec<NodeHandle>) {
    let mut engine = MemoryEngine::new();
    let data = engine.create_volume();
    let nodes = engine
        .build_octree(data, depth, 8, unit_mesh)
        .expect("octree build failed");
    (engine, data, nodes)
}

fn bench_color_encode(c: &mut Criterion) {
    c.bench_function("color_encode_4096", |b| {
        b.iter(|| {
            let mut acc = 0u16;
            for i in 0..4096u32 {
                let v = (i & 0xFF) as u8;
                let color =
                    QuantizedColor::new(black_box(v), v.wrapping_add(1), v.wrapping_add(2), 255);
                acc ^= color.bits();
            }
            acc
        });
    });
}

fn bench_color_decode(c: &mut Criterion) {
    let colors: Vec<QuantizedColor> = (0..4096u32)
        .map(|i| QuantizedColor::from_bits(i as u16))
        .collect();

    c.bench_function("color_decode_4096", |b| {
        b.iter(|| {
            let mut acc = 0u32;
            for color in black_box(&colors) {
                for channel in Channel::ALL {
                    acc += color.get(channel) as u32;
                }
            }
            acc
        });
    });
}

fn bench_reconcile_full_build(c: &mut Criterion) {
    let (engine, _, nodes) = octree(3);
    let root = nodes[0];

    c.bench_function("reconcile_full_build_depth3", |b| {
        b.iter(|| {
            let mut tree: MirrorTree<ColoredCubesVertex> = MirrorTree::new();
            tree.create_root(root, IVec3::ZERO);
            let options = ReconcileOptions::with_budget(usize::MAX);
            reconcile(&mut tree, black_box(&engine), &options).expect("reconcile failed")
        });
    });
}

fn bench_reconcile_steady_state(c: &mut Criterion) {
    let (engine, data, _) = octree(3);
    let mut volume = Volume::new(&engine, Some(data), SyncConfig::with_budget(usize::MAX))
        .expect("engine rejected");
    volume.tick(&engine).expect("tick failed");

    c.bench_function("tick_steady_state_depth3", |b| {
        b.iter(|| volume.tick(black_box(&engine)).expect("tick failed"));
    });
}

fn bench_tick_budgeted_edits(c: &mut Criterion) {
    let (mut engine, data, nodes) = octree(3);
    let mut volume = Volume::new(&engine, Some(data), SyncConfig::with_budget(4))
        .expect("engine rejected");
    while !volume.is_synchronized() {
        volume.tick(&engine).expect("tick failed");
    }

    c.bench_function("tick_budget4_after_edit", |b| {
        let mut next = 0usize;
        b.iter(|| {
            engine.touch(nodes[next % nodes.len()]).expect("touch failed");
            next += 7;
            volume.tick(black_box(&engine)).expect("tick failed")
        });
    });
}

criterion_group!(
    benches,
    bench_color_encode,
    bench_color_decode,
    bench_reconcile_full_build,
    bench_reconcile_steady_state,
    bench_tick_budgeted_edits,
);
criterion_main!(benches);
