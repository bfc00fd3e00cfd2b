//! Benchmarks for CPU-side setup work.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{Vec2, Vec3};
use std::fmt::Write as _;

use particle_morph::gpu::program::{attract_world_position, compile, ProgramLayout, UniformBlock};
use particle_morph::gpu::Camera;
use particle_morph::mesh::Mesh;
use particle_morph::shader::{DRAW_SOURCE, SIMULATE_SOURCE};
use particle_morph::ParticleData;

fn bench_particle_data(c: &mut Criterion) {
    let mut group = c.benchmark_group("particle_data");

    for count in [10_000usize, 100_000, 1_000_000] {
        group.bench_with_input(BenchmarkId::new("new", count), &count, |b, &count| {
            b.iter(|| black_box(ParticleData::new(count)))
        });
    }

    let mesh: Vec<Vec3> = (0..50_000).map(|i| Vec3::splat(i as f32 * 1e-3)).collect();
    group.bench_function("set_mesh_attract_targets_100k", |b| {
        let mut data = ParticleData::new(100_000);
        b.iter(|| data.set_mesh_attract_targets(black_box(&mesh), black_box(&mesh)))
    });

    group.finish();
}

fn bench_shaders(c: &mut Criterion) {
    let mut group = c.benchmark_group("shaders");

    group.bench_function("compile_simulate", |b| {
        b.iter(|| black_box(compile("simulate", SIMULATE_SOURCE)))
    });

    group.bench_function("compile_draw", |b| {
        b.iter(|| black_box(compile("draw", DRAW_SOURCE)))
    });

    if let Ok(module) = compile("draw", DRAW_SOURCE) {
        group.bench_function("reflect_draw", |b| {
            b.iter(|| black_box(ProgramLayout::reflect(&module)))
        });

        let layout = ProgramLayout::reflect(&module);
        let camera = Camera::default();
        group.bench_function("stage_draw_uniforms", |b| {
            let mut block = UniformBlock::new(&layout);
            b.iter(|| {
                block.set_view_proj_matrix(camera.view_proj());
                block.set_camera_axes(camera.axes());
                block.set_time(black_box(1234.0));
            })
        });
    }

    group.finish();
}

fn bench_camera(c: &mut Criterion) {
    let mut group = c.benchmark_group("camera");

    group.bench_function("update", |b| {
        let mut camera = Camera::default();
        let mut t = 0.0;
        b.iter(|| {
            t += 1.0;
            camera.update(black_box(t));
        })
    });

    group.bench_function("attract_world_position", |b| {
        let camera = Camera::default();
        b.iter(|| black_box(attract_world_position(black_box(Vec2::new(0.3, -0.4)), &camera)))
    });

    group.finish();
}

fn bench_mesh(c: &mut Criterion) {
    let mut text = String::new();
    for i in 0..20_000 {
        let f = i as f32 * 0.001;
        let _ = writeln!(text, "v {} {} {}", f, -f, f * 0.5);
        let _ = writeln!(text, "vn 0 1 0");
    }

    c.bench_function("parse_obj_20k", |b| {
        b.iter(|| black_box(Mesh::parse_obj(black_box(&text))))
    });
}

criterion_group!(benches, bench_particle_data, bench_shaders, bench_camera, bench_mesh);
criterion_main!(benches);
