//! GPU integration tests.
//!
//! Every test here needs an adapter. A software adapter is used when no
//! hardware one is available; on machines with neither they print a line
//! and return early.

use glam::{Vec2, Vec3};
use particle_morph::gpu::program::{ProgramSource, ShaderProgram};
use particle_morph::gpu::{request_headless, Camera, ChannelView, ParticleSystem};
use particle_morph::input::AttractMode;
use particle_morph::{Channel, MeshSelect, Params, ShaderError};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn gpu() -> Option<(wgpu::Device, wgpu::Queue)> {
    match pollster::block_on(request_headless()) {
        Ok((adapter, device, queue)) => {
            let info = adapter.get_info();
            eprintln!("GPU test on {} ({:?})", info.name, info.device_type);
            Some((device, queue))
        }
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

fn system(device: &wgpu::Device, count: usize, params: &Params) -> ParticleSystem {
    let mut system = pollster::block_on(ParticleSystem::new(device, FORMAT, count)).unwrap();
    system.apply_params(params);
    system
}

fn step(system: &mut ParticleSystem, device: &wgpu::Device, queue: &wgpu::Queue) {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    system.step(queue, &mut encoder);
    queue.submit(Some(encoder.finish()));
}

fn read(system: &ParticleSystem, device: &wgpu::Device, queue: &wgpu::Queue, g: usize, channel: Channel) -> Vec<f32> {
    system.buffers.read_channel(device, queue, g, channel).unwrap()
}

fn vec3s(values: &[f32]) -> Vec<Vec3> {
    values.chunks_exact(3).map(Vec3::from_slice).collect()
}

// ============================================================================
// Simulation
// ============================================================================

#[test]
fn test_gravity_pulls_velocity_down() {
    let Some((device, queue)) = gpu() else { return };
    let mut system = system(&device, 1000, &Params::default());

    let before = vec3s(&read(&system, &device, &queue, 0, Channel::Velocity));
    step(&mut system, &device, &queue);
    assert_eq!(system.ctx.generation().current(), 1);

    let after = vec3s(&read(&system, &device, &queue, 1, Channel::Velocity));
    assert_eq!(after.len(), 1000);
    for (i, (old, new)) in before.iter().zip(&after).enumerate() {
        assert!(new.y < old.y, "particle {i}: {} !< {}", new.y, old.y);
    }
}

#[test]
fn test_source_generation_untouched() {
    let Some((device, queue)) = gpu() else { return };
    let mut system = system(&device, 256, &Params::default());

    let initial = read(&system, &device, &queue, 0, Channel::Position);
    step(&mut system, &device, &queue);

    assert_eq!(read(&system, &device, &queue, 0, Channel::Position), initial);
    assert_ne!(read(&system, &device, &queue, 1, Channel::Position), initial);
}

#[test]
fn test_generations_alternate() {
    let Some((device, queue)) = gpu() else { return };
    let mut system = system(&device, 64, &Params::default());

    for frame in 1..=7u64 {
        step(&mut system, &device, &queue);
        assert_eq!(system.ctx.frames(), frame);
        assert_eq!(system.ctx.generation().current() as u64, frame % 2);
    }
}

#[test]
fn test_ids_survive_simulation() {
    let Some((device, queue)) = gpu() else { return };
    let mut system = system(&device, 5000, &Params::default());

    for _ in 0..5 {
        step(&mut system, &device, &queue);
    }

    let expected: Vec<f32> = (0..5000).map(|i| i as f32).collect();
    for g in 0..2 {
        assert_eq!(read(&system, &device, &queue, g, Channel::Id), expected);
    }
}

#[test]
fn test_channel_buffers_accept_both_views() {
    let Some((device, _queue)) = gpu() else { return };
    let system = system(&device, 16, &Params::default());

    for g in 0..2 {
        for channel in Channel::ALL {
            let Some(buffer) = system.buffers.channel_buffer(g, channel) else {
                continue;
            };
            assert!(ChannelView::Simulation.accepts(buffer), "{channel:?}");
            assert!(ChannelView::Render.accepts(buffer), "{channel:?}");
        }
    }
}

#[test]
fn test_partial_workgroup_is_simulated() {
    let Some((device, queue)) = gpu() else { return };
    let mut system = system(&device, 65, &Params::default());

    step(&mut system, &device, &queue);

    let times = read(&system, &device, &queue, 1, Channel::Time);
    assert_eq!(times.len(), 130);
    assert!(times.chunks_exact(2).all(|t| t[0] > 0.0));
}

// ============================================================================
// Pointer and mesh forces
// ============================================================================

#[test]
fn test_attract_pulls_toward_click() {
    let Some((device, queue)) = gpu() else { return };
    let mut system = system(&device, 512, &Params::default());
    let camera = Camera::default();

    system.set_attract(AttractMode::Attract, Vec2::new(1.0, 0.0), &camera);
    step(&mut system, &device, &queue);

    let velocities = vec3s(&read(&system, &device, &queue, 1, Channel::Velocity));
    assert!(velocities.iter().all(|v| v.x > 0.0));
}

#[test]
fn test_repel_pushes_away_from_click() {
    let Some((device, queue)) = gpu() else { return };
    let mut system = system(&device, 512, &Params::default());
    let camera = Camera::default();

    system.set_attract(AttractMode::Repel, Vec2::new(1.0, 0.0), &camera);
    step(&mut system, &device, &queue);

    let velocities = vec3s(&read(&system, &device, &queue, 1, Channel::Velocity));
    assert!(velocities.iter().all(|v| v.x < 0.0));
}

#[test]
fn test_mesh_targets_attract_covered_particles() {
    let Some((device, queue)) = gpu() else { return };
    let params = Params {
        mesh: MeshSelect::MeshA,
        ..Params::default()
    };
    let mut system = system(&device, 100, &params);

    let mesh_a: Vec<Vec3> = (0..10).map(|i| Vec3::new(i as f32 * 0.1, -1.0, 0.5)).collect();
    let mesh_b = vec![Vec3::ONE; 100];
    system.set_mesh_attract_targets(&device, &mesh_a, &mesh_b);
    system.apply_params(&params);

    step(&mut system, &device, &queue);
    let start = vec3s(&read(&system, &device, &queue, 0, Channel::Position));
    let moved = vec3s(&read(&system, &device, &queue, 1, Channel::Position));

    for i in 0..10 {
        let before = start[i].distance(mesh_a[i]);
        let after = moved[i].distance(mesh_a[i]);
        assert!(after < before, "particle {i} did not approach its target");
    }

    let targets = vec3s(&read(&system, &device, &queue, 1, Channel::MeshTarget1));
    assert_eq!(&targets[..10], &mesh_a[..]);
    assert!(targets[10..].iter().all(|t| *t == Vec3::ZERO));
}

#[test]
fn test_unconfigured_targets_read_as_zero() {
    let Some((device, queue)) = gpu() else { return };
    let system = system(&device, 32, &Params::default());

    assert!(!system.buffers.is_mesh_configured());
    let targets = read(&system, &device, &queue, 0, Channel::MeshTarget2);
    assert_eq!(targets, vec![0.0; 96]);
}

// ============================================================================
// Rendering and programs
// ============================================================================

#[test]
fn test_frame_renders_without_validation_errors() {
    let Some((device, queue)) = gpu() else { return };
    let mut system = system(&device, 2048, &Params::default());
    system.set_camera(&Camera::default());
    system.set_time(16.0);

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Target"),
        size: wgpu::Extent3d {
            width: 64,
            height: 64,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    for _ in 0..3 {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        system.frame(&queue, &mut encoder, &view);
        queue.submit(Some(encoder.finish()));
    }
    let error = pollster::block_on(device.pop_error_scope());
    assert!(error.is_none(), "{error:?}");

    assert_eq!(
        system.renderer.instanced_channels(),
        &[Channel::Position, Channel::Color]
    );
    assert_eq!(system.ctx.frames(), 3);
    assert_eq!(system.ctx.generation().current(), 1);
}

#[test]
fn test_pipeline_failure_is_link_error() {
    let Some((device, _queue)) = gpu() else { return };

    let source = ProgramSource::compile(
        "Unbound",
        "@group(1) @binding(0) var<storage, read> data: array<f32>;\n\
         @compute @workgroup_size(1) fn main() { _ = data[0]; }",
    )
    .unwrap();

    let result = pollster::block_on(ShaderProgram::compute(&device, source, "main", &[]));
    match result {
        Err(ShaderError::Link { label, diagnostic }) => {
            assert_eq!(label, "Unbound");
            assert!(!diagnostic.is_empty());
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("pipeline with a missing bind group was accepted"),
    }
}
