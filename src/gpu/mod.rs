pub mod camera;
pub mod context;
pub mod particle_buffers;
pub mod program;
pub mod render;
pub mod simulate;

use std::sync::Arc;

use glam::{Vec2, Vec3};
use winit::window::Window;

use crate::error::{AppError, GpuError};
use crate::input::AttractMode;
use crate::params::{MeshSelect, Params};
pub use camera::{Camera, Orbit};
pub use context::{FrameContext, Generation, ProgramId};
pub use particle_buffers::{ChannelView, ParticleBuffers, STORAGE_BUFFERS_PER_STAGE};
pub use program::{attract_world_position, ShaderProgram, Uniform};
pub use render::ParticleRenderer;
pub use simulate::SimulationPass;

/// Gravity-like pull fed to the simulation before gain.
pub const ACCELERATION: Vec3 = Vec3::new(0.0, -1.0, 0.0);

/// Request a device able to bind every particle channel in one compute stage.
pub async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), GpuError> {
    let available = adapter.limits();
    if available.max_storage_buffers_per_shader_stage < STORAGE_BUFFERS_PER_STAGE {
        return Err(GpuError::InsufficientLimits {
            required: STORAGE_BUFFERS_PER_STAGE,
            available: available.max_storage_buffers_per_shader_stage,
        });
    }

    let required_limits = wgpu::Limits {
        max_storage_buffers_per_shader_stage: STORAGE_BUFFERS_PER_STAGE,
        ..wgpu::Limits::downlevel_defaults()
    }
    .using_resolution(available);

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("Device"),
            required_features: wgpu::Features::empty(),
            required_limits,
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        })
        .await?;

    Ok((device, queue))
}

/// Backends tried for a headless device, in order. Hardware first, then a
/// software rasterizer (lavapipe, WARP or llvmpipe) so machines without a GPU
/// can still run the simulation.
pub const HEADLESS_CANDIDATES: [(wgpu::Backends, bool); 3] = [
    (wgpu::Backends::PRIMARY, false),
    (wgpu::Backends::all(), true),
    (wgpu::Backends::GL, false),
];

/// Adapter and device without a window, for tests and tooling.
///
/// Takes the first candidate whose adapter meets the storage buffer limit.
pub async fn request_headless() -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue), GpuError> {
    let mut last_error = None;

    for (backends, force_fallback_adapter) in HEADLESS_CANDIDATES {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
        {
            Ok(adapter) => adapter,
            Err(e) => {
                log::debug!("no headless adapter for {:?} (fallback: {}): {}", backends, force_fallback_adapter, e);
                last_error = Some(GpuError::from(e));
                continue;
            }
        };

        let info = adapter.get_info();
        match request_device(&adapter).await {
            Ok((device, queue)) => {
                log::info!("headless adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
                return Ok((adapter, device, queue));
            }
            Err(e) => {
                log::debug!("rejected headless adapter {}: {}", info.name, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(GpuError::NoHeadlessCandidate))
}


/// Particle buffers plus both passes, independent of any window.
pub struct ParticleSystem {
    pub ctx: FrameContext,
    pub buffers: ParticleBuffers,
    pub simulation: SimulationPass,
    pub renderer: ParticleRenderer,
}

impl ParticleSystem {
    pub async fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        count: usize,
    ) -> Result<Self, AppError> {
        let buffers = ParticleBuffers::create(device, count)?;
        let simulation = SimulationPass::new(device, &buffers).await?;
        let renderer = ParticleRenderer::new(device, format).await?;

        Ok(Self {
            ctx: FrameContext::new(),
            buffers,
            simulation,
            renderer,
        })
    }

    /// Stage every parameter-driven uniform on both programs.
    pub fn apply_params(&mut self, params: &Params) {
        let (filled_a, filled_b) = self.buffers.data().mesh_target_counts();
        let filled = match params.mesh {
            MeshSelect::None => 0,
            MeshSelect::MeshA => filled_a,
            MeshSelect::MeshB => filled_b,
        };
        let mesh_attract_count = params.mesh_attract_count(filled);

        for program in [self.simulation.program_mut(), self.renderer.program_mut()] {
            let uniforms = program.uniforms_mut();
            uniforms.set_acceleration(ACCELERATION);
            uniforms.set_particle_colors(params.color1_linear(), params.color2_linear());
            uniforms.set_color_change_freq(params.color_freq);
            uniforms.set_mesh_select(params.mesh);
            uniforms.set_mesh_attract_count(mesh_attract_count);
            uniforms.set_model_matrix(params.billboard_model());
            uniforms.set_particle_radius(params.particle_radius());
            uniforms.set_breath_rate(params.breath_rate);
        }
    }

    /// Start or stop the pointer force. `ndc` is ignored when turning it off.
    pub fn set_attract(&mut self, mode: AttractMode, ndc: Vec2, camera: &Camera) {
        let uniforms = self.simulation.program_mut().uniforms_mut();
        uniforms.set_attract_mode(mode);
        if mode != AttractMode::Off {
            uniforms.set_attract_pos(ndc, camera);
        }
    }

    pub fn set_camera(&mut self, camera: &Camera) {
        for program in [self.simulation.program_mut(), self.renderer.program_mut()] {
            let uniforms = program.uniforms_mut();
            uniforms.set_view_proj_matrix(camera.view_proj());
            uniforms.set_camera_axes(camera.axes());
        }
    }

    /// Elapsed milliseconds.
    pub fn set_time(&mut self, millis: f32) {
        for program in [self.simulation.program_mut(), self.renderer.program_mut()] {
            program.uniforms_mut().set_time(millis);
        }
    }

    pub fn set_mesh_attract_targets(&mut self, device: &wgpu::Device, mesh_a: &[Vec3], mesh_b: &[Vec3]) {
        self.buffers.set_mesh_attract_targets(device, mesh_a, mesh_b);
    }

    /// Record one simulation step.
    pub fn step(&mut self, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder) {
        self.simulation.encode(&mut self.ctx, queue, &self.buffers, encoder);
    }

    /// Record a full tick: simulate, then draw the new generation into `target`.
    pub fn frame(&mut self, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        self.step(queue, encoder);
        self.renderer.encode(&mut self.ctx, queue, &self.buffers, encoder, target);
    }
}

pub struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: Camera,
    pub system: ParticleSystem,
    orbit: Orbit,
}

impl GpuState {
    pub async fn new(window: Arc<Window>, params: &Params) -> Result<Self, AppError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window).map_err(GpuError::from)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(GpuError::from)?;
        log::info!("adapter: {} ({:?})", adapter.get_info().name, adapter.get_info().backend);

        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(GpuError::IncompatibleSurface)?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .ok_or(GpuError::IncompatibleSurface)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let mut camera = Camera::default();
        camera.set_viewport(config.width, config.height);

        let mut system = ParticleSystem::new(&device, surface_format, params.particle_count as usize).await?;
        system.apply_params(params);
        system.set_camera(&camera);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            camera,
            system,
            orbit: Orbit::default(),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if !self.camera.set_viewport(new_size.width, new_size.height) {
            log::debug!("ignoring zero-sized resize");
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
    }

    pub fn set_attract(&mut self, mode: AttractMode, ndc: Vec2) {
        self.system.set_attract(mode, ndc, &self.camera);
    }

    pub fn set_mesh_attract_targets(&mut self, mesh_a: &[Vec3], mesh_b: &[Vec3], params: &Params) {
        self.system.set_mesh_attract_targets(&self.device, mesh_a, mesh_b);
        self.system.apply_params(params);
    }

    /// Advance the camera (when rotating), simulate one step and present.
    pub fn render(&mut self, millis: f32, rotate: bool) -> Result<(), wgpu::SurfaceError> {
        if rotate {
            self.camera.update(self.orbit.advance());
        }
        self.system.set_camera(&self.camera);
        self.system.set_time(millis);

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        self.system.frame(&self.queue, &mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}
