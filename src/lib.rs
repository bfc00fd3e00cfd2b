//! # particle-morph
//!
//! A GPU particle swarm. Particles live in two generations of per-channel
//! buffers; each frame a compute pass advances the current generation into
//! the other one and an instanced billboard pass draws the result.
//!
//! Particles fall from an emission point as a fountain, can be pulled toward
//! or pushed away from a clicked point, and can morph onto the vertices of one
//! of two meshes.
//!
//! ## Headless use
//!
//! ```ignore
//! use particle_morph::gpu::{request_headless, ParticleSystem};
//! use particle_morph::params::Params;
//!
//! let (_adapter, device, queue) = pollster::block_on(request_headless())?;
//! let mut system = pollster::block_on(ParticleSystem::new(
//!     &device,
//!     wgpu::TextureFormat::Rgba8Unorm,
//!     10_000,
//! ))?;
//! system.apply_params(&Params::default());
//!
//! let mut encoder = device.create_command_encoder(&Default::default());
//! system.step(&queue, &mut encoder);
//! queue.submit(Some(encoder.finish()));
//! ```

pub mod error;
pub mod gpu;
pub mod input;
pub mod mesh;
pub mod params;
pub mod particles;
pub mod shader;
pub mod time;
pub mod window;

pub use error::{AppError, ConfigError, GpuError, MeshError, ShaderError};
pub use glam::{Vec2, Vec3};
pub use gpu::{Camera, ParticleSystem};
pub use params::{MeshSelect, Params};
pub use particles::{Channel, ParticleData};
