//! Error types for particle-morph.
//!
//! GPU setup, shader compilation, mesh loading and configuration each get
//! their own enum; [`AppError`] wraps them for the binary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during GPU initialization and readback.
#[derive(Debug, Error)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    #[error("failed to create GPU surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    /// The adapter cannot bind every particle channel in one compute stage.
    #[error("adapter supports {available} storage buffers per shader stage, {required} are required")]
    InsufficientLimits { required: u32, available: u32 },
    #[error("no headless backend produced a usable device")]
    NoHeadlessCandidate,
    /// Failed to create GPU device.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),
    /// The surface reported no usable texture format.
    #[error("surface is not compatible with the selected adapter")]
    IncompatibleSurface,
    /// Particle buffers need at least one particle.
    #[error("cannot create particle buffers for zero particles")]
    EmptyParticleSet,
    /// Failed to map buffer for reading.
    #[error("failed to map GPU buffer: {0}")]
    BufferMapping(String),
}

/// Errors raised while turning WGSL into a runnable program.
#[derive(Debug, Error)]
pub enum ShaderError {
    /// The source failed to parse or validate; carries the compiler diagnostic.
    #[error("{label}: shader compilation failed:\n{diagnostic}")]
    Compile { label: String, diagnostic: String },
    /// The pipeline could not be created from the module; carries the driver diagnostic.
    #[error("{label}: program link failed:\n{diagnostic}")]
    Link { label: String, diagnostic: String },
}

/// Errors raised by the mesh collaborator.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Failed to read the mesh file from disk.
    #[error("failed to read mesh {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A vertex record could not be parsed.
    #[error("line {line}: malformed vertex record `{record}`")]
    Parse { line: usize, record: String },
    /// The loader thread went away before reporting a result.
    #[error("mesh loader stopped before reporting a result")]
    Disconnected,
}

/// Errors raised while loading or validating [`Params`](crate::params::Params).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not valid JSON for [`Params`](crate::params::Params).
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    /// A numeric option is outside its accepted range.
    #[error("`{field}` must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
}

/// Errors that can occur when running the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Failed to create or run the event loop.
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    /// Failed to create the window.
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    /// GPU initialization failed.
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
    /// A shader program could not be built.
    #[error(transparent)]
    Shader(#[from] ShaderError),
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
