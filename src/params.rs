//! Runtime parameters.
//!
//! Everything the user can tune lives in [`Params`]. It is read once from an
//! optional JSON file at startup, validated, and then edited live from the
//! keyboard (see [`Controls`](crate::input::Controls)). Values derived from it
//! (linear colors, billboard scale, particle radius) are computed on demand so
//! they can never drift from the source fields.

use std::ops::RangeInclusive;
use std::path::Path;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const PARTICLE_COUNT_RANGE: RangeInclusive<u32> = 1..=1_000_000;
pub const PARTICLE_SIZE_RANGE: RangeInclusive<f32> = 0.1..=1.2;
pub const COLOR_FREQ_RANGE: RangeInclusive<u32> = 1..=10;
pub const BREATH_RATE_RANGE: RangeInclusive<u32> = 1..=10;

/// Which mesh the particles are drawn toward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshSelect {
    #[default]
    None,
    MeshA,
    MeshB,
}

impl MeshSelect {
    /// Selector value written to the `mesh_select` uniform.
    pub fn index(self) -> i32 {
        match self {
            MeshSelect::None => 0,
            MeshSelect::MeshA => 1,
            MeshSelect::MeshB => 2,
        }
    }

    /// Unknown selectors mean no attraction.
    pub fn from_index(index: i32) -> Self {
        match index {
            1 => MeshSelect::MeshA,
            2 => MeshSelect::MeshB,
            _ => MeshSelect::None,
        }
    }
}

/// A live edit coming from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    ParticleSize(f32),
    /// Signed step in whole units.
    ColorFreq(i32),
    BreathRate(i32),
    Mesh(MeshSelect),
    ToggleRotation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Params {
    /// Fixed for the lifetime of the particle buffers.
    pub particle_count: u32,
    pub particle_size: f32,
    /// Gradient start, 0-255 per channel.
    pub color1: [u8; 3],
    /// Gradient end, 0-255 per channel.
    pub color2: [u8; 3],
    pub color_freq: u32,
    pub breath_rate: u32,
    pub mesh: MeshSelect,
    pub rotate_camera: bool,
    /// OBJ file for mesh A.
    pub mesh_a: Option<String>,
    /// OBJ file for mesh B.
    pub mesh_b: Option<String>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            particle_count: 100_000,
            particle_size: 0.4,
            color1: [255, 102, 255],
            color2: [169, 217, 198],
            color_freq: 1,
            breath_rate: 1,
            mesh: MeshSelect::None,
            rotate_camera: true,
            mesh_a: None,
            mesh_b: None,
        }
    }
}

impl Params {
    /// Read and validate a JSON parameter file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let params = Self::from_json(&text)?;
        log::info!("loaded parameters from {}", path.display());
        Ok(params)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let params: Params = serde_json::from_str(text)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_u32("particle_count", self.particle_count, &PARTICLE_COUNT_RANGE)?;
        check_f32("particle_size", self.particle_size, &PARTICLE_SIZE_RANGE)?;
        check_u32("color_freq", self.color_freq, &COLOR_FREQ_RANGE)?;
        check_u32("breath_rate", self.breath_rate, &BREATH_RATE_RANGE)?;
        Ok(())
    }

    /// Apply a keyboard edit, clamping into the accepted ranges.
    pub fn apply(&mut self, adjustment: Adjustment) {
        match adjustment {
            Adjustment::ParticleSize(delta) => {
                self.particle_size = clamp(self.particle_size + delta, &PARTICLE_SIZE_RANGE);
            }
            Adjustment::ColorFreq(delta) => {
                self.color_freq = step(self.color_freq, delta, &COLOR_FREQ_RANGE);
            }
            Adjustment::BreathRate(delta) => {
                self.breath_rate = step(self.breath_rate, delta, &BREATH_RATE_RANGE);
            }
            Adjustment::Mesh(select) => self.mesh = select,
            Adjustment::ToggleRotation => self.rotate_camera = !self.rotate_camera,
        }
    }

    pub fn color1_linear(&self) -> Vec3 {
        to_unit(self.color1)
    }

    pub fn color2_linear(&self) -> Vec3 {
        to_unit(self.color2)
    }

    /// Fragment falloff radius.
    pub fn particle_radius(&self) -> f32 {
        0.5 * self.particle_size
    }

    /// Scale applied to the unit quad of every billboard.
    pub fn billboard_model(&self) -> Mat4 {
        let s = 0.1 * self.particle_size;
        Mat4::from_scale(Vec3::new(s, s, 1.0))
    }

    /// Particles that can hold a target from a mesh with `vertices` points.
    pub fn mesh_attract_count(&self, vertices: usize) -> u32 {
        vertices.min(self.particle_count as usize) as u32
    }
}

fn to_unit(rgb: [u8; 3]) -> Vec3 {
    Vec3::new(rgb[0] as f32, rgb[1] as f32, rgb[2] as f32) / 255.0
}

fn clamp(value: f32, range: &RangeInclusive<f32>) -> f32 {
    value.clamp(*range.start(), *range.end())
}

/// Move `value` by `delta` whole units, staying inside `range`.
fn step(value: u32, delta: i32, range: &RangeInclusive<u32>) -> u32 {
    value.saturating_add_signed(delta).clamp(*range.start(), *range.end())
}

fn check_u32(field: &'static str, value: u32, range: &RangeInclusive<u32>) -> Result<(), ConfigError> {
    check(field, value as f64, *range.start() as f64, *range.end() as f64)
}

fn check_f32(field: &'static str, value: f32, range: &RangeInclusive<f32>) -> Result<(), ConfigError> {
    check(field, value as f64, *range.start() as f64, *range.end() as f64)
}

fn check(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::OutOfRange { field, min, max, value });
    }
    Ok(())
}
