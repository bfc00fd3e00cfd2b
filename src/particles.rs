//! CPU-side particle state.
//!
//! Particles are stored column-wise: one flat `f32` array per [`Channel`].
//! This is the data uploaded to both GPU generations at creation and the
//! authoritative copy of the static channels (ids and mesh targets).

use glam::Vec3;

/// Point every particle starts from.
pub const EMISSION_POINT: Vec3 = Vec3::new(0.0, 0.8, 0.0);

/// One per-particle attribute stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Position,
    Velocity,
    Color,
    /// Accumulated age and reset marker.
    Time,
    Id,
    MeshTarget1,
    MeshTarget2,
}

impl Channel {
    /// Every channel, in shader-location order.
    pub const ALL: [Channel; 7] = [
        Channel::Position,
        Channel::Velocity,
        Channel::Color,
        Channel::Time,
        Channel::Id,
        Channel::MeshTarget1,
        Channel::MeshTarget2,
    ];

    /// Channels the simulation writes, in feedback-output order.
    pub const FEEDBACK: [Channel; 4] = [
        Channel::Position,
        Channel::Velocity,
        Channel::Color,
        Channel::Time,
    ];

    /// Number of `f32` components per particle.
    pub fn components(self) -> usize {
        match self {
            Channel::Id => 1,
            Channel::Time => 2,
            _ => 3,
        }
    }

    /// Vertex attribute location used when the channel feeds a vertex stage.
    pub fn location(self) -> u32 {
        match self {
            Channel::Position => 2,
            Channel::Velocity => 3,
            Channel::Color => 4,
            Channel::Time => 5,
            Channel::Id => 6,
            Channel::MeshTarget1 => 7,
            Channel::MeshTarget2 => 8,
        }
    }

    /// Binding slot in the simulation feedback group, if the channel is written.
    pub fn feedback_output(self) -> Option<u32> {
        Self::FEEDBACK
            .iter()
            .position(|c| *c == self)
            .map(|i| i as u32)
    }

    /// Attribute name the draw shader uses for this channel.
    pub fn attribute_name(self) -> &'static str {
        match self {
            Channel::Position => "particle_position",
            Channel::Velocity => "particle_velocity",
            Channel::Color => "particle_color",
            Channel::Time => "particle_time",
            Channel::Id => "particle_id",
            Channel::MeshTarget1 => "mesh_target1",
            Channel::MeshTarget2 => "mesh_target2",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Position => "Position",
            Channel::Velocity => "Velocity",
            Channel::Color => "Color",
            Channel::Time => "Time",
            Channel::Id => "Id",
            Channel::MeshTarget1 => "Mesh Target 1",
            Channel::MeshTarget2 => "Mesh Target 2",
        }
    }
}

/// Column-wise particle arrays for a fixed particle count.
///
/// The count never changes; a different count means a new `ParticleData`.
#[derive(Debug, Clone)]
pub struct ParticleData {
    count: usize,
    positions: Vec<f32>,
    velocities: Vec<f32>,
    colors: Vec<f32>,
    times: Vec<f32>,
    ids: Vec<f32>,
    mesh_targets1: Vec<f32>,
    mesh_targets2: Vec<f32>,
    mesh_target_counts: (usize, usize),
}

impl ParticleData {
    /// Allocate `count` particles at the emission point with zeroed state.
    pub fn new(count: usize) -> Self {
        let positions = (0..count)
            .flat_map(|_| EMISSION_POINT.to_array())
            .collect();

        Self {
            count,
            positions,
            velocities: vec![0.0; count * 3],
            colors: vec![0.0; count * 3],
            times: vec![0.0; count * 2],
            ids: (0..count).map(|i| i as f32).collect(),
            mesh_targets1: vec![0.0; count * 3],
            mesh_targets2: vec![0.0; count * 3],
            mesh_target_counts: (0, 0),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Raw values of one channel.
    pub fn channel(&self, channel: Channel) -> &[f32] {
        match channel {
            Channel::Position => &self.positions,
            Channel::Velocity => &self.velocities,
            Channel::Color => &self.colors,
            Channel::Time => &self.times,
            Channel::Id => &self.ids,
            Channel::MeshTarget1 => &self.mesh_targets1,
            Channel::MeshTarget2 => &self.mesh_targets2,
        }
    }

    /// The vector stored for particle `index` in a 3-component channel.
    pub fn vec3(&self, channel: Channel, index: usize) -> Option<Vec3> {
        if channel.components() != 3 {
            return None;
        }
        self.channel(channel)
            .get(index * 3..index * 3 + 3)
            .map(Vec3::from_slice)
    }

    /// Copy mesh vertices into the two attraction target channels.
    ///
    /// Each mesh fills its own channel up to `min(count, vertices)`. Particles
    /// past a mesh's length keep whatever target they had before.
    pub fn set_mesh_attract_targets(&mut self, mesh_a: &[Vec3], mesh_b: &[Vec3]) {
        let filled_a = copy_targets(&mut self.mesh_targets1, mesh_a, self.count);
        let filled_b = copy_targets(&mut self.mesh_targets2, mesh_b, self.count);
        self.mesh_target_counts = (filled_a, filled_b);
    }

    /// How many particles received a target from mesh A and mesh B.
    pub fn mesh_target_counts(&self) -> (usize, usize) {
        self.mesh_target_counts
    }
}

fn copy_targets(dst: &mut [f32], vertices: &[Vec3], count: usize) -> usize {
    let filled = vertices.len().min(count);
    for (slot, vertex) in dst.chunks_exact_mut(3).zip(&vertices[..filled]) {
        vertex.write_to_slice(slot);
    }
    filled
}
