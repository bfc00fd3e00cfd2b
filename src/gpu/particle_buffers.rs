//! GPU particle storage.
//!
//! Two generations of per-channel buffers. Each frame the simulation reads one
//! generation through its input bind group and writes the other through its
//! feedback bind group; the render pass then draws whichever is current.

use wgpu::util::DeviceExt;

use crate::error::GpuError;
use crate::particles::{Channel, ParticleData};
use glam::Vec3;

/// Storage buffers the simulation binds in one stage: seven inputs plus
/// four feedback outputs.
pub const STORAGE_BUFFERS_PER_STAGE: u32 = 11;

/// Bytes of the zero buffer bound in place of absent mesh targets. Holds a
/// single float, so no particle index ever finds a full target in it.
const STAND_IN_SIZE: u64 = 4;

/// How a pass consumes a channel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelView {
    /// Storage binding indexed by invocation id. No vertex step mode.
    Simulation,
    /// Vertex attribute advanced once per drawn instance.
    Render,
}

impl ChannelView {
    /// Buffer usage a channel needs to be read this way.
    pub fn usage(self) -> wgpu::BufferUsages {
        match self {
            ChannelView::Simulation => wgpu::BufferUsages::STORAGE,
            ChannelView::Render => wgpu::BufferUsages::VERTEX,
        }
    }

    pub fn step_mode(self) -> Option<wgpu::VertexStepMode> {
        match self {
            ChannelView::Simulation => None,
            ChannelView::Render => Some(wgpu::VertexStepMode::Instance),
        }
    }

    /// Vertex buffer layout reading `channel` through `attributes`, for views
    /// that go through the vertex stage.
    pub fn buffer_layout<'a>(
        self,
        channel: Channel,
        attributes: &'a [wgpu::VertexAttribute],
    ) -> Option<wgpu::VertexBufferLayout<'a>> {
        Some(wgpu::VertexBufferLayout {
            array_stride: (channel.components() * std::mem::size_of::<f32>()) as wgpu::BufferAddress,
            step_mode: self.step_mode()?,
            attributes,
        })
    }

    /// Whether `buffer` can be consumed through this view.
    pub fn accepts(self, buffer: &wgpu::Buffer) -> bool {
        buffer.usage().contains(self.usage())
    }
}

/// Usage of every channel buffer: both views plus readback.
fn channel_usage() -> wgpu::BufferUsages {
    ChannelView::Simulation.usage() | ChannelView::Render.usage() | wgpu::BufferUsages::COPY_SRC
}

/// Format of one element of `channel` when read as a vertex attribute.
pub fn vertex_format(channel: Channel) -> wgpu::VertexFormat {
    match channel.components() {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        _ => wgpu::VertexFormat::Float32x3,
    }
}

/// Buffers of one generation that the simulation reads or writes.
pub struct GenerationBuffers {
    pub position: wgpu::Buffer,
    pub velocity: wgpu::Buffer,
    pub color: wgpu::Buffer,
    pub time: wgpu::Buffer,
    pub id: wgpu::Buffer,
}

impl GenerationBuffers {
    fn new(device: &wgpu::Device, data: &ParticleData, generation: usize) -> Self {
        let upload = |channel: Channel| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Buffer {}", channel.label(), generation)),
                contents: bytemuck::cast_slice(data.channel(channel)),
                usage: channel_usage() | wgpu::BufferUsages::COPY_DST,
            })
        };

        Self {
            position: upload(Channel::Position),
            velocity: upload(Channel::Velocity),
            color: upload(Channel::Color),
            time: upload(Channel::Time),
            id: upload(Channel::Id),
        }
    }

    pub fn get(&self, channel: Channel) -> Option<&wgpu::Buffer> {
        match channel {
            Channel::Position => Some(&self.position),
            Channel::Velocity => Some(&self.velocity),
            Channel::Color => Some(&self.color),
            Channel::Time => Some(&self.time),
            Channel::Id => Some(&self.id),
            Channel::MeshTarget1 | Channel::MeshTarget2 => None,
        }
    }
}

/// Lifecycle of the mesh target channels.
enum MeshAttraction {
    /// Both target bindings point at a zero stand-in.
    Unconfigured { stand_in: wgpu::Buffer },
    /// Per-generation `[target1, target2]` buffers, never written by the GPU.
    Configured { targets: [[wgpu::Buffer; 2]; 2] },
}

impl MeshAttraction {
    fn bindings(&self, generation: usize) -> (&wgpu::Buffer, &wgpu::Buffer) {
        match self {
            MeshAttraction::Unconfigured { stand_in } => (stand_in, stand_in),
            MeshAttraction::Configured { targets } => {
                let [first, second] = &targets[generation];
                (first, second)
            }
        }
    }
}

/// Both generations of particle buffers plus their bind groups.
pub struct ParticleBuffers {
    data: ParticleData,
    generations: [GenerationBuffers; 2],
    mesh: MeshAttraction,
    input_layout: wgpu::BindGroupLayout,
    feedback_layout: wgpu::BindGroupLayout,
    inputs: [wgpu::BindGroup; 2],
    feedback: [wgpu::BindGroup; 2],
}

impl ParticleBuffers {
    /// Allocate `count` particles and upload their initial state to both
    /// generations.
    pub fn create(device: &wgpu::Device, count: usize) -> Result<Self, GpuError> {
        if count == 0 {
            return Err(GpuError::EmptyParticleSet);
        }

        let data = ParticleData::new(count);
        let generations = [
            GenerationBuffers::new(device, &data, 0),
            GenerationBuffers::new(device, &data, 1),
        ];

        let stand_in = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Target Stand-in"),
            size: STAND_IN_SIZE,
            usage: ChannelView::Simulation.usage(),
            mapped_at_creation: false,
        });
        let mesh = MeshAttraction::Unconfigured { stand_in };

        let input_entries: Vec<_> = (0..Channel::ALL.len() as u32)
            .map(|binding| storage_entry(binding, true))
            .collect();
        let input_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Simulation Input Layout"),
            entries: &input_entries,
        });

        let feedback_entries: Vec<_> = (0..Channel::FEEDBACK.len() as u32)
            .map(|binding| storage_entry(binding, false))
            .collect();
        let feedback_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Simulation Feedback Layout"),
            entries: &feedback_entries,
        });

        let inputs = [
            input_bind_group(device, &input_layout, &generations[0], &mesh, 0),
            input_bind_group(device, &input_layout, &generations[1], &mesh, 1),
        ];
        let feedback = [
            feedback_bind_group(device, &feedback_layout, &generations[0], 0),
            feedback_bind_group(device, &feedback_layout, &generations[1], 1),
        ];

        log::info!("allocated {} particles in two generations", count);

        Ok(Self {
            data,
            generations,
            mesh,
            input_layout,
            feedback_layout,
            inputs,
            feedback,
        })
    }

    /// Copy mesh vertices into the target channels of both generations.
    ///
    /// May be called before the first simulation pass and again later to
    /// replace the targets.
    pub fn set_mesh_attract_targets(&mut self, device: &wgpu::Device, mesh_a: &[Vec3], mesh_b: &[Vec3]) {
        self.data.set_mesh_attract_targets(mesh_a, mesh_b);

        let data = &self.data;
        let upload = |channel: Channel, generation: usize| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Buffer {}", channel.label(), generation)),
                contents: bytemuck::cast_slice(data.channel(channel)),
                usage: channel_usage(),
            })
        };
        let targets = [0, 1].map(|g| [upload(Channel::MeshTarget1, g), upload(Channel::MeshTarget2, g)]);
        self.mesh = MeshAttraction::Configured { targets };

        for g in 0..2 {
            self.inputs[g] = input_bind_group(device, &self.input_layout, &self.generations[g], &self.mesh, g);
        }

        let (a, b) = self.data.mesh_target_counts();
        log::info!("mesh attraction configured: {} targets from mesh A, {} from mesh B", a, b);
    }

    pub fn is_mesh_configured(&self) -> bool {
        matches!(self.mesh, MeshAttraction::Configured { .. })
    }

    pub fn count(&self) -> usize {
        self.data.count()
    }

    /// CPU mirror of the initial state and the static channels.
    pub fn data(&self) -> &ParticleData {
        &self.data
    }

    pub fn input_layout(&self) -> &wgpu::BindGroupLayout {
        &self.input_layout
    }

    pub fn feedback_layout(&self) -> &wgpu::BindGroupLayout {
        &self.feedback_layout
    }

    /// Everything the simulation reads from generation `g`.
    pub fn simulation_inputs(&self, g: usize) -> &wgpu::BindGroup {
        &self.inputs[g]
    }

    /// Outputs 0-3 (position, velocity, color, time) of generation `g`.
    pub fn feedback(&self, g: usize) -> &wgpu::BindGroup {
        &self.feedback[g]
    }

    pub fn generation(&self, g: usize) -> &GenerationBuffers {
        &self.generations[g]
    }

    /// Buffer holding `channel` for generation `g`. Mesh target channels have
    /// no buffer until targets are configured.
    pub fn channel_buffer(&self, g: usize, channel: Channel) -> Option<&wgpu::Buffer> {
        match (channel, &self.mesh) {
            (Channel::MeshTarget1, MeshAttraction::Configured { targets }) => Some(&targets[g][0]),
            (Channel::MeshTarget2, MeshAttraction::Configured { targets }) => Some(&targets[g][1]),
            _ => self.generations[g].get(channel),
        }
    }

    /// Read one channel of generation `g` back to the CPU. Blocks until the
    /// GPU is idle.
    pub fn read_channel(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        g: usize,
        channel: Channel,
    ) -> Result<Vec<f32>, GpuError> {
        let Some(source) = self.channel_buffer(g, channel) else {
            return Ok(self.data.channel(channel).to_vec());
        };
        let size = source.size();

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;
        rx.recv()
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

        let values = {
            let bytes = slice.get_mapped_range();
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        };
        staging.unmap();

        Ok(values)
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn input_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffers: &GenerationBuffers,
    mesh: &MeshAttraction,
    generation: usize,
) -> wgpu::BindGroup {
    let (target1, target2) = mesh.bindings(generation);
    let resources = [
        &buffers.position,
        &buffers.velocity,
        &buffers.color,
        &buffers.time,
        &buffers.id,
        target1,
        target2,
    ];
    let entries: Vec<_> = resources
        .iter()
        .zip(0u32..)
        .map(|(buffer, binding)| wgpu::BindGroupEntry {
            binding,
            resource: buffer.as_entire_binding(),
        })
        .collect();

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("Simulation Inputs {}", generation)),
        layout,
        entries: &entries,
    })
}

fn feedback_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffers: &GenerationBuffers,
    generation: usize,
) -> wgpu::BindGroup {
    let entries: Vec<_> = Channel::FEEDBACK
        .iter()
        .filter_map(|channel| Some((buffers.get(*channel)?, channel.feedback_output()?)))
        .map(|(buffer, binding)| wgpu::BindGroupEntry {
            binding,
            resource: buffer.as_entire_binding(),
        })
        .collect();

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("Simulation Feedback {}", generation)),
        layout,
        entries: &entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views_map_to_usage() {
        assert_eq!(ChannelView::Simulation.usage(), wgpu::BufferUsages::STORAGE);
        assert_eq!(ChannelView::Simulation.step_mode(), None);
        assert_eq!(ChannelView::Render.usage(), wgpu::BufferUsages::VERTEX);
        assert_eq!(ChannelView::Render.step_mode(), Some(wgpu::VertexStepMode::Instance));

        let usage = channel_usage();
        assert!(usage.contains(wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX));
    }

    #[test]
    fn test_buffer_layout_stride() {
        let attrs = [wgpu::VertexAttribute {
            offset: 0,
            shader_location: Channel::Time.location(),
            format: vertex_format(Channel::Time),
        }];
        assert!(ChannelView::Simulation.buffer_layout(Channel::Time, &attrs).is_none());
        let layout = ChannelView::Render.buffer_layout(Channel::Time, &attrs).unwrap();

        assert_eq!(layout.array_stride, 8);
        assert_eq!(layout.step_mode, wgpu::VertexStepMode::Instance);
        assert_eq!(vertex_format(Channel::Id), wgpu::VertexFormat::Float32);
        assert_eq!(vertex_format(Channel::Color), wgpu::VertexFormat::Float32x3);
    }

    #[test]
    fn test_binding_count_matches_limit() {
        assert_eq!(
            (Channel::ALL.len() + Channel::FEEDBACK.len()) as u32,
            STORAGE_BUFFERS_PER_STAGE
        );
    }
}
