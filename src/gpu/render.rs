//! Instanced billboard rendering of the current particle generation.

use wgpu::util::DeviceExt;

use super::context::FrameContext;
use super::particle_buffers::{vertex_format, ChannelView, ParticleBuffers};
use super::program::{ProgramSource, RenderTarget, ShaderProgram};
use crate::error::ShaderError;
use crate::particles::Channel;
use crate::shader::DRAW_SOURCE;

pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.05,
    g: 0.05,
    b: 0.05,
    a: 1.0,
};

/// Vertex input carrying the quad corner.
pub const CORNER_ATTRIBUTE: &str = "corner";

const QUAD_CORNERS: [[f32; 4]; 4] = [
    [-1.0, -1.0, 0.0, 1.0],
    [1.0, -1.0, 0.0, 1.0],
    [1.0, 1.0, 0.0, 1.0],
    [-1.0, 1.0, 0.0, 1.0],
];
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Channels that can feed the draw program per instance.
const INSTANCE_CHANNELS: [Channel; 5] = [
    Channel::Position,
    Channel::Velocity,
    Channel::Color,
    Channel::Time,
    Channel::Id,
];

/// Additive blending: overlapping particles brighten each other.
pub const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

pub struct ParticleRenderer {
    program: ShaderProgram,
    quad_vertices: wgpu::Buffer,
    quad_indices: wgpu::Buffer,
    has_corner: bool,
    /// Instance channels in vertex buffer slot order, after the corner slot.
    instanced: Vec<Channel>,
}

impl ParticleRenderer {
    pub async fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<Self, ShaderError> {
        let source = ProgramSource::compile("Draw", DRAW_SOURCE)?;
        let layout = source.layout();

        let corner = layout.attribute(CORNER_ATTRIBUTE).map(|location| {
            [wgpu::VertexAttribute {
                offset: 0,
                shader_location: location,
                format: wgpu::VertexFormat::Float32x4,
            }]
        });
        if corner.is_none() {
            log::warn!("draw program declares no `{}` input", CORNER_ATTRIBUTE);
        }

        let instanced: Vec<(Channel, [wgpu::VertexAttribute; 1])> = INSTANCE_CHANNELS
            .into_iter()
            .filter_map(|channel| {
                let location = layout.attribute(channel.attribute_name())?;
                Some((
                    channel,
                    [wgpu::VertexAttribute {
                        offset: 0,
                        shader_location: location,
                        format: vertex_format(channel),
                    }],
                ))
            })
            .collect();

        let mut vertex_buffers = Vec::with_capacity(instanced.len() + 1);
        if let Some(attributes) = &corner {
            vertex_buffers.push(wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            });
        }
        for (channel, attributes) in &instanced {
            vertex_buffers.extend(ChannelView::Render.buffer_layout(*channel, attributes));
        }

        let has_corner = corner.is_some();
        let instanced: Vec<Channel> = instanced.iter().map(|(channel, _)| *channel).collect();

        let program = ShaderProgram::render(
            device,
            source,
            RenderTarget {
                format,
                blend: Some(ADDITIVE),
                vertex_buffers: &vertex_buffers,
            },
        )
        .await?;

        let quad_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(&QUAD_CORNERS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Index Buffer"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            program,
            quad_vertices,
            quad_indices,
            has_corner,
            instanced,
        })
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut ShaderProgram {
        &mut self.program
    }

    /// Channels bound per instance, in slot order.
    pub fn instanced_channels(&self) -> &[Channel] {
        &self.instanced
    }

    /// Clear `target` and draw one billboard per particle of the current
    /// generation.
    pub fn encode(
        &mut self,
        ctx: &mut FrameContext,
        queue: &wgpu::Queue,
        buffers: &ParticleBuffers,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) {
        ctx.use_program(&mut self.program, queue);
        let Some(pipeline) = self.program.render_pipeline() else {
            log::error!("{} is not a render program; skipping draw", self.program.label());
            return;
        };
        let generation = ctx.generation().current();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Particle Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, self.program.bind_group(), &[]);

        let mut slot = 0;
        if self.has_corner {
            pass.set_vertex_buffer(slot, self.quad_vertices.slice(..));
            slot += 1;
        }
        for channel in &self.instanced {
            if let Some(buffer) = buffers.channel_buffer(generation, *channel) {
                debug_assert!(ChannelView::Render.accepts(buffer));
                pass.set_vertex_buffer(slot, buffer.slice(..));
            }
            slot += 1;
        }

        pass.set_index_buffer(self.quad_indices.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..buffers.count() as u32);
    }
}
