//! Shader programs and their uniform contract.
//!
//! A [`ShaderProgram`] owns one validated WGSL module, the pipeline built from
//! it and a uniform buffer at `@group(0) @binding(0)`. Uniform and attribute
//! slots are resolved once, by reflecting the module with naga, into a
//! [`ProgramLayout`]. The typed setters on [`UniformBlock`] write into a CPU
//! staging copy and silently skip any uniform the shader does not declare,
//! which lets one setter surface serve both the simulation and draw programs.

use std::borrow::Cow;
use std::collections::HashMap;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use naga::front::wgsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};

use super::camera::Camera;
use super::context::ProgramId;
use crate::error::ShaderError;
use crate::input::AttractMode;
use crate::params::MeshSelect;

/// Gain applied to the acceleration vector before it reaches the shader.
pub const ACCELERATION_GAIN: f32 = 5.0;

/// Multiple of the eye-to-target distance at which pointer clicks are
/// projected into the world.
pub const ATTRACT_DISTANCE_SCALE: f32 = 1.35;

/// Bind group holding the uniform block in every program.
pub const UNIFORM_GROUP: u32 = 0;

/// Uniforms the application knows how to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uniform {
    Model,
    ModelInvTr,
    ViewProj,
    CameraAxes,
    GeometryColor,
    Time,
    Acceleration,
    ParticleRadius,
    IsAttract,
    AttractPos,
    MeshAttractCount,
    MeshSelect,
    Color1,
    Color2,
    ColorChangeFreq,
    BreathRate,
}

impl Uniform {
    pub const ALL: [Uniform; 16] = [
        Uniform::Model,
        Uniform::ModelInvTr,
        Uniform::ViewProj,
        Uniform::CameraAxes,
        Uniform::GeometryColor,
        Uniform::Time,
        Uniform::Acceleration,
        Uniform::ParticleRadius,
        Uniform::IsAttract,
        Uniform::AttractPos,
        Uniform::MeshAttractCount,
        Uniform::MeshSelect,
        Uniform::Color1,
        Uniform::Color2,
        Uniform::ColorChangeFreq,
        Uniform::BreathRate,
    ];

    /// Member name in the WGSL uniform struct.
    pub fn name(self) -> &'static str {
        match self {
            Uniform::Model => "model",
            Uniform::ModelInvTr => "model_inv_tr",
            Uniform::ViewProj => "view_proj",
            Uniform::CameraAxes => "camera_axes",
            Uniform::GeometryColor => "color",
            Uniform::Time => "time",
            Uniform::Acceleration => "acceleration",
            Uniform::ParticleRadius => "particle_radius",
            Uniform::IsAttract => "is_attract",
            Uniform::AttractPos => "attract_pos",
            Uniform::MeshAttractCount => "mesh_attract_count",
            Uniform::MeshSelect => "mesh_select",
            Uniform::Color1 => "color1",
            Uniform::Color2 => "color2",
            Uniform::ColorChangeFreq => "color_change_freq",
            Uniform::BreathRate => "breath_rate",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Shape of a reflected uniform member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    F32,
    I32,
    U32,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Other,
}

impl UniformKind {
    fn of(inner: &naga::TypeInner) -> Self {
        use naga::{ScalarKind, TypeInner, VectorSize};

        match *inner {
            TypeInner::Scalar(scalar) if scalar.width == 4 => match scalar.kind {
                ScalarKind::Float => UniformKind::F32,
                ScalarKind::Sint => UniformKind::I32,
                ScalarKind::Uint => UniformKind::U32,
                _ => UniformKind::Other,
            },
            TypeInner::Vector { size, scalar }
                if scalar.kind == ScalarKind::Float && scalar.width == 4 =>
            {
                match size {
                    VectorSize::Bi => UniformKind::Vec2,
                    VectorSize::Tri => UniformKind::Vec3,
                    VectorSize::Quad => UniformKind::Vec4,
                }
            }
            TypeInner::Matrix {
                columns: VectorSize::Tri,
                rows: VectorSize::Tri,
                ..
            } => UniformKind::Mat3,
            TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Quad,
                ..
            } => UniformKind::Mat4,
            _ => UniformKind::Other,
        }
    }
}

/// Resolved location of one uniform inside the uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: u32,
    pub size: u32,
    pub kind: UniformKind,
}

/// Reflected interface of a WGSL module.
#[derive(Debug, Clone, Default)]
pub struct ProgramLayout {
    uniform_block_size: u32,
    uniforms: HashMap<String, UniformSlot>,
    attributes: HashMap<String, u32>,
}

impl ProgramLayout {
    /// Walk the module's uniform struct and vertex inputs.
    pub fn reflect(module: &naga::Module) -> Self {
        let mut layout = ProgramLayout::default();

        let block = module.global_variables.iter().find_map(|(_, var)| {
            match (var.space, &var.binding) {
                (naga::AddressSpace::Uniform, Some(binding))
                    if binding.group == UNIFORM_GROUP && binding.binding == 0 =>
                {
                    Some(var.ty)
                }
                _ => None,
            }
        });

        if let Some(ty) = block {
            let gctx = module.to_ctx();
            match &module.types[ty].inner {
                naga::TypeInner::Struct { members, span } => {
                    layout.uniform_block_size = *span;
                    for member in members {
                        let Some(name) = &member.name else { continue };
                        let inner = &module.types[member.ty].inner;
                        layout.uniforms.insert(
                            name.clone(),
                            UniformSlot {
                                offset: member.offset,
                                size: inner.size(gctx),
                                kind: UniformKind::of(inner),
                            },
                        );
                    }
                }
                other => {
                    log::warn!("uniform binding is not a struct ({:?}); no uniforms resolved", other);
                }
            }
        }

        for entry in module
            .entry_points
            .iter()
            .filter(|ep| ep.stage == naga::ShaderStage::Vertex)
        {
            for arg in &entry.function.arguments {
                if let (Some(name), Some(naga::Binding::Location { location, .. })) =
                    (&arg.name, &arg.binding)
                {
                    layout.attributes.insert(name.clone(), *location);
                }
            }
        }

        layout
    }

    pub fn uniform(&self, name: &str) -> Option<UniformSlot> {
        self.uniforms.get(name).copied()
    }

    /// Location of a vertex-stage input, by parameter name.
    pub fn attribute(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    /// Size in bytes of the uniform struct (0 when the module declares none).
    pub fn uniform_block_size(&self) -> u32 {
        self.uniform_block_size
    }
}

/// Parse and validate WGSL, returning the compiler diagnostic on failure.
pub fn compile(label: &str, source: &str) -> Result<naga::Module, ShaderError> {
    let module = wgsl::parse_str(source).map_err(|err| ShaderError::Compile {
        label: label.to_string(),
        diagnostic: err.emit_to_string(source),
    })?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|err| ShaderError::Compile {
            label: label.to_string(),
            diagnostic: format!("{}", err),
        })?;

    Ok(module)
}

/// World-space point under a click, on the plane through the camera target.
///
/// `ndc` is the click in normalized device coordinates (x right, y up, both
/// in -1..1). The point sits on the plane through `target` perpendicular to
/// `forward`, scaled as if seen from [`ATTRACT_DISTANCE_SCALE`] times the
/// current eye distance.
pub fn attract_world_position(ndc: Vec2, camera: &Camera) -> Vec3 {
    let len = ATTRACT_DISTANCE_SCALE * (camera.target - camera.position).length();
    let tan_half_fovy = (0.5 * camera.fovy.to_radians()).tan();

    let v = camera.up * len * tan_half_fovy;
    let h = camera.right * len * camera.aspect_ratio * tan_half_fovy;

    camera.target + ndc.x * h + ndc.y * v
}

/// CPU staging copy of a program's uniform block.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    slots: [Option<UniformSlot>; Uniform::ALL.len()],
    bytes: Vec<u8>,
    dirty: bool,
    warned: bool,
}

impl UniformBlock {
    /// Resolve every known uniform against `layout`.
    pub fn new(layout: &ProgramLayout) -> Self {
        let mut slots = [None; Uniform::ALL.len()];
        for uniform in Uniform::ALL {
            slots[uniform.index()] = layout.uniform(uniform.name());
        }

        let size = (layout.uniform_block_size().max(16) as usize + 15) & !15;

        Self {
            slots,
            bytes: vec![0; size],
            dirty: true,
            warned: false,
        }
    }

    /// Whether the shader declares `uniform`.
    pub fn has(&self, uniform: Uniform) -> bool {
        self.slots[uniform.index()].is_some()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// Staged bytes of `uniform`, if the shader declares it.
    pub fn value(&self, uniform: Uniform) -> Option<&[u8]> {
        let slot = self.slots[uniform.index()]?;
        let start = slot.offset as usize;
        self.bytes.get(start..start + slot.size as usize)
    }

    pub fn get_f32(&self, uniform: Uniform) -> Option<f32> {
        self.value(uniform)
            .filter(|bytes| bytes.len() == 4)
            .map(bytemuck::pod_read_unaligned)
    }

    pub fn get_i32(&self, uniform: Uniform) -> Option<i32> {
        self.value(uniform)
            .filter(|bytes| bytes.len() == 4)
            .map(bytemuck::pod_read_unaligned)
    }

    pub fn get_vec3(&self, uniform: Uniform) -> Option<Vec3> {
        let bytes = self.value(uniform)?;
        let xyz: [f32; 3] = bytemuck::pod_read_unaligned(bytes.get(..12)?);
        Some(Vec3::from_array(xyz))
    }

    fn write(&mut self, uniform: Uniform, kind: UniformKind, data: &[u8]) {
        let Some(slot) = self.slots[uniform.index()] else {
            return;
        };
        if slot.kind != kind || slot.size as usize != data.len() {
            if !self.warned {
                log::warn!(
                    "uniform `{}` is declared as {:?}, setter writes {:?}; ignoring",
                    uniform.name(),
                    slot.kind,
                    kind
                );
                self.warned = true;
            }
            return;
        }
        let start = slot.offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        self.dirty = true;
    }

    fn write_mat4(&mut self, uniform: Uniform, value: Mat4) {
        self.write(uniform, UniformKind::Mat4, bytemuck::bytes_of(&value.to_cols_array()));
    }

    fn write_vec3(&mut self, uniform: Uniform, value: Vec3) {
        self.write(uniform, UniformKind::Vec3, bytemuck::bytes_of(&value.to_array()));
    }

    fn write_f32(&mut self, uniform: Uniform, value: f32) {
        self.write(uniform, UniformKind::F32, bytemuck::bytes_of(&value));
    }

    fn write_i32(&mut self, uniform: Uniform, value: i32) {
        self.write(uniform, UniformKind::I32, bytemuck::bytes_of(&value));
    }

    /// Also fills `model_inv_tr` when the shader declares it.
    pub fn set_model_matrix(&mut self, model: Mat4) {
        self.write_mat4(Uniform::Model, model);
        if self.has(Uniform::ModelInvTr) {
            self.write_mat4(Uniform::ModelInvTr, model.transpose().inverse());
        }
    }

    pub fn set_view_proj_matrix(&mut self, view_proj: Mat4) {
        self.write_mat4(Uniform::ViewProj, view_proj);
    }

    /// mat3x3 columns are padded to 16 bytes in a uniform block.
    pub fn set_camera_axes(&mut self, axes: Mat3) {
        let padded = [
            axes.x_axis.extend(0.0).to_array(),
            axes.y_axis.extend(0.0).to_array(),
            axes.z_axis.extend(0.0).to_array(),
        ];
        self.write(Uniform::CameraAxes, UniformKind::Mat3, bytemuck::bytes_of(&padded));
    }

    pub fn set_geometry_color(&mut self, color: Vec4) {
        self.write(Uniform::GeometryColor, UniformKind::Vec4, bytemuck::bytes_of(&color.to_array()));
    }

    /// Elapsed time in milliseconds.
    pub fn set_time(&mut self, time: f32) {
        self.write_f32(Uniform::Time, time);
    }

    /// Stores `accel` scaled by [`ACCELERATION_GAIN`].
    pub fn set_acceleration(&mut self, accel: Vec3) {
        self.write_vec3(Uniform::Acceleration, accel * ACCELERATION_GAIN);
    }

    pub fn set_particle_radius(&mut self, radius: f32) {
        self.write_f32(Uniform::ParticleRadius, radius);
    }

    pub fn set_attract_mode(&mut self, mode: AttractMode) {
        self.write_i32(Uniform::IsAttract, mode.as_uniform());
    }

    /// Project a click through `camera` and store the world point.
    pub fn set_attract_pos(&mut self, ndc: Vec2, camera: &Camera) {
        if self.has(Uniform::AttractPos) {
            self.write_vec3(Uniform::AttractPos, attract_world_position(ndc, camera));
        }
    }

    pub fn set_mesh_attract_count(&mut self, count: u32) {
        self.write(Uniform::MeshAttractCount, UniformKind::U32, bytemuck::bytes_of(&count));
    }

    pub fn set_mesh_select(&mut self, select: MeshSelect) {
        self.write_i32(Uniform::MeshSelect, select.index());
    }

    pub fn set_particle_colors(&mut self, color1: Vec3, color2: Vec3) {
        self.write_vec3(Uniform::Color1, color1);
        self.write_vec3(Uniform::Color2, color2);
    }

    pub fn set_color_change_freq(&mut self, freq: u32) {
        self.write_f32(Uniform::ColorChangeFreq, freq as f32);
    }

    pub fn set_breath_rate(&mut self, rate: u32) {
        self.write_f32(Uniform::BreathRate, rate as f32);
    }
}

/// A validated, reflected shader waiting to be turned into a pipeline.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    label: String,
    source: Cow<'static, str>,
    layout: ProgramLayout,
}

impl ProgramSource {
    pub fn compile(
        label: impl Into<String>,
        source: impl Into<Cow<'static, str>>,
    ) -> Result<Self, ShaderError> {
        let label = label.into();
        let source = source.into();
        let module = compile(&label, &source)?;
        let layout = ProgramLayout::reflect(&module);

        log::debug!(
            "{}: {} uniforms, {} attributes, uniform block {} bytes",
            label,
            layout.uniforms.len(),
            layout.attributes.len(),
            layout.uniform_block_size
        );

        Ok(Self { label, source, layout })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn layout(&self) -> &ProgramLayout {
        &self.layout
    }
}

/// Fixed-function state of a render program.
pub struct RenderTarget<'a> {
    pub format: wgpu::TextureFormat,
    pub blend: Option<wgpu::BlendState>,
    pub vertex_buffers: &'a [wgpu::VertexBufferLayout<'a>],
}

enum Pipeline {
    Compute(wgpu::ComputePipeline),
    Render(wgpu::RenderPipeline),
}

/// A linked program: pipeline, uniform buffer and its staging block.
pub struct ShaderProgram {
    id: ProgramId,
    label: String,
    layout: ProgramLayout,
    uniforms: UniformBlock,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    pipeline: Pipeline,
}

impl ShaderProgram {
    /// Build a compute program. `groups` are the layouts of bind groups 1.. .
    pub async fn compute(
        device: &wgpu::Device,
        source: ProgramSource,
        entry_point: &str,
        groups: &[&wgpu::BindGroupLayout],
    ) -> Result<Self, ShaderError> {
        let uniforms = UniformResources::new(device, &source, wgpu::ShaderStages::COMPUTE);

        let mut layouts = vec![&uniforms.layout];
        layouts.extend_from_slice(groups);

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&source.label),
            source: wgpu::ShaderSource::Wgsl(source.source.clone()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} Pipeline Layout", source.label)),
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&format!("{} Pipeline", source.label)),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(err) = device.pop_error_scope().await {
            return Err(ShaderError::Link {
                label: source.label,
                diagnostic: err.to_string(),
            });
        }

        Ok(Self::assemble(source, uniforms, Pipeline::Compute(pipeline)))
    }

    /// Build a render program with `vs_main`/`fs_main` entry points.
    pub async fn render(
        device: &wgpu::Device,
        source: ProgramSource,
        target: RenderTarget<'_>,
    ) -> Result<Self, ShaderError> {
        let uniforms = UniformResources::new(
            device,
            &source,
            wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        );

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&source.label),
            source: wgpu::ShaderSource::Wgsl(source.source.clone()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} Pipeline Layout", source.label)),
            bind_group_layouts: &[&uniforms.layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{} Pipeline", source.label)),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: target.vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target.format,
                    blend: target.blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = device.pop_error_scope().await {
            return Err(ShaderError::Link {
                label: source.label,
                diagnostic: err.to_string(),
            });
        }

        Ok(Self::assemble(source, uniforms, Pipeline::Render(pipeline)))
    }

    fn assemble(source: ProgramSource, uniforms: UniformResources, pipeline: Pipeline) -> Self {
        log::info!("{}: program ready", source.label);
        Self {
            id: ProgramId::next(),
            uniforms: UniformBlock::new(&source.layout),
            label: source.label,
            layout: source.layout,
            uniform_buffer: uniforms.buffer,
            bind_group: uniforms.bind_group,
            pipeline,
        }
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn layout(&self) -> &ProgramLayout {
        &self.layout
    }

    pub fn uniforms(&self) -> &UniformBlock {
        &self.uniforms
    }

    /// Setter surface. Values reach the GPU on the next activation.
    pub fn uniforms_mut(&mut self) -> &mut UniformBlock {
        &mut self.uniforms
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn compute_pipeline(&self) -> Option<&wgpu::ComputePipeline> {
        match &self.pipeline {
            Pipeline::Compute(pipeline) => Some(pipeline),
            Pipeline::Render(_) => None,
        }
    }

    pub fn render_pipeline(&self) -> Option<&wgpu::RenderPipeline> {
        match &self.pipeline {
            Pipeline::Render(pipeline) => Some(pipeline),
            Pipeline::Compute(_) => None,
        }
    }

    /// Upload staged uniforms if any changed since the last upload.
    pub(crate) fn flush(&mut self, queue: &wgpu::Queue) {
        if self.uniforms.take_dirty() {
            queue.write_buffer(&self.uniform_buffer, 0, self.uniforms.bytes());
        }
    }
}

struct UniformResources {
    buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

impl UniformResources {
    fn new(device: &wgpu::Device, source: &ProgramSource, visibility: wgpu::ShaderStages) -> Self {
        let size = (source.layout.uniform_block_size().max(16) as u64 + 15) & !15;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{} Uniform Buffer", source.label)),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} Uniform Bind Group Layout", source.label)),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Uniform Bind Group", source.label)),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self { buffer, layout, bind_group }
    }
}
