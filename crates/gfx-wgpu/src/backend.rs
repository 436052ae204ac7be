use crate::reflect::{self, StageReflection};
use prism_common::ShaderStage;
use prism_formats::{
    CompressedFormat, DdsTexture, MeshFile, RenderStates, Vertex, VERTEX_STRIDE,
};
use prism_gfx::{
    DrawTransforms, EffectHandle, GfxError, GpuBackend, MeshHandle, SamplerHandle, TextureHandle,
    UniformHandle, TRANSFORM_UNIFORM_NAMES,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Byte size of the per-draw transform struct: three mat4x4<f32>.
const TRANSFORMS_SIZE: u64 = 192;
/// Byte budget of the material parameter struct.
const PARAMS_SIZE: u64 = 256;
/// One draw's span in the shared uniform buffer. Both sections land on
/// the 256-byte dynamic-offset alignment.
const DRAW_SLOT: u64 = 512;
/// Per-frame draw capacity of the shared uniform buffer.
const MAX_DRAWS: usize = 1024;

struct MeshData {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct EffectData {
    pipeline: wgpu::RenderPipeline,
    vertex: StageReflection,
    fragment: StageReflection,
    /// Transform member offsets within the per-draw slot.
    transform_offsets: [u32; 3],
}

struct TextureData {
    bind_group: wgpu::BindGroup,
}

struct DrawCmd {
    effect: EffectHandle,
    mesh: MeshHandle,
    texture: Option<TextureHandle>,
    slot: usize,
}

/// [`GpuBackend`] over a wgpu device, windowed or headless.
///
/// Draw calls made between `begin_frame` and `end_frame` are recorded
/// along with their staged uniform bytes, then replayed in a single
/// render pass when the frame ends. This keeps every `write_buffer`
/// ahead of the one `submit`.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: Option<wgpu::Surface<'static>>,
    surface_format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    depth_view: wgpu::TextureView,
    /// Offscreen color target used when no surface is attached.
    offscreen_view: Option<wgpu::TextureView>,

    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    shared_sampler: wgpu::Sampler,
    /// Bound for draws whose effect samples no texture.
    fallback_texture: TextureData,

    meshes: HashMap<MeshHandle, MeshData>,
    effects: HashMap<EffectHandle, EffectData>,
    textures: HashMap<TextureHandle, TextureData>,
    next_handle: u32,

    frame_open: bool,
    draws: Vec<DrawCmd>,
    staged: Vec<u8>,
    bound_effect: Option<EffectHandle>,
    pending_texture: Option<TextureHandle>,
}

impl WgpuBackend {
    /// Create a headless backend rendering into an offscreen target.
    pub fn headless(width: u32, height: u32) -> Result<Self, GfxError> {
        let instance = Self::instance();
        Self::init(&instance, None, width, height)
    }

    /// Create a backend presenting to `target`.
    pub fn for_surface(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, GfxError> {
        let instance = Self::instance();
        let surface = instance
            .create_surface(target)
            .map_err(|error| GfxError::device(format!("create surface: {error}")))?;
        Self::init(&instance, Some(surface), width, height)
    }

    fn instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    fn init(
        instance: &wgpu::Instance,
        surface: Option<wgpu::Surface<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, GfxError> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface.as_ref(),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| GfxError::device("no compatible adapter"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("prism_device"),
                required_features: wgpu::Features::TEXTURE_COMPRESSION_BC,
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|error| GfxError::device(format!("request device: {error}")))?;

        let surface_format = match &surface {
            Some(surface) => {
                let caps = surface.get_capabilities(&adapter);
                let format = caps
                    .formats
                    .first()
                    .copied()
                    .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb);
                surface.configure(&device, &wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format,
                    width: width.max(1),
                    height: height.max(1),
                    present_mode: wgpu::PresentMode::Fifo,
                    desired_maximum_frame_latency: 2,
                    alpha_mode: caps
                        .alpha_modes
                        .first()
                        .copied()
                        .unwrap_or(wgpu::CompositeAlphaMode::Opaque),
                    view_formats: vec![],
                });
                format
            }
            None => wgpu::TextureFormat::Rgba8UnormSrgb,
        };

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("draw_uniforms"),
            size: MAX_DRAWS as u64 * DRAW_SLOT,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw_uniform_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: reflect::TRANSFORMS_BINDING,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(TRANSFORMS_SIZE),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: reflect::PARAMS_BINDING,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(PARAMS_SIZE),
                    },
                    count: None,
                },
            ],
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw_uniforms"),
            layout: &uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: reflect::TRANSFORMS_BINDING,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &uniform_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(TRANSFORMS_SIZE),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: reflect::PARAMS_BINDING,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &uniform_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(PARAMS_SIZE),
                    }),
                },
            ],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("effect_layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let shared_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shared_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let fallback_texture = Self::make_fallback_texture(
            &device,
            &queue,
            &texture_layout,
            &shared_sampler,
        );

        let depth_view = Self::create_depth_texture(&device, width, height);
        let offscreen_view = match surface {
            Some(_) => None,
            None => Some(Self::create_offscreen_target(
                &device,
                surface_format,
                width,
                height,
            )),
        };

        info!(?surface_format, width, height, headless = offscreen_view.is_some(), "wgpu backend ready");

        Ok(Self {
            device,
            queue,
            surface,
            surface_format,
            width: width.max(1),
            height: height.max(1),
            depth_view,
            offscreen_view,
            uniform_buffer,
            uniform_bind_group,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            shared_sampler,
            fallback_texture,
            meshes: HashMap::new(),
            effects: HashMap::new(),
            textures: HashMap::new(),
            next_handle: 0,
            frame_open: false,
            draws: Vec::new(),
            staged: vec![0; MAX_DRAWS * DRAW_SLOT as usize],
            bound_effect: None,
            pending_texture: None,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &wgpu::SurfaceConfiguration {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                format: self.surface_format,
                width: self.width,
                height: self.height,
                present_mode: wgpu::PresentMode::Fifo,
                desired_maximum_frame_latency: 2,
                alpha_mode: wgpu::CompositeAlphaMode::Auto,
                view_formats: vec![],
            });
        } else {
            self.offscreen_view = Some(Self::create_offscreen_target(
                &self.device,
                self.surface_format,
                self.width,
                self.height,
            ));
        }
        self.depth_view = Self::create_depth_texture(&self.device, self.width, self.height);
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }

    fn create_offscreen_target(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen_target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }

    fn make_fallback_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> TextureData {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("fallback_white"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[0xff, 0xff, 0xff, 0xff],
        );
        let view = texture.create_view(&Default::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fallback_white"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        TextureData { bind_group }
    }

    fn next(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn build_pipeline(
        &self,
        render_states: RenderStates,
        vertex_source: &str,
        fragment_source: &str,
        vertex: &StageReflection,
        fragment: &StageReflection,
    ) -> wgpu::RenderPipeline {
        let vertex_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("effect_vs"),
                source: wgpu::ShaderSource::Wgsl(vertex_source.into()),
            });
        let fragment_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("effect_fs"),
                source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
            });

        let blend = if render_states.contains(RenderStates::ALPHA) {
            let component = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            };
            Some(wgpu::BlendState {
                color: component,
                alpha: component,
            })
        } else {
            Some(wgpu::BlendState::REPLACE)
        };

        let depth_compare = if render_states.contains(RenderStates::DEPTH_TEST) {
            wgpu::CompareFunction::LessEqual
        } else {
            wgpu::CompareFunction::Always
        };

        let cull_mode = render_states
            .contains(RenderStates::FACE_CULLING)
            .then_some(wgpu::Face::Back);

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("effect_pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some(&vertex.entry_point),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: VERTEX_STRIDE as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![
                            0 => Float32x3,
                            1 => Float32x2,
                            2 => Unorm8x4,
                        ],
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some(&fragment.entry_point),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.surface_format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: render_states.contains(RenderStates::DEPTH_WRITE),
                    depth_compare,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
    }

}

/// Byte range in the staging buffer for a parameter write of `len` bytes,
/// or `None` when the write falls outside the block or the frame already
/// holds [`MAX_DRAWS`] draws and no slot is left to stage into.
fn params_span(draw_count: usize, offset: usize, len: usize) -> Option<std::ops::Range<usize>> {
    if draw_count >= MAX_DRAWS || offset + len > PARAMS_SIZE as usize {
        return None;
    }
    let base = draw_count * DRAW_SLOT as usize + PARAMS_SIZE as usize + offset;
    Some(base..base + len)
}

/// Base byte offset of the slot the next draw will use, or `None` when the
/// frame is already full. `draw_mesh` reports the overflow; the staging
/// calls that precede it just have to stay in bounds.
fn transforms_base(draw_count: usize) -> Option<usize> {
    (draw_count < MAX_DRAWS).then_some(draw_count * DRAW_SLOT as usize)
}

impl GpuBackend for WgpuBackend {
    fn create_mesh(&mut self, mesh: &MeshFile) -> Result<MeshHandle, GfxError> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice::<Vertex, u8>(&mesh.vertices);
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_vertices"),
                contents: vertex_bytes,
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_indices"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let handle = MeshHandle(self.next());
        self.meshes.insert(handle, MeshData {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
        });
        debug!(?handle, vertices = mesh.vertex_count(), "mesh uploaded");
        Ok(handle)
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh);
    }

    fn create_effect(
        &mut self,
        render_states: RenderStates,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<EffectHandle, GfxError> {
        let vertex = reflect::compile(ShaderStage::Vertex, vertex_source)?;
        let fragment = reflect::compile(ShaderStage::Fragment, fragment_source)?;

        let mut transform_offsets = [0u32; 3];
        for (index, name) in TRANSFORM_UNIFORM_NAMES.iter().enumerate() {
            transform_offsets[index] = *vertex
                .transforms
                .get(*name)
                .ok_or_else(|| GfxError::MissingUniform {
                    name: (*name).to_owned(),
                })?;
        }

        let params_size = vertex.params_size.max(fragment.params_size) as u64;
        if params_size > PARAMS_SIZE {
            return Err(GfxError::Allocation { bytes: params_size });
        }
        reflect::check_params_agree(&vertex, &fragment)?;

        let pipeline = self.build_pipeline(
            render_states,
            vertex_source,
            fragment_source,
            &vertex,
            &fragment,
        );
        let handle = EffectHandle(self.next());
        self.effects.insert(handle, EffectData {
            pipeline,
            vertex,
            fragment,
            transform_offsets,
        });
        debug!(?handle, states = ?render_states, "effect compiled");
        Ok(handle)
    }

    fn destroy_effect(&mut self, effect: EffectHandle) {
        self.effects.remove(&effect);
    }

    fn create_texture(&mut self, texture: &DdsTexture) -> Result<TextureHandle, GfxError> {
        let format = match texture.format {
            CompressedFormat::Dxt1 => wgpu::TextureFormat::Bc1RgbaUnorm,
            CompressedFormat::Dxt5 => wgpu::TextureFormat::Bc3RgbaUnorm,
        };
        let gpu_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("material_texture"),
            size: wgpu::Extent3d {
                width: texture.width,
                height: texture.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: texture.mips.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let block_size = texture.format.block_size() as u32;
        for (level, mip) in texture.mips.iter().enumerate() {
            let blocks_wide = mip.width.div_ceil(4);
            let blocks_high = mip.height.div_ceil(4);
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &gpu_texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &mip.data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(blocks_wide * block_size),
                    rows_per_image: Some(blocks_high),
                },
                wgpu::Extent3d {
                    width: mip.width,
                    height: mip.height,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = gpu_texture.create_view(&Default::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material_texture"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.shared_sampler),
                },
            ],
        });

        let handle = TextureHandle(self.next());
        self.textures.insert(handle, TextureData { bind_group });
        debug!(?handle, mips = texture.mips.len(), "texture uploaded");
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn resolve_uniform(
        &mut self,
        effect: EffectHandle,
        name: &str,
        stage: ShaderStage,
    ) -> Result<UniformHandle, GfxError> {
        let data = self
            .effects
            .get(&effect)
            .ok_or_else(|| GfxError::device(format!("resolve uniform on unknown {effect:?}")))?;
        let reflection = match stage {
            ShaderStage::Vertex => &data.vertex,
            ShaderStage::Fragment => &data.fragment,
        };
        let slot = reflection
            .uniforms
            .get(name)
            .ok_or_else(|| GfxError::MissingUniform { name: name.into() })?;
        Ok(UniformHandle(slot.offset))
    }

    fn resolve_sampler(
        &mut self,
        effect: EffectHandle,
        name: &str,
    ) -> Result<SamplerHandle, GfxError> {
        let data = self
            .effects
            .get(&effect)
            .ok_or_else(|| GfxError::device(format!("resolve sampler on unknown {effect:?}")))?;
        if !data.fragment.samplers.iter().any(|sampler| sampler == name) {
            return Err(GfxError::MissingUniform { name: name.into() });
        }
        Ok(SamplerHandle(0))
    }

    fn begin_frame(&mut self) -> Result<(), GfxError> {
        if self.frame_open {
            return Err(GfxError::device("begin_frame while a frame is open"));
        }
        self.frame_open = true;
        self.draws.clear();
        self.staged.fill(0);
        self.bound_effect = None;
        self.pending_texture = None;
        Ok(())
    }

    fn bind_effect(&mut self, effect: EffectHandle) {
        // The whole state vector lives in the effect's pipeline, so a
        // bind is a full state update by construction.
        self.bound_effect = Some(effect);
    }

    fn set_uniform(
        &mut self,
        _effect: EffectHandle,
        uniform: UniformHandle,
        _stage: ShaderStage,
        values: &[f32],
    ) {
        // The stage is irrelevant here: both stages read one shared
        // parameter block, and `create_effect` rejects effects whose
        // stages declare it with different layouts.
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let offset = uniform.0 as usize;
        let Some(span) = params_span(self.draws.len(), offset, bytes.len()) else {
            warn!(offset, len = bytes.len(), "uniform write has no staging slot");
            return;
        };
        self.staged[span].copy_from_slice(bytes);
    }

    fn bind_texture(&mut self, texture: TextureHandle, _sampler: SamplerHandle, _unit: u32) {
        self.pending_texture = Some(texture);
    }

    fn set_draw_transforms(&mut self, effect: EffectHandle, transforms: &DrawTransforms) {
        let Some(data) = self.effects.get(&effect) else {
            return;
        };
        let offsets = data.transform_offsets;
        let Some(base) = transforms_base(self.draws.len()) else {
            return;
        };
        for (offset, matrix) in offsets.iter().zip([
            transforms.local_to_world,
            transforms.world_to_view,
            transforms.view_to_screen,
        ]) {
            let bytes = matrix.to_cols_array();
            let at = base + *offset as usize;
            self.staged[at..at + 64].copy_from_slice(bytemuck::cast_slice(&bytes));
        }
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) -> Result<(), GfxError> {
        if !self.frame_open {
            return Err(GfxError::device("draw outside a frame"));
        }
        let effect = self
            .bound_effect
            .ok_or_else(|| GfxError::device("draw with no effect bound"))?;
        if !self.meshes.contains_key(&mesh) {
            return Err(GfxError::device(format!("draw of unknown {mesh:?}")));
        }
        if self.draws.len() >= MAX_DRAWS {
            return Err(GfxError::device(format!(
                "frame exceeds {MAX_DRAWS} draws"
            )));
        }
        let slot = self.draws.len();
        self.draws.push(DrawCmd {
            effect,
            mesh,
            texture: self.pending_texture.take(),
            slot,
        });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), GfxError> {
        if !self.frame_open {
            return Err(GfxError::device("end_frame without begin_frame"));
        }
        self.frame_open = false;

        if !self.draws.is_empty() {
            let used = self.draws.len() * DRAW_SLOT as usize;
            self.queue
                .write_buffer(&self.uniform_buffer, 0, &self.staged[..used]);
        }

        let frame = match &self.surface {
            Some(surface) => Some(surface.get_current_texture().map_err(|error| {
                GfxError::device(format!("acquire surface texture: {error}"))
            })?),
            None => None,
        };
        let frame_view = frame
            .as_ref()
            .map(|frame| frame.texture.create_view(&Default::default()));
        let target = match (&frame_view, &self.offscreen_view) {
            (Some(view), _) => view,
            (None, Some(view)) => view,
            (None, None) => return Err(GfxError::device("no render target")),
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for cmd in &self.draws {
                let Some(effect) = self.effects.get(&cmd.effect) else {
                    continue;
                };
                let Some(mesh) = self.meshes.get(&cmd.mesh) else {
                    continue;
                };
                let texture = cmd
                    .texture
                    .and_then(|handle| self.textures.get(&handle))
                    .unwrap_or(&self.fallback_texture);
                let base = (cmd.slot as u64 * DRAW_SLOT) as u32;

                pass.set_pipeline(&effect.pipeline);
                pass.set_bind_group(0, &self.uniform_bind_group, &[
                    base,
                    base + PARAMS_SIZE as u32,
                ]);
                pass.set_bind_group(1, &texture.bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }
        self.draws.clear();
        Ok(())
    }

    fn live_object_count(&self) -> usize {
        self.meshes.len() + self.effects.len() + self.textures.len()
    }
}
