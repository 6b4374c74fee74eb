//! wgpu device backend.
//!
//! Device calls arrive one draw at a time, but wgpu wants whole render
//! passes. The backend therefore records every clear and draw into a frame
//! command list and replays it into passes when `swap_buffers` runs. Each
//! recorded draw owns clones of the wgpu resources it touches, so a replay
//! stays valid even when the disposal queue destroys a handle between the
//! recorded draw and the swap.
//!
//! Shader sources are GLSL with loose `uniform` declarations. Before naga
//! translates a part to WGSL the source is rewritten: non-opaque uniforms
//! move into one uniform block at `binding = 0`, and every `sampler2D`
//! splits into a `texture2D`/`sampler` pair with explicit bindings, sampled
//! through the `sampler2D(t, s)` constructor form. Values written through
//! `apply_uniform` land in a CPU copy of the block; the first draw after a
//! change snapshots that copy into a shared ring buffer, bound at a dynamic
//! offset.
//!
//! Dialect limits: vertex input is the standard tagged textured layout,
//! draws sample at most the texture bound to unit 0, and `bool` uniforms
//! are declared as `int` inside the generated block (WGSL rejects bool in
//! host-shareable memory), so shader bodies must compare them explicitly.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;

use crate::coords::Rect;
use crate::error::RenderError;
use crate::renderer::{
    BlendFactor, BlendOperation, BlendingParameters, ClearInfo, DepthFunction, DepthInfo,
};
use crate::shader::{UniformKind, UniformValue};
use crate::vertex::{TaggedVertex, TexturedVertex};

use super::reflect::scan_uniform_decls;
use super::{
    BufferId, BufferKind, FilterMode, GpuDevice, LinkedProgram, PartId, PartKind, Scissor,
    ShaderId, TextureDesc, TextureId, Topology,
};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const UNIFORM_RING_MIN: u64 = 16 * 1024;

/// Initialization parameters for [`WgpuDevice`].
#[derive(Debug, Clone)]
pub struct WgpuDeviceConfig {
    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    /// Adapter selection preference.
    pub power_preference: wgpu::PowerPreference,

    /// Initial vsync state; changed at runtime through `set_vsync`.
    pub vsync: bool,

    /// Desired maximum frame latency for the surface. A hint; support
    /// depends on platform/backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for WgpuDeviceConfig {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            power_preference: wgpu::PowerPreference::HighPerformance,
            vsync: true,
            desired_maximum_frame_latency: 2,
        }
    }
}

// ── resource records ────────────────────────────────────────────────────────

struct GpuBuffer {
    raw: wgpu::Buffer,
}

struct GpuTexture {
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    raw: wgpu::Texture,
    width: u32,
    height: u32,
}

struct StoredPart {
    name: String,
    kind: PartKind,
    source: String,
}

struct ProgramRecord {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    bind_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    block: Option<BlockLayout>,
    image_slots: u32,
    /// CPU copy of the uniform block. Survives across frames so uniform
    /// values persist the way GL program state does.
    cpu_block: Vec<u8>,
    dirty: bool,
    last_offset: Option<u32>,
}

#[derive(Default)]
struct Resources {
    next_id: u64,
    buffers: HashMap<BufferId, GpuBuffer>,
    textures: HashMap<TextureId, GpuTexture>,
    parts: HashMap<PartId, StoredPart>,
    programs: HashMap<ShaderId, ProgramRecord>,
}

impl Resources {
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Byte layout of a program's generated uniform block.
#[derive(Debug)]
struct BlockLayout {
    fields: HashMap<String, (u32, UniformKind)>,
    size: u32,
}

impl BlockLayout {
    fn compute(members: &[(String, UniformKind)]) -> Option<Self> {
        if members.is_empty() {
            return None;
        }
        let mut fields = HashMap::new();
        let mut cursor = 0u32;
        for (name, kind) in members {
            let (align, size) = std140_extent(*kind);
            cursor = align_up(cursor, align);
            fields.insert(name.clone(), (cursor, *kind));
            cursor += size;
        }
        Some(Self { fields, size: align_up(cursor, 16) })
    }
}

/// Everything the rewrite and layout stages need to know about a program's
/// uniforms, scanned from the same declarations both backends reflect.
#[derive(Debug)]
struct ProgramInterface {
    /// All declared uniforms, for the link result.
    reflected: Vec<(String, UniformKind)>,
    /// Non-opaque uniforms, in block declaration order.
    block_members: Vec<(String, UniformKind)>,
    /// `sampler2D` names, in texture binding order.
    images: Vec<String>,
    block: Option<BlockLayout>,
}

struct UniformRing {
    buffer: wgpu::Buffer,
    capacity: u64,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ShaderId,
    blend: BlendingParameters,
    topology: Topology,
    depth: DepthInfo,
}

// ── frame recording ─────────────────────────────────────────────────────────

enum FrameCmd {
    Clear(ClearInfo),
    Draw(Box<DrawCmd>),
}

struct DrawCmd {
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    program: ShaderId,
    image_slots: u32,
    /// Ring offset and bound size of the uniform block snapshot.
    uniforms: Option<(u32, u32)>,
    texture: Option<(TextureId, wgpu::TextureView, wgpu::Sampler)>,
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    first_index: u32,
    index_count: u32,
    viewport: Rect,
    scissor: Option<Scissor>,
}

struct FrameState {
    cmds: Vec<FrameCmd>,
    /// Uniform block snapshots for this frame, written to the ring at swap.
    staging: Vec<u8>,
    viewport: Rect,
    scissor: Scissor,
    scissor_enabled: bool,
    blend: BlendingParameters,
    depth: DepthInfo,
    program: Option<ShaderId>,
    vertex_buffer: Option<BufferId>,
    index_buffer: Option<BufferId>,
    texture: Option<TextureId>,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            cmds: Vec::new(),
            staging: Vec::new(),
            viewport: Rect::new(0.0, 0.0, 0.0, 0.0),
            scissor: Scissor::default(),
            scissor_enabled: false,
            blend: BlendingParameters::default(),
            depth: DepthInfo::DEFAULT,
            program: None,
            vertex_buffer: None,
            index_buffer: None,
            texture: None,
        }
    }
}

// ── device ──────────────────────────────────────────────────────────────────

/// GPU device backed by a wgpu surface.
///
/// Single-threaded by design: the renderer drives every call from the draw
/// thread, matching the rest of the crate.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: RefCell<wgpu::SurfaceConfiguration>,
    depth_view: RefCell<wgpu::TextureView>,
    resources: RefCell<Resources>,
    pipelines: RefCell<HashMap<PipelineKey, wgpu::RenderPipeline>>,
    frame: RefCell<FrameState>,
    uniform_ring: RefCell<UniformRing>,
    uniform_align: u32,
}

impl WgpuDevice {
    /// Creates a device rendering to `target`, typically an `Arc<Window>`.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        init: WgpuDeviceConfig,
    ) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::DeviceInit {
                reason: "surface has zero size".to_owned(),
            });
        }

        // Use all backends to allow wgpu to select the optimal platform backend.
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(target).map_err(|err| {
            RenderError::DeviceInit { reason: format!("failed to create surface: {err}") }
        })?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| RenderError::DeviceInit {
                reason: format!("no suitable GPU adapter: {err}"),
            })?;
        log::debug!("using adapter '{}'", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("tiamat device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| RenderError::DeviceInit {
                reason: format!("failed to create device/queue: {err}"),
            })?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&surface_caps, init.prefer_srgb).ok_or_else(|| {
            RenderError::DeviceInit { reason: "no supported surface formats".to_owned() }
        })?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: present_mode(init.vsync),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);

        let depth_view = create_depth_view(&device, width, height);
        let uniform_align = device.limits().min_uniform_buffer_offset_alignment.max(16);
        let ring = UniformRing {
            buffer: create_ring_buffer(&device, UNIFORM_RING_MIN),
            capacity: UNIFORM_RING_MIN,
        };

        Ok(Self {
            device,
            queue,
            surface,
            config: RefCell::new(config),
            depth_view: RefCell::new(depth_view),
            resources: RefCell::new(Resources::default()),
            pipelines: RefCell::new(HashMap::new()),
            frame: RefCell::new(FrameState::default()),
            uniform_ring: RefCell::new(ring),
            uniform_align,
        })
    }

    /// Reconfigures the surface after a resize.
    ///
    /// wgpu does not support configuring a surface with a 0x0 size; in that
    /// case configuration is deferred until a later non-zero resize.
    pub fn resize(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let mut config = self.config.borrow_mut();
        config.width = width;
        config.height = height;
        self.surface.configure(&self.device, &config);
        *self.depth_view.borrow_mut() = create_depth_view(&self.device, width, height);
    }

    /// Returns the active surface format.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.borrow().format
    }

    /// Returns the current drawable size in physical pixels.
    pub fn surface_size(&self) -> (u32, u32) {
        let config = self.config.borrow();
        (config.width, config.height)
    }

    fn translate_part(
        &self,
        label: &str,
        kind: PartKind,
        source: &str,
        interface: &ProgramInterface,
    ) -> Result<wgpu::ShaderModule, String> {
        let wgsl = glsl_to_wgsl(kind, source, interface)?;
        Ok(self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        }))
    }

    fn create_layouts(
        &self,
        name: &str,
        interface: &ProgramInterface,
    ) -> (wgpu::BindGroupLayout, wgpu::PipelineLayout) {
        let mut entries = Vec::new();
        if let Some(block) = &interface.block {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(u64::from(block.size)),
                },
                count: None,
            });
        }
        let image_slots = interface.images.len() as u32;
        for slot in 0..image_slots {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + slot,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + image_slots + slot,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }

        let bind_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(name),
                entries: &entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(name),
                bind_group_layouts: &[&bind_layout],
                immediate_size: 0,
            });
        (bind_layout, pipeline_layout)
    }

    fn ensure_pipeline(&self, key: PipelineKey, record: &ProgramRecord) -> wgpu::RenderPipeline {
        if let Some(hit) = self.pipelines.borrow().get(&key) {
            return hit.clone();
        }

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<TaggedVertex<TexturedVertex>>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &TAGGED_VERTEX_ATTRIBUTES,
        };

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("tiamat pipeline"),
                layout: Some(&record.pipeline_layout),

                vertex: wgpu::VertexState {
                    module: &record.vertex,
                    entry_point: Some("main"),
                    compilation_options: Default::default(),
                    buffers: &[vertex_layout],
                },

                fragment: Some(wgpu::FragmentState {
                    module: &record.fragment,
                    entry_point: Some("main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.borrow().format,
                        blend: Some(blend_state(key.blend)),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),

                primitive: wgpu::PrimitiveState {
                    topology: topology_mode(key.topology),
                    strip_index_format: match key.topology {
                        Topology::LineStrip | Topology::TriangleStrip => {
                            Some(wgpu::IndexFormat::Uint16)
                        }
                        _ => None,
                    },
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },

                // Disabling the depth test also stops writes, as GL does.
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: key.depth.depth_test && key.depth.write_depth,
                    depth_compare: if key.depth.depth_test {
                        compare_function(key.depth.function)
                    } else {
                        wgpu::CompareFunction::Always
                    },
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),

                multiview_mask: None,
                cache: None,
            });

        self.pipelines.borrow_mut().insert(key, pipeline.clone());
        pipeline
    }

    fn ensure_ring_capacity(&self, needed: u64) {
        let mut ring = self.uniform_ring.borrow_mut();
        if ring.capacity >= needed {
            return;
        }
        let capacity = needed.next_power_of_two().max(UNIFORM_RING_MIN);
        ring.buffer = create_ring_buffer(&self.device, capacity);
        ring.capacity = capacity;
        log::debug!("uniform ring grown to {capacity} bytes");
    }

    fn handle_surface_error(&self, err: wgpu::SurfaceError) {
        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                let config = self.config.borrow();
                if config.width > 0 && config.height > 0 {
                    self.surface.configure(&self.device, &config);
                }
                log::debug!("surface lost or outdated; reconfigured and frame skipped");
            }
            wgpu::SurfaceError::OutOfMemory => {
                log::error!("surface out of memory; frame skipped");
            }
            wgpu::SurfaceError::Timeout => {
                log::debug!("surface acquire timed out; frame skipped");
            }
            wgpu::SurfaceError::Other => {
                log::warn!("surface error; frame skipped");
            }
        }
    }

    fn replay(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        cmds: &[FrameCmd],
    ) {
        let depth_view = self.depth_view.borrow().clone();
        let ring = self.uniform_ring.borrow().buffer.clone();
        let (frame_width, frame_height) = self.surface_size();
        let mut bind_groups: HashMap<(ShaderId, Option<TextureId>), wgpu::BindGroup> =
            HashMap::new();

        let mut rest = cmds;
        while !rest.is_empty() {
            // A pass is one optional leading clear plus the draws up to the
            // next clear. Back-to-back clears fold aspect-wise, the later
            // one winning where they overlap.
            let mut clear: Option<ClearInfo> = None;
            while let Some(FrameCmd::Clear(info)) = rest.first() {
                clear = Some(match clear {
                    Some(prev) => prev.merged_with(*info),
                    None => *info,
                });
                rest = &rest[1..];
            }
            let draw_count = rest
                .iter()
                .take_while(|cmd| matches!(cmd, FrameCmd::Draw(_)))
                .count();
            let (draws, tail) = rest.split_at(draw_count);
            rest = tail;

            let (color_load, depth_load) = clear_load_ops(clear);

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tiamat frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: color_load, store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    // Depth32Float has no stencil aspect to operate on.
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for cmd in draws {
                let FrameCmd::Draw(draw) = cmd else { continue };
                let Some((vx, vy, vw, vh)) =
                    clamp_viewport(draw.viewport, frame_width as f32, frame_height as f32)
                else {
                    continue;
                };
                let (sx, sy, sw, sh) = match draw.scissor {
                    Some(scissor) => {
                        match clamp_scissor(scissor, frame_width, frame_height) {
                            Some(clamped) => clamped,
                            None => continue,
                        }
                    }
                    None => (0, 0, frame_width, frame_height),
                };

                pass.set_pipeline(&draw.pipeline);
                let key = (draw.program, draw.texture.as_ref().map(|(id, ..)| *id));
                let group = bind_groups
                    .entry(key)
                    .or_insert_with(|| build_bind_group(&self.device, &ring, draw));
                match draw.uniforms {
                    Some((offset, _)) => pass.set_bind_group(0, &*group, &[offset]),
                    None => pass.set_bind_group(0, &*group, &[]),
                }
                pass.set_viewport(vx, vy, vw, vh, 0.0, 1.0);
                pass.set_scissor_rect(sx, sy, sw, sh);
                pass.set_vertex_buffer(0, draw.vertex.slice(..));
                pass.set_index_buffer(draw.index.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(
                    draw.first_index..draw.first_index + draw.index_count,
                    0,
                    0..1,
                );
            }
        }
    }
}

impl GpuDevice for WgpuDevice {
    // wgpu binds the surface and queue itself; there is no context to switch.
    fn make_current(&self) {}

    fn swap_buffers(&self) {
        let (cmds, staging) = {
            let mut frame = self.frame.borrow_mut();
            (std::mem::take(&mut frame.cmds), std::mem::take(&mut frame.staging))
        };
        {
            let mut resources = self.resources.borrow_mut();
            for record in resources.programs.values_mut() {
                record.last_offset = None;
                record.dirty = true;
            }
        }

        if !staging.is_empty() {
            self.ensure_ring_capacity(staging.len() as u64);
            self.queue
                .write_buffer(&self.uniform_ring.borrow().buffer, 0, &staging);
        }

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err) => {
                self.handle_surface_error(err);
                return;
            }
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tiamat frame encoder"),
            });

        self.replay(&mut encoder, &view, &cmds);

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
    }

    fn set_vsync(&self, enabled: bool) {
        let mut config = self.config.borrow_mut();
        let mode = present_mode(enabled);
        if config.present_mode == mode {
            return;
        }
        config.present_mode = mode;
        if config.width > 0 && config.height > 0 {
            self.surface.configure(&self.device, &config);
        }
        log::debug!("present mode changed to {mode:?}");
    }

    fn set_viewport(&self, rect: Rect) {
        self.frame.borrow_mut().viewport = rect;
    }

    fn set_scissor(&self, scissor: Scissor) {
        self.frame.borrow_mut().scissor = scissor;
    }

    fn set_scissor_enabled(&self, enabled: bool) {
        self.frame.borrow_mut().scissor_enabled = enabled;
    }

    fn set_blend(&self, blend: BlendingParameters) {
        self.frame.borrow_mut().blend = blend;
    }

    fn set_depth(&self, depth: DepthInfo) {
        self.frame.borrow_mut().depth = depth;
    }

    fn clear(&self, info: ClearInfo) {
        self.frame.borrow_mut().cmds.push(FrameCmd::Clear(info));
    }

    fn create_buffer(&self, kind: BufferKind, bytes: u64) -> BufferId {
        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };
        let raw = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tiamat buffer"),
            size: bytes,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut resources = self.resources.borrow_mut();
        let buffer = BufferId(resources.fresh_id());
        resources.buffers.insert(buffer, GpuBuffer { raw });
        buffer
    }

    // Writes land before this frame's submit, so a range rewritten after a
    // recorded draw affects that draw too. The batching layer only appends
    // within a frame, which keeps the two models equivalent.
    fn upload_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) {
        let resources = self.resources.borrow();
        let Some(entry) = resources.buffers.get(&buffer) else { return };
        self.queue.write_buffer(&entry.raw, offset, data);
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        self.resources.borrow_mut().buffers.remove(&buffer);
        let mut frame = self.frame.borrow_mut();
        if frame.vertex_buffer == Some(buffer) {
            frame.vertex_buffer = None;
        }
        if frame.index_buffer == Some(buffer) {
            frame.index_buffer = None;
        }
    }

    fn bind_vertex_buffer(&self, buffer: BufferId) {
        self.frame.borrow_mut().vertex_buffer = Some(buffer);
    }

    fn bind_index_buffer(&self, buffer: BufferId) {
        self.frame.borrow_mut().index_buffer = Some(buffer);
    }

    fn create_texture(&self, desc: TextureDesc<'_>) -> TextureId {
        let raw = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = raw.create_view(&wgpu::TextureViewDescriptor::default());
        let filter = match desc.filter {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let mut resources = self.resources.borrow_mut();
        let texture = TextureId(resources.fresh_id());
        resources.textures.insert(
            texture,
            GpuTexture { view, sampler, raw, width: desc.width, height: desc.height },
        );
        texture
    }

    fn upload_texture(&self, texture: TextureId, x: u32, y: u32, width: u32, height: u32, data: &[u8]) {
        if width == 0 || height == 0 {
            return;
        }
        let resources = self.resources.borrow();
        let Some(entry) = resources.textures.get(&texture) else { return };
        debug_assert!(
            x + width <= entry.width && y + height <= entry.height,
            "texture upload outside the allocated surface"
        );
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.raw,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
    }

    fn destroy_texture(&self, texture: TextureId) {
        self.resources.borrow_mut().textures.remove(&texture);
        let mut frame = self.frame.borrow_mut();
        if frame.texture == Some(texture) {
            frame.texture = None;
        }
    }

    fn bind_texture(&self, texture: TextureId, unit: u32) {
        debug_assert_eq!(unit, 0, "the wgpu backend samples from unit 0 only");
        self.frame.borrow_mut().texture = Some(texture);
    }

    fn compile_part(&self, name: &str, kind: PartKind, source: &str) -> Result<PartId, String> {
        // Translate now, on the part's own declarations, so authoring errors
        // surface against the part that caused them. Link repeats the
        // translation with the union interface.
        let interface = scan_interface(&[(name.to_owned(), source.to_owned())])?;
        glsl_to_wgsl(kind, source, &interface)?;

        let mut resources = self.resources.borrow_mut();
        let part = PartId(resources.fresh_id());
        resources.parts.insert(
            part,
            StoredPart { name: name.to_owned(), kind, source: source.to_owned() },
        );
        log::trace!("compiled {kind:?} part '{name}'");
        Ok(part)
    }

    fn link_program(&self, name: &str, parts: &[PartId]) -> Result<LinkedProgram, String> {
        let mut vertex_source = None;
        let mut fragment_source = None;
        let mut scanned = Vec::new();
        {
            let resources = self.resources.borrow();
            for id in parts {
                let Some(part) = resources.parts.get(id) else {
                    return Err(format!("part {id:?} was never compiled"));
                };
                scanned.push((part.name.clone(), part.source.clone()));
                match part.kind {
                    PartKind::Vertex => vertex_source = Some(part.source.clone()),
                    PartKind::Fragment => fragment_source = Some(part.source.clone()),
                }
            }
        }
        let Some(vertex_source) = vertex_source else {
            return Err("program has no vertex part".to_owned());
        };
        let Some(fragment_source) = fragment_source else {
            return Err("program has no fragment part".to_owned());
        };

        let interface = scan_interface(&scanned)?;
        let vertex = self.translate_part(name, PartKind::Vertex, &vertex_source, &interface)?;
        let fragment =
            self.translate_part(name, PartKind::Fragment, &fragment_source, &interface)?;
        let (bind_layout, pipeline_layout) = self.create_layouts(name, &interface);

        let cpu_block = vec![0u8; interface.block.as_ref().map_or(0, |b| b.size as usize)];
        let mut resources = self.resources.borrow_mut();
        let program = ShaderId(resources.fresh_id());
        resources.programs.insert(
            program,
            ProgramRecord {
                vertex,
                fragment,
                bind_layout,
                pipeline_layout,
                block: interface.block,
                image_slots: interface.images.len() as u32,
                cpu_block,
                dirty: true,
                last_offset: None,
            },
        );
        log::debug!("linked program '{name}' with {} uniforms", interface.reflected.len());
        Ok(LinkedProgram { program, uniforms: interface.reflected })
    }

    fn destroy_program(&self, program: ShaderId) {
        self.resources.borrow_mut().programs.remove(&program);
        self.pipelines.borrow_mut().retain(|key, _| key.program != program);
        let mut frame = self.frame.borrow_mut();
        if frame.program == Some(program) {
            frame.program = None;
        }
    }

    fn bind_program(&self, program: ShaderId) {
        self.frame.borrow_mut().program = Some(program);
    }

    fn apply_uniform(&self, program: ShaderId, name: &str, value: UniformValue) {
        // Texture bindings come from the bound unit; unit indices carried by
        // sampler uniforms have no block slot.
        if matches!(value, UniformValue::Sampler(_)) {
            return;
        }
        let mut resources = self.resources.borrow_mut();
        let Some(record) = resources.programs.get_mut(&program) else { return };
        let Some(block) = &record.block else { return };
        let Some(&(offset, _)) = block.fields.get(name) else {
            debug_assert!(false, "uniform '{name}' has no slot in the generated block");
            return;
        };
        write_std140(&mut record.cpu_block, offset, &value);
        record.dirty = true;
    }

    fn draw_indexed(&self, topology: Topology, first_index: u32, index_count: u32) {
        if index_count == 0 {
            return;
        }
        let mut frame = self.frame.borrow_mut();
        let frame = &mut *frame;
        let (Some(program_id), Some(vertex_id), Some(index_id)) =
            (frame.program, frame.vertex_buffer, frame.index_buffer)
        else {
            debug_assert!(false, "draw_indexed called without a bound program and buffers");
            return;
        };
        if frame.scissor_enabled && (frame.scissor.width == 0 || frame.scissor.height == 0) {
            return;
        }

        let mut resources = self.resources.borrow_mut();
        let resources = &mut *resources;
        let (Some(record), Some(vertex), Some(index)) = (
            resources.programs.get_mut(&program_id),
            resources.buffers.get(&vertex_id),
            resources.buffers.get(&index_id),
        ) else {
            debug_assert!(false, "draw_indexed against destroyed resources");
            return;
        };

        let texture = frame.texture.and_then(|id| {
            resources
                .textures
                .get(&id)
                .map(|entry| (id, entry.view.clone(), entry.sampler.clone()))
        });
        if record.image_slots > 0 && texture.is_none() {
            debug_assert!(false, "draw_indexed needs a bound texture for a sampling program");
            return;
        }

        let uniforms = if let Some(block) = &record.block {
            if record.dirty || record.last_offset.is_none() {
                let offset = frame.staging.len() as u32;
                frame.staging.extend_from_slice(&record.cpu_block);
                let padded = align_up(frame.staging.len() as u32, self.uniform_align);
                frame.staging.resize(padded as usize, 0);
                record.last_offset = Some(offset);
                record.dirty = false;
            }
            Some((record.last_offset.unwrap_or(0), block.size))
        } else {
            None
        };

        let key = PipelineKey {
            program: program_id,
            blend: frame.blend,
            topology,
            depth: frame.depth,
        };
        let pipeline = self.ensure_pipeline(key, record);

        frame.cmds.push(FrameCmd::Draw(Box::new(DrawCmd {
            pipeline,
            bind_layout: record.bind_layout.clone(),
            program: program_id,
            image_slots: record.image_slots,
            uniforms,
            texture,
            vertex: vertex.raw.clone(),
            index: index.raw.clone(),
            first_index,
            index_count,
            viewport: frame.viewport,
            scissor: frame.scissor_enabled.then_some(frame.scissor),
        })));
    }
}

// ── GLSL rewriting and translation ──────────────────────────────────────────

/// Scans the union of uniform declarations across parts, rejecting
/// kind conflicts, and derives the block and image binding assignments.
fn scan_interface(parts: &[(String, String)]) -> Result<ProgramInterface, String> {
    let mut kinds: BTreeMap<String, UniformKind> = BTreeMap::new();
    for (part_name, source) in parts {
        for (name, kind) in scan_uniform_decls(source) {
            match kinds.get(&name) {
                Some(&existing) if existing != kind => {
                    return Err(format!(
                        "uniform '{name}' declared as {existing:?} in one part and {kind:?} in '{part_name}'"
                    ));
                }
                _ => {
                    kinds.insert(name, kind);
                }
            }
        }
    }

    let reflected: Vec<(String, UniformKind)> =
        kinds.iter().map(|(name, kind)| (name.clone(), *kind)).collect();
    let block_members: Vec<(String, UniformKind)> = kinds
        .iter()
        .filter(|(_, kind)| **kind != UniformKind::Sampler)
        .map(|(name, kind)| (name.clone(), *kind))
        .collect();
    let images: Vec<String> = kinds
        .iter()
        .filter(|(_, kind)| **kind == UniformKind::Sampler)
        .map(|(name, _)| name.clone())
        .collect();
    let block = BlockLayout::compute(&block_members);

    Ok(ProgramInterface { reflected, block_members, images, block })
}

/// Rewrites the loose-uniform dialect into naga's GLSL dialect: one bound
/// uniform block plus split texture/sampler pairs.
fn rewrite_for_naga(source: &str, interface: &ProgramInterface) -> String {
    let mut out = String::with_capacity(source.len() + 256);
    let mut block_pending = !interface.block_members.is_empty();
    if block_pending && !source.trim_start().starts_with("#version") {
        push_block_decl(&mut out, &interface.block_members);
        block_pending = false;
    }

    for line in source.lines() {
        match scan_uniform_decls(line).pop() {
            // Loose non-opaque uniform: replaced by the block.
            Some((_, kind)) if kind != UniformKind::Sampler => continue,
            Some((name, _)) => {
                if let Some(slot) = interface.images.iter().position(|n| *n == name) {
                    let image_binding = 1 + slot;
                    let sampler_binding = 1 + interface.images.len() + slot;
                    out.push_str(&format!(
                        "layout(set = 0, binding = {image_binding}) uniform texture2D {name};\n"
                    ));
                    out.push_str(&format!(
                        "layout(set = 0, binding = {sampler_binding}) uniform sampler {name}_sampler;\n"
                    ));
                    continue;
                }
                out.push_str(line);
                out.push('\n');
            }
            None => {
                out.push_str(line);
                out.push('\n');
            }
        }
        if block_pending && line.trim_start().starts_with("#version") {
            push_block_decl(&mut out, &interface.block_members);
            block_pending = false;
        }
    }

    for name in &interface.images {
        let call = format!("texture({name},");
        let split = format!("texture(sampler2D({name}, {name}_sampler),");
        out = out.replace(&call, &split);
    }
    out
}

fn push_block_decl(out: &mut String, members: &[(String, UniformKind)]) {
    out.push_str("layout(set = 0, binding = 0) uniform tiamat_Globals {\n");
    for (name, kind) in members {
        out.push_str("    ");
        out.push_str(block_member_glsl(*kind));
        out.push(' ');
        out.push_str(name);
        out.push_str(";\n");
    }
    out.push_str("};\n");
}

fn block_member_glsl(kind: UniformKind) -> &'static str {
    match kind {
        UniformKind::Bool | UniformKind::Int => "int",
        UniformKind::Float => "float",
        UniformKind::Vec2 => "vec2",
        UniformKind::Vec3 => "vec3",
        UniformKind::Vec4 => "vec4",
        UniformKind::Mat3 => "mat3",
        UniformKind::Mat4 => "mat4",
        // Samplers never enter the block; the filter above keeps them out.
        UniformKind::Sampler => "int",
    }
}

fn glsl_to_wgsl(kind: PartKind, source: &str, interface: &ProgramInterface) -> Result<String, String> {
    let rewritten = rewrite_for_naga(source, interface);
    let stage = match kind {
        PartKind::Vertex => naga::ShaderStage::Vertex,
        PartKind::Fragment => naga::ShaderStage::Fragment,
    };

    let options = naga::front::glsl::Options { stage, defines: naga::FastHashMap::default() };
    let mut frontend = naga::front::glsl::Frontend::default();
    let module = frontend
        .parse(&options, &rewritten)
        .map_err(|errors| format!("GLSL parse error:\n{errors}"))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let module_info = validator
        .validate(&module)
        .map_err(|err| format!("validation error: {err}"))?;

    naga::back::wgsl::write_string(
        &module,
        &module_info,
        naga::back::wgsl::WriterFlags::empty(),
    )
    .map_err(|err| format!("WGSL generation error: {err}"))
}

// ── std140 block layout ─────────────────────────────────────────────────────

/// Alignment and size of a block member. Matrix columns pad out to 16
/// bytes, which is also what WGSL requires in uniform memory.
fn std140_extent(kind: UniformKind) -> (u32, u32) {
    match kind {
        UniformKind::Bool | UniformKind::Int | UniformKind::Float => (4, 4),
        UniformKind::Vec2 => (8, 8),
        UniformKind::Vec3 => (16, 12),
        UniformKind::Vec4 => (16, 16),
        UniformKind::Mat3 => (16, 48),
        UniformKind::Mat4 => (16, 64),
        UniformKind::Sampler => (4, 0),
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

fn write_std140(block: &mut [u8], offset: u32, value: &UniformValue) {
    let at = offset as usize;
    match value {
        UniformValue::Bool(v) => {
            block[at..at + 4].copy_from_slice(&i32::from(*v).to_le_bytes());
        }
        UniformValue::Int(v) => block[at..at + 4].copy_from_slice(&v.to_le_bytes()),
        UniformValue::Float(v) => block[at..at + 4].copy_from_slice(&v.to_le_bytes()),
        UniformValue::Vec2(v) => block[at..at + 8].copy_from_slice(bytemuck::cast_slice(v)),
        UniformValue::Vec3(v) => block[at..at + 12].copy_from_slice(bytemuck::cast_slice(v)),
        UniformValue::Vec4(v) => block[at..at + 16].copy_from_slice(bytemuck::cast_slice(v)),
        UniformValue::Mat3(m) => {
            for column in 0..3 {
                let base = at + column * 16;
                block[base..base + 12]
                    .copy_from_slice(bytemuck::cast_slice(&m[column * 3..column * 3 + 3]));
            }
        }
        UniformValue::Mat4(m) => {
            block[at..at + 64].copy_from_slice(bytemuck::cast_slice(m));
        }
        UniformValue::Sampler(_) => {}
    }
}

// ── free helpers ────────────────────────────────────────────────────────────

const TAGGED_VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x4,
    2 => Float32x2,
    15 => Float32
];

fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if caps.formats.contains(&f) {
                return Some(f);
            }
        }
    }

    Some(caps.formats[0])
}

fn present_mode(vsync: bool) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::AutoVsync
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("tiamat depth target"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_ring_buffer(device: &wgpu::Device, capacity: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("tiamat uniform ring"),
        size: capacity,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn build_bind_group(
    device: &wgpu::Device,
    ring: &wgpu::Buffer,
    draw: &DrawCmd,
) -> wgpu::BindGroup {
    let mut entries = Vec::new();
    if let Some((_, size)) = draw.uniforms {
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: ring,
                offset: 0,
                size: NonZeroU64::new(u64::from(size)),
            }),
        });
    }
    if let Some((_, view, sampler)) = &draw.texture {
        for slot in 0..draw.image_slots {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + slot,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + draw.image_slots + slot,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
    }
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("tiamat draw bindings"),
        layout: &draw.bind_layout,
        entries: &entries,
    })
}

fn blend_state(blend: BlendingParameters) -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(blend.src),
            dst_factor: blend_factor(blend.dst),
            operation: blend_operation(blend.rgb_operation),
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(blend.src_alpha),
            dst_factor: blend_factor(blend.dst_alpha),
            operation: blend_operation(blend.alpha_operation),
        },
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
    }
}

fn blend_operation(operation: BlendOperation) -> wgpu::BlendOperation {
    match operation {
        BlendOperation::Add => wgpu::BlendOperation::Add,
        BlendOperation::Subtract => wgpu::BlendOperation::Subtract,
        BlendOperation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOperation::Min => wgpu::BlendOperation::Min,
        BlendOperation::Max => wgpu::BlendOperation::Max,
    }
}

fn compare_function(function: DepthFunction) -> wgpu::CompareFunction {
    match function {
        DepthFunction::Never => wgpu::CompareFunction::Never,
        DepthFunction::LessThan => wgpu::CompareFunction::Less,
        DepthFunction::LessThanOrEqual => wgpu::CompareFunction::LessEqual,
        DepthFunction::Equal => wgpu::CompareFunction::Equal,
        DepthFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        DepthFunction::GreaterThan => wgpu::CompareFunction::Greater,
        DepthFunction::GreaterThanOrEqual => wgpu::CompareFunction::GreaterEqual,
        DepthFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn topology_mode(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Points => wgpu::PrimitiveTopology::PointList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn clamp_viewport(rect: Rect, max_width: f32, max_height: f32) -> Option<(f32, f32, f32, f32)> {
    let x = rect.origin.x.clamp(0.0, max_width);
    let y = rect.origin.y.clamp(0.0, max_height);
    let right = (rect.origin.x + rect.size.x).clamp(x, max_width);
    let bottom = (rect.origin.y + rect.size.y).clamp(y, max_height);
    let (width, height) = (right - x, bottom - y);
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    Some((x, y, width, height))
}

fn clamp_scissor(scissor: Scissor, max_width: u32, max_height: u32) -> Option<(u32, u32, u32, u32)> {
    let x = scissor.x.min(max_width);
    let y = scissor.y.min(max_height);
    let width = scissor.width.min(max_width - x);
    let height = scissor.height.min(max_height - y);
    if width == 0 || height == 0 {
        return None;
    }
    Some((x, y, width, height))
}

/// Load ops for a pass's colour and depth attachments. Only the aspects
/// the clear flags name are cleared; the stencil value has no attachment
/// to land on (the depth target is `Depth32Float`) and records nothing.
fn clear_load_ops(clear: Option<ClearInfo>) -> (wgpu::LoadOp<wgpu::Color>, wgpu::LoadOp<f32>) {
    let Some(info) = clear else {
        return (wgpu::LoadOp::Load, wgpu::LoadOp::Load);
    };
    let color = if info.clear_color {
        wgpu::LoadOp::Clear(wgpu::Color {
            r: f64::from(info.color.r),
            g: f64::from(info.color.g),
            b: f64::from(info.color.b),
            a: f64::from(info.color.a),
        })
    } else {
        wgpu::LoadOp::Load
    };
    let depth = if info.clear_depth {
        wgpu::LoadOp::Clear(info.depth)
    } else {
        wgpu::LoadOp::Load
    };
    (color, depth)
}

// ── tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn interface_of(sources: &[(&str, &str)]) -> ProgramInterface {
        let parts: Vec<(String, String)> = sources
            .iter()
            .map(|(name, source)| ((*name).to_owned(), (*source).to_owned()))
            .collect();
        scan_interface(&parts).unwrap()
    }

    #[test]
    fn std140_offsets_respect_member_alignment() {
        let members = vec![
            ("a".to_owned(), UniformKind::Mat3),
            ("b".to_owned(), UniformKind::Vec3),
            ("c".to_owned(), UniformKind::Float),
            ("d".to_owned(), UniformKind::Vec2),
        ];
        let block = BlockLayout::compute(&members).unwrap();
        assert_eq!(block.fields["a"].0, 0);
        assert_eq!(block.fields["b"].0, 48);
        // A scalar packs into the tail of the preceding vec3.
        assert_eq!(block.fields["c"].0, 60);
        assert_eq!(block.fields["d"].0, 64);
        assert_eq!(block.size, 80);
    }

    #[test]
    fn mat3_columns_are_written_at_sixteen_byte_stride() {
        let members = vec![("m".to_owned(), UniformKind::Mat3)];
        let block = BlockLayout::compute(&members).unwrap();
        let mut bytes = vec![0u8; block.size as usize];

        let matrix = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        write_std140(&mut bytes, 0, &UniformValue::Mat3(matrix));

        let column_one: &[f32] = bytemuck::cast_slice(&bytes[16..28]);
        assert_eq!(column_one, &[4.0, 5.0, 6.0]);
        let pad: &[f32] = bytemuck::cast_slice(&bytes[12..16]);
        assert_eq!(pad, &[0.0]);
    }

    #[test]
    fn loose_uniforms_move_into_one_bound_block() {
        let source = "#version 450\n\nuniform mat4 g_Proj;\nuniform bool g_Flag;\n\nvoid main()\n{\n    gl_Position = g_Proj * vec4(0.0);\n}\n";
        let interface = interface_of(&[("t.vs", source)]);
        let rewritten = rewrite_for_naga(source, &interface);

        assert!(!rewritten.contains("uniform mat4"));
        assert!(!rewritten.contains("uniform bool"));
        assert!(rewritten.contains("layout(set = 0, binding = 0) uniform tiamat_Globals {"));
        assert!(rewritten.contains("    mat4 g_Proj;"));
        assert!(rewritten.contains("    int g_Flag;"));
        // The block lands after the version directive.
        assert!(rewritten.find("#version").unwrap() < rewritten.find("tiamat_Globals").unwrap());
    }

    #[test]
    fn samplers_split_into_bound_texture_and_sampler_pairs() {
        let source = "#version 450\nuniform sampler2D m_Texture;\nuniform float fade;\nlayout(location = 0) out vec4 color;\nvoid main()\n{\n    color = texture(m_Texture, vec2(0.5)) * fade;\n}\n";
        let interface = interface_of(&[("t.fs", source)]);
        let rewritten = rewrite_for_naga(source, &interface);

        assert!(rewritten.contains("layout(set = 0, binding = 1) uniform texture2D m_Texture;"));
        assert!(
            rewritten.contains("layout(set = 0, binding = 2) uniform sampler m_Texture_sampler;")
        );
        assert!(rewritten.contains("texture(sampler2D(m_Texture, m_Texture_sampler), vec2(0.5))"));
        assert!(!rewritten.contains("uniform sampler2D"));
    }

    #[test]
    fn two_samplers_bind_images_before_samplers() {
        let source = "#version 450\nuniform sampler2D b_Tex;\nuniform sampler2D a_Tex;\nvoid main() {}\n";
        let interface = interface_of(&[("t.fs", source)]);
        let rewritten = rewrite_for_naga(source, &interface);

        assert!(rewritten.contains("layout(set = 0, binding = 1) uniform texture2D a_Tex;"));
        assert!(rewritten.contains("layout(set = 0, binding = 2) uniform texture2D b_Tex;"));
        assert!(rewritten.contains("layout(set = 0, binding = 3) uniform sampler a_Tex_sampler;"));
        assert!(rewritten.contains("layout(set = 0, binding = 4) uniform sampler b_Tex_sampler;"));
    }

    #[test]
    fn conflicting_kinds_across_parts_fail_the_scan() {
        let parts = vec![
            ("a.vs".to_owned(), "uniform float g_X;\n".to_owned()),
            ("b.fs".to_owned(), "uniform vec2 g_X;\n".to_owned()),
        ];
        let err = scan_interface(&parts).unwrap_err();
        assert!(err.contains("g_X"));
        assert!(err.contains("b.fs"));
    }

    #[test]
    fn rewritten_pair_translates_to_wgsl() {
        let vertex = "#version 450\n\nuniform mat4 mvp;\n\nlayout(location = 0) in vec2 pos;\nlayout(location = 0) out vec2 v_uv;\n\nvoid main()\n{\n    v_uv = pos;\n    gl_Position = mvp * vec4(pos, 0.0, 1.0);\n}\n";
        let fragment = "#version 450\n\nuniform mat4 mvp;\nuniform sampler2D tex;\nuniform float fade;\n\nlayout(location = 0) in vec2 v_uv;\nlayout(location = 0) out vec4 color;\n\nvoid main()\n{\n    color = texture(tex, v_uv) * fade;\n}\n";
        let interface = interface_of(&[("t.vs", vertex), ("t.fs", fragment)]);

        let vs = glsl_to_wgsl(PartKind::Vertex, vertex, &interface).unwrap();
        let fs = glsl_to_wgsl(PartKind::Fragment, fragment, &interface).unwrap();

        assert!(vs.contains("@group(0) @binding(0)"));
        assert!(fs.contains("@group(0) @binding(1)"));
        assert!(fs.contains("@group(0) @binding(2)"));
    }

    #[test]
    fn blending_and_depth_map_onto_wgpu_state() {
        let state = blend_state(BlendingParameters::MIXTURE);
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(state.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
        assert_eq!(state.alpha.operation, wgpu::BlendOperation::Add);

        assert_eq!(compare_function(DepthFunction::LessThan), wgpu::CompareFunction::Less);
        assert_eq!(topology_mode(Topology::Triangles), wgpu::PrimitiveTopology::TriangleList);
    }

    #[test]
    fn scissors_and_viewports_clamp_to_the_surface() {
        assert_eq!(
            clamp_scissor(Scissor { x: 10, y: 10, width: 100, height: 100 }, 64, 64),
            Some((10, 10, 54, 54))
        );
        assert_eq!(
            clamp_scissor(Scissor { x: 80, y: 0, width: 10, height: 10 }, 64, 64),
            None
        );

        let rect = Rect::new(-20.0, -20.0, 840.0, 640.0);
        assert_eq!(clamp_viewport(rect, 800.0, 600.0), Some((0.0, 0.0, 800.0, 600.0)));
        assert_eq!(clamp_viewport(Rect::new(0.0, 0.0, 0.0, 0.0), 800.0, 600.0), None);
    }

    #[test]
    fn clears_map_onto_per_aspect_load_ops() {
        use crate::coords::ColorRgba;

        assert_eq!(clear_load_ops(None), (wgpu::LoadOp::Load, wgpu::LoadOp::Load));

        let (color, depth) = clear_load_ops(Some(ClearInfo::color_only(ColorRgba::white())));
        assert_eq!(color, wgpu::LoadOp::Clear(wgpu::Color::WHITE));
        assert_eq!(depth, wgpu::LoadOp::Load);

        let (color, depth) = clear_load_ops(Some(ClearInfo::depth_only(0.5)));
        assert_eq!(color, wgpu::LoadOp::Load);
        assert_eq!(depth, wgpu::LoadOp::Clear(0.5));
    }
}
