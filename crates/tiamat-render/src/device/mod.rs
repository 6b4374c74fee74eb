//! Graphics device abstraction.
//!
//! The rendering core talks to exactly one [`GpuDevice`] object, which
//! bundles context/present operations with state, resource, and draw
//! operations. Supplying a single device value is what pairs a window with
//! a graphics backend; mismatched pairings are not representable.
//!
//! Two implementations ship:
//! - [`NullDevice`] records every call for tests and headless use.
//! - [`WgpuDevice`] renders through wgpu, translating shader sources with
//!   naga and replaying recorded draws into render passes at present time.

mod null;
pub(crate) mod reflect;
mod wgpu;

pub use null::{DeviceOp, NullDevice};
pub use wgpu::{WgpuDevice, WgpuDeviceConfig};

use crate::coords::Rect;
use crate::renderer::{BlendingParameters, ClearInfo, DepthInfo};
use crate::shader::{UniformKind, UniformValue};

// ── handles ───────────────────────────────────────────────────────────────

/// Device-side vertex or index buffer handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Device-side texture storage handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Device-side linked program handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u64);

/// Device-side compiled shader part handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PartId(pub u64);

// ── vocabulary ────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PartKind {
    Vertex,
    Fragment,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Scissor rectangle in physical pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Scissor {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Texture storage description. Pixel data is always tightly packed RGBA8.
#[derive(Debug, Copy, Clone)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub filter: FilterMode,
}

/// Result of linking a program: the handle plus the reflected active
/// uniform list the shader layer validates its manifest against.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub program: ShaderId,
    pub uniforms: Vec<(String, UniformKind)>,
}

// ── device trait ──────────────────────────────────────────────────────────

/// The complete backend surface the rendering core draws through.
///
/// All methods take `&self`; implementations use interior mutability. The
/// core only ever calls these from the thread that owns the render context
/// (the types holding a device are not `Send`), except through the disposal
/// queue, which forwards deferred actions back onto that thread.
///
/// Part compile and program link report failure as the raw backend log;
/// the shader layer wraps these into named errors.
pub trait GpuDevice {
    // ── context ──
    fn make_current(&self);
    fn swap_buffers(&self);
    fn set_vsync(&self, enabled: bool);

    // ── global state ──
    fn set_viewport(&self, rect: Rect);
    fn set_scissor(&self, scissor: Scissor);
    fn set_scissor_enabled(&self, enabled: bool);
    fn set_blend(&self, blend: BlendingParameters);
    fn set_depth(&self, depth: DepthInfo);
    fn clear(&self, clear: ClearInfo);

    // ── buffers ──
    fn create_buffer(&self, kind: BufferKind, bytes: u64) -> BufferId;
    fn upload_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]);
    fn destroy_buffer(&self, buffer: BufferId);
    fn bind_vertex_buffer(&self, buffer: BufferId);
    fn bind_index_buffer(&self, buffer: BufferId);

    // ── textures ──
    fn create_texture(&self, desc: TextureDesc<'_>) -> TextureId;
    fn upload_texture(&self, texture: TextureId, x: u32, y: u32, width: u32, height: u32, data: &[u8]);
    fn destroy_texture(&self, texture: TextureId);
    fn bind_texture(&self, texture: TextureId, unit: u32);

    // ── shaders ──
    fn compile_part(&self, name: &str, kind: PartKind, source: &str) -> Result<PartId, String>;
    fn link_program(&self, name: &str, parts: &[PartId]) -> Result<LinkedProgram, String>;
    fn destroy_program(&self, program: ShaderId);
    fn bind_program(&self, program: ShaderId);
    fn apply_uniform(&self, program: ShaderId, name: &str, value: UniformValue);

    // ── draws ──
    fn draw_indexed(&self, topology: Topology, first_index: u32, index_count: u32);
}
