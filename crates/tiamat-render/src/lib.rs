//! A GPU rendering core with stacked draw state, batched vertex
//! submission, and draw-thread-deferred resource disposal.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use tiamat_render::prelude::*;
//!
//! let device = pollster::block_on(WgpuDevice::new(window, width, height, WgpuDeviceConfig::default()))?;
//! let ctx = RenderContext::new(Rc::new(device));
//! let mut renderer = Renderer::new(Rc::clone(&ctx));
//! let shaders = ShaderStore::new(Rc::clone(&ctx));
//! let shader = shaders.load_texture_shader()?;
//!
//! // Each frame:
//! renderer.reset_state(Vec2::new(width, height));
//! renderer.clear(ClearInfo::new(ColorRgba::black()));
//! shader.bind()?;
//! texture.draw_quad(&mut renderer, Rect::new(10.0, 10.0, 64.0, 64.0), ColorRgba::white());
//! renderer.finish_frame();
//! ```
//!
//! State pushed between [`reset_state`](renderer::Renderer::reset_state) and
//! [`finish_frame`](renderer::Renderer::finish_frame) must pop before the
//! frame ends; geometry submitted through textures is batched and flushed
//! automatically whenever observable GPU state is about to change.

pub mod context;
pub mod coords;
pub mod device;
pub mod disposal;
pub mod error;
pub mod logging;
pub mod node;
pub mod renderer;
pub mod shader;
pub mod stats;
pub mod texture;
pub mod vertex;

/// The types almost every integration needs.
pub mod prelude {
    pub use crate::context::RenderContext;
    pub use crate::coords::{ColorRgba, Rect, Vec2};
    pub use crate::device::{FilterMode, GpuDevice, WgpuDevice, WgpuDeviceConfig};
    pub use crate::error::RenderError;
    pub use crate::logging::{LoggingConfig, init_logging};
    pub use crate::node::{CompositeNode, ContainerDrawNode, DrawNode};
    pub use crate::renderer::{BlendingParameters, ClearInfo, DepthInfo, MaskingInfo, Renderer};
    pub use crate::shader::{ShaderStore, Uniform, UniformManifest};
    pub use crate::texture::{Texture, TextureAtlas, TextureUpload};
}
