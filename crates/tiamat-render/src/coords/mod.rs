//! Coordinate and geometry types shared across the rendering core.
//!
//! Canonical CPU space:
//! - Logical pixels
//! - Origin top-left
//! - +X right, +Y down
//!
//! Projection to NDC happens in shaders through the projection matrix
//! carried as a global uniform.

mod color;
mod rect;
mod vec2;

pub use color::ColorRgba;
pub use rect::Rect;
pub use vec2::Vec2;
