//! Vertex layouts accepted by [`VertexBuffer`](super::VertexBuffer).

use bytemuck::{Pod, Zeroable};

use crate::coords::{ColorRgba, Vec2};

/// Marker for types that can live in a vertex buffer.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with every field a 4-byte-aligned
/// scalar or array of scalars, so that appending the depth tag in
/// [`TaggedVertex`] introduces no padding. The blanket `Pod` impl for
/// `TaggedVertex` relies on this; a type with trailing padding would let
/// uninitialized bytes reach `bytemuck::cast_slice`.
pub unsafe trait Vertex: Pod + PartialEq + 'static {}

/// The standard textured vertex: position, straight-alpha color, UV.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
    pub tex_coord: [f32; 2],
}

impl TexturedVertex {
    #[inline]
    pub fn new(position: Vec2, color: ColorRgba, tex_coord: Vec2) -> Self {
        Self {
            position: [position.x, position.y],
            color: color.to_array(),
            tex_coord: [tex_coord.x, tex_coord.y],
        }
    }
}

// Safety: #[repr(C)], all fields are f32 arrays.
unsafe impl Vertex for TexturedVertex {}

/// A vertex with the draw-depth tag appended as a trailing attribute.
///
/// Buffers store these rather than bare vertices; the tag is stamped from
/// the context's current draw depth at write time and participates in
/// change detection, so re-submitting identical geometry at a new depth
/// still dirties the span.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedVertex<V: Vertex> {
    pub vertex: V,
    pub depth: f32,
}

// Safety: the Vertex safety contract guarantees V is Pod with 4-byte-aligned
// fields, so the trailing f32 starts exactly at size_of::<V>() and the
// struct has no padding bytes.
unsafe impl<V: Vertex> Zeroable for TaggedVertex<V> {}
unsafe impl<V: Vertex> Pod for TaggedVertex<V> {}

// ── tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_vertex_has_no_padding() {
        assert_eq!(
            std::mem::size_of::<TaggedVertex<TexturedVertex>>(),
            std::mem::size_of::<TexturedVertex>() + 4,
        );
    }

    #[test]
    fn textured_vertex_stride() {
        assert_eq!(std::mem::size_of::<TexturedVertex>(), 32);
        assert_eq!(std::mem::size_of::<TaggedVertex<TexturedVertex>>(), 36);
    }
}
