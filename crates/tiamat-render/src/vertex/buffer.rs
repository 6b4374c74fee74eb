//! Fixed-capacity vertex buffers with change detection.

use std::rc::Rc;

use bytemuck::Zeroable;

use crate::context::RenderContext;
use crate::device::{BufferId, BufferKind, Topology};

use super::index::{IndexKind, MAX_INDEXED_VERTICES};
use super::types::{TaggedVertex, Vertex};

/// A CPU-mirrored vertex array of fixed capacity.
///
/// Writes go through [`set_vertex`](Self::set_vertex), which tags the vertex
/// with the context's current draw depth, compares against the stored copy,
/// and widens the dirty span only on a real change. [`draw`](Self::draw)
/// lazily creates device storage, uploads just the dirty span, binds buffers
/// only when the context says they are not already bound, and issues one
/// indexed draw.
pub struct VertexBuffer<V: Vertex> {
    ctx: Rc<RenderContext>,
    topology: Topology,
    index_kind: IndexKind,
    vertices: Vec<TaggedVertex<V>>,
    buffer: Option<BufferId>,
    dirty_min: usize,
    dirty_max: usize,
    index_generation: u64,
}

impl<V: Vertex> VertexBuffer<V> {
    /// A buffer drawn with sequential indices.
    pub fn linear(ctx: Rc<RenderContext>, capacity: usize, topology: Topology) -> Self {
        Self::with_layout(ctx, capacity, topology, IndexKind::Linear)
    }

    /// A buffer of `quad_count` quads (four vertices each, ordered top-left,
    /// top-right, bottom-right, bottom-left), drawn as triangles through the
    /// shared quad index cache.
    pub fn quads(ctx: Rc<RenderContext>, quad_count: usize) -> Self {
        Self::with_layout(ctx, quad_count * 4, Topology::Triangles, IndexKind::Quad)
    }

    fn with_layout(
        ctx: Rc<RenderContext>,
        capacity: usize,
        topology: Topology,
        index_kind: IndexKind,
    ) -> Self {
        debug_assert!(capacity > 0, "vertex buffer capacity must be non-zero");
        debug_assert!(capacity <= MAX_INDEXED_VERTICES, "vertex buffer capacity exceeds 16-bit index range");
        debug_assert!(
            index_kind != IndexKind::Quad || capacity % 4 == 0,
            "quad buffer capacity must be a multiple of 4"
        );
        debug_assert_eq!(
            std::mem::size_of::<TaggedVertex<V>>(),
            std::mem::size_of::<V>() + 4,
            "vertex type must have 4-byte-aligned fields and no tail padding"
        );

        Self {
            ctx,
            topology,
            index_kind,
            vertices: vec![TaggedVertex::zeroed(); capacity],
            buffer: None,
            dirty_min: usize::MAX,
            dirty_max: 0,
            index_generation: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    fn stride() -> usize {
        std::mem::size_of::<TaggedVertex<V>>()
    }

    /// Writes `vertex` at `index`, tagged with the current draw depth.
    /// Returns whether anything actually changed. Panics when `index` is out
    /// of range.
    pub fn set_vertex(&mut self, index: usize, vertex: V) -> bool {
        assert!(
            index < self.vertices.len(),
            "vertex index {index} out of range (capacity {})",
            self.vertices.len()
        );

        let tagged = TaggedVertex { vertex, depth: self.ctx.draw_depth() };
        if self.vertices[index] == tagged {
            return false;
        }

        self.vertices[index] = tagged;
        self.dirty_min = self.dirty_min.min(index);
        self.dirty_max = self.dirty_max.max(index + 1);
        true
    }

    /// Draws the whole buffer.
    pub fn draw(&mut self) {
        self.draw_range(0, self.vertices.len());
    }

    /// Draws vertices `start..end`, uploading any pending dirty span first.
    pub fn draw_range(&mut self, start: usize, end: usize) {
        assert!(
            start <= end && end <= self.vertices.len(),
            "draw range {start}..{end} out of range (capacity {})",
            self.vertices.len()
        );
        debug_assert!(
            self.index_kind != IndexKind::Quad || (start % 4 == 0 && end % 4 == 0),
            "quad draw range must fall on quad boundaries"
        );
        if start == end {
            return;
        }

        let ctx = Rc::clone(&self.ctx);
        let device = Rc::clone(ctx.device());

        let buffer = *self.buffer.get_or_insert_with(|| {
            device.create_buffer(
                BufferKind::Vertex,
                (self.vertices.len() * Self::stride()) as u64,
            )
        });

        if self.dirty_min < self.dirty_max {
            let span = &self.vertices[self.dirty_min..self.dirty_max];
            device.upload_buffer(
                buffer,
                (self.dirty_min * Self::stride()) as u64,
                bytemuck::cast_slice(span),
            );
            ctx.stats().add_vertices_uploaded(span.len() as u32);
            self.dirty_min = usize::MAX;
            self.dirty_max = 0;
        }

        if ctx.bound_vertex_buffer() != Some(buffer) {
            device.bind_vertex_buffer(buffer);
            ctx.set_bound_vertex_buffer(Some(buffer));
        }

        let (indices, generation) = ctx.ensure_indices(self.index_kind, self.vertices.len());
        if ctx.bound_index_buffer() != Some(indices) || self.index_generation != generation {
            device.bind_index_buffer(indices);
            ctx.set_bound_index_buffer(Some(indices));
            self.index_generation = generation;
        }

        device.draw_indexed(
            self.topology,
            self.index_kind.first_element(start) as u32,
            self.index_kind.elements_for(end - start) as u32,
        );
        ctx.stats().add_draw_call();
    }
}

impl<V: Vertex> Drop for VertexBuffer<V> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.ctx.disposal().defer(move |device| device.destroy_buffer(buffer));
        }
    }
}

// ── tests ───────────────────────────────────────────────────────────────────
