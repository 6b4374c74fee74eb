//! Streaming vertex batches.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::context::RenderContext;
use crate::device::Topology;

use super::buffer::VertexBuffer;
use super::index::{IndexKind, MAX_INDEXED_VERTICES};
use super::types::Vertex;

/// Pages allocated in one frame before the churn warning fires.
const PAGE_CHURN_WARNING: usize = 64;

/// Something holding vertices that have been submitted but not yet drawn.
///
/// The context keeps a weak handle to the single active implementor and
/// flushes it before any observable device state changes.
pub(crate) trait PendingFlush {
    fn flush_pending(&self);
}

/// An append-only vertex stream drawn in submission order.
///
/// Vertices accumulate into a pool of fixed-capacity pages. The write
/// cursor only moves forward within a frame; pages cycle when one fills or
/// when the draw depth moves back toward the viewer while vertices are
/// pending. Adding a vertex makes this batch the context's active batch,
/// flushing whichever batch was active before, so interleaved batches still
/// draw in submission order.
///
/// Pages persist across frames. The cursor rewinds at the first `add` of a
/// new frame, and per-vertex change detection means a batch whose content
/// is identical to the previous frame re-draws without re-uploading.
pub struct VertexBatch<V: Vertex> {
    inner: Rc<BatchInner<V>>,
}

struct BatchInner<V: Vertex> {
    ctx: Rc<RenderContext>,
    topology: Topology,
    index_kind: IndexKind,
    page_capacity: usize,
    state: RefCell<BatchState<V>>,
    warned_page_churn: Cell<bool>,
}

struct BatchState<V: Vertex> {
    pages: Vec<VertexBuffer<V>>,
    current: usize,
    write_index: usize,
    draw_start: usize,
    frame: u64,
    last_depth: f32,
}

impl<V: Vertex> VertexBatch<V> {
    /// A batch drawn with sequential indices.
    pub fn linear(ctx: Rc<RenderContext>, page_capacity: usize, topology: Topology) -> Self {
        Self::with_layout(ctx, page_capacity, topology, IndexKind::Linear)
    }

    /// A quad batch: vertices are submitted four at a time, ordered
    /// top-left, top-right, bottom-right, bottom-left.
    pub fn quads(ctx: Rc<RenderContext>, quads_per_page: usize) -> Self {
        Self::with_layout(ctx, quads_per_page * 4, Topology::Triangles, IndexKind::Quad)
    }

    fn with_layout(
        ctx: Rc<RenderContext>,
        page_capacity: usize,
        topology: Topology,
        index_kind: IndexKind,
    ) -> Self {
        debug_assert!(
            page_capacity > 0 && page_capacity <= MAX_INDEXED_VERTICES,
            "batch page capacity out of range"
        );
        Self {
            inner: Rc::new(BatchInner {
                ctx,
                topology,
                index_kind,
                page_capacity,
                state: RefCell::new(BatchState {
                    pages: Vec::new(),
                    current: 0,
                    write_index: 0,
                    draw_start: 0,
                    frame: 0,
                    last_depth: 0.0,
                }),
                warned_page_churn: Cell::new(false),
            }),
        }
    }

    /// Appends one vertex at the context's current draw depth.
    pub fn add(&self, vertex: V) {
        self.inner
            .ctx
            .make_batch_active(Rc::clone(&self.inner) as Rc<dyn PendingFlush>);
        self.inner.add(vertex);
    }

    /// Vertices submitted since the last flush.
    pub fn pending_vertices(&self) -> usize {
        let state = self.inner.state.borrow();
        state.write_index - state.draw_start
    }

    /// Pages allocated so far (pages persist across frames).
    pub fn pages_allocated(&self) -> usize {
        self.inner.state.borrow().pages.len()
    }

    #[cfg(test)]
    fn current_page(&self) -> usize {
        self.inner.state.borrow().current
    }
}

impl<V: Vertex> BatchInner<V> {
    fn add(&self, vertex: V) {
        let mut state = self.state.borrow_mut();

        // First write of a new frame rewinds the cursor to page zero.
        let frame = self.ctx.frame_index();
        if state.frame != frame {
            state.frame = frame;
            state.current = 0;
            state.write_index = 0;
            state.draw_start = 0;
            state.last_depth = self.ctx.draw_depth();
        }

        // Depth moving back toward the viewer means the pending vertices
        // must hit the device before anything drawn in front of them.
        let depth = self.ctx.draw_depth();
        if depth < state.last_depth && state.write_index > state.draw_start {
            self.flush_locked(&mut state);
            // A partial quad still pending (depth changed mid-quad) pins
            // the cursor to this page.
            if state.write_index == state.draw_start {
                self.advance_page(&mut state);
            }
        }

        if state.current == state.pages.len() {
            let page = self.new_page();
            state.pages.push(page);
            if state.pages.len() > PAGE_CHURN_WARNING && !self.warned_page_churn.get() {
                self.warned_page_churn.set(true);
                log::warn!(
                    "vertex batch allocated more than {PAGE_CHURN_WARNING} pages of {} vertices",
                    self.page_capacity
                );
            }
        }

        let index = state.write_index;
        let current = state.current;
        state.pages[current].set_vertex(index, vertex);
        state.write_index += 1;
        state.last_depth = depth;

        if state.write_index == self.page_capacity {
            self.flush_locked(&mut state);
            self.advance_page(&mut state);
        }
    }

    fn new_page(&self) -> VertexBuffer<V> {
        match self.index_kind {
            IndexKind::Linear => {
                VertexBuffer::linear(Rc::clone(&self.ctx), self.page_capacity, self.topology)
            }
            IndexKind::Quad => VertexBuffer::quads(Rc::clone(&self.ctx), self.page_capacity / 4),
        }
    }

    fn flush_locked(&self, state: &mut BatchState<V>) {
        // Quad flushes stop at the last complete quad; a partial tail stays
        // pending until its remaining vertices arrive.
        let pending = state.write_index - state.draw_start;
        let complete = match self.index_kind {
            IndexKind::Linear => pending,
            IndexKind::Quad => pending / 4 * 4,
        };
        if complete == 0 {
            return;
        }
        let current = state.current;
        let (start, end) = (state.draw_start, state.draw_start + complete);
        state.pages[current].draw_range(start, end);
        state.draw_start = end;
    }

    fn advance_page(&self, state: &mut BatchState<V>) {
        state.current += 1;
        state.write_index = 0;
        state.draw_start = 0;
    }
}

impl<V: Vertex> PendingFlush for BatchInner<V> {
    fn flush_pending(&self) {
        let mut state = self.state.borrow_mut();
        self.flush_locked(&mut state);
    }
}

// ── tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::device::DeviceOp;
    use crate::vertex::TexturedVertex;

    fn v(x: f32) -> TexturedVertex {
        TexturedVertex { position: [x, 0.0], color: [1.0; 4], tex_coord: [0.0, 0.0] }
    }

    fn draws(ops: &[DeviceOp]) -> Vec<(u32, u32)> {
        ops.iter()
            .filter_map(|op| match op {
                DeviceOp::DrawIndexed { first_index, index_count, .. } => {
                    Some((*first_index, *index_count))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn flush_draws_the_pending_range_once() {
        let (device, ctx) = test_context();
        let batch = VertexBatch::quads(Rc::clone(&ctx), 16);

        for i in 0..4 {
            batch.add(v(i as f32));
        }
        assert_eq!(batch.pending_vertices(), 4);

        ctx.flush_active_batch();
        assert_eq!(batch.pending_vertices(), 0);
        assert_eq!(draws(&device.take_ops()), vec![(0, 6)]);

        // Nothing pending, so a second flush draws nothing.
        ctx.flush_active_batch();
        assert!(draws(&device.take_ops()).is_empty());
    }

    #[test]
    fn partial_quads_stay_pending_across_a_flush() {
        let (device, ctx) = test_context();
        let batch = VertexBatch::quads(Rc::clone(&ctx), 16);

        for i in 0..6 {
            batch.add(v(i as f32));
        }
        ctx.flush_active_batch();
        assert_eq!(draws(&device.take_ops()), vec![(0, 6)]);
        assert_eq!(batch.pending_vertices(), 2);

        batch.add(v(6.0));
        batch.add(v(7.0));
        ctx.flush_active_batch();
        assert_eq!(draws(&device.take_ops()), vec![(6, 6)]);
    }

    #[test]
    fn interleaved_batches_flush_in_submission_order() {
        let (device, ctx) = test_context();
        let a = VertexBatch::quads(Rc::clone(&ctx), 16);
        let b = VertexBatch::quads(Rc::clone(&ctx), 16);

        for i in 0..4 {
            a.add(v(i as f32));
        }
        // Activating b flushes a's pending quad first.
        b.add(v(9.0));
        assert_eq!(a.pending_vertices(), 0);
        assert_eq!(b.pending_vertices(), 1);
        assert_eq!(draws(&device.take_ops()), vec![(0, 6)]);

        // And switching back flushes b.
        for i in 0..3 {
            b.add(v(i as f32));
        }
        a.add(v(0.5));
        assert_eq!(b.pending_vertices(), 0);
    }

    #[test]
    fn full_pages_cycle_to_the_next_page() {
        let (device, ctx) = test_context();
        let batch = VertexBatch::quads(Rc::clone(&ctx), 1);

        for i in 0..4 {
            batch.add(v(i as f32));
        }
        // Page filled: drawn and cycled.
        assert_eq!(draws(&device.take_ops()), vec![(0, 6)]);
        assert_eq!(batch.current_page(), 1);
        assert_eq!(batch.pages_allocated(), 1);

        batch.add(v(9.0));
        assert_eq!(batch.pages_allocated(), 2);
    }

    #[test]
    fn depth_regression_flushes_and_cycles() {
        let (device, ctx) = test_context();
        let batch = VertexBatch::linear(Rc::clone(&ctx), 64, Topology::Triangles);

        ctx.set_draw_depth(0.5);
        for i in 0..3 {
            batch.add(v(i as f32));
        }
        ctx.set_draw_depth(0.2);
        batch.add(v(9.0));

        assert_eq!(draws(&device.take_ops()), vec![(0, 3)]);
        assert_eq!(batch.current_page(), 1);
        assert_eq!(batch.pending_vertices(), 1);

        // Depth moving away again does not cycle.
        ctx.set_draw_depth(0.8);
        batch.add(v(10.0));
        assert_eq!(batch.current_page(), 1);
    }

    #[test]
    fn new_frame_rewinds_to_page_zero() {
        let (device, ctx) = test_context();
        let batch = VertexBatch::quads(Rc::clone(&ctx), 1);

        ctx.begin_frame();
        for i in 0..8 {
            batch.add(v(i as f32));
        }
        assert_eq!(batch.current_page(), 2);
        device.take_ops();

        ctx.begin_frame();
        for i in 0..4 {
            batch.add(v(i as f32));
        }
        // Capacity-1 pages cycle on the fourth vertex, drawing page zero.
        assert_eq!(batch.current_page(), 1);
        assert_eq!(draws(&device.take_ops()), vec![(0, 6)]);
    }

    #[test]
    fn unchanged_content_redraws_without_uploading() {
        let (device, ctx) = test_context();
        let batch = VertexBatch::quads(Rc::clone(&ctx), 4);

        ctx.begin_frame();
        for i in 0..4 {
            batch.add(v(i as f32));
        }
        ctx.flush_active_batch();
        assert!(
            device
                .take_ops()
                .iter()
                .any(|op| matches!(op, DeviceOp::UploadBuffer { .. }))
        );

        ctx.begin_frame();
        for i in 0..4 {
            batch.add(v(i as f32));
        }
        ctx.flush_active_batch();
        let ops = device.take_ops();
        assert!(ops.iter().all(|op| !matches!(op, DeviceOp::UploadBuffer { .. })));
        assert_eq!(draws(&ops), vec![(0, 6)]);
    }
}
