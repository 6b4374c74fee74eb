//! Shared per-context render state.
//!
//! One [`RenderContext`] exists per device. It owns everything that is
//! context-wide rather than per-resource: the device handle, the disposal
//! queue, frame statistics, the global uniform registry, the shared index
//! caches, and the bound-state cells that gate redundant device calls.
//!
//! The context is `Rc`-shared and deliberately not `Send`; every type that
//! can touch the device holds one, which pins all device work to the
//! constructing thread at compile time. The disposal queue is the only
//! `Send` path back in.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::device::{BufferId, GpuDevice, ShaderId, TextureId};
use crate::disposal::DisposalQueue;
use crate::shader::GlobalUniforms;
use crate::stats::FrameStats;
use crate::vertex::{IndexCache, IndexKind, PendingFlush};

pub struct RenderContext {
    device: Rc<dyn GpuDevice>,
    disposal: Arc<DisposalQueue>,
    stats: FrameStats,
    globals: GlobalUniforms,

    linear_indices: RefCell<IndexCache>,
    quad_indices: RefCell<IndexCache>,

    bound_program: Cell<Option<ShaderId>>,
    bound_texture: Cell<Option<(TextureId, u32)>>,
    bound_vertex_buffer: Cell<Option<BufferId>>,
    bound_index_buffer: Cell<Option<BufferId>>,

    active_batch: RefCell<Option<Weak<dyn PendingFlush>>>,
    draw_depth: Cell<f32>,
    frame_index: Cell<u64>,
}

impl RenderContext {
    pub fn new(device: Rc<dyn GpuDevice>) -> Rc<Self> {
        Rc::new(Self {
            device,
            disposal: Arc::new(DisposalQueue::new()),
            stats: FrameStats::new(),
            globals: GlobalUniforms::with_standard_set(),
            linear_indices: RefCell::new(IndexCache::new(IndexKind::Linear)),
            quad_indices: RefCell::new(IndexCache::new(IndexKind::Quad)),
            bound_program: Cell::new(None),
            bound_texture: Cell::new(None),
            bound_vertex_buffer: Cell::new(None),
            bound_index_buffer: Cell::new(None),
            active_batch: RefCell::new(None),
            draw_depth: Cell::new(0.0),
            frame_index: Cell::new(0),
        })
    }

    #[inline]
    pub fn device(&self) -> &Rc<dyn GpuDevice> {
        &self.device
    }

    #[inline]
    pub fn disposal(&self) -> &Arc<DisposalQueue> {
        &self.disposal
    }

    #[inline]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    #[inline]
    pub fn globals(&self) -> &GlobalUniforms {
        &self.globals
    }

    #[inline]
    pub fn draw_depth(&self) -> f32 {
        self.draw_depth.get()
    }

    #[inline]
    pub(crate) fn set_draw_depth(&self, depth: f32) {
        self.draw_depth.set(depth);
    }

    #[inline]
    pub(crate) fn frame_index(&self) -> u64 {
        self.frame_index.get()
    }

    /// Starts a new frame: bumps the frame index (which resets batch write
    /// cursors lazily), zeroes statistics, and forgets the active batch.
    pub(crate) fn begin_frame(&self) {
        self.frame_index.set(self.frame_index.get() + 1);
        self.stats.reset();
        self.draw_depth.set(0.0);
        *self.active_batch.borrow_mut() = None;
    }

    // ── active batch ──────────────────────────────────────────────────────

    /// Draws whatever the active batch has accumulated since its last
    /// flush. Called before every observable state change.
    pub(crate) fn flush_active_batch(&self) {
        let active = self.active_batch.borrow().clone();
        if let Some(weak) = active
            && let Some(batch) = weak.upgrade()
        {
            batch.flush_pending();
        }
    }

    /// Makes `batch` the active batch, flushing the previous one first.
    /// Submission order across batches is preserved by this flush.
    pub(crate) fn make_batch_active(&self, batch: Rc<dyn PendingFlush>) {
        let already_active = self
            .active_batch
            .borrow()
            .as_ref()
            .is_some_and(|w| std::ptr::addr_eq(w.as_ptr(), Rc::as_ptr(&batch)));
        if already_active {
            return;
        }

        self.flush_active_batch();
        *self.active_batch.borrow_mut() = Some(Rc::downgrade(&batch));
    }

    // ── shared index caches ───────────────────────────────────────────────

    /// Ensures the context index cache for `kind` covers `vertices`,
    /// returning the buffer handle and its generation.
    pub(crate) fn ensure_indices(&self, kind: IndexKind, vertices: usize) -> (BufferId, u64) {
        let cache = match kind {
            IndexKind::Linear => &self.linear_indices,
            IndexKind::Quad => &self.quad_indices,
        };
        cache.borrow_mut().ensure(self.device.as_ref(), vertices)
    }

    // ── bound-state bookkeeping ───────────────────────────────────────────

    #[inline]
    pub(crate) fn bound_program(&self) -> Option<ShaderId> {
        self.bound_program.get()
    }

    #[inline]
    pub(crate) fn set_bound_program(&self, program: Option<ShaderId>) {
        self.bound_program.set(program);
    }

    #[inline]
    pub(crate) fn bound_texture(&self) -> Option<(TextureId, u32)> {
        self.bound_texture.get()
    }

    #[inline]
    pub(crate) fn set_bound_texture(&self, texture: Option<(TextureId, u32)>) {
        self.bound_texture.set(texture);
    }

    #[inline]
    pub(crate) fn bound_vertex_buffer(&self) -> Option<BufferId> {
        self.bound_vertex_buffer.get()
    }

    #[inline]
    pub(crate) fn set_bound_vertex_buffer(&self, buffer: Option<BufferId>) {
        self.bound_vertex_buffer.set(buffer);
    }

    #[inline]
    pub(crate) fn bound_index_buffer(&self) -> Option<BufferId> {
        self.bound_index_buffer.get()
    }

    #[inline]
    pub(crate) fn set_bound_index_buffer(&self, buffer: Option<BufferId>) {
        self.bound_index_buffer.set(buffer);
    }
}

/// A context over a fresh [`NullDevice`](crate::device::NullDevice), with a
/// second handle to the device so tests can inspect recorded calls.
#[cfg(test)]
pub(crate) fn test_context() -> (Rc<crate::device::NullDevice>, Rc<RenderContext>) {
    let device = Rc::new(crate::device::NullDevice::new());
    let ctx = RenderContext::new(Rc::clone(&device) as Rc<dyn GpuDevice>);
    (device, ctx)
}

// ── tests ───────────────────────────────────────────────────────────────────
