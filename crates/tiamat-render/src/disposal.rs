//! Deferred resource disposal.
//!
//! Drop impls of shared GPU resources can run on any thread, but device
//! effects are only valid on the thread that owns the render context. The
//! disposal queue bridges the two: any thread enqueues an action, and the
//! context thread drains the queue once per frame, after traversal and
//! before presenting.
//!
//! Enqueue order is execution order. Actions are never coalesced or
//! dropped; an action enqueued from within a drain runs on the next drain.

use parking_lot::Mutex;

use crate::device::GpuDevice;

type DisposalAction = Box<dyn FnOnce(&dyn GpuDevice) + Send>;

/// Cross-thread queue of deferred device actions.
///
/// This is the only sanctioned way for non-context-thread code to cause a
/// GPU-visible effect.
#[derive(Default)]
pub struct DisposalQueue {
    pending: Mutex<Vec<DisposalAction>>,
}

impl DisposalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `action` to run on the context thread at the next drain.
    pub fn defer(&self, action: impl FnOnce(&dyn GpuDevice) + Send + 'static) {
        self.pending.lock().push(Box::new(action));
    }

    /// Runs every pending action in enqueue order. Returns the number run.
    ///
    /// Takes the batch out under the lock first, so actions that enqueue
    /// further work do not deadlock and that work waits for the next drain.
    pub fn drain(&self, device: &dyn GpuDevice) -> usize {
        let batch = std::mem::take(&mut *self.pending.lock());
        let count = batch.len();

        for action in batch {
            action(device);
        }

        if count > 0 {
            log::trace!("disposal queue ran {count} deferred action(s)");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::device::{BufferId, NullDevice};

    use super::*;

    // ── ordering ──────────────────────────────────────────────────────────

    #[test]
    fn drains_in_enqueue_order() {
        let queue = DisposalQueue::new();
        let device = NullDevice::new();

        queue.defer(|d| d.destroy_buffer(BufferId(1)));
        queue.defer(|d| d.destroy_buffer(BufferId(2)));
        queue.defer(|d| d.destroy_buffer(BufferId(3)));

        assert_eq!(queue.drain(&device), 3);

        let destroyed: Vec<_> = device
            .take_ops()
            .into_iter()
            .map(|op| match op {
                crate::device::DeviceOp::DestroyBuffer(id) => id.0,
                other => panic!("unexpected op {other:?}"),
            })
            .collect();
        assert_eq!(destroyed, vec![1, 2, 3]);
    }

    #[test]
    fn cross_thread_enqueues_run_on_drain() {
        let queue = Arc::new(DisposalQueue::new());
        let device = NullDevice::new();

        let remote = Arc::clone(&queue);
        std::thread::spawn(move || {
            remote.defer(|d| d.destroy_buffer(BufferId(10)));
        })
        .join()
        .unwrap();
        queue.defer(|d| d.destroy_buffer(BufferId(20)));

        assert_eq!(queue.drain(&device), 2);

        let destroyed: Vec<_> = device
            .take_ops()
            .into_iter()
            .filter_map(|op| match op {
                crate::device::DeviceOp::DestroyBuffer(id) => Some(id.0),
                _ => None,
            })
            .collect();
        assert_eq!(destroyed, vec![10, 20]);
    }

    // ── re-entrancy ───────────────────────────────────────────────────────

    #[test]
    fn action_enqueued_during_drain_waits_for_next_drain() {
        let queue = Arc::new(DisposalQueue::new());
        let device = NullDevice::new();

        let inner = Arc::clone(&queue);
        queue.defer(move |d| {
            d.destroy_buffer(BufferId(1));
            inner.defer(|d| d.destroy_buffer(BufferId(2)));
        });

        assert_eq!(queue.drain(&device), 1);
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.drain(&device), 1);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn empty_drain_is_a_no_op() {
        let queue = DisposalQueue::new();
        let device = NullDevice::new();
        assert_eq!(queue.drain(&device), 0);
        assert!(device.take_ops().is_empty());
    }
}
