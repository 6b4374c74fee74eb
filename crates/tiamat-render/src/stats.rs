use std::cell::Cell;

/// Per-frame renderer counters.
///
/// Counters accumulate between [`reset`](FrameStats::reset) calls (one reset
/// per frame, driven by the renderer) and are read through [`snapshot`]
/// for HUD-style overlays.
///
/// [`snapshot`]: FrameStats::snapshot
#[derive(Debug, Default)]
pub struct FrameStats {
    draw_calls: Cell<u32>,
    vertices_uploaded: Cell<u32>,
    state_changes: Cell<u32>,
    texture_binds: Cell<u32>,
}

/// Plain copy of the counters at a point in time.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub draw_calls: u32,
    pub vertices_uploaded: u32,
    pub state_changes: u32,
    pub texture_binds: u32,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_draw_call(&self) {
        self.draw_calls.set(self.draw_calls.get() + 1);
    }

    #[inline]
    pub(crate) fn add_vertices_uploaded(&self, count: u32) {
        self.vertices_uploaded
            .set(self.vertices_uploaded.get() + count);
    }

    #[inline]
    pub(crate) fn add_state_change(&self) {
        self.state_changes.set(self.state_changes.get() + 1);
    }

    #[inline]
    pub(crate) fn add_texture_bind(&self) {
        self.texture_binds.set(self.texture_binds.get() + 1);
    }

    /// Zeroes all counters. Called once per frame by `Renderer::reset_state`.
    pub fn reset(&self) {
        self.draw_calls.set(0);
        self.vertices_uploaded.set(0);
        self.state_changes.set(0);
        self.texture_binds.set(0);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            draw_calls: self.draw_calls.get(),
            vertices_uploaded: self.vertices_uploaded.get(),
            state_changes: self.state_changes.get(),
            texture_binds: self.texture_binds.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_reset() {
        let stats = FrameStats::new();
        stats.add_draw_call();
        stats.add_draw_call();
        stats.add_vertices_uploaded(12);
        stats.add_state_change();
        stats.add_texture_bind();

        let snap = stats.snapshot();
        assert_eq!(snap.draw_calls, 2);
        assert_eq!(snap.vertices_uploaded, 12);
        assert_eq!(snap.state_changes, 1);
        assert_eq!(snap.texture_binds, 1);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
