//! Draw-thread renderer: state stacks, geometry batches, frame lifecycle.

mod blend;
mod clear;
mod depth;
mod masking;

pub use blend::{BlendFactor, BlendOperation, BlendingParameters};
pub use clear::ClearInfo;
pub use depth::{DepthFunction, DepthInfo};
pub use masking::MaskingInfo;

use std::rc::Rc;

use glam::Mat4;

use crate::context::RenderContext;
use crate::coords::{ColorRgba, Rect, Vec2};
use crate::device::{Scissor, Topology};
use crate::shader::UniformValue;
use crate::texture::Texture;
use crate::vertex::{TexturedVertex, VertexBatch};

/// The single authority for GPU-observable global state.
///
/// Draw nodes never talk to the device directly; they push and pop state
/// here and submit geometry through textures. Every stacked state (viewport,
/// projection, masking, depth, scissor toggle) reaches the device only when
/// the new top differs structurally from the previous one, and any pending
/// batch content is flushed first so earlier draws keep the state they were
/// submitted under.
///
/// `Renderer` is `!Send`, which pins all of this to the thread that created
/// the context. Code on other threads affects the GPU only through the
/// disposal queue.
pub struct Renderer {
    ctx: Rc<RenderContext>,
    frame_size: Vec2,
    viewport_stack: Vec<Rect>,
    ortho_stack: Vec<Rect>,
    masking_stack: Vec<MaskingInfo>,
    /// Effective scissor rect per masking frame, already intersected with
    /// every outer masking bound.
    scissor_stack: Vec<Rect>,
    depth_stack: Vec<DepthInfo>,
    scissor_state_stack: Vec<bool>,
    blend: Option<BlendingParameters>,
    quads: VertexBatch<TexturedVertex>,
    triangles: VertexBatch<TexturedVertex>,
}

impl Renderer {
    /// Creates a renderer over `ctx`. No device calls happen until
    /// [`reset_state`](Self::reset_state) begins the first frame.
    pub fn new(ctx: Rc<RenderContext>) -> Self {
        let quads = VertexBatch::quads(Rc::clone(&ctx), 1024);
        let triangles = VertexBatch::linear(Rc::clone(&ctx), 3 * 1024, Topology::Triangles);
        Self {
            ctx,
            frame_size: Vec2::zero(),
            viewport_stack: Vec::new(),
            ortho_stack: Vec::new(),
            masking_stack: Vec::new(),
            scissor_stack: Vec::new(),
            depth_stack: Vec::new(),
            scissor_state_stack: Vec::new(),
            blend: None,
            quads,
            triangles,
        }
    }

    #[inline]
    pub fn context(&self) -> &Rc<RenderContext> {
        &self.ctx
    }

    /// Frame dimensions passed to the last [`reset_state`](Self::reset_state).
    #[inline]
    pub fn frame_size(&self) -> Vec2 {
        self.frame_size
    }

    // ── frame lifecycle ───────────────────────────────────────────────────

    /// Begins a frame: rewinds every stack to one base entry sized to `size`
    /// and re-applies the base device state unconditionally.
    ///
    /// Call exactly once per frame, before any draw node runs.
    pub fn reset_state(&mut self, size: Vec2) {
        self.ctx.device().make_current();
        self.ctx.begin_frame();

        self.frame_size = size;
        let frame = Rect::from_size(size);

        self.viewport_stack.clear();
        self.viewport_stack.push(frame);
        self.ortho_stack.clear();
        self.ortho_stack.push(frame);
        self.masking_stack.clear();
        self.masking_stack.push(MaskingInfo::unmasked(frame));
        self.scissor_stack.clear();
        self.scissor_stack.push(frame);
        self.depth_stack.clear();
        self.depth_stack.push(DepthInfo::DEFAULT);
        self.scissor_state_stack.clear();
        self.scissor_state_stack.push(true);
        self.blend = Some(BlendingParameters::default());

        self.apply_viewport(frame);
        self.apply_scissor(frame);
        self.apply_scissor_state(true);
        self.apply_depth(DepthInfo::DEFAULT);
        self.ctx.device().set_blend(BlendingParameters::default());
        self.ctx.stats().add_state_change();
        self.apply_ortho(frame);
        self.apply_masking(&MaskingInfo::unmasked(frame));
    }

    /// Ends the frame: flushes pending batch content, runs deferred disposal
    /// actions, and swaps buffers.
    ///
    /// # Panics
    /// Panics (debug only) if any state stack still holds pushed entries.
    pub fn finish_frame(&mut self) {
        self.ctx.flush_active_batch();

        debug_assert!(
            self.viewport_stack.len() <= 1,
            "finish_frame called with unbalanced viewport stack"
        );
        debug_assert!(
            self.ortho_stack.len() <= 1,
            "finish_frame called with unbalanced ortho stack"
        );
        debug_assert!(
            self.masking_stack.len() <= 1,
            "finish_frame called with unbalanced masking stack"
        );
        debug_assert!(
            self.depth_stack.len() <= 1,
            "finish_frame called with unbalanced depth stack"
        );
        debug_assert!(
            self.scissor_state_stack.len() <= 1,
            "finish_frame called with unbalanced scissor-state stack"
        );

        self.ctx.disposal().drain(self.ctx.device().as_ref());
        self.ctx.device().swap_buffers();
    }

    /// Clears the bound frame buffer.
    pub fn clear(&mut self, info: ClearInfo) {
        self.ctx.flush_active_batch();
        self.ctx.device().clear(info);
    }

    // ── viewport ──────────────────────────────────────────────────────────

    /// Makes `rect` the active pixel-space viewport until the matching
    /// [`pop_viewport`](Self::pop_viewport).
    pub fn push_viewport(&mut self, rect: Rect) {
        let rect = rect.normalized();
        let changed = self.viewport_stack.last() != Some(&rect);
        self.viewport_stack.push(rect);
        if changed {
            self.apply_viewport(rect);
        }
    }

    /// Restores the viewport active before the matching push.
    ///
    /// # Panics
    /// Panics (debug only) if called without a matching `push_viewport`.
    pub fn pop_viewport(&mut self) {
        debug_assert!(
            self.viewport_stack.len() > 1,
            "pop_viewport called without matching push_viewport"
        );
        if self.viewport_stack.len() <= 1 {
            return;
        }
        let popped = self.viewport_stack.pop();
        if let Some(&restored) = self.viewport_stack.last()
            && popped != Some(restored)
        {
            self.apply_viewport(restored);
        }
    }

    /// Current viewport (top of the viewport stack).
    pub fn viewport(&self) -> Rect {
        self.viewport_stack.last().copied().unwrap_or_default()
    }

    // ── orthographic projection ───────────────────────────────────────────

    /// Makes `rect` the draw-space region mapped to the full clip space
    /// until the matching [`pop_ortho`](Self::pop_ortho).
    pub fn push_ortho(&mut self, rect: Rect) {
        let rect = rect.normalized();
        let changed = self.ortho_stack.last() != Some(&rect);
        self.ortho_stack.push(rect);
        if changed {
            self.apply_ortho(rect);
        }
    }

    /// Restores the projection active before the matching push.
    ///
    /// # Panics
    /// Panics (debug only) if called without a matching `push_ortho`.
    pub fn pop_ortho(&mut self) {
        debug_assert!(
            self.ortho_stack.len() > 1,
            "pop_ortho called without matching push_ortho"
        );
        if self.ortho_stack.len() <= 1 {
            return;
        }
        let popped = self.ortho_stack.pop();
        if let Some(&restored) = self.ortho_stack.last()
            && popped != Some(restored)
        {
            self.apply_ortho(restored);
        }
    }

    /// Draw-space rect the current projection maps to clip space.
    pub fn ortho_rect(&self) -> Rect {
        self.ortho_stack.last().copied().unwrap_or_default()
    }

    // ── masking and scissor ───────────────────────────────────────────────

    /// Pushes a masking scope. The active scissor becomes the intersection
    /// of all pushed masking bounds, unless `overwrite_scissor` makes
    /// `info`'s bounds replace the accumulated rect (used when draws are
    /// redirected to a fresh render target whose coordinates restart at the
    /// origin).
    pub fn push_masking(&mut self, info: MaskingInfo, overwrite_scissor: bool) {
        let aabb = info.screen_space_aabb.normalized();
        let scissor = if overwrite_scissor {
            aabb
        } else {
            match self.scissor_stack.last() {
                // No overlap leaves a zero-area scissor so the scoped draws
                // reach the screen nowhere.
                Some(&current) => current.intersect(aabb).unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0)),
                None => aabb,
            }
        };
        let scissor_changed = self.scissor_stack.last() != Some(&scissor);

        self.masking_stack.push(info);
        self.scissor_stack.push(scissor);

        self.apply_masking(&info);
        if scissor_changed {
            self.apply_scissor(scissor);
        }
    }

    /// Restores the masking scope (and derived scissor) active before the
    /// matching push.
    ///
    /// # Panics
    /// Panics (debug only) if called without a matching `push_masking`.
    pub fn pop_masking(&mut self) {
        debug_assert!(
            self.masking_stack.len() > 1,
            "pop_masking called without matching push_masking"
        );
        if self.masking_stack.len() <= 1 {
            return;
        }
        self.masking_stack.pop();
        let popped_scissor = self.scissor_stack.pop();

        if let Some(&info) = self.masking_stack.last() {
            self.apply_masking(&info);
        }
        if let Some(&restored) = self.scissor_stack.last()
            && popped_scissor != Some(restored)
        {
            self.apply_scissor(restored);
        }
    }

    /// Masking parameters of the innermost active scope.
    pub fn masking(&self) -> MaskingInfo {
        self.masking_stack
            .last()
            .copied()
            .unwrap_or(MaskingInfo::unmasked(Rect::from_size(self.frame_size)))
    }

    /// Whether any masking scope beyond the base frame is active.
    pub fn is_masking(&self) -> bool {
        self.masking_stack.len() > 1
    }

    /// The scissor rect currently applied to the device, in logical pixels.
    pub fn scissor_rect(&self) -> Rect {
        self.scissor_stack.last().copied().unwrap_or_default()
    }

    /// Pushes the scissor-test toggle, independent of the masking stack, so
    /// masking can stay computed while scissor testing is suppressed.
    pub fn push_scissor_state(&mut self, enabled: bool) {
        let changed = self.scissor_state_stack.last() != Some(&enabled);
        self.scissor_state_stack.push(enabled);
        if changed {
            self.apply_scissor_state(enabled);
        }
    }

    /// Restores the scissor-test toggle active before the matching push.
    ///
    /// # Panics
    /// Panics (debug only) if called without a matching `push_scissor_state`.
    pub fn pop_scissor_state(&mut self) {
        debug_assert!(
            self.scissor_state_stack.len() > 1,
            "pop_scissor_state called without matching push_scissor_state"
        );
        if self.scissor_state_stack.len() <= 1 {
            return;
        }
        let popped = self.scissor_state_stack.pop();
        if let Some(&restored) = self.scissor_state_stack.last()
            && popped != Some(restored)
        {
            self.apply_scissor_state(restored);
        }
    }

    /// Whether scissor testing is currently enabled.
    pub fn scissor_enabled(&self) -> bool {
        self.scissor_state_stack.last().copied().unwrap_or(true)
    }

    // ── depth ─────────────────────────────────────────────────────────────

    /// Pushes depth test/write configuration.
    pub fn push_depth(&mut self, info: DepthInfo) {
        let changed = self.depth_stack.last() != Some(&info);
        self.depth_stack.push(info);
        if changed {
            self.apply_depth(info);
        }
    }

    /// Restores the depth configuration active before the matching push.
    ///
    /// # Panics
    /// Panics (debug only) if called without a matching `push_depth`.
    pub fn pop_depth(&mut self) {
        debug_assert!(
            self.depth_stack.len() > 1,
            "pop_depth called without matching push_depth"
        );
        if self.depth_stack.len() <= 1 {
            return;
        }
        let popped = self.depth_stack.pop();
        if let Some(&restored) = self.depth_stack.last()
            && popped != Some(restored)
        {
            self.apply_depth(restored);
        }
    }

    /// Current depth configuration.
    pub fn depth(&self) -> DepthInfo {
        self.depth_stack.last().copied().unwrap_or(DepthInfo::DEFAULT)
    }

    // ── non-stacked state ─────────────────────────────────────────────────

    /// Sets fixed-function blending. An equal value is a no-op.
    pub fn set_blend(&mut self, blend: BlendingParameters) {
        if self.blend == Some(blend) {
            return;
        }
        self.blend = Some(blend);
        self.ctx.flush_active_batch();
        self.ctx.device().set_blend(blend);
        self.ctx.stats().add_state_change();
    }

    /// Sets the depth tag stamped onto subsequently submitted vertices.
    /// CPU-side only; nothing is flushed.
    pub fn set_draw_depth(&mut self, depth: f32) {
        self.ctx.set_draw_depth(depth);
    }

    /// Binds `texture` to `unit`, creating device storage and flushing its
    /// queued pixel uploads first. Returns `false` when the texture has no
    /// usable storage (zero-sized or already released).
    pub fn bind_texture(&mut self, texture: &Texture, unit: u32) -> bool {
        if !texture.available() {
            return false;
        }
        let Some(id) = texture.prepare(self.ctx.device().as_ref()) else {
            return false;
        };
        if self.ctx.bound_texture() == Some((id, unit)) {
            return true;
        }
        self.ctx.flush_active_batch();
        self.ctx.device().bind_texture(id, unit);
        self.ctx.set_bound_texture(Some((id, unit)));
        self.ctx.stats().add_texture_bind();
        true
    }

    // ── geometry submission ───────────────────────────────────────────────

    pub(crate) fn draw_texture_quad(&mut self, texture: &Texture, quad: Rect, color: ColorRgba) {
        if !self.bind_texture(texture, 0) {
            return;
        }
        let uv = texture.uv_rect();
        let q = quad.normalized();
        let (pmin, pmax) = (q.min(), q.max());
        let (tmin, tmax) = (uv.min(), uv.max());
        self.quads.add(TexturedVertex::new(pmin, color, tmin));
        self.quads.add(TexturedVertex::new(
            Vec2::new(pmax.x, pmin.y),
            color,
            Vec2::new(tmax.x, tmin.y),
        ));
        self.quads.add(TexturedVertex::new(pmax, color, tmax));
        self.quads.add(TexturedVertex::new(
            Vec2::new(pmin.x, pmax.y),
            color,
            Vec2::new(tmin.x, tmax.y),
        ));
    }

    pub(crate) fn draw_texture_triangle(
        &mut self,
        texture: &Texture,
        points: [Vec2; 3],
        color: ColorRgba,
    ) {
        if !self.bind_texture(texture, 0) {
            return;
        }
        let uv = texture.uv_rect();
        let uvs = [
            uv.origin,
            Vec2::new(uv.origin.x + uv.size.x, uv.origin.y),
            Vec2::new(uv.origin.x + uv.size.x * 0.5, uv.origin.y + uv.size.y),
        ];
        for (point, tex) in points.into_iter().zip(uvs) {
            self.triangles.add(TexturedVertex::new(point, color, tex));
        }
    }

    // ── device application ────────────────────────────────────────────────

    fn apply_viewport(&self, rect: Rect) {
        self.ctx.flush_active_batch();
        self.ctx.device().set_viewport(rect);
        self.ctx.stats().add_state_change();
    }

    fn apply_ortho(&self, rect: Rect) {
        let matrix = UniformValue::Mat4(ortho_matrix(rect));
        if self.ctx.globals().set("g_ProjMatrix", matrix) {
            self.ctx.stats().add_state_change();
        }
    }

    /// Writes the masking scope into the global uniform table. Each global
    /// fans out only on a real value change, so re-applying an unchanged
    /// scope touches no shader.
    fn apply_masking(&self, info: &MaskingInfo) {
        let globals = self.ctx.globals();
        let (min, max) = (info.masking_rect.min(), info.masking_rect.max());
        let mut changed = globals.set(
            "g_MaskingRect",
            UniformValue::Vec4([min.x, min.y, max.x, max.y]),
        );
        changed |= globals.set("g_CornerRadius", UniformValue::Float(info.corner_radius));
        changed |= globals.set("g_CornerExponent", UniformValue::Float(info.corner_exponent));
        changed |= globals.set("g_BorderThickness", UniformValue::Float(info.border_thickness));
        changed |= globals.set("g_MaskingBlendRange", UniformValue::Float(info.blend_range));
        let masking = if self.is_masking() { 1.0 } else { 0.0 };
        changed |= globals.set("g_IsMasking", UniformValue::Float(masking));
        if changed {
            self.ctx.stats().add_state_change();
        }
    }

    fn apply_scissor(&self, rect: Rect) {
        self.ctx.flush_active_batch();
        self.ctx.device().set_scissor(self.to_scissor(rect));
        self.ctx.stats().add_state_change();
    }

    fn apply_scissor_state(&self, enabled: bool) {
        self.ctx.flush_active_batch();
        self.ctx.device().set_scissor_enabled(enabled);
        self.ctx.stats().add_state_change();
    }

    fn apply_depth(&self, info: DepthInfo) {
        self.ctx.flush_active_batch();
        self.ctx.device().set_depth(info);
        self.ctx.stats().add_state_change();
    }

    /// Converts a logical rect to integer scissor bounds clamped to the
    /// frame. Mins floor and maxes ceil so partially covered pixels stay in.
    fn to_scissor(&self, rect: Rect) -> Scissor {
        let rect = rect.normalized();
        let x0 = rect.min().x.floor().clamp(0.0, self.frame_size.x);
        let y0 = rect.min().y.floor().clamp(0.0, self.frame_size.y);
        let x1 = rect.max().x.ceil().clamp(0.0, self.frame_size.x);
        let y1 = rect.max().y.ceil().clamp(0.0, self.frame_size.y);
        Scissor {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 as u32).saturating_sub(x0 as u32),
            height: (y1 as u32).saturating_sub(y0 as u32),
        }
    }
}

/// Column-major projection mapping `rect` to clip space with +Y down in
/// draw space and the near plane at z = 0.
fn ortho_matrix(rect: Rect) -> [[f32; 4]; 4] {
    let (min, max) = (rect.min(), rect.max());
    Mat4::orthographic_rh(min.x, max.x, max.y, min.y, -1.0, 1.0).to_cols_array_2d()
}

// ── tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::device::{DeviceOp, FilterMode, NullDevice};
    use crate::texture::TextureUpload;

    fn frame_renderer() -> (std::rc::Rc<NullDevice>, Renderer) {
        let (device, ctx) = test_context();
        let mut renderer = Renderer::new(ctx);
        renderer.reset_state(Vec2::new(800.0, 600.0));
        device.take_ops();
        (device, renderer)
    }

    fn white_texture(renderer: &Renderer) -> Texture {
        let texture = Texture::new(renderer.context(), "white", 2, 2, FilterMode::Nearest);
        texture
            .set_data(TextureUpload::full(2, 2, vec![255; 16]))
            .unwrap();
        texture
    }

    #[test]
    fn reset_state_applies_base_frame() {
        let (device, ctx) = test_context();
        let mut renderer = Renderer::new(ctx);
        renderer.reset_state(Vec2::new(800.0, 600.0));

        let frame = Rect::new(0.0, 0.0, 800.0, 600.0);
        assert_eq!(renderer.viewport(), frame);
        assert_eq!(renderer.ortho_rect(), frame);
        assert_eq!(renderer.scissor_rect(), frame);
        assert_eq!(renderer.depth(), DepthInfo::DEFAULT);
        assert!(renderer.scissor_enabled());
        assert!(!renderer.is_masking());

        let ops = device.take_ops();
        assert!(ops.contains(&DeviceOp::MakeCurrent));
        assert!(ops.contains(&DeviceOp::SetViewport(frame)));
        assert!(ops.contains(&DeviceOp::SetScissor(Scissor { x: 0, y: 0, width: 800, height: 600 })));
        assert!(ops.contains(&DeviceOp::SetScissorEnabled(true)));
        assert!(ops.contains(&DeviceOp::SetDepth(DepthInfo::DEFAULT)));
        assert!(ops.contains(&DeviceOp::SetBlend(BlendingParameters::MIXTURE)));
    }

    #[test]
    fn clears_reach_the_device_with_their_aspect_flags() {
        let (device, mut renderer) = frame_renderer();

        let info = ClearInfo::depth_only(0.5);
        renderer.clear(info);

        assert_eq!(device.take_ops(), vec![DeviceOp::Clear(info)]);
    }

    #[test]
    fn viewport_pushes_apply_and_pops_restore() {
        let (device, mut renderer) = frame_renderer();
        let inner = Rect::new(10.0, 20.0, 100.0, 50.0);

        renderer.push_viewport(inner);
        assert_eq!(renderer.viewport(), inner);
        assert_eq!(device.take_ops(), vec![DeviceOp::SetViewport(inner)]);

        // Same viewport again: stack grows, device untouched.
        renderer.push_viewport(inner);
        assert!(device.take_ops().is_empty());

        renderer.pop_viewport();
        assert!(device.take_ops().is_empty());

        renderer.pop_viewport();
        assert_eq!(
            device.take_ops(),
            vec![DeviceOp::SetViewport(Rect::new(0.0, 0.0, 800.0, 600.0))]
        );
        assert_eq!(renderer.viewport(), Rect::new(0.0, 0.0, 800.0, 600.0));
    }

    #[test]
    fn ortho_push_updates_projection_global() {
        let (_device, mut renderer) = frame_renderer();
        let rect = Rect::new(0.0, 0.0, 400.0, 300.0);

        renderer.push_ortho(rect);
        assert_eq!(
            renderer.context().globals().get("g_ProjMatrix"),
            Some(UniformValue::Mat4(ortho_matrix(rect)))
        );

        renderer.pop_ortho();
        assert_eq!(
            renderer.context().globals().get("g_ProjMatrix"),
            Some(UniformValue::Mat4(ortho_matrix(Rect::new(0.0, 0.0, 800.0, 600.0))))
        );
    }

    #[test]
    fn masking_scissor_is_the_intersection_of_bounds() {
        let (_device, mut renderer) = frame_renderer();

        renderer.push_masking(MaskingInfo::rect(Rect::new(100.0, 100.0, 300.0, 300.0)), false);
        assert_eq!(renderer.scissor_rect(), Rect::new(100.0, 100.0, 300.0, 300.0));
        assert!(renderer.is_masking());

        renderer.push_masking(MaskingInfo::rect(Rect::new(200.0, 200.0, 300.0, 300.0)), false);
        assert_eq!(renderer.scissor_rect(), Rect::new(200.0, 200.0, 200.0, 200.0));

        renderer.pop_masking();
        assert_eq!(renderer.scissor_rect(), Rect::new(100.0, 100.0, 300.0, 300.0));

        renderer.pop_masking();
        assert_eq!(renderer.scissor_rect(), Rect::new(0.0, 0.0, 800.0, 600.0));
        assert!(!renderer.is_masking());
    }

    #[test]
    fn overwrite_scissor_replaces_instead_of_intersecting() {
        let (_device, mut renderer) = frame_renderer();

        renderer.push_masking(MaskingInfo::rect(Rect::new(0.0, 0.0, 50.0, 50.0)), false);
        // Disjoint from the outer bound; an intersection would be empty.
        renderer.push_masking(MaskingInfo::rect(Rect::new(400.0, 400.0, 100.0, 100.0)), true);
        assert_eq!(renderer.scissor_rect(), Rect::new(400.0, 400.0, 100.0, 100.0));

        renderer.pop_masking();
        renderer.pop_masking();
    }

    #[test]
    fn disjoint_masking_yields_zero_area_scissor() {
        let (_device, mut renderer) = frame_renderer();

        renderer.push_masking(MaskingInfo::rect(Rect::new(0.0, 0.0, 50.0, 50.0)), false);
        renderer.push_masking(MaskingInfo::rect(Rect::new(400.0, 400.0, 100.0, 100.0)), false);
        assert!(renderer.scissor_rect().is_empty());

        renderer.pop_masking();
        renderer.pop_masking();
    }

    #[test]
    fn masking_scope_reaches_the_global_table() {
        let (_device, mut renderer) = frame_renderer();
        let ctx = Rc::clone(renderer.context());

        renderer.push_masking(
            MaskingInfo::rounded_rect(Rect::new(10.0, 10.0, 80.0, 40.0), 8.0),
            false,
        );
        assert_eq!(
            ctx.globals().get("g_MaskingRect"),
            Some(UniformValue::Vec4([10.0, 10.0, 90.0, 50.0]))
        );
        assert_eq!(ctx.globals().get("g_CornerRadius"), Some(UniformValue::Float(8.0)));
        assert_eq!(ctx.globals().get("g_IsMasking"), Some(UniformValue::Float(1.0)));

        renderer.pop_masking();
        assert_eq!(ctx.globals().get("g_IsMasking"), Some(UniformValue::Float(0.0)));
    }

    #[test]
    fn scissor_bounds_round_outward_to_whole_pixels() {
        let (device, mut renderer) = frame_renderer();

        renderer.push_masking(MaskingInfo::rect(Rect::new(10.4, 10.6, 20.2, 20.2)), false);
        let ops = device.take_ops();
        assert!(ops.contains(&DeviceOp::SetScissor(Scissor { x: 10, y: 10, width: 21, height: 21 })));

        renderer.pop_masking();
    }

    #[test]
    fn scissor_state_stack_is_independent_of_masking() {
        let (device, mut renderer) = frame_renderer();

        renderer.push_scissor_state(false);
        assert!(!renderer.scissor_enabled());
        assert_eq!(device.take_ops(), vec![DeviceOp::SetScissorEnabled(false)]);

        renderer.push_scissor_state(false);
        assert!(device.take_ops().is_empty());

        renderer.pop_scissor_state();
        renderer.pop_scissor_state();
        assert!(renderer.scissor_enabled());
        assert_eq!(device.take_ops(), vec![DeviceOp::SetScissorEnabled(true)]);
    }

    #[test]
    fn equal_depth_push_skips_the_device() {
        let (device, mut renderer) = frame_renderer();

        renderer.push_depth(DepthInfo::DEFAULT);
        assert!(device.take_ops().is_empty());

        let read_only = DepthInfo { write_depth: false, ..DepthInfo::DEFAULT };
        renderer.push_depth(read_only);
        assert_eq!(device.take_ops(), vec![DeviceOp::SetDepth(read_only)]);

        renderer.pop_depth();
        assert_eq!(device.take_ops(), vec![DeviceOp::SetDepth(DepthInfo::DEFAULT)]);
        renderer.pop_depth();
    }

    #[test]
    fn set_blend_gates_on_equality() {
        let (device, mut renderer) = frame_renderer();

        renderer.set_blend(BlendingParameters::MIXTURE);
        assert!(device.take_ops().is_empty());

        renderer.set_blend(BlendingParameters::ADDITIVE);
        assert_eq!(device.take_ops(), vec![DeviceOp::SetBlend(BlendingParameters::ADDITIVE)]);
    }

    #[test]
    fn bind_texture_skips_redundant_binds() {
        let (device, mut renderer) = frame_renderer();
        let texture = white_texture(&renderer);

        assert!(renderer.bind_texture(&texture, 0));
        let ops = device.take_ops();
        assert!(ops.iter().any(|op| matches!(op, DeviceOp::CreateTexture { .. })));
        assert!(ops.iter().any(|op| matches!(op, DeviceOp::BindTexture { unit: 0, .. })));

        assert!(renderer.bind_texture(&texture, 0));
        assert!(device.take_ops().is_empty());
        assert_eq!(renderer.context().stats().snapshot().texture_binds, 1);
    }

    #[test]
    fn quad_draw_flushes_as_one_indexed_draw() {
        let (device, mut renderer) = frame_renderer();
        let texture = white_texture(&renderer);

        texture.draw_quad(&mut renderer, Rect::new(0.0, 0.0, 64.0, 64.0), ColorRgba::white());
        renderer.finish_frame();

        let ops = device.take_ops();
        let draws: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                DeviceOp::DrawIndexed { first_index, index_count, .. } => {
                    Some((*first_index, *index_count))
                }
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![(0, 6)]);
        assert_eq!(ops.last(), Some(&DeviceOp::SwapBuffers));
    }

    #[test]
    fn state_change_mid_batch_flushes_before_applying() {
        let (device, mut renderer) = frame_renderer();
        let texture = white_texture(&renderer);

        texture.draw_quad(&mut renderer, Rect::new(0.0, 0.0, 32.0, 32.0), ColorRgba::white());
        renderer.push_depth(DepthInfo { write_depth: false, ..DepthInfo::DEFAULT });

        let ops = device.take_ops();
        let draw_at = ops
            .iter()
            .position(|op| matches!(op, DeviceOp::DrawIndexed { .. }));
        let depth_at = ops
            .iter()
            .position(|op| matches!(op, DeviceOp::SetDepth(_)));
        assert!(draw_at.is_some() && draw_at < depth_at);

        renderer.pop_depth();
        renderer.finish_frame();
    }

    #[test]
    fn finish_frame_drains_disposals_before_swapping() {
        let (device, mut renderer) = frame_renderer();
        let texture = white_texture(&renderer);

        assert!(renderer.bind_texture(&texture, 0));
        device.take_ops();
        drop(texture);
        renderer.context().set_bound_texture(None);
        renderer.finish_frame();

        let ops = device.take_ops();
        let destroy_at = ops
            .iter()
            .position(|op| matches!(op, DeviceOp::DestroyTexture(_)));
        let swap_at = ops.iter().position(|op| *op == DeviceOp::SwapBuffers);
        assert!(destroy_at.is_some() && destroy_at < swap_at);
    }

    #[test]
    fn draw_with_unusable_texture_is_skipped() {
        let (device, mut renderer) = frame_renderer();
        let empty = Texture::new(renderer.context(), "empty", 0, 0, FilterMode::Nearest);

        empty.draw_quad(&mut renderer, Rect::new(0.0, 0.0, 32.0, 32.0), ColorRgba::white());
        renderer.finish_frame();

        let ops = device.take_ops();
        assert!(!ops.iter().any(|op| matches!(op, DeviceOp::CreateTexture { .. })));
        assert!(!ops.iter().any(|op| matches!(op, DeviceOp::DrawIndexed { .. })));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "pop_viewport called without matching push_viewport")]
    fn unbalanced_viewport_pop_panics_in_debug() {
        let (_device, mut renderer) = frame_renderer();
        renderer.pop_viewport();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "finish_frame called with unbalanced masking stack")]
    fn unbalanced_finish_frame_panics_in_debug() {
        let (_device, mut renderer) = frame_renderer();
        renderer.push_masking(MaskingInfo::rect(Rect::new(0.0, 0.0, 10.0, 10.0)), false);
        renderer.finish_frame();
    }
}
