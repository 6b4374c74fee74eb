//! Texture handles.

use std::fmt;
use std::sync::Arc;

use crate::context::RenderContext;
use crate::coords::{ColorRgba, Rect, Vec2};
use crate::device::{FilterMode, GpuDevice, TextureId};
use crate::error::RenderError;
use crate::renderer::Renderer;

use super::source::{TextureSource, TextureUpload};

/// A reference-counted handle to texture storage, possibly restricted to a
/// sub-region (atlas entries share one backing source).
///
/// Every handle counts one reference, taken eagerly at construction or
/// clone. Dropping a handle defers its decrement through the disposal
/// queue; the decrement that reaches zero destroys the device storage and
/// marks the source dead, after which any touch through a leftover
/// [`TextureUpdater`] reports [`RenderError::TextureUseAfterFree`].
///
/// Handles are `Send`. Pixel uploads queue CPU-side from any thread and
/// reach the device on the context thread when the texture is next bound.
pub struct Texture {
    source: Arc<TextureSource>,
    /// Sub-region in texels of `source`, when this handle is an atlas entry.
    region: Option<Rect>,
}

impl Texture {
    /// New storage of the given size. Zero-sized textures are permanently
    /// unavailable placeholders that draw nothing.
    pub fn new(
        ctx: &RenderContext,
        label: &str,
        width: u32,
        height: u32,
        filter: FilterMode,
    ) -> Self {
        let source = TextureSource::new(Arc::clone(ctx.disposal()), label, width, height, filter);
        Self::from_source(source, None)
    }

    pub(crate) fn from_source(source: Arc<TextureSource>, region: Option<Rect>) -> Self {
        source.retain();
        Self { source, region }
    }

    /// Another handle to the same storage, restricted to `region` (texels).
    pub(crate) fn share_region(&self, region: Rect) -> Texture {
        Texture::from_source(Arc::clone(&self.source), Some(region))
    }

    #[inline]
    pub fn label(&self) -> &str {
        self.source.label()
    }

    /// Width in texels (of the region, for atlas entries).
    pub fn width(&self) -> u32 {
        match self.region {
            Some(region) => region.size.x as u32,
            None => self.source.width(),
        }
    }

    /// Height in texels (of the region, for atlas entries).
    pub fn height(&self) -> u32 {
        match self.region {
            Some(region) => region.size.y as u32,
            None => self.source.height(),
        }
    }

    /// Whether binding this texture can succeed: storage dimensions exist
    /// and the source has not been released.
    pub fn available(&self) -> bool {
        self.source.is_alive() && self.source.has_storage_dims()
    }

    /// Queues a pixel upload into this handle's coordinate space. The data
    /// reaches the device when the texture is next bound.
    pub fn set_data(&self, mut upload: TextureUpload) -> Result<(), RenderError> {
        if let Some(region) = self.region {
            upload.x += region.min().x as u32;
            upload.y += region.min().y as u32;
        }
        self.source.queue_upload(upload)
    }

    /// A `Send + Sync` upload handle that does not keep the texture alive.
    /// Writes through it fail once every real handle has dropped.
    pub fn updater(&self) -> TextureUpdater {
        TextureUpdater {
            source: Arc::clone(&self.source),
            region: self.region,
        }
    }

    /// Draws this texture into `quad`, tinted by `color`. Unavailable
    /// textures draw nothing.
    pub fn draw_quad(&self, renderer: &mut Renderer, quad: Rect, color: ColorRgba) {
        renderer.draw_texture_quad(self, quad, color);
    }

    /// Draws this texture across an arbitrary triangle. UVs map the
    /// texture's top edge onto `points[0] -> points[1]` and its bottom
    /// center onto `points[2]`.
    pub fn draw_triangle(&self, renderer: &mut Renderer, points: [Vec2; 3], color: ColorRgba) {
        renderer.draw_texture_triangle(self, points, color);
    }

    pub(crate) fn prepare(&self, device: &dyn GpuDevice) -> Option<TextureId> {
        self.source.prepare(device)
    }

    /// Normalized UV rectangle of this handle within its source.
    pub(crate) fn uv_rect(&self) -> Rect {
        match self.region {
            None => Rect::new(0.0, 0.0, 1.0, 1.0),
            Some(region) => {
                let w = self.source.width() as f32;
                let h = self.source.height() as f32;
                Rect::new(
                    region.origin.x / w,
                    region.origin.y / h,
                    region.size.x / w,
                    region.size.y / h,
                )
            }
        }
    }
}

impl Clone for Texture {
    fn clone(&self) -> Self {
        Self::from_source(Arc::clone(&self.source), self.region)
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("label", &self.label())
            .field("width", &self.width())
            .field("height", &self.height())
            .field("region", &self.region)
            .finish()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.source.release();
    }
}

/// Upload-only texture access without a reference count.
///
/// Useful for worker threads that stream pixel data into a texture owned
/// elsewhere. If the owner releases the texture first, writes through the
/// updater return [`RenderError::TextureUseAfterFree`] instead of touching
/// freed storage.
pub struct TextureUpdater {
    source: Arc<TextureSource>,
    region: Option<Rect>,
}

impl TextureUpdater {
    pub fn set_data(&self, mut upload: TextureUpload) -> Result<(), RenderError> {
        if let Some(region) = self.region {
            upload.x += region.min().x as u32;
            upload.y += region.min().y as u32;
        }
        self.source.queue_upload(upload)
    }

    pub fn label(&self) -> &str {
        self.source.label()
    }
}

// ── tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::device::DeviceOp;

    fn rgba(width: u32, height: u32) -> Vec<u8> {
        vec![0xff; (width * height * 4) as usize]
    }

    #[test]
    fn storage_is_created_lazily_and_uploads_flush_in_order() {
        let (device, ctx) = test_context();
        let texture = Texture::new(&ctx, "lazy", 8, 8, FilterMode::Linear);

        texture.set_data(TextureUpload::full(8, 8, rgba(8, 8))).unwrap();
        texture
            .set_data(TextureUpload { x: 2, y: 3, width: 1, height: 1, data: rgba(1, 1) })
            .unwrap();
        // Nothing reaches the device until prepare.
        assert!(device.take_ops().is_empty());

        let id = texture.prepare(device.as_ref()).unwrap();
        let ops = device.take_ops();
        assert!(matches!(
            ops[0],
            DeviceOp::CreateTexture { texture, width: 8, height: 8 } if texture == id
        ));
        assert!(matches!(ops[1], DeviceOp::UploadTexture { x: 0, y: 0, .. }));
        assert!(matches!(ops[2], DeviceOp::UploadTexture { x: 2, y: 3, .. }));

        // Prepared again with no new uploads: no further ops.
        texture.prepare(device.as_ref()).unwrap();
        assert!(device.take_ops().is_empty());
    }

    #[test]
    fn clones_share_storage_and_the_last_drop_destroys_it() {
        let (device, ctx) = test_context();
        let first = Texture::new(&ctx, "shared", 4, 4, FilterMode::Nearest);
        first.prepare(device.as_ref()).unwrap();
        device.take_ops();

        let second = first.clone();
        let third = second.clone();

        drop(first);
        drop(second);
        ctx.disposal().drain(device.as_ref());
        // Two of three handles gone: storage survives.
        assert!(device.take_ops().is_empty());
        assert!(third.available());

        drop(third);
        ctx.disposal().drain(device.as_ref());
        assert!(
            device
                .take_ops()
                .iter()
                .any(|op| matches!(op, DeviceOp::DestroyTexture(_)))
        );
    }

    #[test]
    fn updater_reports_use_after_free() {
        let (device, ctx) = test_context();
        let texture = Texture::new(&ctx, "streamed", 4, 4, FilterMode::Linear);
        let updater = texture.updater();

        // The updater holds no reference, so it works only while the
        // texture is alive.
        updater.set_data(TextureUpload::full(4, 4, rgba(4, 4))).unwrap();

        drop(texture);
        ctx.disposal().drain(device.as_ref());

        let err = updater
            .set_data(TextureUpload::full(4, 4, rgba(4, 4)))
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::TextureUseAfterFree { name } if name == "streamed"
        ));
    }

    #[test]
    fn released_textures_stop_being_available() {
        let (device, ctx) = test_context();
        let texture = Texture::new(&ctx, "gone", 4, 4, FilterMode::Linear);
        texture.prepare(device.as_ref()).unwrap();
        device.take_ops();
        let clone = texture.clone();

        drop(texture);
        // The decrement is deferred: still available until the drain.
        assert!(clone.available());
        ctx.disposal().drain(device.as_ref());
        assert!(clone.available());

        drop(clone);
        ctx.disposal().drain(device.as_ref());
        assert!(
            device
                .take_ops()
                .iter()
                .any(|op| matches!(op, DeviceOp::DestroyTexture(_)))
        );
    }

    #[test]
    fn zero_sized_textures_are_unavailable_but_harmless() {
        let (device, ctx) = test_context();
        let texture = Texture::new(&ctx, "empty", 0, 0, FilterMode::Linear);

        assert!(!texture.available());
        assert!(texture.prepare(device.as_ref()).is_none());
        assert!(device.take_ops().is_empty());
    }
}
