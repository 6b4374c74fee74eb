//! Decoding encoded images into textures.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::RenderContext;
use crate::device::FilterMode;

use super::source::TextureUpload;
use super::handle::Texture;

/// One warning per process; later decode failures drop to debug.
static WARNED_UNDECODABLE: AtomicBool = AtomicBool::new(false);

impl Texture {
    /// Decodes encoded image bytes (PNG, JPEG) into a new texture.
    ///
    /// Undecodable or empty input is not an error: it logs and returns
    /// `None`, so a missing or corrupt asset degrades to not drawing.
    pub fn from_encoded(
        ctx: &RenderContext,
        label: &str,
        bytes: &[u8],
        filter: FilterMode,
    ) -> Option<Texture> {
        if bytes.is_empty() {
            log::debug!("texture '{label}': empty image data");
            return None;
        }

        let decoded = match image::load_from_memory(bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                if WARNED_UNDECODABLE.swap(true, Ordering::Relaxed) {
                    log::debug!("texture '{label}': undecodable image data: {err}");
                } else {
                    log::warn!("texture '{label}': undecodable image data: {err}");
                }
                return None;
            }
        };

        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        let texture = Texture::new(ctx, label, width, height, filter);
        texture
            .set_data(TextureUpload::full(width, height, rgba.into_raw()))
            .ok()?;
        Some(texture)
    }
}

// ── tests ───────────────────────────────────────────────────────────────────
