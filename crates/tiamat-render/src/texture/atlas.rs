//! Shelf-packed texture atlas.

use std::rc::Rc;

use crate::context::RenderContext;
use crate::coords::Rect;
use crate::device::FilterMode;
use crate::error::RenderError;

use super::handle::Texture;

#[derive(Debug, Clone, Copy)]
pub struct AtlasConfig {
    /// Side length of a standard backing surface.
    pub surface_size: u32,
    /// Texels of clearance around every entry.
    pub padding: u32,
    /// Hard cap on backing surface size; single requests beyond this fail.
    pub max_surface_size: u32,
    pub filter: FilterMode,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            surface_size: 1024,
            padding: 1,
            max_surface_size: 4096,
            filter: FilterMode::Linear,
        }
    }
}

/// Packs many small textures onto shared backing surfaces.
///
/// Placement is shelf-based: entries fill a row left to right, rows stack
/// downward. A surface that cannot take the next entry is left as-is and a
/// fresh surface is opened; the atlas never evicts, so existing entries
/// stay valid for as long as their handles live. Entries oversized for the
/// standard surface get a surface sized up to fit, within
/// [`AtlasConfig::max_surface_size`].
pub struct TextureAtlas {
    ctx: Rc<RenderContext>,
    config: AtlasConfig,
    backing: Texture,
    cursor_x: u32,
    cursor_y: u32,
    row_height: u32,
    surfaces_opened: usize,
}

impl TextureAtlas {
    pub fn new(ctx: Rc<RenderContext>, config: AtlasConfig) -> Self {
        debug_assert!(
            config.surface_size > 0 && config.surface_size <= config.max_surface_size,
            "atlas surface size must be within (0, max_surface_size]"
        );
        debug_assert!(
            config.padding * 2 < config.surface_size,
            "atlas padding leaves no room for entries"
        );

        let backing = Self::open(&ctx, &config, config.surface_size, 1);
        Self {
            ctx,
            config,
            backing,
            cursor_x: 0,
            cursor_y: 0,
            row_height: 0,
            surfaces_opened: 1,
        }
    }

    pub fn with_defaults(ctx: Rc<RenderContext>) -> Self {
        Self::new(ctx, AtlasConfig::default())
    }

    /// Reserves a `width` x `height` region, returning a texture handle
    /// mapped onto it.
    pub fn add(&mut self, width: u32, height: u32) -> Result<Texture, RenderError> {
        let pad = self.config.padding;
        let max = self.config.max_surface_size;
        // Raw sizes are capped before the padding arithmetic, which would
        // wrap for requests near u32::MAX.
        if width > max || height > max {
            return Err(RenderError::AtlasRequestTooLarge { width, height, max });
        }
        let (cell_w, cell_h) = (width + 2 * pad, height + 2 * pad);
        if cell_w > max || cell_h > max {
            return Err(RenderError::AtlasRequestTooLarge { width, height, max });
        }

        // Requests beyond the standard surface get a dedicated larger one.
        if cell_w > self.config.surface_size || cell_h > self.config.surface_size {
            let size = cell_w.max(cell_h).next_power_of_two().min(max);
            self.open_surface(size);
        }

        let surface = self.backing.width();
        if self.cursor_x + cell_w > surface {
            self.cursor_x = 0;
            self.cursor_y += self.row_height;
            self.row_height = 0;
        }
        if self.cursor_y + cell_h > surface {
            // Vertically exhausted. Existing entries keep their storage;
            // new entries land on a fresh surface.
            self.open_surface(self.config.surface_size);
        }

        let region = Rect::new(
            (self.cursor_x + pad) as f32,
            (self.cursor_y + pad) as f32,
            width as f32,
            height as f32,
        );
        self.row_height = self.row_height.max(cell_h);
        self.cursor_x += cell_w;

        Ok(self.backing.share_region(region))
    }

    /// Surfaces opened over this atlas's lifetime.
    pub fn surfaces_opened(&self) -> usize {
        self.surfaces_opened
    }

    fn open_surface(&mut self, size: u32) {
        self.surfaces_opened += 1;
        self.backing = Self::open(&self.ctx, &self.config, size, self.surfaces_opened);
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.row_height = 0;
    }

    fn open(ctx: &RenderContext, config: &AtlasConfig, size: u32, ordinal: usize) -> Texture {
        let label = format!("atlas-{ordinal}");
        log::debug!("atlas opened surface '{label}' ({size}x{size})");
        Texture::new(ctx, &label, size, size, config.filter)
    }
}

// ── tests ───────────────────────────────────────────────────────────────────
