use crate::coords::ColorRgba;

/// Parameters for clearing the bound frame buffer.
///
/// Each aspect carries a flag alongside its clear value; aspects whose
/// flag is off keep their current contents, so depth can be reset
/// mid-frame without losing the colour buffer. [`ClearInfo::new`] clears
/// all three aspects, which is what the start of a frame wants.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClearInfo {
    pub color: ColorRgba,
    pub depth: f32,
    pub stencil: u32,
    pub clear_color: bool,
    pub clear_depth: bool,
    pub clear_stencil: bool,
}

impl ClearInfo {
    /// Clears colour, depth, and stencil.
    #[inline]
    pub const fn new(color: ColorRgba) -> Self {
        Self {
            color,
            depth: 1.0,
            stencil: 0,
            clear_color: true,
            clear_depth: true,
            clear_stencil: true,
        }
    }

    /// Clears only the colour aspect.
    #[inline]
    pub const fn color_only(color: ColorRgba) -> Self {
        Self {
            color,
            depth: 1.0,
            stencil: 0,
            clear_color: true,
            clear_depth: false,
            clear_stencil: false,
        }
    }

    /// Clears only the depth aspect.
    #[inline]
    pub const fn depth_only(depth: f32) -> Self {
        Self {
            color: ColorRgba::transparent(),
            depth,
            stencil: 0,
            clear_color: false,
            clear_depth: true,
            clear_stencil: false,
        }
    }

    /// Folds `later` over this clear: aspects `later` touches take its
    /// values, untouched aspects keep this clear's settings. Two clears
    /// with no draw between them are equivalent to their fold.
    pub fn merged_with(self, later: ClearInfo) -> ClearInfo {
        ClearInfo {
            color: if later.clear_color { later.color } else { self.color },
            depth: if later.clear_depth { later.depth } else { self.depth },
            stencil: if later.clear_stencil { later.stencil } else { self.stencil },
            clear_color: self.clear_color || later.clear_color,
            clear_depth: self.clear_depth || later.clear_depth,
            clear_stencil: self.clear_stencil || later.clear_stencil,
        }
    }
}

impl Default for ClearInfo {
    fn default() -> Self {
        Self::new(ColorRgba::transparent())
    }
}

// ── tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_touches_every_aspect() {
        let info = ClearInfo::new(ColorRgba::black());
        assert!(info.clear_color && info.clear_depth && info.clear_stencil);
        assert_eq!(info.depth, 1.0);
        assert_eq!(info.stencil, 0);
    }

    #[test]
    fn single_aspect_clears_leave_the_rest_untouched() {
        let color = ClearInfo::color_only(ColorRgba::white());
        assert!(color.clear_color && !color.clear_depth && !color.clear_stencil);

        let depth = ClearInfo::depth_only(0.5);
        assert!(!depth.clear_color && depth.clear_depth && !depth.clear_stencil);
        assert_eq!(depth.depth, 0.5);
    }

    #[test]
    fn merging_folds_aspects_with_the_later_clear_winning() {
        let first = ClearInfo::color_only(ColorRgba::black());
        let second = ClearInfo::depth_only(0.25);

        // Disjoint aspects accumulate.
        let merged = first.merged_with(second);
        assert!(merged.clear_color && merged.clear_depth && !merged.clear_stencil);
        assert_eq!(merged.color, ColorRgba::black());
        assert_eq!(merged.depth, 0.25);

        // Overlapping aspects take the later value.
        let repainted = merged.merged_with(ClearInfo::color_only(ColorRgba::white()));
        assert_eq!(repainted.color, ColorRgba::white());
        assert_eq!(repainted.depth, 0.25);
    }
}
