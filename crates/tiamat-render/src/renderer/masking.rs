use crate::coords::Rect;

/// Masking parameters for a scope of draws.
///
/// `screen_space_aabb` is the axis-aligned bound the scissor is derived
/// from; `masking_rect` is the exact (possibly rounded) region the fragment
/// stage masks against.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MaskingInfo {
    pub screen_space_aabb: Rect,
    pub masking_rect: Rect,
    pub corner_radius: f32,
    pub corner_exponent: f32,
    pub border_thickness: f32,
    pub blend_range: f32,
}

impl MaskingInfo {
    /// The base stack entry covering the whole frame, with masking inert.
    pub fn unmasked(frame: Rect) -> Self {
        Self {
            screen_space_aabb: frame,
            masking_rect: frame,
            corner_radius: 0.0,
            corner_exponent: 2.0,
            border_thickness: 0.0,
            blend_range: 1.0,
        }
    }

    /// Plain rectangular mask over `rect`.
    pub fn rect(rect: Rect) -> Self {
        Self {
            screen_space_aabb: rect,
            masking_rect: rect,
            corner_radius: 0.0,
            corner_exponent: 2.0,
            border_thickness: 0.0,
            blend_range: 1.0,
        }
    }

    /// Rounded-rectangle mask over `rect`.
    pub fn rounded_rect(rect: Rect, corner_radius: f32) -> Self {
        Self {
            corner_radius,
            ..Self::rect(rect)
        }
    }
}
