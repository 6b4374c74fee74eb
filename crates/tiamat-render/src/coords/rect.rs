use super::Vec2;

/// Axis-aligned rectangle, top-left origin.
///
/// The units are the caller's: the same type carries pixel viewports and
/// texel atlas regions as well as normalized UV windows. A negative size
/// is tolerated everywhere and means the origin sits at the far corner;
/// [`normalized`](Rect::normalized) flips it into canonical form.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    #[inline]
    pub const fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    /// A rectangle of `size` anchored at the origin, as frame-sized
    /// viewports and ortho rects are.
    #[inline]
    pub const fn from_size(size: Vec2) -> Self {
        Self {
            origin: Vec2::zero(),
            size,
        }
    }

    #[inline]
    pub fn min(self) -> Vec2 {
        self.origin
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        self.origin + self.size
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.origin.is_finite() && self.size.is_finite()
    }

    /// Canonical form with non-negative extents; the covered area is
    /// unchanged.
    #[inline]
    pub fn normalized(self) -> Self {
        let a = self.origin;
        let b = self.max();
        let lo = Vec2::new(a.x.min(b.x), a.y.min(b.y));
        let hi = Vec2::new(a.x.max(b.x), a.y.max(b.y));
        Rect::from_origin_size(lo, hi - lo)
    }

    /// Half-open containment: the min edge is inside, the max edge is not.
    #[inline]
    pub fn contains(self, p: Vec2) -> bool {
        let r = self.normalized();
        let (lo, hi) = (r.min(), r.max());
        p.x >= lo.x && p.x < hi.x && p.y >= lo.y && p.y < hi.y
    }

    /// The overlap of two rectangles, or `None` when they share at most
    /// an edge.
    #[inline]
    pub fn intersect(self, other: Rect) -> Option<Rect> {
        let (a, b) = (self.normalized(), other.normalized());
        let lo = Vec2::new(a.min().x.max(b.min().x), a.min().y.max(b.min().y));
        let hi = Vec2::new(a.max().x.min(b.max().x), a.max().y.min(b.max().y));
        if hi.x <= lo.x || hi.y <= lo.y {
            return None;
        }
        Some(Rect::from_origin_size(lo, hi - lo))
    }
}

// ── tests ───────────────────────────────────────────────────────────────────
