use smallvec::SmallVec;

pub use kurbo::{Affine, BezPath, Point, Rect, RoundedRect, RoundedRectRadii, Size, Vec2};

/// A rect that contains every finite point. Used for root clips.
pub const INFINITE_RECT: Rect = Rect {
    x0: f64::NEG_INFINITY,
    y0: f64::NEG_INFINITY,
    x1: f64::INFINITY,
    y1: f64::INFINITY,
};

/// Opaque identity of a display item client, stable across paint cycles.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ClientId(pub u64);

/// Premultiplied RGBA8 (r,g,b already multiplied by a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8Premul {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8Premul {
    pub fn transparent() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        }
    }

    pub fn from_straight_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        fn premul(c: u8, a: u8) -> u8 {
            let c = u16::from(c);
            let a = u16::from(a);
            (((c * a) + 127) / 255) as u8
        }

        Self {
            r: premul(r, a),
            g: premul(g, a),
            b: premul(b, a),
            a,
        }
    }

    pub fn is_opaque(self) -> bool {
        self.a == 255
    }
}

/// True when `r` has no area (including inverted rects).
pub fn rect_is_empty(r: Rect) -> bool {
    !(r.x1 > r.x0 && r.y1 > r.y0)
}

/// True when `r` extends to infinity on any side.
pub fn rect_is_infinite(r: Rect) -> bool {
    !(r.x0.is_finite() && r.y0.is_finite() && r.x1.is_finite() && r.y1.is_finite())
}

/// Whether `outer` fully contains `inner`. Empty `inner` is contained by anything.
pub fn rect_contains(outer: Rect, inner: Rect) -> bool {
    if rect_is_empty(inner) {
        return true;
    }
    outer.x0 <= inner.x0 && outer.y0 <= inner.y0 && outer.x1 >= inner.x1 && outer.y1 >= inner.y1
}

/// Intersection that normalizes non-overlapping inputs to `Rect::ZERO`.
pub fn rect_intersect(a: Rect, b: Rect) -> Rect {
    let r = a.intersect(b);
    if rect_is_empty(r) { Rect::ZERO } else { r }
}

/// Union that ignores empty operands.
pub fn rect_union(a: Rect, b: Rect) -> Rect {
    match (rect_is_empty(a), rect_is_empty(b)) {
        (true, true) => Rect::ZERO,
        (true, false) => b,
        (false, true) => a,
        (false, false) => a.union(b),
    }
}

/// The parts of `a` not covered by `b`, as at most four disjoint rects.
///
/// Bands are emitted top, bottom, left, right; the left/right bands only span the vertical
/// overlap so the output never double-covers a pixel.
pub fn rect_subtract(a: Rect, b: Rect) -> SmallVec<[Rect; 4]> {
    let mut out = SmallVec::new();
    if rect_is_empty(a) {
        return out;
    }
    let overlap = rect_intersect(a, b);
    if rect_is_empty(overlap) {
        out.push(a);
        return out;
    }

    if overlap.y0 > a.y0 {
        out.push(Rect::new(a.x0, a.y0, a.x1, overlap.y0));
    }
    if overlap.y1 < a.y1 {
        out.push(Rect::new(a.x0, overlap.y1, a.x1, a.y1));
    }
    if overlap.x0 > a.x0 {
        out.push(Rect::new(a.x0, overlap.y0, overlap.x0, overlap.y1));
    }
    if overlap.x1 < a.x1 {
        out.push(Rect::new(overlap.x1, overlap.y0, a.x1, overlap.y1));
    }
    out
}

/// Smallest integer-aligned rect containing `r`. Infinite rects pass through unchanged.
pub fn enclosing_int_rect(r: Rect) -> Rect {
    if rect_is_empty(r) {
        return Rect::ZERO;
    }
    if rect_is_infinite(r) {
        return r;
    }
    Rect::new(r.x0.floor(), r.y0.floor(), r.x1.ceil(), r.y1.ceil())
}

/// Whether the affine only translates (no scale, rotation or skew).
pub fn is_translation_only(t: Affine) -> bool {
    let [a, b, c, d, _, _] = t.as_coeffs();
    a == 1.0 && b == 0.0 && c == 0.0 && d == 1.0
}

/// Whether the affine keeps axis-aligned rects axis-aligned (scale/flip/90 degree rotation).
pub fn preserves_axis_alignment(t: Affine) -> bool {
    let [a, b, c, d, _, _] = t.as_coeffs();
    (b == 0.0 && c == 0.0) || (a == 0.0 && d == 0.0)
}

/// Whether two affines are equal apart from their translation component.
pub fn differ_only_in_translation(a: Affine, b: Affine) -> bool {
    let [a0, a1, a2, a3, _, _] = a.as_coeffs();
    let [b0, b1, b2, b3, _, _] = b.as_coeffs();
    a0 == b0 && a1 == b1 && a2 == b2 && a3 == b3
}

/// Maps a rect through an affine, returning the axis-aligned bounding box.
///
/// Infinite rects stay infinite rather than degrading to NaN.
pub fn map_rect(t: Affine, r: Rect) -> Rect {
    if rect_is_infinite(r) {
        return INFINITE_RECT;
    }
    t.transform_rect_bbox(r)
}
