//! Integer rectangles in frame pixel coordinates.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle `{x, y, width, height}` in pixel coordinates.
///
/// Coordinates are unsigned, so `x >= 0` and `y >= 0` hold by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a rectangle from its top-left corner and size.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge (`x + width`).
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge (`y + height`).
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Area in square pixels.
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// True when either side is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Geometric center.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            f64::from(self.x) + f64::from(self.width) / 2.0,
            f64::from(self.y) + f64::from(self.height) / 2.0,
        )
    }

    /// True if `other` lies entirely inside `self`.
    #[must_use]
    pub const fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Intersection of two rectangles, `None` if they do not overlap.
    #[must_use]
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if left >= right || top >= bottom {
            return None;
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }

    /// Intersection-over-union ratio in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn overlap_ratio(&self, other: &Rect) -> f64 {
        let Some(inter) = self.intersection(other) else {
            return 0.0;
        };
        let inter = inter.area();
        let union = self.area() + other.area() - inter;
        if union == 0 {
            0.0
        } else {
            inter as f64 / union as f64
        }
    }

    /// Euclidean distance between the two centers.
    #[must_use]
    pub fn center_distance(&self, other: &Rect) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        (ax - bx).hypot(ay - by)
    }

    /// Smallest rectangle covering both.
    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Smallest rectangle covering every rectangle in `rects`.
    pub fn bounding<I: IntoIterator<Item = Rect>>(rects: I) -> Option<Rect> {
        rects.into_iter().reduce(|acc, r| acc.union(&r))
    }

    /// Grow by `pad_x` on the left and right and `pad_y` on the top and bottom.
    ///
    /// Growth toward negative coordinates stops at zero; the far edge still moves
    /// outward by the full amount, so the result always contains `self`.
    #[must_use]
    pub fn expand(&self, pad_x: u32, pad_y: u32) -> Rect {
        let left = self.x.saturating_sub(pad_x);
        let top = self.y.saturating_sub(pad_y);
        let right = self.right() + pad_x;
        let bottom = self.bottom() + pad_y;
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Translate by a non-negative offset.
    #[must_use]
    pub const fn offset(&self, dx: u32, dy: u32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Scale all coordinates by `factor`, rounding outward so the scaled
    /// rectangle covers the original area.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn scale(&self, factor: f64) -> Rect {
        let left = (f64::from(self.x) * factor).floor().max(0.0) as u32;
        let top = (f64::from(self.y) * factor).floor().max(0.0) as u32;
        let right = (f64::from(self.right()) * factor).ceil().max(0.0) as u32;
        let bottom = (f64::from(self.bottom()) * factor).ceil().max(0.0) as u32;
        Rect::new(
            left,
            top,
            right.saturating_sub(left),
            bottom.saturating_sub(top),
        )
    }

    /// Clip to a `width x height` frame. Returns `None` if nothing remains.
    #[must_use]
    pub fn clip_to(&self, width: u32, height: u32) -> Option<Rect> {
        self.intersection(&Rect::new(0, 0, width, height))
    }

    /// Shrink oversized sides to at most `max_width x max_height` around the
    /// same center (exact when the size difference is even, otherwise within
    /// half a pixel). Sides already within the limit are left untouched.
    #[must_use]
    pub fn clamp_centered(&self, max_width: u32, max_height: u32) -> Rect {
        let mut out = *self;
        if out.width > max_width {
            out.x = (2 * out.x + out.width).saturating_sub(max_width) / 2;
            out.width = max_width;
        }
        if out.height > max_height {
            out.y = (2 * out.y + out.height).saturating_sub(max_height) / 2;
            out.height = max_height;
        }
        out
    }

    /// Force the rectangle inside a `frame_width x frame_height` frame with at
    /// least `min_side` pixels per side and a one pixel margin on the right and
    /// bottom, so `x + width < frame_width` and `y + height < frame_height`.
    ///
    /// Returns `None` if the frame cannot hold such a rectangle.
    #[must_use]
    pub fn clamp_into(&self, frame_width: u32, frame_height: u32, min_side: u32) -> Option<Rect> {
        let max_x = frame_width.checked_sub(min_side + 1)?;
        let max_y = frame_height.checked_sub(min_side + 1)?;
        let x = self.x.min(max_x);
        let y = self.y.min(max_y);
        let width = self.width.min(frame_width - 1 - x).max(min_side);
        let height = self.height.min(frame_height - 1 - y).max(min_side);
        Some(Rect::new(x, y, width, height))
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}
