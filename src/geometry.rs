//! Canvas geometry: bounding boxes, containment and the canvas transform.
//!
//! Handles conversions between canvas coordinates and screen coordinates,
//! accounting for pan and zoom.

use egui::{Pos2, Rect, Vec2};

/// Smallest axis-aligned box enclosing every rect, or `None` for no rects.
pub fn bbox(rects: impl IntoIterator<Item = Rect>) -> Option<Rect> {
    rects.into_iter().reduce(|acc, r| acc.union(r))
}

/// Whether `outer` fully encloses `inner`. Shared edges count as contained.
pub fn contains(outer: Rect, inner: Rect) -> bool {
    outer.min.x <= inner.min.x
        && outer.min.y <= inner.min.y
        && outer.max.x >= inner.max.x
        && outer.max.y >= inner.max.y
}

/// Pan and zoom of the canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasTransform {
    pub pan: Vec2,
    pub zoom: f32,
}

impl Default for CanvasTransform {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl CanvasTransform {
    pub const MIN_ZOOM: f32 = 0.1;
    pub const MAX_ZOOM: f32 = 10.0;

    /// Convert canvas coordinates to screen coordinates.
    ///
    /// # Arguments
    /// * `pos` - Position in canvas space
    /// * `canvas_offset` - Top-left corner of the canvas in screen space
    pub fn to_screen(&self, pos: Pos2, canvas_offset: Pos2) -> Pos2 {
        canvas_offset + self.pan + pos.to_vec2() * self.zoom
    }

    /// Convert screen coordinates to canvas coordinates.
    pub fn from_screen(&self, screen_pos: Pos2, canvas_offset: Pos2) -> Pos2 {
        ((screen_pos - canvas_offset - self.pan) / self.zoom).to_pos2()
    }

    pub fn rect_to_screen(&self, rect: Rect, canvas_offset: Pos2) -> Rect {
        Rect::from_min_size(self.to_screen(rect.min, canvas_offset), rect.size() * self.zoom)
    }

    /// Zoom by `factor` keeping the screen point `anchor` stationary.
    pub fn zoom_around(&mut self, anchor: Vec2, factor: f32) {
        let old_zoom = self.zoom;
        let new_zoom = (old_zoom * factor).clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
        let ratio = new_zoom / old_zoom;
        self.pan = anchor - (anchor - self.pan) * ratio;
        self.zoom = new_zoom;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_min_size(Pos2::new(x, y), Vec2::new(w, h))
    }

    #[test]
    fn bbox_of_nothing_is_none() {
        assert_eq!(bbox(std::iter::empty()), None);
    }

    #[test]
    fn bbox_encloses_all_rects() {
        let b = bbox([rect(0.0, 0.0, 10.0, 10.0), rect(20.0, -5.0, 5.0, 5.0)]).unwrap();
        assert_eq!(b, Rect::from_min_max(Pos2::new(0.0, -5.0), Pos2::new(25.0, 10.0)));
    }

    #[test]
    fn containment_is_inclusive() {
        let outer = rect(0.0, 0.0, 10.0, 10.0);
        assert!(contains(outer, outer));
        assert!(contains(outer, rect(2.0, 2.0, 3.0, 3.0)));
        assert!(!contains(outer, rect(8.0, 8.0, 3.0, 3.0)));
        assert!(!contains(rect(2.0, 2.0, 3.0, 3.0), outer));
    }

    #[test]
    fn screen_round_trip() {
        let t = CanvasTransform {
            pan: Vec2::new(30.0, -12.0),
            zoom: 2.0,
        };
        let offset = Pos2::new(5.0, 5.0);
        let p = Pos2::new(7.0, 9.0);
        let back = t.from_screen(t.to_screen(p, offset), offset);
        assert!((back - p).length() < 1e-4);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut t = CanvasTransform::default();
        t.zoom_around(Vec2::ZERO, 1000.0);
        assert_eq!(t.zoom, CanvasTransform::MAX_ZOOM);
    }
}
