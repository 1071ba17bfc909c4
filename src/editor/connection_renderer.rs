//! Connection rendering utilities.
//!
//! Draws edges between slots in the configured [`EdgeType`] and
//! hit-tests them for selection.

use egui::{Color32, Pos2, Stroke, Vec2};

use crate::settings::EdgeType;

/// Points approximating an edge from `p1` (output) to `p2` (input).
pub fn edge_points(edge_type: EdgeType, p1: Pos2, p2: Pos2) -> Vec<Pos2> {
    match edge_type {
        EdgeType::Straight => vec![p1, p2],
        EdgeType::Step => {
            let mid_x = (p1.x + p2.x) * 0.5;
            vec![p1, Pos2::new(mid_x, p1.y), Pos2::new(mid_x, p2.y), p2]
        }
        EdgeType::Bezier => {
            let dist = (p2.x - p1.x).abs();
            let control_offset = (dist * 0.5).max(50.0);
            let cp1 = Pos2::new(p1.x + control_offset, p1.y);
            let cp2 = Pos2::new(p2.x - control_offset, p2.y);

            let steps = 30;
            (0..=steps)
                .map(|i| {
                    let t = i as f32 / steps as f32;
                    let it = 1.0 - t;
                    (it.powi(3) * p1.to_vec2()
                        + 3.0 * it.powi(2) * t * cp1.to_vec2()
                        + 3.0 * it * t.powi(2) * cp2.to_vec2()
                        + t.powi(3) * p2.to_vec2())
                    .to_pos2()
                })
                .collect()
        }
    }
}

/// Draw an edge, blending from `c1_color` to `c2_color` when they differ.
pub fn draw_edge(
    painter: &egui::Painter,
    edge_type: EdgeType,
    p1: Pos2,
    p2: Pos2,
    c1_color: Color32,
    c2_color: Color32,
    width: f32,
) {
    let points = edge_points(edge_type, p1, p2);
    if c1_color == c2_color {
        painter.line(points, Stroke::new(width, c1_color));
        return;
    }
    let segments = points.len().saturating_sub(1).max(1);
    for (i, pair) in points.windows(2).enumerate() {
        let t = i as f32 / segments as f32;
        let color = Color32::from_rgb(
            lerp(c1_color.r(), c2_color.r(), t),
            lerp(c1_color.g(), c2_color.g(), t),
            lerp(c1_color.b(), c2_color.b(), t),
        );
        painter.line_segment([pair[0], pair[1]], Stroke::new(width, color));
    }
}

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 * (1.0 - t) + b as f32 * t) as u8
}

/// Test if a point is within a threshold distance of an edge.
pub fn hit_test_edge(edge_type: EdgeType, pos: Pos2, p1: Pos2, p2: Pos2, threshold: f32) -> bool {
    edge_points(edge_type, p1, p2)
        .windows(2)
        .any(|pair| distance_to_segment(pos, pair[0], pair[1]) < threshold)
}

/// Calculate distance from a point to a line segment.
pub fn distance_to_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab: Vec2 = b - a;
    let ap = p - a;
    if ab.length_sq() == 0.0 {
        return ap.length();
    }
    let proj = (ab.dot(ap) / ab.length_sq()).clamp(0.0, 1.0);
    let closest = a + ab * proj;
    (p - closest).length()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_edges_turn_halfway() {
        let points = edge_points(EdgeType::Step, Pos2::new(0.0, 0.0), Pos2::new(100.0, 50.0));
        assert_eq!(points[1], Pos2::new(50.0, 0.0));
        assert_eq!(points[2], Pos2::new(50.0, 50.0));
    }

    #[test]
    fn hit_test_follows_the_curve() {
        let (p1, p2) = (Pos2::new(0.0, 0.0), Pos2::new(200.0, 0.0));
        assert!(hit_test_edge(EdgeType::Bezier, Pos2::new(100.0, 2.0), p1, p2, 5.0));
        assert!(!hit_test_edge(EdgeType::Straight, Pos2::new(100.0, 40.0), p1, p2, 5.0));
    }

    #[test]
    fn degenerate_segment_distance() {
        let p = Pos2::new(3.0, 4.0);
        assert_eq!(distance_to_segment(p, Pos2::ZERO, Pos2::ZERO), 5.0);
    }
}
