//! Editor styling and constants.
//!
//! Contains `EditorStyle` and the slot type colors.

use egui::Color32;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Height of a node or group title bar at zoom 1.
pub const HEADER_HEIGHT: f32 = 26.0;

/// Vertical distance between two slots at zoom 1.
pub const SLOT_SPACING: f32 = 22.0;

pub const NODE_WIDTH: f32 = 190.0;

/// Radius of a slot handle at zoom 1.
pub const SLOT_RADIUS: f32 = 5.0;

/// Get the display color for a slot type.
pub fn slot_color(slot_type: &str) -> Color32 {
    match slot_type {
        "MODEL" => Color32::from_rgb(180, 160, 255),
        "CLIP" => Color32::from_rgb(255, 210, 80),
        "VAE" => Color32::from_rgb(255, 110, 110),
        "CONDITIONING" => Color32::from_rgb(255, 170, 60),
        "LATENT" => Color32::from_rgb(255, 150, 220),
        "IMAGE" => Color32::from_rgb(100, 180, 255),
        "MASK" => Color32::from_rgb(120, 220, 150),
        _ => Color32::GRAY,
    }
}

/// Visual styling configuration for the canvas.
#[derive(Clone, Serialize, Deserialize)]
pub struct EditorStyle {
    /// Header color per widget category.
    pub header_colors: HashMap<String, Color32>,
    pub group_color: Color32,
    pub highlight_color: Color32,
    pub use_gradient_connections: bool,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

fn default_font_size() -> f32 {
    14.0
}

impl Default for EditorStyle {
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert("loaders".into(), Color32::from_rgb(110, 70, 160));
        map.insert("conditioning".into(), Color32::from_rgb(160, 110, 40));
        map.insert("sampling".into(), Color32::from_rgb(50, 100, 200));
        map.insert("latent".into(), Color32::from_rgb(160, 60, 120));
        map.insert("image".into(), Color32::from_rgb(50, 150, 150));
        map.insert("Default".into(), Color32::from_rgb(100, 100, 100));
        Self {
            header_colors: map,
            group_color: Color32::from_rgb(90, 110, 130),
            highlight_color: Color32::from_rgb(255, 200, 60),
            use_gradient_connections: true,
            font_size: 14.0,
        }
    }
}

impl EditorStyle {
    pub fn header_color(&self, category: Option<&str>) -> Color32 {
        category
            .and_then(|c| self.header_colors.get(c))
            .or_else(|| self.header_colors.get("Default"))
            .copied()
            .unwrap_or(Color32::GRAY)
    }
}
