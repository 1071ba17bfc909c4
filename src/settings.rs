//! Application settings persisted as JSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::history::DEFAULT_MAX_RECORDS;

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    #[default]
    Bezier,
    Step,
    Straight,
}

/// `Figma` selects with a plain drag and pans with the middle button.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Default,
    Figma,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Normal,
    Fp16,
    Fp32,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    None,
    #[default]
    Auto,
    Latent2Rgb,
    Taesd,
}

/// Launch options handed to the generation backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub fp_mode: Precision,
    pub vae_mode: Precision,
    pub preview_mode: PreviewMode,
    pub extra_command: String,
}

impl RunConfig {
    /// Command line arguments for the generation backend.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self.fp_mode {
            Precision::Normal => {}
            Precision::Fp16 => args.push("--force-fp16".to_string()),
            Precision::Fp32 => args.push("--force-fp32".to_string()),
        }
        match self.vae_mode {
            Precision::Normal => {}
            Precision::Fp16 => args.push("--fp16-vae".to_string()),
            Precision::Fp32 => args.push("--fp32-vae".to_string()),
        }
        let preview = match self.preview_mode {
            PreviewMode::None => "none",
            PreviewMode::Auto => "auto",
            PreviewMode::Latent2Rgb => "latent2rgb",
            PreviewMode::Taesd => "taesd",
        };
        args.push("--preview-method".to_string());
        args.push(preview.to_string());
        args.extend(self.extra_command.split_whitespace().map(str::to_string));
        args
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub edge_type: EdgeType,
    pub selection_mode: SelectionMode,
    pub history_max_records: usize,
    pub last_document_id: Option<String>,
    /// Where workflow documents are stored. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    pub run_config: RunConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            edge_type: EdgeType::default(),
            selection_mode: SelectionMode::default(),
            history_max_records: DEFAULT_MAX_RECORDS,
            last_document_id: None,
            data_dir: None,
            run_config: RunConfig::default(),
        }
    }
}

impl AppSettings {
    /// Load settings, falling back to defaults when the file is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(Some(settings)) => {
                log::info!("Settings loaded from {}", path.display());
                settings
            }
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("Using default settings: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(settings))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("workflow_canvas")))
            .unwrap_or_else(|| PathBuf::from("workflows"))
            .join("documents")
    }
}
