use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::annotation::{Rgba, StrokeWidth, TextSize};
use crate::history::DEFAULT_DEPTH;

/// Editor preferences persisted as JSON in the platform config directory.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorSettings {
    pub last_color: Rgba,
    pub last_stroke: StrokeWidth,
    pub last_text_size: TextSize,
    pub arrow_heads: bool,
    pub text_background: Option<Rgba>,
    pub badge_fill: Rgba,
    pub badge_text: Rgba,
    pub highlight_color: Rgba,
    pub font_path: Option<PathBuf>,
    pub history_depth: usize,
    pub drag_rate_hz: f64,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            last_color: [229, 62, 62, 255],
            last_stroke: StrokeWidth::Medium,
            last_text_size: TextSize::DEFAULT,
            arrow_heads: true,
            text_background: None,
            badge_fill: [229, 62, 62, 255],
            badge_text: [255, 255, 255, 255],
            highlight_color: [255, 230, 0, 96],
            font_path: None,
            history_depth: DEFAULT_DEPTH,
            drag_rate_hz: 90.0,
        }
    }
}

impl EditorSettings {
    fn file_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("com", "snapmark", "snapmark")?;
        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir).ok()?;
        Some(config_dir.join("editor.json"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::file_path().context("cannot resolve settings path")?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let settings: Self = serde_json::from_str(&raw)
            .with_context(|| format!("cannot parse {}", path.display()))?;
        Ok(settings.sanitized())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::file_path().context("cannot resolve settings path")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("cannot write {}", path.display()))?;
        Ok(())
    }

    /// Minimum time between two processed drag ticks, in seconds.
    /// Minimum spacing between applied drag ticks. Zero when the rate is
    /// unusable, so no tick is ever dropped.
    pub fn drag_interval(&self) -> f64 {
        if self.drag_rate_hz.is_finite() && self.drag_rate_hz > 0.0 {
            1.0 / self.drag_rate_hz
        } else {
            0.0
        }
    }

    pub(crate) fn sanitized(mut self) -> Self {
        self.history_depth = self.history_depth.max(1);
        if !self.drag_rate_hz.is_finite() || self.drag_rate_hz <= 0.0 {
            self.drag_rate_hz = Self::default().drag_rate_hz;
        }
        self
    }
}
