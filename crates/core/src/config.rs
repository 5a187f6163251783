//! Editor configuration
//!
//! Settings can be created programmatically, loaded from a JSON file, or
//! overridden through `FOLIO_*` environment variables.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use folio_cache::MemoryBudgetConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::ToolKind;

/// Configuration for one editing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum number of snapshots kept in the undo history
    pub history_capacity: usize,

    /// Redactions must be wider and taller than this (document units)
    pub min_redaction_size: f32,

    /// Ink strokes must span more than this along their longer side
    pub min_ink_extent: f32,

    /// Shapes and created fields must span more than this
    pub min_shape_size: f32,

    /// Hit-test slack around elements, in document units
    pub hit_tolerance: f32,

    pub eraser_radius: f32,
    pub handle_size: f32,

    pub min_zoom: f32,
    pub max_zoom: f32,
    pub zoom_step: f32,

    /// Pages on each side of the current page kept rendered
    pub render_window: u32,
    pub raster_cache_mb: usize,
    pub memory_budget_mb: usize,
    pub memory_warning_threshold: f64,
    pub memory_check_interval_secs: u64,

    pub default_font_family: String,
    pub default_font_size: f32,

    /// Attempts per font fetch before falling back
    pub font_fetch_attempts: u32,

    /// Offset applied to pasted elements
    pub paste_offset: f32,

    /// OCR blocks below this confidence are not promoted
    pub ocr_min_confidence: f32,

    /// Single-letter tool shortcuts overriding the defaults
    pub shortcuts: BTreeMap<String, ToolKind>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            min_redaction_size: 5.0,
            min_ink_extent: 2.0,
            min_shape_size: 2.0,
            hit_tolerance: 3.0,
            eraser_radius: 10.0,
            handle_size: 6.0,
            min_zoom: 0.25,
            max_zoom: 4.0,
            zoom_step: 1.25,
            render_window: 2,
            raster_cache_mb: 256,
            memory_budget_mb: 512,
            memory_warning_threshold: 0.85,
            memory_check_interval_secs: 5,
            default_font_family: "Helvetica".to_string(),
            default_font_size: 14.0,
            font_fetch_attempts: 2,
            paste_offset: 10.0,
            ocr_min_confidence: 0.5,
            shortcuts: BTreeMap::new(),
        }
    }
}

impl EditorConfig {
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_min_redaction_size(mut self, size: f32) -> Self {
        self.min_redaction_size = size;
        self
    }

    pub fn with_eraser_radius(mut self, radius: f32) -> Self {
        self.eraser_radius = radius;
        self
    }

    pub fn with_render_window(mut self, radius: u32) -> Self {
        self.render_window = radius;
        self
    }

    pub fn with_raster_cache_mb(mut self, mb: usize) -> Self {
        self.raster_cache_mb = mb;
        self
    }

    pub fn with_default_font(mut self, family: impl Into<String>, size: f32) -> Self {
        self.default_font_family = family.into();
        self.default_font_size = size;
        self
    }

    /// Bind a letter to a tool, replacing its default shortcut
    pub fn with_shortcut(mut self, key: char, tool: ToolKind) -> Self {
        self.shortcuts.insert(key.to_lowercase().to_string(), tool);
        self
    }

    /// Memory budget settings for the compositor
    pub fn memory_budget(&self) -> MemoryBudgetConfig {
        MemoryBudgetConfig::new(self.memory_budget_mb)
            .with_warning_threshold(self.memory_warning_threshold)
            .with_check_interval(Duration::from_secs(self.memory_check_interval_secs))
    }

    /// Clamp a zoom factor into the configured range
    pub fn clamp_zoom(&self, zoom: f32) -> f32 {
        if zoom.is_finite() {
            zoom.clamp(self.min_zoom, self.max_zoom)
        } else {
            1.0
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FOLIO_HISTORY_CAPACITY`: undo snapshots kept (default: 50)
    /// - `FOLIO_MIN_REDACTION_SIZE`: minimum redaction side (default: 5)
    /// - `FOLIO_ERASER_RADIUS`: eraser radius in document units (default: 10)
    /// - `FOLIO_RENDER_WINDOW`: pages kept rendered around the current page (default: 2)
    /// - `FOLIO_RASTER_CACHE_MB`: raster cache size in MB (default: 256)
    /// - `FOLIO_MEMORY_BUDGET_MB`: memory budget in MB (default: 512)
    /// - `FOLIO_DEFAULT_FONT`: default text box font family
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Apply `FOLIO_*` overrides on top of `self`
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        env_override("FOLIO_HISTORY_CAPACITY", &mut self.history_capacity)?;
        env_override("FOLIO_MIN_REDACTION_SIZE", &mut self.min_redaction_size)?;
        env_override("FOLIO_ERASER_RADIUS", &mut self.eraser_radius)?;
        env_override("FOLIO_RENDER_WINDOW", &mut self.render_window)?;
        env_override("FOLIO_RASTER_CACHE_MB", &mut self.raster_cache_mb)?;
        env_override("FOLIO_MEMORY_BUDGET_MB", &mut self.memory_budget_mb)?;

        if let Ok(family) = std::env::var("FOLIO_DEFAULT_FONT") {
            if !family.trim().is_empty() {
                self.default_font_family = family.trim().to_string();
            }
        }

        self.validate()?;
        Ok(self)
    }

    /// Loads configuration from a JSON file; missing keys keep their defaults.
    ///
    /// ```json
    /// { "history_capacity": 100, "eraser_radius": 12.0, "shortcuts": { "q": "rectangle" } }
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom) {
            return Err(ConfigError::Invalid(format!(
                "zoom range {}..{} is empty",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.zoom_step <= 1.0 {
            return Err(ConfigError::Invalid("zoom_step must exceed 1".to_string()));
        }
        if self.default_font_size <= 0.0 {
            return Err(ConfigError::Invalid(
                "default_font_size must be positive".to_string(),
            ));
        }
        for key in self.shortcuts.keys() {
            if key.chars().count() != 1 {
                return Err(ConfigError::Invalid(format!(
                    "shortcut {key:?} must be a single character"
                )));
            }
        }
        Ok(())
    }
}

fn env_override<T: FromStr>(name: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(name) {
        *target = value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: name.to_string(),
            value,
        })?;
    }
    Ok(())
}

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("{0}")]
    Invalid(String),

    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
