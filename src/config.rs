//! Numeric constants and palette consumed when the atlas is created.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::palette::Palette;

/// Default upper zoom bound. Points stay within a fraction of a pixel of their
/// f64 position up to here.
pub const DEFAULT_MAX_ZOOM: f64 = 10_000.0;

/// Errors produced while loading or validating an [`AtlasConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse atlas config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be a positive finite number, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("opacity {field} must be within 0..=1, got {value}")]
    OpacityOutOfRange { field: &'static str, value: f32 },
    #[error("max_zoom ({max}) must not be below min_zoom ({min})")]
    InvalidZoomBounds { min: f64, max: f64 },
}

/// Visual and interaction constants of the atlas.
///
/// Every field has a default matching the reference CDE explorer, so partial
/// JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Point diameter in logical pixels.
    pub point_size: f32,
    /// Point diameter for search matches.
    pub point_size_highlight: f32,
    /// Point diameter for pinned entities. Overrides the other sizes.
    pub point_size_pinned: f32,
    /// Opacity of points filtered out.
    pub dimmed_opacity: f32,
    /// Opacity of points passing the filters.
    pub active_opacity: f32,
    /// Opacity of pinned entities. Overrides the other opacities.
    pub pinned_opacity: f32,

    /// Vertical half extent of the frustum at zoom 1, in world units.
    pub frustum_half_extent: f64,
    pub min_zoom: f64,
    /// Upper zoom bound, `None` for unbounded.
    ///
    /// Point positions reach the GPU as f32. Past the default bound their
    /// rounding approaches a pixel for data a few hundred units from the origin.
    pub max_zoom: Option<f64>,
    /// Multiplicative zoom per wheel notch.
    pub wheel_zoom_factor: f64,
    /// Multiplicative zoom of the zoom in/out buttons.
    pub step_zoom_factor: f64,
    /// Zoom reached when focusing an entity.
    pub focus_zoom: f64,
    /// Fraction of the pending pan applied per 60 Hz frame.
    pub pan_damping: f64,

    /// Hit tolerance at zoom 1, in world units.
    pub pick_threshold: f64,
    /// Pointer travel in logical pixels above which a press becomes a drag.
    pub click_threshold_px: f32,

    pub focus_duration_ms: u64,
    pub reset_duration_ms: u64,
    pub step_zoom_duration_ms: u64,

    /// Characters of the entity name shown in pin labels before truncation.
    pub label_max_chars: usize,
    /// Hover ring radii in world units.
    pub ring_inner_radius: f32,
    pub ring_outer_radius: f32,
    /// Hover ring color (RGB) and opacity.
    pub ring_color: [u8; 3],
    pub ring_opacity: f32,

    /// Inclusive year range covered by the year histogram and default filter.
    pub year_min: i32,
    pub year_max: i32,

    pub palette: Palette,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            point_size: 4.0,
            point_size_highlight: 7.0,
            point_size_pinned: 8.0,
            dimmed_opacity: 0.03,
            active_opacity: 0.85,
            pinned_opacity: 1.0,
            frustum_half_extent: 120.0,
            min_zoom: 0.5,
            max_zoom: Some(DEFAULT_MAX_ZOOM),
            wheel_zoom_factor: 1.15,
            step_zoom_factor: 1.5,
            focus_zoom: 8.0,
            pan_damping: 0.1,
            pick_threshold: 1.5,
            click_threshold_px: 5.0,
            focus_duration_ms: 400,
            reset_duration_ms: 350,
            step_zoom_duration_ms: 200,
            label_max_chars: 35,
            ring_inner_radius: 1.8,
            ring_outer_radius: 2.4,
            ring_color: [0x3b, 0x82, 0xf6],
            ring_opacity: 0.85,
            year_min: 2015,
            year_max: 2024,
            palette: Palette::default(),
        }
    }
}

impl AtlasConfig {
    /// Parse a (possibly partial) JSON configuration and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all constants describe a usable atlas.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("frustum_half_extent", self.frustum_half_extent),
            ("min_zoom", self.min_zoom),
            ("wheel_zoom_factor", self.wheel_zoom_factor),
            ("step_zoom_factor", self.step_zoom_factor),
            ("focus_zoom", self.focus_zoom),
            ("pick_threshold", self.pick_threshold),
            ("point_size", self.point_size as f64),
            ("point_size_highlight", self.point_size_highlight as f64),
            ("point_size_pinned", self.point_size_pinned as f64),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        let opacities = [
            ("dimmed_opacity", self.dimmed_opacity),
            ("active_opacity", self.active_opacity),
            ("pinned_opacity", self.pinned_opacity),
            ("ring_opacity", self.ring_opacity),
        ];
        for (field, value) in opacities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OpacityOutOfRange { field, value });
            }
        }

        if let Some(max) = self.max_zoom
            && (max.is_nan() || max < self.min_zoom)
        {
            return Err(ConfigError::InvalidZoomBounds {
                min: self.min_zoom,
                max,
            });
        }

        Ok(())
    }

    /// Upper zoom bound as a plain number (`f64::INFINITY` when unbounded).
    pub fn max_zoom_or_inf(&self) -> f64 {
        self.max_zoom.unwrap_or(f64::INFINITY)
    }

    pub fn focus_duration(&self) -> Duration {
        Duration::from_millis(self.focus_duration_ms)
    }

    pub fn reset_duration(&self) -> Duration {
        Duration::from_millis(self.reset_duration_ms)
    }

    pub fn step_zoom_duration(&self) -> Duration {
        Duration::from_millis(self.step_zoom_duration_ms)
    }
}
