//! Persistent observing conditions and selection tunables.
//!
//! [`SkyConfig`] is an explicitly constructed configuration object: load it,
//! validate it, and build the runtime [`SkyContext`] and
//! [`SelectionSettings`] from it. Stored as pretty-printed JSON; any field
//! missing from the file takes its default.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atmosphere::{
    Extinction, Refraction, UndergroundExtinctionMode, DEFAULT_EXTINCTION_COEFFICIENT,
    DEFAULT_PRESSURE_MBAR, DEFAULT_TEMPERATURE_CELSIUS,
};
use crate::selection::{SelectionSettings, DEFAULT_DISTANCE_WEIGHT, DEFAULT_SEARCH_RADIUS_PX};
use crate::sky_context::{SkyContext, DEFAULT_LIMIT_MAGNITUDE};

/// Lowest physically possible temperature
const ABSOLUTE_ZERO_CELSIUS: f64 = -273.15;

/// Errors that can occur loading, saving or validating a [`SkyConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Observing conditions and selection tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyConfig {
    /// Atmospheric pressure in millibars
    pub pressure_mbar: f64,
    /// Air temperature in degrees Celsius
    pub temperature_celsius: f64,
    /// Extinction in magnitudes per airmass. Values outside `[0, 1]` are
    /// accepted but physically implausible.
    pub extinction_coefficient: f64,
    /// Airmass policy below the horizon threshold
    pub underground_extinction: UndergroundExtinctionMode,
    /// Whether atmospheric effects apply in [`RefractionMode::Auto`](crate::RefractionMode::Auto)
    pub has_atmosphere: bool,
    /// Limiting magnitude of the current view
    pub limit_magnitude: f64,
    /// User override of the limiting magnitude for selection
    pub custom_limit_magnitude: Option<f64>,
    /// On-screen search circle diameter in pixels
    pub search_radius_px: f64,
    /// Weight of pixel distance against select priority
    pub distance_weight: f64,
}

impl Default for SkyConfig {
    fn default() -> Self {
        Self {
            pressure_mbar: DEFAULT_PRESSURE_MBAR,
            temperature_celsius: DEFAULT_TEMPERATURE_CELSIUS,
            extinction_coefficient: DEFAULT_EXTINCTION_COEFFICIENT,
            underground_extinction: UndergroundExtinctionMode::default(),
            has_atmosphere: true,
            limit_magnitude: DEFAULT_LIMIT_MAGNITUDE,
            custom_limit_magnitude: None,
            search_radius_px: DEFAULT_SEARCH_RADIUS_PX,
            distance_weight: DEFAULT_DISTANCE_WEIGHT,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn require_finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} is not finite")))
    }
}

impl SkyConfig {
    /// Check every field for physically meaningful values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_finite("pressure_mbar", self.pressure_mbar)?;
        require_finite("temperature_celsius", self.temperature_celsius)?;
        require_finite("extinction_coefficient", self.extinction_coefficient)?;
        require_finite("limit_magnitude", self.limit_magnitude)?;
        require_finite("search_radius_px", self.search_radius_px)?;
        require_finite("distance_weight", self.distance_weight)?;
        if let Some(custom) = self.custom_limit_magnitude {
            require_finite("custom_limit_magnitude", custom)?;
        }

        if self.pressure_mbar <= 0.0 {
            return Err(invalid("pressure_mbar", "must be positive"));
        }
        if self.temperature_celsius <= ABSOLUTE_ZERO_CELSIUS {
            return Err(invalid(
                "temperature_celsius",
                format!("must be above {ABSOLUTE_ZERO_CELSIUS}"),
            ));
        }
        if self.search_radius_px <= 0.0 {
            return Err(invalid("search_radius_px", "must be positive"));
        }
        if self.distance_weight < 0.0 {
            return Err(invalid("distance_weight", "must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.extinction_coefficient) {
            log::warn!(
                "Extinction coefficient {} mag/airmass is outside the usual [0, 1] range",
                self.extinction_coefficient
            );
        }
        Ok(())
    }

    /// Runtime sky state for these conditions
    pub fn build_context(&self) -> SkyContext {
        let mut extinction = Extinction::new(self.extinction_coefficient);
        extinction.set_underground_mode(self.underground_extinction);
        let refraction = Refraction::with_conditions(self.pressure_mbar, self.temperature_celsius);

        let mut sky = SkyContext::new(extinction, refraction);
        sky.set_has_atmosphere(self.has_atmosphere);
        sky.set_limit_magnitude(self.limit_magnitude);
        sky.set_custom_limit_magnitude(self.custom_limit_magnitude);
        sky
    }

    /// Resolver tunables from this config
    pub fn selection_settings(&self) -> SelectionSettings {
        SelectionSettings {
            search_radius_px: self.search_radius_px,
            distance_weight: self.distance_weight,
        }
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::debug!("Saved sky config to {}", path.display());
        Ok(())
    }

    /// Load from JSON file and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        log::debug!("Loaded sky config from {}", path.display());
        Ok(config)
    }
}
