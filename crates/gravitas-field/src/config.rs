//! Engine configuration.
//!
//! Values are read from a TOML file or string through the `config` crate,
//! then overridden by environment variables prefixed with `GRAVITAS`
//! (nested keys separated by `__`).
//!
//! ```toml
//! self_weight = 0.0
//! neighbor_weight = 0.25
//! compute_device = "gpu"
//! compute_iterations = 2
//! ```

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::backend::Device;
use crate::diffusion::DiffusionWeights;
use crate::error::{FieldError, Result};

/// Allowed range of diffusion passes per `diffuse` call.
pub const ITERATIONS_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

const ENV_PREFIX: &str = "GRAVITAS";

/// Values the engine reads from application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Weight of a cell's own previous value.
    #[serde(default = "default_self_weight")]
    pub self_weight: f32,

    /// Weight of each orthogonal neighbor.
    #[serde(default = "default_neighbor_weight")]
    pub neighbor_weight: f32,

    /// Compute device (`cpu` or `gpu`).
    #[serde(default)]
    pub compute_device: Device,

    /// Diffusion passes per `diffuse` call.
    #[serde(default = "default_iterations")]
    pub compute_iterations: u32,

    /// World units per grid cell.
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,

    /// Grid width in cells.
    #[serde(default = "default_grid_width")]
    pub grid_width: u32,

    /// Grid height in cells.
    #[serde(default = "default_grid_height")]
    pub grid_height: u32,
}

fn default_self_weight() -> f32 {
    0.0
}

fn default_neighbor_weight() -> f32 {
    0.25
}

fn default_iterations() -> u32 {
    1
}

fn default_cell_size() -> f32 {
    1.0
}

fn default_grid_width() -> u32 {
    640
}

fn default_grid_height() -> u32 {
    480
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            self_weight: default_self_weight(),
            neighbor_weight: default_neighbor_weight(),
            compute_device: Device::default(),
            compute_iterations: default_iterations(),
            cell_size: default_cell_size(),
            grid_width: default_grid_width(),
            grid_height: default_grid_height(),
        }
    }
}

impl FieldConfig {
    /// Load from a TOML file with environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, falling back to defaults on any error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Using default field configuration: {}", e);
            Self::default()
        })
    }

    /// Create from environment variables only.
    pub fn from_env() -> Result<Self> {
        let builder =
            Config::builder().add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string as-is, without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let builder = Config::builder().add_source(File::from_str(content, FileFormat::Toml));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Diffusion weights as a single value.
    pub fn weights(&self) -> DiffusionWeights {
        DiffusionWeights::new(self.self_weight, self.neighbor_weight)
    }

    /// Convert a world position to continuous grid coordinates.
    pub fn world_to_grid(&self, wx: f32, wy: f32) -> (f32, f32) {
        (wx / self.cell_size, wy / self.cell_size)
    }

    /// Validate the configuration.
    ///
    /// Weights only need to be finite; values outside `[0, 1]` are allowed
    /// and may make the field grow without bound.
    pub fn validate(&self) -> Result<()> {
        self.weights().validate()?;

        if !ITERATIONS_RANGE.contains(&self.compute_iterations) {
            return Err(FieldError::invalid_input(format!(
                "compute_iterations must be in {}..={}, got {}",
                ITERATIONS_RANGE.start(),
                ITERATIONS_RANGE.end(),
                self.compute_iterations
            )));
        }

        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(FieldError::invalid_input(format!(
                "cell_size must be positive, got {}",
                self.cell_size
            )));
        }

        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(FieldError::invalid_input(format!(
                "grid dimensions must be positive, got {}x{}",
                self.grid_width, self.grid_height
            )));
        }

        Ok(())
    }
}

/// Load configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FieldConfig> {
    FieldConfig::load(path)
}

/// Load configuration from a TOML string with environment overrides.
///
/// `GRAVITAS__*` variables take precedence over the string; use
/// [`FieldConfig::from_toml_str`] to ignore them.
pub fn load_config_from_str(content: &str) -> Result<FieldConfig> {
    let builder = Config::builder()
        .add_source(File::from_str(content, FileFormat::Toml))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let config: FieldConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Fluent construction of a [`FieldConfig`].
pub struct ConfigBuilder {
    config: FieldConfig,
}

impl ConfigBuilder {
    /// Start from defaults.
    pub fn new() -> Self {
        Self {
            config: FieldConfig::default(),
        }
    }

    pub fn weights(mut self, self_weight: f32, neighbor_weight: f32) -> Self {
        self.config.self_weight = self_weight;
        self.config.neighbor_weight = neighbor_weight;
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.config.compute_device = device;
        self
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.config.compute_iterations = iterations;
        self
    }

    pub fn cell_size(mut self, cell_size: f32) -> Self {
        self.config.cell_size = cell_size;
        self
    }

    pub fn grid(mut self, width: u32, height: u32) -> Self {
        self.config.grid_width = width;
        self.config.grid_height = height;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<FieldConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
