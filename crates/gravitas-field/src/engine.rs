//! Vector field compute facade.
//!
//! [`VectorFieldEngine`] is the single entry point the simulation talks to.
//! It owns the active backend plus the diffusion settings, and forwards every
//! field operation to the backend without inspecting the device per call.
//!
//! The engine is an ordinary value owned by the simulation; it holds no
//! global state. Calls are synchronous, and concurrent use from several
//! threads must be serialized by the caller.
//!
//! # Example
//!
//! ```
//! use gravitas_field::{Vec2, VectorFieldEngine};
//!
//! let mut engine = VectorFieldEngine::cpu();
//! let mut field = engine.create(64, 48, Vec2::ZERO).unwrap();
//!
//! engine.add(&mut field, 10.5, 20.25, 1.0, 0.0).unwrap();
//! engine.diffuse(&mut field).unwrap();
//! let v = engine.fit(&field, 10.5, 20.25).unwrap();
//! assert!(v.is_finite());
//! ```

use crate::backend::{Device, FieldBackend};
use crate::config::{FieldConfig, ITERATIONS_RANGE};
use crate::cpu::CpuBackend;
use crate::diffusion::{self, DiffusionWeights};
use crate::error::{FieldError, Result};
use crate::field::{Vec2, VectorField};
use crate::sampling::{Impulse, Injection};

/// Field operations over a switchable compute backend.
pub struct VectorFieldEngine {
    backend: Box<dyn FieldBackend>,
    weights: DiffusionWeights,
    iterations: u32,
}

impl VectorFieldEngine {
    /// Create an engine on the configured device.
    ///
    /// Fails with `DeviceUnavailable` if that device cannot be acquired; the
    /// caller decides whether to fall back to [`VectorFieldEngine::cpu`].
    pub fn new(config: &FieldConfig) -> Result<Self> {
        config.validate()?;
        let backend = open_backend(config.compute_device)?;
        tracing::info!("Vector field engine started on {}", backend.device());
        Ok(Self {
            backend,
            weights: config.weights(),
            iterations: config.compute_iterations,
        })
    }

    /// CPU engine with default settings.
    pub fn cpu() -> Self {
        let config = FieldConfig::default();
        Self {
            backend: Box::new(CpuBackend::new()),
            weights: config.weights(),
            iterations: config.compute_iterations,
        }
    }

    /// Engine over an existing backend.
    pub fn with_backend(backend: Box<dyn FieldBackend>, config: &FieldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            weights: config.weights(),
            iterations: config.compute_iterations,
        })
    }

    /// Allocate a field with every cell set to `default`.
    pub fn create(&self, width: u32, height: u32, default: Vec2) -> Result<VectorField> {
        VectorField::new(width, height, default)
    }

    /// Run the configured number of diffusion passes in place.
    pub fn diffuse(&mut self, field: &mut VectorField) -> Result<()> {
        self.backend.diffuse(field, self.weights, self.iterations)
    }

    /// Bilinear sample at `(x, y)`.
    pub fn fit(&mut self, field: &VectorField, x: f32, y: f32) -> Result<Vec2> {
        self.backend.fit(field, x, y)
    }

    /// Bilinear injection of `(vx, vy)` at `(x, y)`.
    pub fn add(&mut self, field: &mut VectorField, x: f32, y: f32, vx: f32, vy: f32) -> Result<()> {
        self.backend.add(field, Injection::new(x, y, vx, vy))
    }

    /// Local disturbance around the cell nearest `(x, y)`.
    pub fn tiny(&mut self, field: &mut VectorField, x: f32, y: f32, magnitude: f32) -> Result<()> {
        self.backend.tiny(field, Impulse::new(x, y, magnitude))
    }

    /// Outward radial push around `(x, y)`.
    pub fn burst(
        &mut self,
        field: &mut VectorField,
        x: f32,
        y: f32,
        magnitude: f32,
    ) -> Result<()> {
        self.backend.burst(field, Impulse::new(x, y, magnitude))
    }

    /// Sample every position against the field as it is now.
    pub fn fit_batch(&mut self, field: &VectorField, positions: &[Vec2]) -> Result<Vec<Vec2>> {
        self.backend.fit_batch(field, positions)
    }

    pub fn add_batch(&mut self, field: &mut VectorField, injections: &[Injection]) -> Result<()> {
        self.backend.add_batch(field, injections)
    }

    pub fn tiny_batch(&mut self, field: &mut VectorField, impulses: &[Impulse]) -> Result<()> {
        self.backend.tiny_batch(field, impulses)
    }

    pub fn burst_batch(&mut self, field: &mut VectorField, impulses: &[Impulse]) -> Result<()> {
        self.backend.burst_batch(field, impulses)
    }

    /// Weighted self+neighbor value of one cell under the current weights,
    /// without modifying the field.
    pub fn sum_adjacent(&self, field: &VectorField, x: i64, y: i64) -> Vec2 {
        diffusion::diffuse_cell(field, x, y, self.weights)
    }

    /// Switch to the device named `name` (`cpu`, `gpu` or `parallel`).
    ///
    /// Returns `false` and keeps the current device if the name is unknown
    /// or the device cannot be acquired.
    pub fn set_device(&mut self, name: &str) -> bool {
        match name.parse::<Device>() {
            Ok(device) => self.set_device_kind(device),
            Err(e) => {
                tracing::warn!("Refusing device switch: {}", e);
                false
            }
        }
    }

    /// Switch to `device`. Field contents always live on the host between
    /// calls, so nothing needs flushing before the switch.
    pub fn set_device_kind(&mut self, device: Device) -> bool {
        let current = self.backend.device();
        if device == current {
            return true;
        }

        match open_backend(device) {
            Ok(next) => {
                self.backend.release();
                self.backend = next;
                tracing::info!("Switched compute device {} -> {}", current, device);
                true
            }
            Err(e) => {
                tracing::warn!("Cannot switch to {}, staying on {}: {}", device, current, e);
                false
            }
        }
    }

    /// Active device.
    pub fn current_device(&self) -> Device {
        self.backend.device()
    }

    /// Apply changed configuration.
    ///
    /// Weights and iterations take effect immediately. The device switch is
    /// then attempted; the return value says whether the configured device
    /// is now active.
    pub fn apply_config(&mut self, config: &FieldConfig) -> Result<bool> {
        config.validate()?;
        self.weights = config.weights();
        self.iterations = config.compute_iterations;
        Ok(self.set_device_kind(config.compute_device))
    }

    pub fn weights(&self) -> DiffusionWeights {
        self.weights
    }

    pub fn set_weights(&mut self, weights: DiffusionWeights) -> Result<()> {
        weights.validate()?;
        self.weights = weights;
        Ok(())
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn set_iterations(&mut self, iterations: u32) -> Result<()> {
        if !ITERATIONS_RANGE.contains(&iterations) {
            return Err(FieldError::invalid_input(format!(
                "iterations must be in {}..={}, got {}",
                ITERATIONS_RANGE.start(),
                ITERATIONS_RANGE.end(),
                iterations
            )));
        }
        self.iterations = iterations;
        Ok(())
    }

    /// Release backend resources. Safe to call repeatedly; the engine stays
    /// usable and the backend re-acquires what it needs on next use.
    pub fn cleanup(&mut self) {
        tracing::info!("Releasing {} backend resources", self.backend.device());
        self.backend.release();
    }
}

impl Default for VectorFieldEngine {
    fn default() -> Self {
        Self::cpu()
    }
}

fn open_backend(device: Device) -> Result<Box<dyn FieldBackend>> {
    match device {
        Device::Cpu => Ok(Box::new(CpuBackend::new())),
        Device::Parallel => open_parallel(),
    }
}

#[cfg(feature = "wgpu")]
fn open_parallel() -> Result<Box<dyn FieldBackend>> {
    Ok(Box::new(crate::wgpu_compute::WgpuBackend::new()?))
}

#[cfg(not(feature = "wgpu"))]
fn open_parallel() -> Result<Box<dyn FieldBackend>> {
    Err(FieldError::device(
        "parallel backend not compiled in (enable the `wgpu` feature)",
    ))
}
