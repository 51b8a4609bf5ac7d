//! Compute backend abstraction.
//!
//! Each backend implements the same operation set over a host-resident
//! [`VectorField`]. The engine holds exactly one active backend and swaps it
//! on device change, so the hot path never dispatches on a device name.
//!
//! ## Contract
//!
//! - The host field is the single source of truth between calls. A backend
//!   may cache device buffers, but every call ends with the host field
//!   up to date.
//! - Batches are validated in full before the field is touched, and device
//!   results are written back only after the whole round-trip succeeds. A
//!   failed call leaves the field unmodified.
//! - Reads in `fit_batch` all observe the field as it was at entry. Writes
//!   in the injection batches are commutative accumulations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::diffusion::DiffusionWeights;
use crate::error::{FieldError, Result};
use crate::field::{Vec2, VectorField};
use crate::sampling::{self, Impulse, Injection};

/// Compute device selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Device {
    /// Host CPU with rayon data parallelism.
    #[default]
    #[serde(rename = "cpu")]
    Cpu,
    /// Accelerator via WebGPU compute shaders.
    #[serde(rename = "gpu", alias = "parallel")]
    Parallel,
}

impl Device {
    /// Configuration name.
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Parallel => "gpu",
        }
    }

    /// Both devices in order.
    pub const ALL: [Device; 2] = [Device::Cpu, Device::Parallel];
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "gpu" | "parallel" => Ok(Device::Parallel),
            other => Err(FieldError::UnknownDevice(other.to_string())),
        }
    }
}

/// Operation set every compute backend provides.
pub trait FieldBackend: Send {
    /// Device this backend runs on.
    fn device(&self) -> Device;

    /// Apply `iterations` diffusion passes in place.
    fn diffuse(
        &mut self,
        field: &mut VectorField,
        weights: DiffusionWeights,
        iterations: u32,
    ) -> Result<()>;

    /// Sample every position against the field as it was at entry.
    fn fit_batch(&mut self, field: &VectorField, positions: &[Vec2]) -> Result<Vec<Vec2>>;

    /// Bilinear injection of every request.
    fn add_batch(&mut self, field: &mut VectorField, injections: &[Injection]) -> Result<()>;

    /// Local 5-cell disturbance for every impulse.
    fn tiny_batch(&mut self, field: &mut VectorField, impulses: &[Impulse]) -> Result<()>;

    /// Outward radial push for every impulse.
    fn burst_batch(&mut self, field: &mut VectorField, impulses: &[Impulse]) -> Result<()>;

    /// Single sample. Launching a kernel per point costs more than it saves,
    /// so backends run this on the host by default.
    fn fit(&mut self, field: &VectorField, x: f32, y: f32) -> Result<Vec2> {
        sampling::validate_point(Vec2::new(x, y))?;
        Ok(sampling::fit(field, x, y))
    }

    /// Single bilinear injection.
    fn add(&mut self, field: &mut VectorField, injection: Injection) -> Result<()> {
        injection.validate()?;
        sampling::add(field, injection.x, injection.y, injection.vx, injection.vy);
        Ok(())
    }

    /// Single local disturbance.
    fn tiny(&mut self, field: &mut VectorField, impulse: Impulse) -> Result<()> {
        impulse.validate()?;
        sampling::tiny(field, impulse.x, impulse.y, impulse.magnitude);
        Ok(())
    }

    /// Single radial push.
    fn burst(&mut self, field: &mut VectorField, impulse: Impulse) -> Result<()> {
        impulse.validate()?;
        sampling::burst(field, impulse.x, impulse.y, impulse.magnitude);
        Ok(())
    }

    /// Release device resources. Idempotent; the backend stays usable and
    /// re-acquires on next use.
    fn release(&mut self) {}
}

/// Validate a whole injection batch before any write.
pub(crate) fn validate_injections(injections: &[Injection]) -> Result<()> {
    injections.iter().try_for_each(Injection::validate)
}

/// Validate a whole impulse batch before any write.
pub(crate) fn validate_impulses(impulses: &[Impulse]) -> Result<()> {
    impulses.iter().try_for_each(Impulse::validate)
}

/// Validate a whole sample batch.
pub(crate) fn validate_points(positions: &[Vec2]) -> Result<()> {
    positions.iter().try_for_each(|&p| sampling::validate_point(p))
}
