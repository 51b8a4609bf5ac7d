//! # Gravitas Field
//!
//! A dense 2D vector field that diffuses over time, with sub-cell bilinear
//! sampling and injection, executed on either the host CPU or a GPU.
//!
//! Entities in a simulation read the field at their position to update
//! their velocity and write disturbances back into it; every tick the field
//! spreads those disturbances to neighboring cells.
//!
//! ## Features
//!
//! - Row-major `W x H` grid of `Vec2` cells
//! - Weighted four-neighbor diffusion with zero boundary
//! - Bilinear `fit` / `add`, local `tiny` and radial `burst` disturbances
//! - Batched forms of every sample and injection operation
//! - Rayon CPU backend and WebGPU compute backend, switchable at runtime
//!
//! ## Run
//!
//! ```bash
//! cargo run -p gravitas-field --release --bin field_bench -- --device gpu
//! ```

pub mod backend;
pub mod config;
pub mod cpu;
pub mod diffusion;
pub mod engine;
pub mod error;
pub mod field;
pub mod sampling;

#[cfg(feature = "wgpu")]
pub mod wgpu_compute;

pub use backend::{Device, FieldBackend};
pub use crate::config::{load_config, load_config_from_str, ConfigBuilder, FieldConfig};
pub use cpu::CpuBackend;
pub use diffusion::DiffusionWeights;
pub use engine::VectorFieldEngine;
pub use error::{FieldError, Result};
pub use field::{Vec2, VectorField};
pub use sampling::{Impulse, Injection};

#[cfg(feature = "wgpu")]
pub use wgpu_compute::{is_gpu_available, WgpuBackend};
