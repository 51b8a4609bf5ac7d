//! Sub-cell sampling and injection primitives.
//!
//! All operations take continuous grid coordinates. Out-of-range coordinates
//! are clamped to the nearest valid cell rather than rejected:
//!
//! ```text
//!   x0 = clamp(floor(x), 0, W-1)      fx = x - floor(x)
//!   x1 = clamp(floor(x) + 1, 0, W-1)
//!
//!   (x0,y0) ---- (x1,y0)      weights:
//!      |    p      |            w00 = (1-fx)(1-fy)   w10 = fx(1-fy)
//!   (x0,y1) ---- (x1,y1)        w01 = (1-fx)fy       w11 = fx·fy
//! ```
//!
//! The fractional weights are taken before clamping, so a point far outside
//! the grid collapses onto a single edge cell instead of extrapolating.
//!
//! The WGSL kernels in `shaders/vector_field.wgsl` mirror these routines
//! exactly; keep the two in sync.

use crate::error::{FieldError, Result};
use crate::field::{Vec2, VectorField};

/// Share of a `tiny` deposit each orthogonal neighbor receives.
pub const TINY_NEIGHBOR_FRACTION: f32 = 0.25;

/// Orthogonal unit steps: west, east, north, south.
pub const ORTHOGONAL: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Bilinear deposit request: add `(vx, vy)` at `(x, y)`.
///
/// `#[repr(C)]` so a batch uploads directly as a WGSL `array<vec4<f32>>`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Injection {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Injection {
    pub const fn new(x: f32, y: f32, vx: f32, vy: f32) -> Self {
        Self { x, y, vx, vy }
    }

    pub fn validate(&self) -> Result<()> {
        if self.x.is_finite() && self.y.is_finite() && self.vx.is_finite() && self.vy.is_finite() {
            Ok(())
        } else {
            Err(FieldError::invalid_input(format!(
                "non-finite injection {:?}",
                self
            )))
        }
    }
}

/// Scalar disturbance request for `tiny` and `burst`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Impulse {
    pub x: f32,
    pub y: f32,
    pub magnitude: f32,
}

impl Impulse {
    pub const fn new(x: f32, y: f32, magnitude: f32) -> Self {
        Self { x, y, magnitude }
    }

    pub fn validate(&self) -> Result<()> {
        if self.x.is_finite() && self.y.is_finite() && self.magnitude.is_finite() {
            Ok(())
        } else {
            Err(FieldError::invalid_input(format!(
                "non-finite impulse {:?}",
                self
            )))
        }
    }
}

impl From<(f32, f32, f32)> for Impulse {
    fn from((x, y, magnitude): (f32, f32, f32)) -> Self {
        Self::new(x, y, magnitude)
    }
}

/// Reject a sample position that is not finite.
pub fn validate_point(p: Vec2) -> Result<()> {
    if p.is_finite() {
        Ok(())
    } else {
        Err(FieldError::invalid_input(format!(
            "non-finite sample position ({}, {})",
            p.x, p.y
        )))
    }
}

/// Four clamped corner cells and their bilinear weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilinearStencil {
    /// Linear indices in order (x0,y0), (x1,y0), (x0,y1), (x1,y1).
    pub indices: [usize; 4],
    /// Weights in the same order; they always sum to 1.
    pub weights: [f32; 4],
}

impl BilinearStencil {
    pub fn new(width: u32, height: u32, x: f32, y: f32) -> Self {
        let xmax = (width - 1) as f32;
        let ymax = (height - 1) as f32;

        let fx0 = x.floor();
        let fy0 = y.floor();
        let fx = x - fx0;
        let fy = y - fy0;

        let x0 = fx0.clamp(0.0, xmax) as usize;
        let x1 = (fx0 + 1.0).clamp(0.0, xmax) as usize;
        let y0 = fy0.clamp(0.0, ymax) as usize;
        let y1 = (fy0 + 1.0).clamp(0.0, ymax) as usize;

        let w = width as usize;
        Self {
            indices: [y0 * w + x0, y0 * w + x1, y1 * w + x0, y1 * w + x1],
            weights: [
                (1.0 - fx) * (1.0 - fy),
                fx * (1.0 - fy),
                (1.0 - fx) * fy,
                fx * fy,
            ],
        }
    }

    /// Weighted blend of the corner vectors.
    #[inline]
    pub fn sample(&self, cells: &[Vec2]) -> Vec2 {
        let mut out = Vec2::ZERO;
        for (&idx, &w) in self.indices.iter().zip(self.weights.iter()) {
            out += cells[idx] * w;
        }
        out
    }

    /// Distribute `v` onto the corners, accumulating.
    #[inline]
    pub fn deposit(&self, cells: &mut [Vec2], v: Vec2) {
        for (&idx, &w) in self.indices.iter().zip(self.weights.iter()) {
            cells[idx] += v * w;
        }
    }

    /// (index, contribution) pairs for depositing `v`.
    #[inline]
    pub fn contributions(&self, v: Vec2) -> [(usize, Vec2); 4] {
        let mut out = [(0usize, Vec2::ZERO); 4];
        for (slot, (&idx, &w)) in out
            .iter_mut()
            .zip(self.indices.iter().zip(self.weights.iter()))
        {
            *slot = (idx, v * w);
        }
        out
    }
}

/// Cells touched by a `tiny` deposit: the center plus in-grid neighbors.
#[derive(Debug, Clone, Copy)]
pub struct TinyStencil {
    targets: [(usize, Vec2); 5],
    len: usize,
}

impl TinyStencil {
    pub fn new(width: u32, height: u32, x: f32, y: f32, magnitude: f32) -> Self {
        // Nearest cell, ties toward +inf; same rule as the WGSL kernel.
        let cx = (x + 0.5).floor().clamp(0.0, (width - 1) as f32) as i64;
        let cy = (y + 0.5).floor().clamp(0.0, (height - 1) as f32) as i64;
        let w = width as i64;
        let h = height as i64;

        let mut targets = [(0usize, Vec2::ZERO); 5];
        targets[0] = ((cy * w + cx) as usize, Vec2::splat(magnitude));
        let mut len = 1;

        let side = Vec2::splat(magnitude * TINY_NEIGHBOR_FRACTION);
        for (dx, dy) in ORTHOGONAL {
            let nx = cx + dx;
            let ny = cy + dy;
            if nx >= 0 && ny >= 0 && nx < w && ny < h {
                targets[len] = ((ny * w + nx) as usize, side);
                len += 1;
            }
        }

        Self { targets, len }
    }

    pub fn targets(&self) -> &[(usize, Vec2)] {
        &self.targets[..self.len]
    }
}

impl AsRef<[(usize, Vec2)]> for TinyStencil {
    fn as_ref(&self) -> &[(usize, Vec2)] {
        self.targets()
    }
}

/// The four bilinear deposits of a `burst`.
pub fn burst_contributions(width: u32, height: u32, impulse: &Impulse) -> [(usize, Vec2); 16] {
    let px = impulse.x.clamp(0.0, (width - 1) as f32);
    let py = impulse.y.clamp(0.0, (height - 1) as f32);

    let mut out = [(0usize, Vec2::ZERO); 16];
    for (i, (dx, dy)) in ORTHOGONAL.into_iter().enumerate() {
        let push = Vec2::new(dx as f32, dy as f32) * impulse.magnitude;
        let stencil = BilinearStencil::new(width, height, px + dx as f32, py + dy as f32);
        out[i * 4..i * 4 + 4].copy_from_slice(&stencil.contributions(push));
    }
    out
}

/// Bilinear sample at `(x, y)`.
pub fn fit(field: &VectorField, x: f32, y: f32) -> Vec2 {
    BilinearStencil::new(field.width(), field.height(), x, y).sample(field.cells())
}

/// Bilinear injection of `(vx, vy)` at `(x, y)`.
pub fn add(field: &mut VectorField, x: f32, y: f32, vx: f32, vy: f32) {
    let stencil = BilinearStencil::new(field.width(), field.height(), x, y);
    stencil.deposit(field.cells_mut(), Vec2::new(vx, vy));
}

/// Local 5-cell disturbance around the cell nearest `(x, y)`.
///
/// The center receives `magnitude` on both components and each existing
/// orthogonal neighbor receives `TINY_NEIGHBOR_FRACTION` of it. Neighbors
/// outside the grid are skipped.
pub fn tiny(field: &mut VectorField, x: f32, y: f32, magnitude: f32) {
    let stencil = TinyStencil::new(field.width(), field.height(), x, y, magnitude);
    let cells = field.cells_mut();
    for &(idx, v) in stencil.targets() {
        cells[idx] += v;
    }
}

/// Outward radial push around `(x, y)`.
///
/// The point is clamped into the grid, then `d * magnitude` is injected
/// bilinearly at the point offset by each orthogonal unit step `d`.
pub fn burst(field: &mut VectorField, x: f32, y: f32, magnitude: f32) {
    let impulse = Impulse::new(x, y, magnitude);
    let contributions = burst_contributions(field.width(), field.height(), &impulse);
    let cells = field.cells_mut();
    for (idx, v) in contributions {
        cells[idx] += v;
    }
}
