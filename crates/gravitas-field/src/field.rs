//! Dense grid storage for the vector field.
//!
//! Cells are stored row-major (`index = y * width + x`) as a flat `Vec<Vec2>`.
//! `Vec2` is `#[repr(C)]` and `Pod`, so the cell slice uploads to a WGSL
//! `array<vec2<f32>>` without any repacking.

use std::ops::{Add, AddAssign, Mul, Sub};

use crate::error::{FieldError, Result};

/// A 2-component vector.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    /// The zero vector.
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Vector with both components set to `v`.
    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v }
    }

    /// Euclidean length.
    #[inline]
    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    #[inline]
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    #[inline]
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    #[inline]
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    #[inline]
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl From<(f32, f32)> for Vec2 {
    fn from((x, y): (f32, f32)) -> Self {
        Self::new(x, y)
    }
}

impl From<Vec2> for (f32, f32) {
    fn from(v: Vec2) -> Self {
        (v.x, v.y)
    }
}

/// Dense W×H grid of 2D vectors.
///
/// Width and height are fixed at construction; the public API never changes
/// the number of cells, so a field cannot become malformed after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField {
    width: u32,
    height: u32,
    cells: Vec<Vec2>,
}

impl VectorField {
    /// Create a field with every cell set to `default`.
    ///
    /// Fails with `InvalidInput` for a zero dimension and with
    /// `ResourceExhausted` if the host cannot hold the grid.
    pub fn new(width: u32, height: u32, default: Vec2) -> Result<Self> {
        let len = Self::checked_len(width, height)?;

        let mut cells = Vec::new();
        cells.try_reserve_exact(len).map_err(|e| {
            FieldError::exhausted(format!(
                "cannot allocate {}x{} field ({} cells): {}",
                width, height, len, e
            ))
        })?;
        cells.resize(len, default);

        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Wrap existing row-major cells.
    pub fn from_cells(width: u32, height: u32, cells: Vec<Vec2>) -> Result<Self> {
        let len = Self::checked_len(width, height)?;
        if cells.len() != len {
            // Report the shape the cell count would have with this width.
            let actual_height = (cells.len() / width as usize) as u32;
            return Err(FieldError::mismatch(
                (width, height),
                (width, actual_height),
            ));
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    fn checked_len(width: u32, height: u32) -> Result<usize> {
        if width == 0 || height == 0 {
            return Err(FieldError::invalid_input(format!(
                "field dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| FieldError::exhausted(format!("{}x{} field overflows", width, height)))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// (width, height).
    #[inline]
    pub fn shape(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Linear index of an in-bounds cell.
    #[inline(always)]
    pub fn index_of(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    /// Cell value, or `None` outside the grid.
    pub fn get(&self, x: u32, y: u32) -> Option<Vec2> {
        if x < self.width && y < self.height {
            Some(self.cells[self.index_of(x, y)])
        } else {
            None
        }
    }

    /// Overwrite a cell. Out-of-range coordinates are an error.
    pub fn set(&mut self, x: u32, y: u32, value: Vec2) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(FieldError::invalid_input(format!(
                "cell ({}, {}) outside {}x{} field",
                x, y, self.width, self.height
            )));
        }
        let idx = self.index_of(x, y);
        self.cells[idx] = value;
        Ok(())
    }

    /// Row-major cells.
    #[inline]
    pub fn cells(&self) -> &[Vec2] {
        &self.cells
    }

    /// Mutable row-major cells. The slice length is fixed.
    #[inline]
    pub fn cells_mut(&mut self) -> &mut [Vec2] {
        &mut self.cells
    }

    pub fn fill(&mut self, value: Vec2) {
        self.cells.fill(value);
    }

    /// Copy all cells from a field of identical shape.
    pub fn copy_from(&mut self, other: &VectorField) -> Result<()> {
        self.ensure_shape(other.shape())?;
        self.cells.copy_from_slice(&other.cells);
        Ok(())
    }

    /// Error unless this field has the given shape.
    pub fn ensure_shape(&self, shape: (u32, u32)) -> Result<()> {
        if self.shape() != shape {
            return Err(FieldError::mismatch(shape, self.shape()));
        }
        Ok(())
    }

    /// Replace every cell with host data read back from a device.
    pub(crate) fn overwrite_cells(&mut self, data: &[Vec2]) -> Result<()> {
        if data.len() != self.cells.len() {
            return Err(FieldError::transfer(format!(
                "readback returned {} cells, field has {}",
                data.len(),
                self.cells.len()
            )));
        }
        self.cells.copy_from_slice(data);
        Ok(())
    }

    /// Exchange cell storage with a buffer of equal length (ping-pong).
    pub(crate) fn swap_cells(&mut self, other: &mut Vec<Vec2>) {
        debug_assert_eq!(other.len(), self.cells.len());
        std::mem::swap(&mut self.cells, other);
    }

    /// Largest cell magnitude.
    pub fn max_magnitude(&self) -> f32 {
        self.cells
            .iter()
            .map(|v| v.length())
            .fold(0.0f32, f32::max)
    }

    /// Component-wise sum of all cells.
    pub fn total(&self) -> Vec2 {
        self.cells.iter().fold(Vec2::ZERO, |acc, &v| acc + v)
    }

    /// Whether every cell is finite.
    pub fn is_finite(&self) -> bool {
        self.cells.iter().all(|v| v.is_finite())
    }
}
