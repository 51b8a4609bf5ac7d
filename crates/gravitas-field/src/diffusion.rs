//! Diffusion step rule.
//!
//! One pass computes, for every cell,
//!
//! ```text
//! v'(x,y) = ws * v(x,y) + wn * (v(x-1,y) + v(x+1,y) + v(x,y-1) + v(x,y+1))
//! ```
//!
//! where neighbors outside the grid are omitted (no wraparound, no mirroring).
//! Every cell reads the pre-update field; backends must double-buffer.
//!
//! Weights are not normalized. With `ws + 4*wn > 1` magnitudes grow each pass
//! and can diverge; that is left to configuration.

use crate::error::{FieldError, Result};
use crate::field::{Vec2, VectorField};
use crate::sampling::ORTHOGONAL;

/// Self and neighbor weights for one diffusion pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffusionWeights {
    /// Multiplies each cell's own value.
    pub self_weight: f32,
    /// Multiplies the sum of the existing orthogonal neighbors.
    pub neighbor_weight: f32,
}

impl Default for DiffusionWeights {
    fn default() -> Self {
        Self::new(0.0, 0.25)
    }
}

impl DiffusionWeights {
    pub const fn new(self_weight: f32, neighbor_weight: f32) -> Self {
        Self {
            self_weight,
            neighbor_weight,
        }
    }

    /// Weights must be finite; their range is not restricted.
    pub fn validate(&self) -> Result<()> {
        if !self.self_weight.is_finite() || !self.neighbor_weight.is_finite() {
            return Err(FieldError::invalid_input(format!(
                "diffusion weights must be finite (self={}, neighbor={})",
                self.self_weight, self.neighbor_weight
            )));
        }
        Ok(())
    }

}

/// Sum of the orthogonal neighbors of `(x, y)` that lie inside the grid.
///
/// `(x, y)` itself may lie outside; only existing neighbors contribute.
pub fn neighbor_sum(field: &VectorField, x: i64, y: i64) -> Vec2 {
    let mut sum = Vec2::ZERO;
    for (dx, dy) in ORTHOGONAL {
        let (Some(nx), Some(ny)) = (x.checked_add(dx), y.checked_add(dy)) else {
            continue;
        };
        if field.contains(nx, ny) {
            sum += field.cells()[field.index_of(nx as u32, ny as u32)];
        }
    }
    sum
}

/// Diffusion rule evaluated at one cell against the current field.
///
/// Outside the grid there is no self term, so the result is the weighted
/// sum of whichever neighbors exist.
pub fn diffuse_cell(field: &VectorField, x: i64, y: i64, weights: DiffusionWeights) -> Vec2 {
    let own = if field.contains(x, y) {
        field.cells()[field.index_of(x as u32, y as u32)]
    } else {
        Vec2::ZERO
    };
    own * weights.self_weight + neighbor_sum(field, x, y) * weights.neighbor_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_sum_at_cell() {
        let mut field = VectorField::new(5, 5, Vec2::ZERO).unwrap();
        field.set(1, 1, Vec2::new(1.0, 0.0)).unwrap();
        field.set(1, 0, Vec2::new(0.0, 1.0)).unwrap();
        field.set(1, 2, Vec2::new(0.0, -1.0)).unwrap();
        field.set(0, 1, Vec2::new(-1.0, 0.0)).unwrap();
        field.set(2, 1, Vec2::new(2.0, 0.0)).unwrap();

        let v = diffuse_cell(&field, 1, 1, DiffusionWeights::new(0.0, 0.25));
        assert!((v.x - 0.25).abs() < 1e-6);
        assert!(v.y.abs() < 1e-6);
    }

    #[test]
    fn test_corner_omits_missing_neighbors() {
        let field = VectorField::new(3, 3, Vec2::splat(1.0)).unwrap();
        assert_eq!(neighbor_sum(&field, 0, 0), Vec2::splat(2.0));
        assert_eq!(neighbor_sum(&field, 1, 0), Vec2::splat(3.0));
        assert_eq!(neighbor_sum(&field, 1, 1), Vec2::splat(4.0));
    }

    #[test]
    fn test_outside_cell_has_no_self_term() {
        let field = VectorField::new(3, 3, Vec2::splat(1.0)).unwrap();
        let v = diffuse_cell(&field, -1, 1, DiffusionWeights::new(1.0, 0.5));
        // Only (0, 1) is an in-grid neighbor.
        assert_eq!(v, Vec2::splat(0.5));
        assert_eq!(diffuse_cell(&field, 10, 10, DiffusionWeights::new(1.0, 1.0)), Vec2::ZERO);
    }

    #[test]
    fn test_weight_validation() {
        assert!(DiffusionWeights::new(0.2, 0.2).validate().is_ok());
        // Out-of-range but finite weights are accepted.
        assert!(DiffusionWeights::new(5.0, -3.0).validate().is_ok());
        assert!(DiffusionWeights::new(f32::NAN, 0.2).validate().is_err());
        assert!(DiffusionWeights::new(0.2, f32::INFINITY).validate().is_err());
    }

    #[test]
    fn test_extreme_coordinates_do_not_overflow() {
        let field = VectorField::new(4, 4, Vec2::splat(1.0)).unwrap();
        let weights = DiffusionWeights::new(1.0, 1.0);
        for (x, y) in [(i64::MAX, 0), (0, i64::MIN), (i64::MIN, i64::MAX)] {
            assert_eq!(neighbor_sum(&field, x, y), Vec2::ZERO);
            assert_eq!(diffuse_cell(&field, x, y, weights), Vec2::ZERO);
        }
    }
}
