//! CPU backend using bulk slice arithmetic and rayon.
//!
//! Diffusion builds each output row from shifted views of the source grid:
//!
//! ```text
//! out[y][1..]    += src[y][..w-1]     (west neighbor)
//! out[y][..w-1]  += src[y][1..]       (east neighbor)
//! out[y]         += src[y-1]          (north, rows 1..h)
//! out[y]         += src[y+1]          (south, rows 0..h-1)
//! out[y]          = ws * src[y] + wn * out[y]
//! ```
//!
//! Reads come only from `src` and writes only to the shadow buffer, so
//! every cell sees the pre-update field. Neighbors are accumulated in the
//! same order as [`crate::diffusion::neighbor_sum`], so results match the
//! per-cell rule bit for bit.

use rayon::prelude::*;

use crate::backend::{self, Device, FieldBackend};
use crate::diffusion::DiffusionWeights;
use crate::error::{FieldError, Result};
use crate::field::{Vec2, VectorField};
use crate::sampling::{burst_contributions, BilinearStencil, Impulse, Injection, TinyStencil};

/// Grids with at least this many cells diffuse rows in parallel.
///
/// Below it the rayon fork/join overhead outweighs the per-row work.
const PARALLEL_MIN_CELLS: usize = 256 * 256;

/// Batches with at least this many requests build stencils in parallel.
const PARALLEL_MIN_BATCH: usize = 1024;

/// CPU compute backend.
#[derive(Debug, Default)]
pub struct CpuBackend {
    /// Shadow buffer reused across diffuse calls.
    scratch: Vec<Vec2>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn scratch_for(&mut self, len: usize) -> Result<&mut Vec<Vec2>> {
        if self.scratch.len() != len {
            self.scratch.clear();
            self.scratch.try_reserve_exact(len).map_err(|e| {
                FieldError::exhausted(format!("cannot allocate diffusion buffer: {}", e))
            })?;
            self.scratch.resize(len, Vec2::ZERO);
        }
        Ok(&mut self.scratch)
    }
}

/// One diffusion pass from `src` into `dst`.
fn diffuse_pass(src: &[Vec2], dst: &mut [Vec2], width: usize, weights: DiffusionWeights) {
    let height = src.len() / width;
    let row = |(y, out): (usize, &mut [Vec2])| diffuse_row(src, out, y, width, height, weights);

    if src.len() >= PARALLEL_MIN_CELLS {
        dst.par_chunks_mut(width).enumerate().for_each(row);
    } else {
        dst.chunks_mut(width).enumerate().for_each(row);
    }
}

#[inline]
fn accumulate(out: &mut [Vec2], src: &[Vec2]) {
    for (o, &s) in out.iter_mut().zip(src) {
        *o += s;
    }
}

#[inline]
fn diffuse_row(
    src: &[Vec2],
    out: &mut [Vec2],
    y: usize,
    width: usize,
    height: usize,
    weights: DiffusionWeights,
) {
    let start = y * width;
    let row = &src[start..start + width];

    out.fill(Vec2::ZERO);
    accumulate(&mut out[1..], &row[..width - 1]);
    accumulate(&mut out[..width - 1], &row[1..]);
    if y > 0 {
        accumulate(out, &src[start - width..start]);
    }
    if y + 1 < height {
        accumulate(out, &src[start + width..start + 2 * width]);
    }

    for (o, &own) in out.iter_mut().zip(row) {
        *o = own * weights.self_weight + *o * weights.neighbor_weight;
    }
}

/// Accumulate per-request contributions into the grid.
///
/// Large batches compute their stencils in parallel; accumulation is a
/// sequential pass so no two writers touch a cell at once.
fn scatter<T, C, F>(cells: &mut [Vec2], items: &[T], contributions: F)
where
    T: Sync,
    C: AsRef<[(usize, Vec2)]> + Send,
    F: Fn(&T) -> C + Sync + Send,
{
    if items.len() >= PARALLEL_MIN_BATCH {
        let staged: Vec<C> = items.par_iter().map(&contributions).collect();
        for c in &staged {
            for &(idx, v) in c.as_ref() {
                cells[idx] += v;
            }
        }
    } else {
        for item in items {
            for &(idx, v) in contributions(item).as_ref() {
                cells[idx] += v;
            }
        }
    }
}

impl FieldBackend for CpuBackend {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn diffuse(
        &mut self,
        field: &mut VectorField,
        weights: DiffusionWeights,
        iterations: u32,
    ) -> Result<()> {
        weights.validate()?;
        let width = field.width() as usize;
        let scratch = self.scratch_for(field.len())?;

        for _ in 0..iterations {
            diffuse_pass(field.cells(), scratch, width, weights);
            field.swap_cells(scratch);
        }

        tracing::debug!(
            "cpu diffuse: {}x{} x{} passes",
            field.width(),
            field.height(),
            iterations
        );
        Ok(())
    }

    fn fit_batch(&mut self, field: &VectorField, positions: &[Vec2]) -> Result<Vec<Vec2>> {
        backend::validate_points(positions)?;
        let (w, h) = field.shape();
        let cells = field.cells();
        let sample = |p: &Vec2| BilinearStencil::new(w, h, p.x, p.y).sample(cells);

        let out: Vec<Vec2> = if positions.len() >= PARALLEL_MIN_BATCH {
            positions.par_iter().map(sample).collect()
        } else {
            positions.iter().map(sample).collect()
        };
        Ok(out)
    }

    fn add_batch(&mut self, field: &mut VectorField, injections: &[Injection]) -> Result<()> {
        backend::validate_injections(injections)?;
        let (w, h) = field.shape();
        scatter(field.cells_mut(), injections, |inj| {
            BilinearStencil::new(w, h, inj.x, inj.y).contributions(Vec2::new(inj.vx, inj.vy))
        });
        Ok(())
    }

    fn tiny_batch(&mut self, field: &mut VectorField, impulses: &[Impulse]) -> Result<()> {
        backend::validate_impulses(impulses)?;
        let (w, h) = field.shape();
        scatter(field.cells_mut(), impulses, |imp| {
            TinyStencil::new(w, h, imp.x, imp.y, imp.magnitude)
        });
        Ok(())
    }

    fn burst_batch(&mut self, field: &mut VectorField, impulses: &[Impulse]) -> Result<()> {
        backend::validate_impulses(impulses)?;
        let (w, h) = field.shape();
        scatter(field.cells_mut(), impulses, |imp| burst_contributions(w, h, imp));
        Ok(())
    }

    fn release(&mut self) {
        self.scratch = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::diffuse_cell;
    use crate::sampling;

    fn seeded_field(width: u32, height: u32) -> VectorField {
        let cells = (0..width * height)
            .map(|i| {
                let f = i as f32;
                Vec2::new((f * 0.37).sin(), (f * 0.11).cos())
            })
            .collect();
        VectorField::from_cells(width, height, cells).unwrap()
    }

    #[test]
    fn test_diffuse_single_impulse() {
        let mut field = VectorField::new(5, 5, Vec2::ZERO).unwrap();
        field.set(2, 2, Vec2::new(1.0, 0.0)).unwrap();

        let mut cpu = CpuBackend::new();
        cpu.diffuse(&mut field, DiffusionWeights::new(0.0, 0.25), 1)
            .unwrap();

        for y in 0..5 {
            for x in 0..5 {
                let expected = match (x, y) {
                    (1, 2) | (3, 2) | (2, 1) | (2, 3) => Vec2::new(0.25, 0.0),
                    _ => Vec2::ZERO,
                };
                assert_eq!(field.get(x, y).unwrap(), expected, "cell ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_diffuse_matches_per_cell_rule() {
        let weights = DiffusionWeights::new(0.3, 0.15);
        for &(w, h) in &[(1, 1), (1, 7), (7, 1), (2, 2), (13, 9)] {
            let original = seeded_field(w, h);
            let mut field = original.clone();
            CpuBackend::new().diffuse(&mut field, weights, 1).unwrap();

            for y in 0..h {
                for x in 0..w {
                    let expected = diffuse_cell(&original, x as i64, y as i64, weights);
                    assert_eq!(field.get(x, y).unwrap(), expected, "{w}x{h} at ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn test_diffuse_parallel_path_matches_sequential() {
        // Large enough to take the rayon path.
        let original = seeded_field(300, 260);
        let weights = DiffusionWeights::new(0.1, 0.2);

        let mut field = original.clone();
        CpuBackend::new().diffuse(&mut field, weights, 1).unwrap();

        for &(x, y) in &[(0, 0), (299, 259), (150, 0), (0, 130), (17, 211)] {
            let expected = diffuse_cell(&original, x, y, weights);
            assert_eq!(field.get(x as u32, y as u32).unwrap(), expected);
        }
    }

    #[test]
    fn test_diffuse_iterations_compose() {
        let original = seeded_field(8, 6);
        let weights = DiffusionWeights::new(0.2, 0.2);
        let mut cpu = CpuBackend::new();

        let mut twice = original.clone();
        cpu.diffuse(&mut twice, weights, 2).unwrap();

        let mut stepped = original.clone();
        cpu.diffuse(&mut stepped, weights, 1).unwrap();
        cpu.diffuse(&mut stepped, weights, 1).unwrap();

        assert_eq!(twice, stepped);
    }

    #[test]
    fn test_diffuse_zero_iterations_is_noop() {
        let original = seeded_field(4, 4);
        let mut field = original.clone();
        CpuBackend::new()
            .diffuse(&mut field, DiffusionWeights::new(0.5, 0.5), 0)
            .unwrap();
        assert_eq!(field, original);
    }

    #[test]
    fn test_diffuse_rejects_nan_weight() {
        let original = seeded_field(4, 4);
        let mut field = original.clone();
        let err = CpuBackend::new()
            .diffuse(&mut field, DiffusionWeights::new(f32::NAN, 0.25), 1)
            .unwrap_err();
        assert!(matches!(err, FieldError::InvalidInput(_)));
        assert_eq!(field, original);
    }

    #[test]
    fn test_fit_batch_matches_single() {
        let field = seeded_field(10, 10);
        let positions: Vec<Vec2> = (0..2000)
            .map(|i| Vec2::new((i % 97) as f32 * 0.13 - 1.0, (i % 89) as f32 * 0.12 - 0.5))
            .collect();

        let batch = CpuBackend::new().fit_batch(&field, &positions).unwrap();
        assert_eq!(batch.len(), positions.len());
        for (p, v) in positions.iter().zip(&batch) {
            assert_eq!(*v, sampling::fit(&field, p.x, p.y));
        }
    }

    #[test]
    fn test_add_batch_matches_sequential_adds() {
        let injections: Vec<Injection> = (0..1500)
            .map(|i| {
                let f = i as f32;
                Injection::new((f * 0.71) % 12.0, (f * 0.53) % 9.0, (f * 0.1).sin(), 1.0)
            })
            .collect();

        let mut batched = VectorField::new(10, 8, Vec2::ZERO).unwrap();
        CpuBackend::new().add_batch(&mut batched, &injections).unwrap();

        let mut single = VectorField::new(10, 8, Vec2::ZERO).unwrap();
        for inj in injections.iter().rev() {
            sampling::add(&mut single, inj.x, inj.y, inj.vx, inj.vy);
        }

        for (a, b) in batched.cells().iter().zip(single.cells()) {
            assert!((*a - *b).length() < 1e-3, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_invalid_batch_leaves_field_untouched() {
        let original = seeded_field(6, 6);
        let mut field = original.clone();
        let mut cpu = CpuBackend::new();

        let bad = [
            Injection::new(1.0, 1.0, 5.0, 5.0),
            Injection::new(2.0, f32::INFINITY, 1.0, 1.0),
        ];
        assert!(cpu.add_batch(&mut field, &bad).is_err());
        assert_eq!(field, original);

        let bad = [Impulse::new(1.0, 1.0, 1.0), Impulse::new(f32::NAN, 0.0, 1.0)];
        assert!(cpu.tiny_batch(&mut field, &bad).is_err());
        assert!(cpu.burst_batch(&mut field, &bad).is_err());
        assert_eq!(field, original);
    }

    #[test]
    fn test_tiny_and_burst_batch_match_single() {
        let impulses = [
            Impulse::new(0.0, 0.0, 1.0),
            Impulse::new(3.4, 2.6, -0.5),
            Impulse::new(100.0, -4.0, 2.0),
        ];
        let mut cpu = CpuBackend::new();

        let mut batched = VectorField::new(6, 5, Vec2::ZERO).unwrap();
        cpu.tiny_batch(&mut batched, &impulses).unwrap();
        cpu.burst_batch(&mut batched, &impulses).unwrap();

        let mut single = VectorField::new(6, 5, Vec2::ZERO).unwrap();
        for imp in &impulses {
            sampling::tiny(&mut single, imp.x, imp.y, imp.magnitude);
        }
        for imp in &impulses {
            sampling::burst(&mut single, imp.x, imp.y, imp.magnitude);
        }

        for (a, b) in batched.cells().iter().zip(single.cells()) {
            assert!((*a - *b).length() < 1e-6);
        }
    }

    #[test]
    fn test_release_keeps_backend_usable() {
        let mut cpu = CpuBackend::new();
        let mut field = seeded_field(4, 4);
        cpu.diffuse(&mut field, DiffusionWeights::default(), 1).unwrap();
        cpu.release();
        cpu.release();
        cpu.diffuse(&mut field, DiffusionWeights::default(), 1).unwrap();
    }
}
