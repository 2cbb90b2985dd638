//! Active-region tracking: mask, bounding box and boundary shell.
//!
//! The mask decides which cells the stepper evolves. The bounding box is
//! kept tight around the mask so that every row pass can skip the rest of the
//! grid. The boundary shell (active cells touching an inactive cell) is
//! rebuilt once per step and seeds the next step's growth.
//!
//! Scans walk the bounding box row by row: serial for small boxes, one row
//! per task for large ones, with per-row results merged in row order.

use super::grid::{AXIS_OFFSETS, Bounds, Grid};
use super::index_set::IndexSet;
use super::support::{MaskSupport, Unrestricted, gradient_sq};
use super::sync::map_rows;

/// Value and gradient tolerances for one significance test. A cell is
/// significant when its value reaches `value` or its squared gradient
/// reaches `gradient²`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub value: f64,
    pub gradient: f64,
}

impl Thresholds {
    pub fn new(value: f64, gradient: f64) -> Self {
        Self { value, gradient }
    }

    #[inline(always)]
    pub fn is_significant(&self, value: f64, gradient_sq: f64) -> bool {
        value >= self.value || gradient_sq >= self.gradient * self.gradient
    }
}

#[derive(Clone, Debug)]
pub struct ActiveRegion {
    mask: Vec<bool>,
    bounds: Option<Bounds>,
    count: usize,
    shell: IndexSet,
}

impl ActiveRegion {
    pub fn empty(cells: usize) -> Self {
        Self {
            mask: vec![false; cells],
            bounds: None,
            count: 0,
            shell: IndexSet::new(),
        }
    }

    /// Initial truncation. Interior cells that are significant under `keep`
    /// (gradient taken over raw neighbours) become active; the rest are
    /// zeroed in `f` and `pf`.
    pub fn seed(grid: &Grid, f: &mut [f64], pf: &mut [f64], keep: Thresholds) -> Self {
        let interior = grid.interior();
        let values: &[f64] = f;
        let kept_rows = map_rows(interior.rows(), grid.stride(), |i1| {
            interior
                .cols()
                .map(|i2| grid.index(i1, i2))
                .filter(|&idx| keep.is_significant(values[idx], gradient_sq(grid, &Unrestricted, values, idx)))
                .collect::<Vec<usize>>()
        });

        let mut region = Self::empty(grid.len());
        for idx in kept_rows.into_iter().flatten() {
            region.mask[idx] = true;
        }
        for i1 in interior.rows() {
            for i2 in interior.cols() {
                let idx = grid.index(i1, i2);
                if !region.mask[idx] {
                    f[idx] = 0.0;
                    pf[idx] = 0.0;
                }
            }
        }
        region.rebuild(grid, interior);
        region
    }

    /// Every interior cell active.
    pub fn full_interior(grid: &Grid) -> Self {
        let interior = grid.interior();
        let mut region = Self::empty(grid.len());
        for i1 in interior.rows() {
            for i2 in interior.cols() {
                region.mask[grid.index(i1, i2)] = true;
            }
        }
        region.rebuild(grid, interior);
        region
    }

    #[inline]
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    #[inline]
    pub fn support(&self) -> MaskSupport<'_> {
        MaskSupport(&self.mask)
    }

    #[inline]
    pub fn is_active(&self, idx: usize) -> bool {
        self.mask[idx]
    }

    #[inline]
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn shell(&self) -> &IndexSet {
        &self.shell
    }

    /// Mark a cell active and widen the bounding box. The shell is left
    /// untouched until the next [`ActiveRegion::rebuild`].
    pub fn activate(&mut self, grid: &Grid, idx: usize) -> bool {
        if self.mask[idx] {
            return false;
        }
        let (i1, i2) = grid.coords(idx);
        debug_assert!(grid.in_interior(i1, i2));
        self.mask[idx] = true;
        self.count += 1;
        match self.bounds.as_mut() {
            Some(bounds) => bounds.include(i1, i2),
            None => self.bounds = Some(Bounds::point(i1, i2)),
        }
        true
    }

    /// Shell cells inside the growth margin that are significant under
    /// `low`: the value test reads `pf`, the gradient test reads `f`.
    pub fn select_candidates(&self, grid: &Grid, pf: &[f64], f: &[f64], low: Thresholds) -> IndexSet {
        let support = self.support();
        let picked: Vec<usize> = self
            .shell
            .iter()
            .filter(|&idx| {
                let (i1, i2) = grid.coords(idx);
                grid.in_growth_margin(i1, i2)
                    && low.is_significant(pf[idx], gradient_sq(grid, &support, f, idx))
            })
            .collect();
        IndexSet::from_sorted(picked)
    }

    /// Drop active cells that are no longer significant under `high`: the
    /// value test reads the post-normalization snapshot `pf`, the gradient
    /// test reads the provisional field `ff`. Dropped cells are zeroed in
    /// `f` and `pf`. Bounds, count and shell are rebuilt afterwards.
    pub fn shrink(&mut self, grid: &Grid, f: &mut [f64], pf: &mut [f64], ff: &[f64], high: Thresholds) -> usize {
        let Some(bounds) = self.bounds else {
            return 0;
        };
        let support = self.support();
        let snapshot: &[f64] = pf;
        let dropped_rows = map_rows(bounds.rows(), bounds.cols().count(), |i1| {
            bounds
                .cols()
                .map(|i2| grid.index(i1, i2))
                .filter(|&idx| {
                    support.0[idx] && !high.is_significant(snapshot[idx], gradient_sq(grid, &support, ff, idx))
                })
                .collect::<Vec<usize>>()
        });

        let mut dropped = 0;
        for idx in dropped_rows.into_iter().flatten() {
            self.mask[idx] = false;
            f[idx] = 0.0;
            pf[idx] = 0.0;
            dropped += 1;
        }
        self.rebuild(grid, bounds);
        dropped
    }

    /// Recompute bounds, count and shell from the mask. `search` must
    /// contain every active cell.
    pub fn rebuild(&mut self, grid: &Grid, search: Bounds) {
        self.rebuild_bounds(grid, search);
        self.rebuild_shell(grid);
    }

    fn rebuild_bounds(&mut self, grid: &Grid, search: Bounds) {
        let mask = &self.mask;
        let rows = map_rows(search.rows(), search.cols().count(), |i1| {
            let mut first = None;
            let mut last = 0;
            let mut count = 0;
            for i2 in search.cols() {
                if mask[grid.index(i1, i2)] {
                    first.get_or_insert(i2);
                    last = i2;
                    count += 1;
                }
            }
            first.map(|first| (i1, first, last, count))
        });

        let mut bounds: Option<Bounds> = None;
        let mut count = 0;
        for (i1, first, last, row_count) in rows.into_iter().flatten() {
            count += row_count;
            let row = Bounds {
                min: [i1, first],
                max: [i1, last],
            };
            bounds = Some(match bounds {
                Some(b) => b.merge(row),
                None => row,
            });
        }
        self.bounds = bounds;
        self.count = count;
    }

    fn rebuild_shell(&mut self, grid: &Grid) {
        let Some(bounds) = self.bounds else {
            self.shell.clear();
            return;
        };
        let mask = &self.mask;
        let rows = map_rows(bounds.rows(), bounds.cols().count(), |i1| {
            bounds
                .cols()
                .map(|i2| grid.index(i1, i2))
                .filter(|&idx| {
                    mask[idx]
                        && AXIS_OFFSETS.iter().any(|&(axis, dir)| match grid.offset(idx, axis, dir, 1) {
                            Some(j) => !mask[j],
                            None => true,
                        })
                })
                .collect::<Vec<usize>>()
        });
        self.shell = IndexSet::from_sorted(rows.into_iter().flatten().collect());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use rand::{Rng, SeedableRng};

    use super::*;

    fn grid() -> Grid {
        Grid::new([-10.0, -10.0], [10.0, 10.0], [1.0, 1.0], 2).unwrap()
    }

    /// Mask, bounds, count and shell agree with each other.
    pub(crate) fn assert_consistent(grid: &Grid, region: &ActiveRegion) {
        let mut count = 0;
        let mut tight: Option<Bounds> = None;
        for idx in 0..grid.len() {
            if region.is_active(idx) {
                let (i1, i2) = grid.coords(idx);
                assert!(grid.in_interior(i1, i2), "active cell ({i1},{i2}) outside interior");
                count += 1;
                match tight.as_mut() {
                    Some(b) => b.include(i1, i2),
                    None => tight = Some(Bounds::point(i1, i2)),
                }
            }
        }
        assert_eq!(region.len(), count);
        assert_eq!(region.bounds(), tight);
        for idx in region.shell().iter() {
            assert!(region.is_active(idx));
            assert!(
                AXIS_OFFSETS
                    .iter()
                    .any(|&(axis, dir)| grid.offset(idx, axis, dir, 1).is_none_or(|j| !region.is_active(j)))
            );
        }
        for idx in 0..grid.len() {
            if region.is_active(idx) && !region.shell().contains(idx) {
                for &(axis, dir) in &AXIS_OFFSETS {
                    let j = grid.offset(idx, axis, dir, 1).unwrap();
                    assert!(region.is_active(j));
                }
            }
        }
        if count > 0 {
            assert!(!region.shell().is_empty());
        }
    }

    #[test]
    fn seed_keeps_significant_cells_and_zeroes_the_rest() {
        let grid = grid();
        let mut f = vec![0.0; grid.len()];
        let centre = grid.index(10, 10);
        f[centre] = 1.0;
        f[grid.index(10, 11)] = 1e-9;
        let mut pf = f.clone();
        let region = ActiveRegion::seed(&grid, &mut f, &mut pf, Thresholds::new(1e-6, 1e-3));

        // centre by value, its four neighbours by gradient (0.5 per unit)
        assert!(region.is_active(centre));
        for &(axis, dir) in &AXIS_OFFSETS {
            assert!(region.is_active(grid.offset(centre, axis, dir, 1).unwrap()));
        }
        assert_eq!(region.len(), 5);
        assert_eq!(region.bounds(), Some(Bounds { min: [9, 9], max: [11, 11] }));
        // the centre is surrounded by active cells
        assert_eq!(region.shell().len(), 4);
        assert!(!region.shell().contains(centre));
        assert_eq!(f[grid.index(10, 11)], 1e-9);
        assert_consistent(&grid, &region);
    }

    #[test]
    fn seed_of_zero_field_is_empty() {
        let grid = grid();
        let mut f = vec![0.0; grid.len()];
        let mut pf = f.clone();
        let region = ActiveRegion::seed(&grid, &mut f, &mut pf, Thresholds::new(1e-6, 1e-6));
        assert!(region.is_empty());
        assert_eq!(region.bounds(), None);
        assert!(region.shell().is_empty());
    }

    #[test]
    fn full_interior_shell_is_the_rim() {
        let grid = grid();
        let region = ActiveRegion::full_interior(&grid);
        assert_eq!(region.len(), 17 * 17);
        assert_eq!(region.shell().len(), 4 * 16);
        assert_consistent(&grid, &region);
        let none = region.select_candidates(&grid, &vec![1.0; grid.len()], &vec![1.0; grid.len()], Thresholds::new(0.0, 0.0));
        assert!(none.is_empty(), "rim cells sit outside the growth margin");
    }

    #[test]
    fn activate_widens_bounds_and_rebuild_restores_shell() {
        let grid = grid();
        let mut region = ActiveRegion::empty(grid.len());
        assert!(region.activate(&grid, grid.index(5, 5)));
        assert!(!region.activate(&grid, grid.index(5, 5)));
        region.activate(&grid, grid.index(7, 4));
        assert_eq!(region.bounds(), Some(Bounds { min: [5, 4], max: [7, 5] }));
        assert_eq!(region.len(), 2);
        region.rebuild(&grid, grid.interior());
        assert_consistent(&grid, &region);
    }

    #[test]
    fn shrink_drops_flat_small_cells() {
        let grid = grid();
        let mut region = ActiveRegion::full_interior(&grid);
        let centre = grid.index(10, 10);
        let mut ff = vec![0.0; grid.len()];
        ff[centre] = 1.0;
        // committed values below the drop threshold everywhere but the centre
        let mut f: Vec<f64> = ff.iter().map(|&v| if v > 0.0 { v } else { 1e-9 }).collect();
        let mut pf = f.clone();
        let dropped = region.shrink(&grid, &mut f, &mut pf, &ff, Thresholds::new(1e-6, 1e-3));
        assert_eq!(region.len(), 5);
        assert_eq!(dropped, 17 * 17 - 5);
        assert_consistent(&grid, &region);
        for idx in 0..grid.len() {
            let (i1, i2) = grid.coords(idx);
            if region.is_active(idx) {
                assert_eq!(pf[idx], f[idx]);
            } else if grid.in_interior(i1, i2) {
                assert_eq!((f[idx], pf[idx]), (0.0, 0.0), "dropped cell ({i1}, {i2}) keeps a value");
            }
        }
        assert_eq!(f[centre], 1.0);
    }

    #[test]
    fn shrink_to_nothing_is_not_an_error() {
        let grid = grid();
        let mut region = ActiveRegion::full_interior(&grid);
        let mut f = vec![1e-12; grid.len()];
        let mut pf = f.clone();
        let ff = f.clone();
        region.shrink(&grid, &mut f, &mut pf, &ff, Thresholds::new(1e-6, 1e-6));
        assert!(region.is_empty());
        assert!(region.shell().is_empty());
        assert_eq!(region.bounds(), None);
        assert_eq!(region.shrink(&grid, &mut f, &mut pf, &ff, Thresholds::new(1e-6, 1e-6)), 0);
    }

    #[test]
    fn random_masks_stay_consistent() {
        let grid = grid();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xAC71_0001);
        for _ in 0..32 {
            let mut f = vec![0.0; grid.len()];
            let interior = grid.interior();
            for i1 in interior.rows() {
                for i2 in interior.cols() {
                    if rng.random::<f64>() < 0.3 {
                        f[grid.index(i1, i2)] = rng.random::<f64>();
                    }
                }
            }
            let mut pf = f.clone();
            let mut region = ActiveRegion::seed(&grid, &mut f, &mut pf, Thresholds::new(0.5, 0.8));
            assert_consistent(&grid, &region);
            let ff = f.clone();
            region.shrink(&grid, &mut f, &mut pf, &ff, Thresholds::new(0.7, 0.9));
            assert_consistent(&grid, &region);
        }
    }

    #[test]
    fn raising_low_threshold_never_adds_candidates() {
        let grid = grid();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xCA4D_0002);
        for _ in 0..32 {
            let mut f = vec![0.0; grid.len()];
            for i1 in 6..15 {
                for i2 in 6..15 {
                    f[grid.index(i1, i2)] = rng.random::<f64>() * 1e-3;
                }
            }
            let mut pf = f.clone();
            let region = ActiveRegion::seed(&grid, &mut f, &mut pf, Thresholds::new(1e-12, 1e9));
            assert!(!region.shell().is_empty());
            let mut prev: Option<IndexSet> = None;
            for k in 0..8 {
                let tol = 1e-5 * (k as f64) * (k as f64);
                let picked = region.select_candidates(&grid, &pf, &f, Thresholds::new(tol, tol));
                if let Some(prev) = &prev {
                    assert!(picked.difference(prev).is_empty(), "tol {tol} added candidates");
                }
                prev = Some(picked);
            }
        }
    }
}
