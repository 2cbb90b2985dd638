//! Which neighbours a stencil may read, and what it sees when it may not.

use serde::{Deserialize, Serialize};

use super::grid::Grid;

/// Value substituted for a neighbour that is not evolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeClosure {
    /// The cell's own (stage-shifted) value: zero gradient across the edge.
    #[default]
    Mirror,
    /// Zero.
    Vacuum,
}

/// Predicate telling whether a cell participates in evolution.
pub trait Support: Sync {
    fn is_active(&self, idx: usize) -> bool;
}

/// Truncated mode: the active mask decides.
#[derive(Clone, Copy)]
pub struct MaskSupport<'a>(pub &'a [bool]);

impl Support for MaskSupport<'_> {
    #[inline(always)]
    fn is_active(&self, idx: usize) -> bool {
        self.0[idx]
    }
}

/// Full-grid mode: every interior cell participates.
#[derive(Clone, Copy)]
pub struct InteriorSupport<'a>(pub &'a Grid);

impl Support for InteriorSupport<'_> {
    #[inline(always)]
    fn is_active(&self, idx: usize) -> bool {
        let (i1, i2) = self.0.coords(idx);
        self.0.in_interior(i1, i2)
    }
}

/// Every in-grid cell, margin included.
#[derive(Clone, Copy)]
pub struct Unrestricted;

impl Support for Unrestricted {
    #[inline(always)]
    fn is_active(&self, _idx: usize) -> bool {
        true
    }
}

/// Squared centred-difference gradient of `values` at `idx`.
///
/// A neighbour outside `support` is replaced by the cell's own value and the
/// divisor shrinks to the number of neighbours actually present on that axis.
/// An axis with no present neighbour contributes nothing.
#[inline]
pub fn gradient_sq<S: Support>(grid: &Grid, support: &S, values: &[f64], idx: usize) -> f64 {
    let h = grid.spacing();
    let own = values[idx];
    let mut total = 0.0;
    for axis in 0..2 {
        let mut present = 0u32;
        let mut sample = |dir: isize| match grid.offset(idx, axis, dir, 1) {
            Some(j) if support.is_active(j) => {
                present += 1;
                values[j]
            }
            _ => own,
        };
        let plus = sample(1);
        let minus = sample(-1);
        if present > 0 {
            let d = (plus - minus) / (present as f64 * h[axis]);
            total += d * d;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::new([0.0, 0.0], [6.0, 6.0], [1.0, 0.5], 1).unwrap()
    }

    #[test]
    fn full_neighbourhood_uses_centred_difference() {
        let grid = grid();
        let mut values = vec![0.0; grid.len()];
        let c = grid.index(3, 6);
        values[grid.index(4, 6)] = 4.0;
        values[grid.index(2, 6)] = 2.0;
        values[grid.index(3, 7)] = 1.0;
        values[grid.index(3, 5)] = 0.0;
        let g = gradient_sq(&grid, &Unrestricted, &values, c);
        let d1 = (4.0 - 2.0) / (2.0 * 1.0);
        let d2 = (1.0 - 0.0) / (2.0 * 0.5);
        assert!((g - (d1 * d1 + d2 * d2)).abs() < 1e-12);
    }

    #[test]
    fn missing_neighbours_mirror_the_cell() {
        let grid = grid();
        let mut values = vec![0.0; grid.len()];
        let mut mask = vec![false; grid.len()];
        let c = grid.index(3, 6);
        let up = grid.index(4, 6);
        values[c] = 1.0;
        values[up] = 3.0;
        mask[c] = true;
        mask[up] = true;
        let g = gradient_sq(&grid, &MaskSupport(&mask), &values, c);
        // one-sided along axis 0, nothing along axis 1
        let d1 = (3.0 - 1.0) / 1.0;
        assert!((g - d1 * d1).abs() < 1e-12);

        let isolated = gradient_sq(&grid, &MaskSupport(&vec![false; grid.len()]), &values, c);
        assert_eq!(isolated, 0.0);
    }

    #[test]
    fn interior_support_excludes_margin() {
        let grid = grid();
        let support = InteriorSupport(&grid);
        assert!(!support.is_active(grid.index(0, 3)));
        assert!(support.is_active(grid.index(1, 1)));
        assert!(!support.is_active(grid.index(6, 3)));
    }
}
