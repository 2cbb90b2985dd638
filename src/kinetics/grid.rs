//! Fixed-resolution phase-space lattice.
//!
//! Axis 0 is position (rows), axis 1 is momentum (columns). Cells are stored
//! row-major, so the linear index of `(i1, i2)` is `i1 * stride + i2`. A fixed
//! margin of `edge` cells on every side is never evolved and always reads as
//! zero.

use std::ops::RangeInclusive;

use crate::error::{KineticsError, Result};

/// The four axis-aligned neighbour offsets, axis 0 first.
pub const AXIS_OFFSETS: [(usize, isize); 4] = [(0, 1), (0, -1), (1, 1), (1, -1)];

#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    lower: [f64; 2],
    upper: [f64; 2],
    spacing: [f64; 2],
    shape: [usize; 2],
    edge: usize,
}

impl Grid {
    pub fn new(lower: [f64; 2], upper: [f64; 2], spacing: [f64; 2], edge: usize) -> Result<Self> {
        let mut shape = [0usize; 2];
        for axis in 0..2 {
            let h = spacing[axis];
            if !(h.is_finite() && h > 0.0) {
                return Err(KineticsError::invalid(
                    format!("grid.spacing[{axis}]"),
                    h,
                    "must be positive and finite",
                ));
            }
            let extent = upper[axis] - lower[axis];
            if !(extent.is_finite() && extent > 0.0) {
                return Err(KineticsError::invalid(
                    format!("grid.upper[{axis}]"),
                    upper[axis],
                    format!("must exceed lower bound {}", lower[axis]),
                ));
            }
            shape[axis] = (extent / h).round() as usize + 1;
            if shape[axis] <= 2 * edge + 2 {
                return Err(KineticsError::invalid(
                    format!("grid.shape[{axis}]"),
                    shape[axis],
                    format!("needs more than {} cells for edge margin {edge}", 2 * edge + 2),
                ));
            }
        }
        if edge == 0 {
            return Err(KineticsError::invalid("grid.edge", edge, "must be at least 1"));
        }
        Ok(Self {
            lower,
            upper,
            spacing,
            shape,
            edge,
        })
    }

    #[inline]
    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.shape[1]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shape[0] * self.shape[1]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn spacing(&self) -> [f64; 2] {
        self.spacing
    }

    #[inline]
    pub fn lower(&self) -> [f64; 2] {
        self.lower
    }

    #[inline]
    pub fn upper(&self) -> [f64; 2] {
        self.upper
    }

    #[inline]
    pub fn edge(&self) -> usize {
        self.edge
    }

    #[inline]
    pub fn cell_volume(&self) -> f64 {
        self.spacing[0] * self.spacing[1]
    }

    #[inline(always)]
    pub fn index(&self, i1: usize, i2: usize) -> usize {
        debug_assert!(i1 < self.shape[0] && i2 < self.shape[1]);
        i1 * self.shape[1] + i2
    }

    #[inline(always)]
    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx / self.shape[1], idx % self.shape[1])
    }

    #[inline(always)]
    pub fn x1(&self, i1: usize) -> f64 {
        self.lower[0] + i1 as f64 * self.spacing[0]
    }

    #[inline(always)]
    pub fn x2(&self, i2: usize) -> f64 {
        self.lower[1] + i2 as f64 * self.spacing[1]
    }

    /// Physical coordinates of every column, indexed by `i2`.
    pub fn momenta(&self) -> Vec<f64> {
        (0..self.shape[1]).map(|i2| self.x2(i2)).collect()
    }

    /// Row index nearest to the physical position `x1`, clamped to the grid.
    pub fn row_at(&self, x1: f64) -> usize {
        let raw = ((x1 - self.lower[0]) / self.spacing[0]).round();
        if raw <= 0.0 || raw.is_nan() {
            0
        } else {
            (raw as usize).min(self.shape[0] - 1)
        }
    }

    /// Cell `dist` steps away from `idx` along `axis` in direction `dir`.
    #[inline(always)]
    pub fn offset(&self, idx: usize, axis: usize, dir: isize, dist: usize) -> Option<usize> {
        let (i1, i2) = self.coords(idx);
        let along = if axis == 0 { i1 } else { i2 };
        let moved = if dir < 0 {
            along.checked_sub(dist)?
        } else {
            let moved = along + dist;
            if moved >= self.shape[axis] {
                return None;
            }
            moved
        };
        Some(if axis == 0 {
            moved * self.shape[1] + i2
        } else {
            i1 * self.shape[1] + moved
        })
    }

    #[inline(always)]
    pub fn in_interior(&self, i1: usize, i2: usize) -> bool {
        let e = self.edge;
        i1 >= e && i2 >= e && i1 < self.shape[0] - e && i2 < self.shape[1] - e
    }

    /// Cells strictly inside the interior, one cell away from its rim. Only
    /// these may seed or receive extrapolated growth.
    #[inline(always)]
    pub fn in_growth_margin(&self, i1: usize, i2: usize) -> bool {
        let e = self.edge;
        i1 > e && i2 > e && i1 + e + 1 < self.shape[0] && i2 + e + 1 < self.shape[1]
    }

    pub fn interior(&self) -> Bounds {
        let e = self.edge;
        Bounds {
            min: [e, e],
            max: [self.shape[0] - e - 1, self.shape[1] - e - 1],
        }
    }
}

/// Inclusive index box over the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub min: [usize; 2],
    pub max: [usize; 2],
}

impl Bounds {
    pub fn point(i1: usize, i2: usize) -> Self {
        Self {
            min: [i1, i2],
            max: [i1, i2],
        }
    }

    #[inline]
    pub fn include(&mut self, i1: usize, i2: usize) {
        self.min[0] = self.min[0].min(i1);
        self.min[1] = self.min[1].min(i2);
        self.max[0] = self.max[0].max(i1);
        self.max[1] = self.max[1].max(i2);
    }

    pub fn merge(self, other: Bounds) -> Bounds {
        let mut out = self;
        out.include(other.min[0], other.min[1]);
        out.include(other.max[0], other.max[1]);
        out
    }

    #[inline]
    pub fn contains(&self, i1: usize, i2: usize) -> bool {
        i1 >= self.min[0] && i1 <= self.max[0] && i2 >= self.min[1] && i2 <= self.max[1]
    }

    #[inline]
    pub fn rows(&self) -> RangeInclusive<usize> {
        self.min[0]..=self.max[0]
    }

    #[inline]
    pub fn cols(&self) -> RangeInclusive<usize> {
        self.min[1]..=self.max[1]
    }

    pub fn cell_count(&self) -> usize {
        (self.max[0] - self.min[0] + 1) * (self.max[1] - self.min[1] + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_21() -> Grid {
        Grid::new([-10.0, -10.0], [10.0, 10.0], [1.0, 1.0], 2).unwrap()
    }

    #[test]
    fn shape_rounds_extent_over_spacing() {
        let grid = Grid::new([-1.0, 0.0], [1.0, 3.0], [0.1, 0.25], 2).unwrap();
        assert_eq!(grid.shape(), [21, 13]);
        assert_eq!(grid.lower(), [-1.0, 0.0]);
        assert_eq!(grid.upper(), [1.0, 3.0]);
        assert_eq!(grid.stride(), 13);
        assert_eq!(grid.len(), 21 * 13);
        assert!((grid.cell_volume() - 0.025).abs() < 1e-15);
    }

    #[test]
    fn index_and_coords_are_inverse() {
        let grid = grid_21();
        for i1 in [0, 3, 20] {
            for i2 in [0, 7, 20] {
                let idx = grid.index(i1, i2);
                assert_eq!(grid.coords(idx), (i1, i2));
            }
        }
        assert_eq!(grid.x1(0), -10.0);
        assert_eq!(grid.x2(20), 10.0);
    }

    #[test]
    fn offset_respects_grid_edges() {
        let grid = grid_21();
        let corner = grid.index(0, 0);
        assert_eq!(grid.offset(corner, 0, -1, 1), None);
        assert_eq!(grid.offset(corner, 1, -1, 1), None);
        assert_eq!(grid.offset(corner, 0, 1, 2), Some(grid.index(2, 0)));
        assert_eq!(grid.offset(corner, 1, 1, 1), Some(grid.index(0, 1)));
        let far = grid.index(20, 20);
        assert_eq!(grid.offset(far, 0, 1, 1), None);
        assert_eq!(grid.offset(far, 1, 1, 1), None);
    }

    #[test]
    fn interior_and_growth_margin() {
        let grid = grid_21();
        assert!(!grid.in_interior(1, 10));
        assert!(grid.in_interior(2, 10));
        assert!(grid.in_interior(18, 18));
        assert!(!grid.in_interior(19, 10));
        assert!(!grid.in_growth_margin(2, 10));
        assert!(grid.in_growth_margin(3, 10));
        assert!(grid.in_growth_margin(17, 17));
        assert!(!grid.in_growth_margin(18, 10));
        assert_eq!(grid.interior(), Bounds { min: [2, 2], max: [18, 18] });
    }

    #[test]
    fn row_at_clamps() {
        let grid = grid_21();
        assert_eq!(grid.row_at(-100.0), 0);
        assert_eq!(grid.row_at(0.4), 10);
        assert_eq!(grid.row_at(100.0), 20);
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(Grid::new([0.0, 0.0], [1.0, 1.0], [0.0, 0.1], 1).is_err());
        assert!(Grid::new([0.0, 0.0], [-1.0, 1.0], [0.1, 0.1], 1).is_err());
        assert!(Grid::new([0.0, 0.0], [0.5, 1.0], [0.1, 0.1], 2).is_err());
        assert!(Grid::new([0.0, 0.0], [1.0, 1.0], [0.1, 0.1], 0).is_err());
    }

    #[test]
    fn bounds_grow_and_merge() {
        let mut b = Bounds::point(5, 5);
        b.include(3, 8);
        assert_eq!(b, Bounds { min: [3, 5], max: [5, 8] });
        assert!(b.contains(4, 6));
        assert!(!b.contains(6, 6));
        assert_eq!(b.cell_count(), 3 * 4);
        let merged = b.merge(Bounds::point(10, 1));
        assert_eq!(merged, Bounds { min: [3, 1], max: [10, 8] });
    }
}
