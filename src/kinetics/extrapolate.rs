//! Log-linear regrowth of the active region.
//!
//! One growth round consists of:
//! 1. [`frontier`]: inactive in-margin cells adjacent to the current candidates.
//! 2. [`resolve`]: geometric extrapolation of each frontier cell from the two
//!    nearest cells in every axis direction, damped when the average would
//!    exceed the smallest neighbour.
//! 3. The engine writes resolved values, activates the cells, refreshes the
//!    equilibrium and reruns RK4 locally over [`closure`].
//! 4. [`next_candidates`]: resolved cells that turned out significant seed
//!    the next round.
//!
//! Frontier resolution is embarrassingly parallel; every other phase works on
//! sorted-unique [`IndexSet`]s so duplicate indices never survive a round.

use rayon::prelude::*;

use super::activity::{ActiveRegion, Thresholds};
use super::grid::{AXIS_OFFSETS, Grid};
use super::index_set::IndexSet;
use super::support::gradient_sq;
use super::sync::PARALLEL_SET_THRESHOLD;

/// Manhattan radius of the neighbourhood re-evolved around resolved cells.
pub const CLOSURE_RADIUS: usize = 4;

/// Inactive cells in the growth margin that touch a candidate, minus the
/// candidates themselves.
pub fn frontier(grid: &Grid, region: &ActiveRegion, candidates: &IndexSet) -> IndexSet {
    let mut raw = Vec::with_capacity(candidates.len() * 2);
    for idx in candidates.iter() {
        for &(axis, dir) in &AXIS_OFFSETS {
            let Some(n) = grid.offset(idx, axis, dir, 1) else {
                continue;
            };
            let (n1, n2) = grid.coords(n);
            if grid.in_growth_margin(n1, n2) && !region.is_active(n) {
                raw.push(n);
            }
        }
    }
    IndexSet::from_unsorted(raw).difference(candidates)
}

/// Extrapolated value for one frontier cell, or `None` when no direction
/// offers two nonzero cells to extrapolate from.
pub fn resolve_cell(grid: &Grid, f: &[f64], idx: usize, reduce: f64) -> Option<f64> {
    let spacing = grid.spacing();
    let mut sum = 0.0;
    let mut count = 0u32;
    let mut min_abs = f64::INFINITY;
    let mut min_value = 0.0;
    let mut min_axis = 0;

    for &(axis, dir) in &AXIS_OFFSETS {
        let v1 = match grid.offset(idx, axis, dir, 1) {
            Some(n) => f[n],
            None => continue,
        };
        if v1 == 0.0 {
            continue;
        }
        let v2 = grid.offset(idx, axis, dir, 2).map_or(0.0, |n| f[n]);
        if v2 == 0.0 {
            continue;
        }
        if v1.abs() < min_abs {
            min_abs = v1.abs();
            min_value = v1;
            min_axis = axis;
        }
        let extrapolated = (2.0 * v1.ln() - v2.ln()).exp();
        if extrapolated.is_finite() {
            sum += extrapolated;
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }
    let mean = sum / count as f64;
    if mean.abs() > min_abs {
        Some(min_value * (-reduce * spacing[min_axis]).exp())
    } else {
        Some(mean)
    }
}

/// Resolve every frontier cell. Unresolved cells are left out; the result
/// keeps frontier order.
pub fn resolve(grid: &Grid, f: &[f64], frontier: &IndexSet, reduce: f64) -> Vec<(usize, f64)> {
    let one = |&idx: &usize| resolve_cell(grid, f, idx, reduce).map(|v| (idx, v));
    if frontier.len() >= PARALLEL_SET_THRESHOLD {
        frontier.as_slice().par_iter().filter_map(one).collect()
    } else {
        frontier.as_slice().iter().filter_map(one).collect()
    }
}

/// Resolved cells plus every active cell within [`CLOSURE_RADIUS`] of one.
pub fn closure(grid: &Grid, region: &ActiveRegion, resolved: &[usize]) -> IndexSet {
    let [rows, cols] = grid.shape();
    let radius = CLOSURE_RADIUS as isize;
    let mut raw = Vec::with_capacity(resolved.len() * 41);
    for &idx in resolved {
        raw.push(idx);
        let (i1, i2) = grid.coords(idx);
        for d1 in -radius..=radius {
            let reach = radius - d1.abs();
            for d2 in -reach..=reach {
                if d1 == 0 && d2 == 0 {
                    continue;
                }
                let (Some(n1), Some(n2)) = (i1.checked_add_signed(d1), i2.checked_add_signed(d2)) else {
                    continue;
                };
                if n1 < rows && n2 < cols {
                    let n = grid.index(n1, n2);
                    if region.is_active(n) {
                        raw.push(n);
                    }
                }
            }
        }
    }
    IndexSet::from_unsorted(raw)
}

/// Resolved cells in the growth margin that are significant under `high`
/// once evolved, judged on the provisional field `ff`.
pub fn next_candidates(
    grid: &Grid,
    region: &ActiveRegion,
    ff: &[f64],
    resolved: &[usize],
    high: Thresholds,
) -> IndexSet {
    let support = region.support();
    resolved
        .iter()
        .copied()
        .filter(|&idx| {
            let (i1, i2) = grid.coords(idx);
            grid.in_growth_margin(i1, i2) && high.is_significant(ff[idx], gradient_sq(grid, &support, ff, idx))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::new([0.0, 0.0], [20.0, 10.0], [1.0, 0.5], 2).unwrap()
    }

    #[test]
    fn geometric_extrapolation_from_one_direction() {
        let grid = grid();
        let mut f = vec![0.0; grid.len()];
        let idx = grid.index(8, 10);
        f[grid.index(9, 10)] = 0.5;
        f[grid.index(10, 10)] = 1.0;
        let v = resolve_cell(&grid, &f, idx, 1.0).unwrap();
        assert!((v - 0.25).abs() < 1e-15);
    }

    #[test]
    fn growing_profile_is_damped_to_smallest_neighbour() {
        let grid = grid();
        let mut f = vec![0.0; grid.len()];
        let idx = grid.index(8, 10);
        // the profile grows toward the frontier, so the geometric guess (4.0)
        // exceeds the nearest value and the damped form applies
        f[grid.index(9, 10)] = 2.0;
        f[grid.index(10, 10)] = 1.0;
        let reduce = 0.7;
        let v = resolve_cell(&grid, &f, idx, reduce).unwrap();
        assert!((v - 2.0 * (-reduce * 1.0f64).exp()).abs() < 1e-15);

        // the decay uses the spacing of the axis that held the minimum
        let mut g = vec![0.0; grid.len()];
        g[grid.index(8, 11)] = 2.0;
        g[grid.index(8, 12)] = 1.0;
        let v = resolve_cell(&grid, &g, idx, reduce).unwrap();
        assert!((v - 2.0 * (-reduce * 0.5f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn averages_directions_and_drops_non_finite() {
        let grid = grid();
        let mut f = vec![0.0; grid.len()];
        let idx = grid.index(8, 10);
        f[grid.index(9, 10)] = 0.5;
        f[grid.index(10, 10)] = 1.0;
        f[grid.index(8, 11)] = 0.2;
        f[grid.index(8, 12)] = 0.4;
        // negative values cannot be log-extrapolated
        f[grid.index(7, 10)] = -0.3;
        f[grid.index(6, 10)] = -0.6;
        let v = resolve_cell(&grid, &f, idx, 1.0).unwrap();
        // |mean| = 0.175 < smallest |v1| = 0.2, so the mean stands
        assert!((v - (0.25 + 0.1) / 2.0).abs() < 1e-15);
    }

    #[test]
    fn missing_second_neighbour_leaves_cell_unresolved() {
        let grid = grid();
        let mut f = vec![0.0; grid.len()];
        let idx = grid.index(8, 10);
        f[grid.index(9, 10)] = 0.5;
        assert_eq!(resolve_cell(&grid, &f, idx, 1.0), None);
        let frontier = IndexSet::from_unsorted(vec![idx]);
        assert!(resolve(&grid, &f, &frontier, 1.0).is_empty());
    }

    #[test]
    fn frontier_stays_in_margin_and_off_active_cells() {
        let grid = grid();
        let mut region = ActiveRegion::empty(grid.len());
        let a = grid.index(3, 10);
        let b = grid.index(10, 10);
        region.activate(&grid, a);
        region.activate(&grid, b);
        region.activate(&grid, grid.index(10, 11));
        let candidates = IndexSet::from_unsorted(vec![a, b]);
        let front = frontier(&grid, &region, &candidates);
        // row 2 is outside the growth margin
        assert!(!front.contains(grid.index(2, 10)));
        assert!(front.contains(grid.index(4, 10)));
        assert!(front.contains(grid.index(3, 9)));
        assert!(!front.contains(grid.index(10, 11)));
        assert_eq!(front.len(), 3 + 3);
        assert!(front.difference(&candidates) == front);
    }

    #[test]
    fn closure_covers_active_diamond() {
        let grid = grid();
        let region = ActiveRegion::full_interior(&grid);
        let centre = grid.index(10, 10);
        let set = closure(&grid, &region, &[centre]);
        // 1 + 4 + 8 + 12 + 16
        assert_eq!(set.len(), 41);
        assert!(set.contains(grid.index(14, 10)));
        assert!(!set.contains(grid.index(13, 12)));

        let near_rim = grid.index(3, 3);
        let clipped = closure(&grid, &region, &[near_rim]);
        assert!(clipped.len() < 41);
        assert!(clipped.iter().all(|i| region.is_active(i)));
    }

    #[test]
    fn next_candidates_require_significance_and_margin() {
        let grid = grid();
        let mut region = ActiveRegion::empty(grid.len());
        let strong = grid.index(8, 8);
        let weak = grid.index(12, 8);
        let rim = grid.index(2, 8);
        for idx in [strong, weak, rim] {
            region.activate(&grid, idx);
        }
        let mut ff = vec![0.0; grid.len()];
        ff[strong] = 1e-2;
        ff[weak] = 1e-9;
        ff[rim] = 1.0;
        let next = next_candidates(&grid, &region, &ff, &[strong, weak, rim], Thresholds::new(1e-4, 1e-3));
        assert_eq!(next.as_slice(), &[strong]);
    }
}
