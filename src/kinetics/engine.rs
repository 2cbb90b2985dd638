use std::sync::{Arc, OnceLock};

use log::{debug, info, warn};
use rayon::prelude::*;

use super::activity::{ActiveRegion, Thresholds};
use super::extrapolate;
use super::field::{FieldBuffers, RowMoments};
use super::grid::{Bounds, Grid};
use super::index_set::IndexSet;
use super::moments::{EquilibriumPolicy, Physics, compute_equilibrium};
use super::observables::{Correlation, transmittance};
use super::potential::{GaussianPacket, Potential};
use super::stencil::{StageInputs, StencilCoefficients, rk4_cells, rk4_region};
use super::support::{EdgeClosure, InteriorSupport, Support};
use super::sync::{PARALLEL_ROW_THRESHOLD, map_rows};
use crate::config::{SimulationConfig, ThreadConfig};
use crate::error::{KineticsError, Result};

static PHYSICAL_CORES: OnceLock<usize> = OnceLock::new();

#[inline]
fn physical_core_count() -> usize {
    *PHYSICAL_CORES.get_or_init(|| num_cpus::get_physical().max(1))
}

#[inline]
fn auto_pool_thread_count_for_physical(physical: usize) -> usize {
    let physical = physical.max(1);
    if physical <= 8 {
        physical
    } else {
        physical.div_ceil(2).max(6)
    }
}

/// Resolve the thread count from a config, falling back to auto-detect.
fn resolve_thread_count(config: &ThreadConfig) -> usize {
    let mut threads = config
        .thread_count
        .unwrap_or_else(|| auto_pool_thread_count_for_physical(physical_core_count()));
    if let Some(cap) = config.max_threads {
        threads = threads.min(cap);
    }
    threads.max(1)
}

/// Summary of the most recent step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepReport {
    pub step: u64,
    pub active_cells: usize,
    pub shell_cells: usize,
    /// Growth rounds run this step.
    pub extrapolation_rounds: usize,
    /// Cells added by extrapolation.
    pub grown_cells: usize,
    /// Cells removed by re-truncation.
    pub dropped_cells: usize,
    /// Growth stopped at the round limit with candidates left.
    pub curtailed: bool,
    /// Integrated mass of the provisional field before rescaling.
    pub mass_before_normalization: f64,
    /// Integrated mass of the committed field right after rescaling, before
    /// any cell is dropped.
    pub mass_after_normalization: f64,
}

/// Immutable description of the model, shared by every phase of a step.
struct StepContext {
    grid: Grid,
    physics: Physics,
    policy: EquilibriumPolicy,
    closure: EdgeClosure,
    coeffs: StencilCoefficients,
    momenta: Vec<f64>,
    high: Thresholds,
    low: Thresholds,
    reduce: f64,
    limit: usize,
}

fn refresh_equilibrium<S: Support>(ctx: &StepContext, support: &S, bounds: Option<Bounds>, buffers: &mut FieldBuffers) {
    let Some(bounds) = bounds else {
        buffers.moments.clear();
        return;
    };
    compute_equilibrium(
        &ctx.grid,
        &ctx.physics,
        ctx.policy,
        support,
        bounds,
        &buffers.f,
        &ctx.momenta,
        &mut buffers.feq,
        &mut buffers.moments,
    );
}

fn stage_inputs<'a, S: Support>(ctx: &'a StepContext, support: &'a S, f: &'a [f64], feq: &'a [f64], force: &'a [f64]) -> StageInputs<'a, S> {
    StageInputs {
        grid: &ctx.grid,
        support,
        closure: ctx.closure,
        coeffs: ctx.coeffs,
        f,
        feq,
        force,
        momenta: &ctx.momenta,
    }
}

fn evolve_region<S: Support>(ctx: &StepContext, support: &S, bounds: Bounds, buffers: &mut FieldBuffers) {
    let inputs = stage_inputs(ctx, support, &buffers.f, &buffers.feq, &buffers.force);
    rk4_region(&inputs, bounds, &mut buffers.stages, &mut buffers.ff);
}

fn evolve_cells<S: Support>(ctx: &StepContext, support: &S, cells: &IndexSet, buffers: &mut FieldBuffers) {
    let inputs = stage_inputs(ctx, support, &buffers.f, &buffers.feq, &buffers.force);
    rk4_cells(&inputs, cells, &mut buffers.stages, &mut buffers.ff);
}

/// `Σ values` over supported cells, summed per row and then in row order.
fn supported_sum<S: Support>(grid: &Grid, support: &S, bounds: Bounds, values: &[f64]) -> f64 {
    map_rows(bounds.rows(), bounds.cols().count(), |i1| {
        let base = grid.index(i1, 0);
        let mut sum = 0.0;
        for i2 in bounds.cols() {
            if support.is_active(base + i2) {
                sum += values[base + i2];
            }
        }
        sum
    })
    .into_iter()
    .sum()
}

/// Rescale the provisional field to unit mass and commit it into `f` and
/// `pf`. Returns the mass before rescaling.
fn normalize<S: Support>(ctx: &StepContext, support: &S, bounds: Option<Bounds>, buffers: &mut FieldBuffers) -> f64 {
    let Some(bounds) = bounds else {
        return 0.0;
    };
    let grid = &ctx.grid;
    let mass = supported_sum(grid, support, bounds, &buffers.ff) * grid.cell_volume();
    let scale = if mass > 0.0 && mass.is_finite() {
        1.0 / mass
    } else {
        warn!("normalization skipped: provisional mass is {mass:e}");
        1.0
    };

    let stride = grid.stride();
    let span = bounds.min[0] * stride..(bounds.max[0] + 1) * stride;
    let first_row = bounds.min[0];
    let commit = |(offset, ((ff_row, f_row), pf_row)): (usize, ((&mut [f64], &mut [f64]), &mut [f64]))| {
        let base = (first_row + offset) * stride;
        for i2 in bounds.cols() {
            if support.is_active(base + i2) {
                let value = ff_row[i2] * scale;
                ff_row[i2] = value;
                f_row[i2] = value;
                pf_row[i2] = value;
            }
        }
    };
    let ff = &mut buffers.ff[span.clone()];
    let f = &mut buffers.f[span.clone()];
    let pf = &mut buffers.pf[span];
    if bounds.cell_count() >= PARALLEL_ROW_THRESHOLD {
        ff.par_chunks_mut(stride)
            .zip(f.par_chunks_mut(stride))
            .zip(pf.par_chunks_mut(stride))
            .enumerate()
            .for_each(commit);
    } else {
        ff.chunks_mut(stride)
            .zip(f.chunks_mut(stride))
            .zip(pf.chunks_mut(stride))
            .enumerate()
            .for_each(commit);
    }
    mass
}

/// Integrated mass of the committed snapshot `pf` over supported cells.
fn committed_mass<S: Support>(grid: &Grid, support: &S, bounds: Option<Bounds>, pf: &[f64]) -> f64 {
    bounds.map_or(0.0, |bounds| supported_sum(grid, support, bounds, pf) * grid.cell_volume())
}

/// Klein-Kramers phase-space solver on an adaptive truncated grid.
///
/// Construct it from a validated [`SimulationConfig`], then advance with
/// [`step`](Self::step) or [`step_n`](Self::step_n). All intra-step work
/// runs on the engine's own rayon pool; results do not depend on its size.
pub struct KleinKramers {
    ctx: StepContext,
    buffers: FieldBuffers,
    region: ActiveRegion,
    potential: Box<dyn Potential>,
    correlation: Correlation,
    full_grid: bool,
    dt: f64,
    period: u64,
    transmittance_row: usize,
    log_transmittance: bool,
    log_correlation: bool,
    steps: u64,
    curtailed_steps: u64,
    report: StepReport,
    pool: Arc<rayon::ThreadPool>,
    threads: usize,
}

impl KleinKramers {
    /// Engine with the configured potential and Gaussian initial packet.
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        let packet = GaussianPacket {
            center: config.initial.center,
            width: config.initial.width,
            hbar: config.physics.hbar,
        };
        Self::with_initial(config, config.potential.build(), move |x1, x2| packet.value(x1, x2))
    }

    /// Engine with an injected potential and initial density. The density is
    /// sampled on the interior and normalized to unit mass.
    pub fn with_initial<F>(config: &SimulationConfig, potential: Box<dyn Potential>, initial: F) -> Result<Self>
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        config.validate()?;
        let grid = config.build_grid()?;
        let threads = resolve_thread_count(&config.threads);
        let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(threads).build()?);

        let physics = Physics {
            mass: config.physics.mass,
            kb: config.physics.kb,
            temperature: config.physics.temperature,
            gamma: config.physics.gamma,
        };
        let t = &config.truncation;
        let ctx = StepContext {
            coeffs: StencilCoefficients::new(&grid, &physics, config.time.dt),
            momenta: grid.momenta(),
            physics,
            policy: config.equilibrium,
            closure: t.closure,
            high: Thresholds::new(t.tol_high, t.tol_high_gradient),
            low: Thresholds::new(t.tol_low, t.tol_low_gradient),
            reduce: t.extrapolation_reduce,
            limit: t.extrapolation_limit,
            grid,
        };

        let (buffers, region, correlation) =
            pool.install(|| Self::initial_state(&ctx, potential.as_ref(), &initial, t.full_grid))?;

        let engine = Self {
            transmittance_row: ctx.grid.row_at(config.output.transmittance_x0),
            ctx,
            buffers,
            region,
            potential,
            correlation,
            full_grid: t.full_grid,
            dt: config.time.dt,
            period: config.output.period as u64,
            log_transmittance: config.output.transmittance,
            log_correlation: config.output.correlation,
            steps: 0,
            curtailed_steps: 0,
            report: StepReport::default(),
            pool,
            threads,
        };
        engine.log_setup();
        Ok(engine)
    }

    fn initial_state<F>(
        ctx: &StepContext,
        potential: &dyn Potential,
        initial: &F,
        full_grid: bool,
    ) -> Result<(FieldBuffers, ActiveRegion, Correlation)>
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        let grid = &ctx.grid;
        let [rows, cols] = grid.shape();
        let mut buffers = FieldBuffers::zeros(grid.len(), rows);
        let interior = grid.interior();

        let force_rows = map_rows(0..=rows - 1, cols, |i1| {
            (0..cols).map(|i2| potential.gradient(grid.x1(i1), grid.x2(i2))).collect::<Vec<f64>>()
        });
        for (i1, row) in force_rows.into_iter().enumerate() {
            let base = grid.index(i1, 0);
            buffers.force[base..base + cols].copy_from_slice(&row);
        }

        let sampled = map_rows(interior.rows(), cols, |i1| {
            interior.cols().map(|i2| initial(grid.x1(i1), grid.x2(i2))).collect::<Vec<f64>>()
        });
        for (i1, row) in interior.rows().zip(sampled) {
            let base = grid.index(i1, interior.min[1]);
            buffers.f[base..base + row.len()].copy_from_slice(&row);
        }

        let support = InteriorSupport(grid);
        let mass = supported_sum(grid, &support, interior, &buffers.f) * grid.cell_volume();
        if !(mass > 0.0 && mass.is_finite()) {
            return Err(KineticsError::invalid("initial", mass, "initial density must have positive finite mass"));
        }
        info!("initial normalization factor = {mass:.16e}");
        let scale = 1.0 / mass;
        for i1 in interior.rows() {
            for i2 in interior.cols() {
                let idx = grid.index(i1, i2);
                buffers.f[idx] *= scale;
                buffers.pf[idx] = buffers.f[idx];
                buffers.ff[idx] = buffers.f[idx];
            }
        }
        let correlation = Correlation::capture(grid, &support, Some(interior), &buffers.f);
        info!("corr_0 = {:.16e}", correlation.norm());

        let region = if full_grid {
            ActiveRegion::full_interior(grid)
        } else {
            let FieldBuffers { f, pf, .. } = &mut buffers;
            ActiveRegion::seed(grid, f, pf, ctx.high)
        };
        if full_grid {
            refresh_equilibrium(ctx, &support, Some(interior), &mut buffers);
        } else {
            refresh_equilibrium(ctx, &region.support(), region.bounds(), &mut buffers);
        }
        Ok((buffers, region, correlation))
    }

    fn log_setup(&self) {
        let g = &self.ctx.grid;
        let p = &self.ctx.physics;
        info!("potential: {}", self.potential.name());
        info!(
            "grid: [{}, {}] x [{}, {}], shape = ({}, {}), spacing = ({}, {}), edge = {}",
            g.lower()[0],
            g.upper()[0],
            g.lower()[1],
            g.upper()[1],
            g.shape()[0],
            g.shape()[1],
            g.spacing()[0],
            g.spacing()[1],
            g.edge()
        );
        info!(
            "physics: m = {}, kb = {}, temp = {}, gamma = {}, dt = {}",
            p.mass, p.kb, p.temperature, p.gamma, self.dt
        );
        info!(
            "truncation: full_grid = {}, tol_high = {:e}, tol_low = {:e}, tol_high_gradient = {:e}, tol_low_gradient = {:e}, reduce = {}, limit = {}",
            self.full_grid,
            self.ctx.high.value,
            self.ctx.low.value,
            self.ctx.high.gradient,
            self.ctx.low.gradient,
            self.ctx.reduce,
            self.ctx.limit
        );
        info!(
            "equilibrium: {:?}, closure: {:?}, threads: {}",
            self.ctx.policy, self.ctx.closure, self.threads
        );
        if !self.full_grid {
            info!(
                "initial active region: {} cells, shell {} cells",
                self.region.len(),
                self.region.shell().len()
            );
        }
    }

    pub fn step(&mut self) {
        let pool = Arc::clone(&self.pool);
        pool.install(|| self.step_impl());
    }

    pub fn step_n(&mut self, n: u64) {
        let pool = Arc::clone(&self.pool);
        pool.install(|| {
            for _ in 0..n {
                self.step_impl();
            }
        });
    }

    fn step_impl(&mut self) {
        let mut report = if self.full_grid {
            self.step_full()
        } else {
            self.step_truncated()
        };
        self.steps += 1;
        report.step = self.steps;
        report.active_cells = self.region.len();
        report.shell_cells = self.region.shell().len();
        if report.curtailed {
            self.curtailed_steps += 1;
        }
        self.report = report;

        if self.steps % self.period == 0 {
            self.log_progress();
        } else {
            debug!(
                "step {}: active = {}, shell = {}, rounds = {}, grown = {}, dropped = {}, mass = {:.16e}",
                self.steps,
                self.report.active_cells,
                self.report.shell_cells,
                self.report.extrapolation_rounds,
                self.report.grown_cells,
                self.report.dropped_cells,
                self.report.mass_after_normalization
            );
        }
    }

    fn step_full(&mut self) -> StepReport {
        let ctx = &self.ctx;
        let interior = ctx.grid.interior();
        let support = InteriorSupport(&ctx.grid);
        refresh_equilibrium(ctx, &support, Some(interior), &mut self.buffers);
        evolve_region(ctx, &support, interior, &mut self.buffers);
        let mass = normalize(ctx, &support, Some(interior), &mut self.buffers);
        StepReport {
            mass_before_normalization: mass,
            mass_after_normalization: committed_mass(&ctx.grid, &support, Some(interior), &self.buffers.pf),
            ..StepReport::default()
        }
    }

    fn step_truncated(&mut self) -> StepReport {
        let ctx = &self.ctx;
        let grid = &ctx.grid;
        let buffers = &mut self.buffers;
        let region = &mut self.region;

        let mut candidates = region.select_candidates(grid, &buffers.pf, &buffers.f, ctx.low);
        let mut history = candidates.clone();
        let mut local = IndexSet::new();
        let mut rounds = 0;
        let mut grown = 0;
        // the last RK4 pass covered the current mask with current moments
        let mut fresh = false;

        while !candidates.is_empty() && rounds < ctx.limit {
            let front = extrapolate::frontier(grid, region, &candidates);
            let resolved = extrapolate::resolve(grid, &buffers.f, &front, ctx.reduce);
            if resolved.is_empty() {
                break;
            }
            let mut cells = Vec::with_capacity(resolved.len());
            for &(idx, value) in &resolved {
                buffers.f[idx] = value;
                region.activate(grid, idx);
                cells.push(idx);
            }
            grown += cells.len();

            refresh_equilibrium(ctx, &region.support(), region.bounds(), buffers);
            if rounds == 0 {
                if let Some(bounds) = region.bounds() {
                    evolve_region(ctx, &region.support(), bounds, buffers);
                }
                fresh = true;
            } else {
                local.merge(&extrapolate::closure(grid, region, &cells));
                evolve_cells(ctx, &region.support(), &local, buffers);
                fresh = false;
            }

            let next = extrapolate::next_candidates(grid, region, &buffers.ff, &cells, ctx.high);
            candidates = next.difference(&history);
            history.merge(&candidates);
            rounds += 1;
        }

        let curtailed = ctx.limit > 0 && rounds == ctx.limit && !candidates.is_empty();
        if curtailed {
            warn!(
                "step {}: extrapolation stopped at round limit {} with {} candidates left",
                self.steps + 1,
                ctx.limit,
                candidates.len()
            );
        }

        if !fresh {
            refresh_equilibrium(ctx, &region.support(), region.bounds(), buffers);
            if let Some(bounds) = region.bounds() {
                evolve_region(ctx, &region.support(), bounds, buffers);
            }
        }

        let mass = normalize(ctx, &region.support(), region.bounds(), buffers);
        let normalized = committed_mass(grid, &region.support(), region.bounds(), &buffers.pf);
        let dropped = region.shrink(grid, &mut buffers.f, &mut buffers.pf, &buffers.ff, ctx.high);

        StepReport {
            extrapolation_rounds: rounds,
            grown_cells: grown,
            dropped_cells: dropped,
            curtailed,
            mass_before_normalization: mass,
            mass_after_normalization: normalized,
            ..StepReport::default()
        }
    }

    fn log_progress(&self) {
        let t = self.time();
        if self.full_grid {
            info!("Time {t:.6}, full grid, mass = {:.16e}", self.report.mass_before_normalization);
        } else {
            let total = self.ctx.grid.len();
            let range = match self.region.bounds() {
                Some(b) => format!("[{}, {}] x [{}, {}]", b.min[0], b.max[0], b.min[1], b.max[1]),
                None => "empty".to_string(),
            };
            info!(
                "Time {t:.6}, TA size = {}, TB size = {}, TA range = {range}, TA/total = {:.4}, ExCount/ExLimit = {}/{}",
                self.region.len(),
                self.region.shell().len(),
                self.region.len() as f64 / total as f64,
                self.report.extrapolation_rounds,
                self.ctx.limit
            );
        }
        if self.log_transmittance {
            info!("Time {t:.6}, Trans = {:.16e}", self.transmittance());
        }
        if self.log_correlation {
            info!("Time {t:.6}, Corr = {:.16e}", self.correlation());
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.ctx.grid
    }

    pub fn potential(&self) -> &dyn Potential {
        self.potential.as_ref()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn time(&self) -> f64 {
        self.steps as f64 * self.dt
    }

    pub fn is_full_grid(&self) -> bool {
        self.full_grid
    }

    pub fn thread_count(&self) -> usize {
        self.threads
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.region.bounds()
    }

    pub fn active_len(&self) -> usize {
        self.region.len()
    }

    /// Active cells touching an inactive one. Empty in full-grid mode.
    pub fn shell(&self) -> &IndexSet {
        static EMPTY: IndexSet = IndexSet::new();
        if self.full_grid { &EMPTY } else { self.region.shell() }
    }

    pub fn shell_len(&self) -> usize {
        self.shell().len()
    }

    pub fn is_active(&self, i1: usize, i2: usize) -> bool {
        self.region.is_active(self.ctx.grid.index(i1, i2))
    }

    pub fn value(&self, i1: usize, i2: usize) -> f64 {
        self.buffers.f[self.ctx.grid.index(i1, i2)]
    }

    /// Committed density over the whole grid; inactive cells hold zero.
    pub fn field(&self) -> &[f64] {
        &self.buffers.f
    }

    pub fn for_each_active<F: FnMut(usize, usize, f64)>(&self, mut f: F) {
        let Some(bounds) = self.region.bounds() else {
            return;
        };
        let grid = &self.ctx.grid;
        for i1 in bounds.rows() {
            for i2 in bounds.cols() {
                let idx = grid.index(i1, i2);
                if self.region.is_active(idx) {
                    f(i1, i2, self.buffers.f[idx]);
                }
            }
        }
    }

    /// Row moments from the latest equilibrium refresh.
    pub fn moments(&self) -> &RowMoments {
        &self.buffers.moments
    }

    pub fn total_mass(&self) -> f64 {
        committed_mass(&self.ctx.grid, &self.region.support(), self.region.bounds(), &self.buffers.f)
    }

    pub fn transmittance(&self) -> f64 {
        transmittance(
            &self.ctx.grid,
            &self.region.support(),
            self.region.bounds(),
            &self.buffers.pf,
            self.transmittance_row,
        )
    }

    pub fn correlation(&self) -> f64 {
        self.correlation
            .evaluate(&self.ctx.grid, &self.region.support(), self.region.bounds(), &self.buffers.pf)
    }

    pub fn last_report(&self) -> &StepReport {
        &self.report
    }

    /// Steps whose growth was cut short by the round limit.
    pub fn curtailed_steps(&self) -> u64 {
        self.curtailed_steps
    }
}
