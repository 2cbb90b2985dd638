#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::time::Instant;

use klein_kramers::kinetics::PotentialKind;
use klein_kramers::{KleinKramers, Result, SimulationConfig};
use rand::{Rng, SeedableRng};

const TRIALS: usize = 4;
const STEPS: u64 = 500;

struct Run {
    ms: f64,
    mass: f64,
    active: usize,
    field: Vec<f64>,
}

fn run(config: &SimulationConfig) -> Result<Run> {
    let mut engine = KleinKramers::new(config)?;
    let start = Instant::now();
    engine.step_n(STEPS);
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    Ok(Run {
        ms,
        mass: engine.total_mass(),
        active: engine.active_len(),
        field: engine.field().to_vec(),
    })
}

fn double_well() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.potential = PotentialKind::DoubleWell;
    config
}

fn main() -> Result<()> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED_1234_ABCD_EF01);

    let setup = KleinKramers::new(&double_well())?;
    let [lo, hi] = [setup.grid().lower(), setup.grid().upper()];
    println!(
        "potential: {}, grid: [{}, {}] x [{}, {}], {} steps, {} threads",
        setup.potential().name(),
        lo[0],
        hi[0],
        lo[1],
        hi[1],
        STEPS,
        setup.thread_count()
    );
    drop(setup);

    println!(
        "{:<18} {:>10} {:>12} {:>12} {:>9} {:>12} {:>12}",
        "Center", "Active", "Trunc(ms)", "Full(ms)", "Speedup", "Mass", "MaxDiff"
    );
    println!("{}", "-".repeat(92));

    for _ in 0..TRIALS {
        let mut config = double_well();
        config.initial.center = [rng.random_range(-2.0..2.0), rng.random_range(-1.0..1.0)];

        let truncated = run(&config)?;
        let full = run(&config.clone().full_grid(true))?;
        let max_diff = truncated
            .field
            .iter()
            .zip(&full.field)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);

        println!(
            "{:<18} {:>10} {:>12.1} {:>12.1} {:>8.2}x {:>12.9} {:>12.3e}",
            format!("({:.3}, {:.3})", config.initial.center[0], config.initial.center[1]),
            truncated.active,
            truncated.ms,
            full.ms,
            full.ms / truncated.ms,
            truncated.mass,
            max_diff
        );
        std::hint::black_box(full.mass);
    }
    Ok(())
}
