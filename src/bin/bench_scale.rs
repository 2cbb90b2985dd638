use std::time::Instant;

use klein_kramers::{KleinKramers, Result, SimulationConfig};

fn bench_engine(spacing: f64, full_grid: bool, steps: u64) -> Result<(f64, usize, usize)> {
    let mut config = SimulationConfig::default().full_grid(full_grid);
    config.grid.spacing = [spacing, spacing];
    let mut engine = KleinKramers::new(&config)?;

    let start = Instant::now();
    engine.step_n(steps);
    let duration = start.elapsed();

    let total_ms = duration.as_secs_f64() * 1000.0;
    Ok((total_ms, engine.active_len(), engine.grid().len()))
}

fn main() -> Result<()> {
    let scales: &[(f64, u64)] = &[
        (0.1, 200),   // 161x121, below the parallel row threshold for most rows
        (0.05, 200),  // 321x241, default setup
        (0.025, 100), // 641x481
        (0.0125, 50), // 1281x961
    ];

    println!(
        "{:<10} {:>10} {:>10} {:>8} {:>12} {:>10} {:>12} {:>10}",
        "Spacing", "Cells", "Active", "Steps", "Trunc(ms)", "Avg(ms)", "Full(ms)", "Avg(ms)"
    );
    println!("{}", "-".repeat(90));

    for &(spacing, steps) in scales {
        let (trunc_ms, active, cells) = bench_engine(spacing, false, steps)?;
        let (full_ms, _, _) = bench_engine(spacing, true, steps)?;
        println!(
            "{:<10} {:>10} {:>10} {:>8} {:>12.1} {:>10.4} {:>12.1} {:>10.4}",
            spacing,
            cells,
            active,
            steps,
            trunc_ms,
            trunc_ms / steps as f64,
            full_ms,
            full_ms / steps as f64
        );
    }
    Ok(())
}
