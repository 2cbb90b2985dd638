#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use klein_kramers::{KineticsError, KleinKramers, Result, SimulationConfig, SnapshotWriter};
use log::{error, info};

const USAGE: &str = "usage: klein-kramers [--config FILE] [--output DIR] [--threads N] [--max-threads N] [--full-grid] [--log-level LEVEL]";

struct MainArgs {
    config: Option<PathBuf>,
    output: PathBuf,
    threads: Option<usize>,
    max_threads: Option<usize>,
    full_grid: bool,
    log_level: String,
}

fn parse_args() -> Result<MainArgs> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = MainArgs {
        config: None,
        output: PathBuf::from("output"),
        threads: None,
        max_threads: None,
        full_grid: false,
        log_level: "info".to_string(),
    };
    let next_arg = |i: usize, flag: &str| -> Result<&str> {
        args.get(i)
            .map(String::as_str)
            .ok_or_else(|| KineticsError::invalid(flag, "<missing>", "requires a value"))
    };
    let count = |i: usize, flag: &str| -> Result<usize> {
        let raw = next_arg(i, flag)?;
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(KineticsError::invalid(flag, raw, "requires a positive integer")),
        }
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                parsed.config = Some(PathBuf::from(next_arg(i, "--config")?));
            }
            "--output" => {
                i += 1;
                parsed.output = PathBuf::from(next_arg(i, "--output")?);
            }
            "--threads" => {
                i += 1;
                parsed.threads = Some(count(i, "--threads")?);
            }
            "--max-threads" => {
                i += 1;
                parsed.max_threads = Some(count(i, "--max-threads")?);
            }
            "--full-grid" => {
                parsed.full_grid = true;
            }
            "--log-level" => {
                i += 1;
                parsed.log_level = next_arg(i, "--log-level")?.to_string();
            }
            other => return Err(KineticsError::invalid("argument", other, USAGE)),
        }
        i += 1;
    }
    Ok(parsed)
}

fn load_config(args: &MainArgs) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(n) = args.threads {
        config = config.thread_count(n);
    }
    if let Some(n) = args.max_threads {
        config = config.max_threads(n);
    }
    if args.full_grid {
        config = config.full_grid(true);
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &MainArgs) -> Result<()> {
    let config = load_config(args)?;
    let total_steps = config.time_steps();

    let mut engine = KleinKramers::new(&config)?;
    let mut writer = SnapshotWriter::create(&args.output, &config.output, engine.is_full_grid())?;
    writer.record(&engine)?;

    let start = Instant::now();
    for _ in 0..total_steps {
        engine.step();
        writer.record(&engine)?;
    }
    let elapsed = start.elapsed();
    writer.flush()?;

    let ms = elapsed.as_secs_f64() * 1000.0;
    let avg_ms = if total_steps > 0 { ms / total_steps as f64 } else { 0.0 };
    info!("run finished, snapshots in {}", writer.dir().display());
    println!("\n--- Summary ({total_steps} steps, t = {:.6}) ---", engine.time());
    println!("Mode: {}", if engine.is_full_grid() { "full grid" } else { "truncated" });
    println!("Threads: {}", engine.thread_count());
    println!("Wall time: {ms:.3} ms total, {avg_ms:.6} ms/step");
    println!("Final mass: {:.16e}", engine.total_mass());
    println!(
        "Active cells: {} of {} ({:.4})",
        engine.active_len(),
        engine.grid().len(),
        engine.active_len() as f64 / engine.grid().len() as f64
    );
    if engine.curtailed_steps() > 0 {
        println!("Steps with curtailed growth: {}", engine.curtailed_steps());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level.as_str()))
        .format_timestamp_millis()
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
