//! Periodic text snapshots of a running engine.
//!
//! Each enabled channel owns one buffered file under the output directory and
//! receives a record whenever the step count is a multiple of its period.
//! Everything is read through the engine's public views.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::OutputConfig;
use crate::error::Result;
use crate::kinetics::KleinKramers;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Wavefunction,
    Edge,
    Density,
    DriftVelocity,
    Temperature,
    Transmittance,
    Correlation,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Wavefunction,
        Channel::Edge,
        Channel::Density,
        Channel::DriftVelocity,
        Channel::Temperature,
        Channel::Transmittance,
        Channel::Correlation,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Channel::Wavefunction => "wave.dat",
            Channel::Edge => "edge.dat",
            Channel::Density => "density.dat",
            Channel::DriftVelocity => "driftvelocity.dat",
            Channel::Temperature => "localtemperature.dat",
            Channel::Transmittance => "transmittance.dat",
            Channel::Correlation => "correlation.dat",
        }
    }

    fn enabled(self, output: &OutputConfig, full_grid: bool) -> bool {
        match self {
            Channel::Wavefunction => output.wavefunction,
            Channel::Edge => output.edge && !full_grid,
            Channel::Density => output.density,
            Channel::DriftVelocity => output.drift_velocity,
            Channel::Temperature => output.temperature,
            Channel::Transmittance => output.transmittance,
            Channel::Correlation => output.correlation,
        }
    }

    fn period(self, output: &OutputConfig) -> u64 {
        let period = match self {
            Channel::Wavefunction => output.wavefunction_period,
            Channel::Edge | Channel::Density | Channel::DriftVelocity | Channel::Temperature => output.print_period,
            Channel::Transmittance | Channel::Correlation => output.period,
        };
        period.max(1) as u64
    }
}

pub struct SnapshotWriter {
    dir: PathBuf,
    output: OutputConfig,
    sinks: Vec<(Channel, BufWriter<File>)>,
}

impl SnapshotWriter {
    /// Create `dir` if needed and truncate one file per enabled channel.
    pub fn create(dir: impl AsRef<Path>, output: &OutputConfig, full_grid: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let mut sinks = Vec::new();
        for channel in Channel::ALL {
            if channel.enabled(output, full_grid) {
                let file = File::create(dir.join(channel.file_name()))?;
                sinks.push((channel, BufWriter::new(file)));
            }
        }
        debug!("snapshot channels: {:?}", sinks.iter().map(|(c, _)| *c).collect::<Vec<_>>());
        Ok(Self {
            dir,
            output: output.clone(),
            sinks,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.sinks.iter().map(|(c, _)| *c)
    }

    /// Write every channel whose period divides the engine's step count.
    pub fn record(&mut self, engine: &KleinKramers) -> Result<()> {
        let step = engine.steps();
        for (channel, sink) in &mut self.sinks {
            if step % channel.period(&self.output) == 0 {
                write_channel(*channel, sink, engine)?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        for (_, sink) in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

fn write_channel<W: Write>(channel: Channel, out: &mut W, engine: &KleinKramers) -> Result<()> {
    match channel {
        Channel::Wavefunction => write_wave(out, engine),
        Channel::Edge => write_edge(out, engine),
        Channel::Density => write_profile(out, engine, &engine.moments().density),
        Channel::DriftVelocity => write_profile(out, engine, &engine.moments().velocity),
        Channel::Temperature => write_profile(out, engine, &engine.moments().temperature),
        Channel::Transmittance => {
            writeln!(out, "{:.6} {:.16e}", engine.time(), engine.transmittance())?;
            Ok(())
        }
        Channel::Correlation => {
            writeln!(out, "{:.6} {:.16e}", engine.time(), engine.correlation())?;
            Ok(())
        }
    }
}

fn write_wave<W: Write>(out: &mut W, engine: &KleinKramers) -> Result<()> {
    let grid = engine.grid();
    if engine.is_full_grid() {
        let [rows, cols] = grid.shape();
        writeln!(out, "{} {}", engine.steps(), grid.len())?;
        for i1 in 0..rows {
            for i2 in 0..cols {
                writeln!(out, "{i1} {i2} {:.16e}", engine.value(i1, i2))?;
            }
        }
        return Ok(());
    }
    writeln!(out, "{} {}", engine.steps(), engine.active_len())?;
    let mut result = Ok(());
    engine.for_each_active(|i1, i2, v| {
        if result.is_ok() {
            result = writeln!(out, "{i1} {i2} {v:.16e}");
        }
    });
    Ok(result?)
}

fn write_edge<W: Write>(out: &mut W, engine: &KleinKramers) -> Result<()> {
    let grid = engine.grid();
    let shell = engine.shell();
    writeln!(out, "{} {:.6} {}", engine.steps(), engine.time(), shell.len())?;
    for idx in shell.iter() {
        let (i1, i2) = grid.coords(idx);
        writeln!(out, "{i1} {i2} {:.6} {:.6}", grid.x1(i1), grid.x2(i2))?;
    }
    Ok(())
}

fn write_profile<W: Write>(out: &mut W, engine: &KleinKramers, values: &[f64]) -> Result<()> {
    let grid = engine.grid();
    let rows = if engine.is_full_grid() {
        Some(0..=grid.shape()[0] - 1)
    } else {
        engine.bounds().map(|b| b.rows())
    };
    let count = rows.clone().map_or(0, |r| r.count());
    writeln!(out, "{} {:.6} {count}", engine.steps(), engine.time())?;
    for i1 in rows.into_iter().flatten() {
        writeln!(out, "{:.6} {:.16e}", grid.x1(i1), values[i1])?;
    }
    Ok(())
}
