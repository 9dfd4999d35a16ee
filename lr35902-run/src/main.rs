//! Headless runner for the lr35902 core. Loads a cartridge, runs it for some amount of emulated time and keeps its
//! battery-backed RAM in a save file next to the ROM.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, error, info};
use lr35902::{Config, EventListener, Gameboy, Model, Rom, CLOCK_SPEED};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to .gb/.gbc ROM file
    rom: PathBuf,

    /// Hardware to emulate. Defaults to whatever the cartridge header asks for
    #[arg(long, value_enum)]
    model: Option<ModelArg>,

    /// Seconds of emulated time to run for
    #[arg(long, default_value_t = 10.0)]
    seconds: f64,

    /// Battery save file. Defaults to the ROM path with a .sav extension
    #[arg(long)]
    save: Option<PathBuf>,

    /// Restore this save state before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state here when done
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Print the next N instructions at PC and exit
    #[arg(long, value_name = "N")]
    disassemble: Option<usize>,

    /// Debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModelArg {
    Dmg,
    Cgb,
}

impl From<ModelArg> for Model {
    fn from(m: ModelArg) -> Model {
        match m {
            ModelArg::Dmg => Model::Dmg,
            ModelArg::Cgb => Model::Cgb,
        }
    }
}

/// Writes cartridge RAM through to disk every time the game touches it.
struct SaveFile {
    path: PathBuf,
}

impl EventListener for SaveFile {
    fn on_battery_write(&mut self, ram: &[u8]) {
        if let Err(err) = fs::write(&self.path, ram) {
            error!("Failed to write {}: {}", self.path.display(), err);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let data = fs::read(&args.rom).with_context(|| format!("could not read {}", args.rom.display()))?;
    let rom = Rom::new(data.into_boxed_slice()).context("failed to load cartridge")?;
    let has_battery = rom.has_battery;

    let save_path = args.save.clone().unwrap_or_else(|| args.rom.with_extension("sav"));
    let config = Config {
        model: args.model.map(Model::from),
    };
    let mut gb = Gameboy::new(rom, config, SaveFile { path: save_path.clone() });

    if has_battery && save_path.exists() {
        let ram = fs::read(&save_path).with_context(|| format!("could not read {}", save_path.display()))?;
        gb.load_battery_ram(&ram);
        info!("Loaded battery RAM from {}", save_path.display());
    }

    if let Some(path) = &args.load_state {
        let state = fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
        gb.load_state(&state)
            .with_context(|| format!("could not restore {}", path.display()))?;
    }

    if let Some(count) = args.disassemble {
        for (addr, instruction) in gb.disassemble(count) {
            println!("{:04x}: {}", addr, instruction);
        }
        return Ok(());
    }

    let ticks = (args.seconds * CLOCK_SPEED as f64) as u64;
    info!("Running {:?} for {}s of emulated time", gb.hw.model, args.seconds);

    let start = Instant::now();
    let result = gb.run_cycles(ticks);
    let elapsed = start.elapsed();
    debug!(
        "Ran {} ticks in {:?} ({:.1}x real time)",
        gb.hw.cycle_count,
        elapsed,
        args.seconds / elapsed.as_secs_f64()
    );

    if let Some(path) = &args.save_state {
        let state = gb.save_state()?;
        fs::write(path, state).with_context(|| format!("could not write {}", path.display()))?;
        info!("Wrote save state to {}", path.display());
    }

    result.with_context(|| format!("emulation stopped after {} ticks", gb.hw.cycle_count))
}
