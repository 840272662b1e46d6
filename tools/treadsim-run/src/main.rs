use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use treadsim_core::{digest_u64, SimConfig, StepStats, XorShift64};
use treadsim_debris::{generate, DebrisParams};
use treadsim_world::{LoadReport, World};

/// Overrides `controller_timeout_ms` from the config.
const TIMEOUT_ENV: &str = "TREADSIM_TIMEOUT_MS";

#[derive(Parser, Debug)]
#[command(name = "treadsim-run", version, about = "Load, re-emit or run a tracked-robot scene")]
struct Opts {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Load the scene and print the load report
    Check {
        scene: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Parse and re-emit the scene in canonical layout
    Fmt {
        scene: PathBuf,
        /// Write here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Step the scene for a number of ticks
    Run {
        scene: PathBuf,
        #[arg(long, default_value_t = 1000)]
        ticks: u64,
        /// JSON engine config (every field optional)
        #[arg(long)]
        config: Option<PathBuf>,
        /// `controller:device=value`, queued before the first tick (repeatable)
        #[arg(long, action = ArgAction::Append)]
        drive: Vec<String>,
        /// Scatter floating debris generated from this seed
        #[arg(long)]
        debris_seed: Option<u64>,
        /// Side of the square debris area in metres, centred on the origin
        #[arg(long, default_value_t = 20.0)]
        debris_area: f64,
        /// Height at which debris is placed
        #[arg(long, default_value_t = 0.0)]
        debris_surface: f32,
        /// Write a JSON run report
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

struct Drive {
    controller: String,
    device: String,
    value: f32,
}

fn parse_drive(s: &str) -> Result<Drive> {
    let (controller, rest) = s.split_once(':').ok_or_else(|| anyhow!("--drive `{s}`: expected controller:device=value"))?;
    let (device, value) = rest.split_once('=').ok_or_else(|| anyhow!("--drive `{s}`: expected controller:device=value"))?;
    let value: f32 = value.trim().parse().with_context(|| format!("--drive `{s}`: bad value"))?;
    Ok(Drive { controller: controller.to_string(), device: device.to_string(), value })
}

fn load_config(path: Option<&Path>) -> Result<SimConfig> {
    let mut cfg = match path {
        Some(p) => SimConfig::from_json_file(p)?,
        None => SimConfig::default(),
    };
    if let Ok(v) = std::env::var(TIMEOUT_ENV) {
        cfg.controller_timeout_ms = v.trim().parse()
            .with_context(|| format!("{TIMEOUT_ENV}={v} is not a number of milliseconds"))?;
        info!("controller timeout from {TIMEOUT_ENV}: {} ms", cfg.controller_timeout_ms);
    }
    cfg.validate()?;
    Ok(cfg)
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes { use std::fmt::Write; let _ = write!(s, "{:02x}", b); }
    s
}

#[derive(Serialize, Default)]
struct Totals {
    contacts: u64,
    commands_applied: u64,
    commands_dropped: u64,
    controller_timeouts: u64,
}

#[derive(Serialize)]
struct RunReport {
    scene: String,
    load: LoadReport,
    ticks: u64,
    debris: usize,
    totals: Totals,
    last: StepStats,
    hash: String,
}

fn print_load(scene: &Path, report: &LoadReport) {
    println!("Scene:       {}", scene.display());
    println!("Bodies:      {}", report.bodies);
    println!("Colliders:   {}", report.colliders);
    println!("Tracks:      {}", report.tracks);
    println!("Devices:     {}", report.devices);
    println!("Fluids:      {}", report.fluids);
    println!("Controllers: {}", report.controllers.join(", "));
    println!("Time step:   {} ms", report.time_step_ms);
    for w in &report.warnings {
        println!("warning: {w}");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::parse();

    match opts.cmd {
        Cmd::Check { scene, config } => {
            let cfg = load_config(config.as_deref())?;
            let (_, report) = World::load_file(&scene, &cfg)
                .with_context(|| format!("load {}", scene.display()))?;
            print_load(&scene, &report);
        }
        Cmd::Fmt { scene, out } => {
            let text = std::fs::read_to_string(&scene)
                .with_context(|| format!("read {}", scene.display()))?;
            let doc = treadsim_scene::load(&text)
                .with_context(|| format!("parse {}", scene.display()))?;
            let emitted = treadsim_scene::write(&doc);
            match out {
                Some(p) => std::fs::write(&p, emitted).with_context(|| format!("write {}", p.display()))?,
                None => print!("{emitted}"),
            }
        }
        Cmd::Run { scene, ticks, config, drive, debris_seed, debris_area, debris_surface, json } => {
            let cfg = load_config(config.as_deref())?;
            let (mut world, report) = World::load_file(&scene, &cfg)
                .with_context(|| format!("load {}", scene.display()))?;
            for w in &report.warnings { warn!("{w}"); }

            for d in &drive {
                let d = parse_drive(d)?;
                world.drive(&d.controller, &d.device, d.value)
                    .with_context(|| format!("--drive {}:{}", d.controller, d.device))?;
            }

            let mut debris = 0;
            if let Some(seed) = debris_seed {
                if !(debris_area.is_finite() && debris_area > 0.0) { bail!("--debris-area must be > 0"); }
                let params = DebrisParams { width: debris_area, height: debris_area, centered: true, ..Default::default() };
                let pieces = generate(&params, &mut XorShift64::new(seed))?;
                debris = world.spawn_debris(&pieces, debris_surface).len();
                info!("debris seed {seed}: {debris} pieces");
            }

            let mut totals = Totals::default();
            let mut last = StepStats::default();
            for _ in 0..ticks {
                last = world.step();
                totals.contacts += u64::from(last.contacts);
                totals.commands_applied += u64::from(last.commands_applied);
                totals.commands_dropped += u64::from(last.commands_dropped);
                totals.controller_timeouts += u64::from(last.controller_timeouts);
            }
            world.shutdown();

            let hash = world.step_hash();
            println!("Ticks:  {}", world.tick());
            println!("Time:   {:.3} s", world.tick() as f32 * world.dt());
            println!("Hash:   {}", hex(&hash));
            println!("Id:     {:016x}", digest_u64(&hash));
            for t in 0..world.num_tracks() {
                let id = treadsim_core::TrackId(t);
                if let (Some(state), Some(disp)) = (world.track_state(id), world.track_displacement(id)) {
                    println!("Track {t}: {state:?}, belt travel {disp:.4} m");
                }
            }

            if let Some(path) = json {
                let out = RunReport {
                    scene: scene.display().to_string(),
                    load: report,
                    ticks: world.tick(),
                    debris,
                    totals,
                    last,
                    hash: hex(&hash),
                };
                let text = serde_json::to_string_pretty(&out)?;
                std::fs::write(&path, text).with_context(|| format!("write {}", path.display()))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_argument_parses() {
        let d = parse_drive("track_controller:test_motor=3.5").unwrap();
        assert_eq!(d.controller, "track_controller");
        assert_eq!(d.device, "test_motor");
        assert_eq!(d.value, 3.5);
        assert!(parse_drive("no_colon").is_err());
        assert!(parse_drive("a:b=x").is_err());
    }
}
