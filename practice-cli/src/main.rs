//! # Practice Listener - terminal front end
//!
//! Drives the practice engine from the command line: a tuner that prints the
//! nearest note (or the deviation from a chosen target) and a chord recognizer
//! that prints chord names.
//!
//! ## Architecture
//! - **Main thread**: parses arguments, owns the detector, prints results
//! - **Detector thread**: spawned by `practice_core`, captures and analyzes
//! - **Stdin thread**: waits for EOF (Ctrl-D) and asks the main thread to stop
//! - **Communication**: crossbeam channels, multiplexed with `select!`

mod args;

use std::fmt::Display;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, select};
use practice_core::audio::{CaptureBackend, CpalBackend, SyntheticBackend};
use practice_core::config::{ChordConfig, TunerConfig};
use practice_core::{Detector, Pipeline};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use args::{Command, Mode, Options};

/// Amplitude of each simulated tone; keeps a four-note mix below full scale.
const SIMULATED_TONE_AMPLITUDE: f64 = 0.25;

/// Settings file layout. Either section may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    tuner: TunerConfig,
    chords: ChordConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .init();

    let options = match args::parse(std::env::args().skip(1))? {
        Command::Run(options) => options,
        Command::Help => {
            println!("{}", args::USAGE);
            return Ok(());
        }
    };

    let settings = match &options.config {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };
    let backend = make_backend(&options);

    match options.mode {
        Mode::Tuner => {
            let reference_a4 = settings.tuner.reference_a4;
            let mut tuner = Detector::tuner(settings.tuner, backend)
                .context("invalid tuner settings")?;
            if let Some(target) = &options.target {
                let hz = target.resolve(reference_a4)?;
                info!(target_hz = hz, "tuning against target");
                tuner.set_target_frequency(Some(hz));
            }
            run(&mut tuner, &options)
        }
        Mode::Chords => {
            let mut chords = Detector::chords(settings.chords, backend)
                .context("invalid chord settings")?;
            run(&mut chords, &options)
        }
    }
}

/// Loads a settings file.
///
/// Missing fields keep their defaults, so `{"tuner": {"reference_a4": 442}}`
/// is a complete file.
fn load_settings(path: &Path) -> Result<Settings> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    let settings = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse settings in {}", path.display()))?;
    Ok(settings)
}

fn make_backend(options: &Options) -> Arc<dyn CaptureBackend> {
    match &options.simulate {
        Some(freqs) => {
            let tones: Vec<(f64, f64)> = freqs
                .iter()
                .map(|&hz| (hz, SIMULATED_TONE_AMPLITUDE))
                .collect();
            info!(?freqs, "using simulated input");
            Arc::new(SyntheticBackend::tones(&tones))
        }
        None => Arc::new(CpalBackend),
    }
}

/// Runs one detector session and prints its results until the cycle limit
/// is reached or stdin is closed.
fn run<P>(detector: &mut Detector<P>, options: &Options) -> Result<()>
where
    P: Pipeline,
    P::Output: Display + Serialize,
{
    let results = detector
        .start()
        .with_context(|| format!("failed to start the {}", P::NAME))?;
    let quit = spawn_stdin_watcher();

    let outcome = print_results(&results, &quit, options);
    detector.stop();
    outcome
}

fn print_results<T>(results: &Receiver<T>, quit: &Receiver<()>, options: &Options) -> Result<()>
where
    T: Display + Serialize,
{
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut printed = 0usize;

    while options.cycles.is_none_or(|limit| printed < limit) {
        select! {
            recv(results) -> msg => {
                let Ok(result) = msg else {
                    debug!("result channel closed");
                    break;
                };
                if options.json {
                    let line = serde_json::to_string(&result).context("failed to encode result")?;
                    writeln!(out, "{line}")?;
                } else {
                    writeln!(out, "{result}")?;
                }
                out.flush()?;
                printed += 1;
            }
            recv(quit) -> _ => {
                info!("stdin closed, stopping");
                break;
            }
        }
    }
    Ok(())
}

/// Signals on the returned channel once stdin reaches EOF.
fn spawn_stdin_watcher() -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let spawned = thread::Builder::new()
        .name("stdin-watcher".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                if line.is_err() {
                    break;
                }
            }
            let _ = tx.send(());
        });
    match spawned {
        Ok(_) => rx,
        Err(e) => {
            // A dropped sender would read as EOF right away.
            warn!(error = %e, "could not watch stdin");
            crossbeam_channel::never()
        }
    }
}
