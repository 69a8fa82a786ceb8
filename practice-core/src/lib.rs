// practice-core/src/lib.rs

//! The core logic for the songbook practice listener.
//! This crate turns a live microphone signal into tuner readings (which note,
//! how many cents off) and chord names. It is completely headless and
//! contains no UI code.
//!
//! ```no_run
//! use std::sync::Arc;
//! use practice_core::{audio::CpalBackend, config::TunerConfig, Detector};
//!
//! let mut tuner = Detector::tuner(TunerConfig::default(), Arc::new(CpalBackend))?;
//! tuner.set_target_frequency(Some(82.41));
//! let results = tuner.start()?;
//! for reading in results.iter().take(25) {
//!     println!("{reading}");
//! }
//! tuner.stop();
//! # Ok::<(), practice_core::EngineError>(())
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod audio;
pub mod chord;
pub mod chroma;
pub mod config;
pub mod detector;
pub mod error;
pub mod fft;
pub mod pipeline;
pub mod pitch;
pub mod tuning;
pub mod window;

pub use detector::Detector;
pub use error::{EngineError, Result};
pub use pipeline::{ChordPipeline, Pipeline, TargetFrequency, TunerPipeline};

/// One tuner reading, emitted once per analysis cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerResult {
    /// Detected fundamental in Hz; `0.0` when nothing was detected.
    pub frequency: f64,
    /// Pitch-class name (`"A"`, `"C#"`), the target's name in target mode,
    /// or `"--"` when nothing was detected.
    pub note_name: String,
    /// Signed deviation from the reference note in cents.
    pub cents_off: i32,
    /// `|cents_off| < 5`.
    pub is_locked: bool,
    /// Frame loudness in [0, 1]; zero for gated frames.
    pub amplitude: f64,
    /// The target the reading was measured against, if one was set.
    pub target_frequency: Option<f64>,
}

impl TunerResult {
    /// The "no pitch" sentinel.
    pub fn silence(target_frequency: Option<f64>) -> Self {
        Self {
            frequency: 0.0,
            note_name: tuning::NO_NOTE.to_string(),
            cents_off: 0,
            is_locked: false,
            amplitude: 0.0,
            target_frequency,
        }
    }

    pub fn has_pitch(&self) -> bool {
        self.frequency > 0.0
    }
}

impl fmt::Display for TunerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_pitch() {
            return write!(f, "{:>3}  {:>8}  amp {:.2}", self.note_name, "-", self.amplitude);
        }
        write!(
            f,
            "{:>3}  {:>8.2} Hz  {:+4} cents{}  amp {:.2}",
            self.note_name,
            self.frequency,
            self.cents_off,
            if self.is_locked { "  [locked]" } else { "" },
            self.amplitude
        )
    }
}

/// One chord reading, emitted once per analysis cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordResult {
    /// `"C"`, `"Am"`, `"G7"`...; `None` for silence or no match.
    pub chord_name: Option<String>,
    /// Share of chroma energy on the named chord's notes, in [0, 1].
    pub probability: f64,
    /// Frame loudness in [0, 1]; zero for gated frames.
    pub amplitude: f64,
}

impl ChordResult {
    /// The "no chord" sentinel for silent or unreadable frames.
    pub fn silence() -> Self {
        Self {
            chord_name: None,
            probability: 0.0,
            amplitude: 0.0,
        }
    }
}

impl fmt::Display for ChordResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5}  p {:.2}  amp {:.2}",
            self.chord_name.as_deref().unwrap_or(tuning::NO_NOTE),
            self.probability,
            self.amplitude
        )
    }
}
