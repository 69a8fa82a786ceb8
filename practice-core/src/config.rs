//! Configuration for the two detection pipelines.
//!
//! Every field has a default, and the structs deserialize with `#[serde(default)]`
//! so a front end can load a partial JSON document and override only what it needs.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::audio::{CaptureConfig, CaptureOverrides};
use crate::chord::{ChordTemplate, DEFAULT_TEMPLATES};
use crate::chroma::ChromaConfig;
use crate::error::{EngineError, Result};
use crate::fft::DEFAULT_FFT_SIZE;
use crate::pitch::PitchConfig;
use crate::tuning::DEFAULT_REFERENCE_A4;
use crate::window::EnergyGate;

/// Tuner capture rate.
pub const TUNER_SAMPLE_RATE: u32 = 44100;
/// Tuner frame length (~93 ms at 44.1 kHz).
pub const TUNER_FRAME_SIZE: usize = 4096;
/// Pause between tuner cycles.
pub const TUNER_CYCLE_DELAY_MS: u64 = 40;

/// Chord detector capture rate.
pub const CHORD_SAMPLE_RATE: u32 = 22050;
/// Pause between chord cycles.
pub const CHORD_CYCLE_DELAY_MS: u64 = 100;

fn default_tuner_capture() -> CaptureConfig {
    CaptureConfig {
        sample_rate: TUNER_SAMPLE_RATE,
        frame_size: TUNER_FRAME_SIZE,
        ..CaptureConfig::default()
    }
}

fn default_chord_capture() -> CaptureConfig {
    CaptureConfig {
        sample_rate: CHORD_SAMPLE_RATE,
        frame_size: DEFAULT_FFT_SIZE,
        ..CaptureConfig::default()
    }
}

// A partial `capture` section keeps the pipeline's own rate and frame size.
fn tuner_capture<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<CaptureConfig, D::Error> {
    CaptureOverrides::deserialize(deserializer).map(|o| o.apply_to(default_tuner_capture()))
}

fn chord_capture<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<CaptureConfig, D::Error> {
    CaptureOverrides::deserialize(deserializer).map(|o| o.apply_to(default_chord_capture()))
}

/// Settings for the monophonic (tuner) pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    #[serde(deserialize_with = "tuner_capture")]
    pub capture: CaptureConfig,
    pub gate: EnergyGate,
    pub pitch: PitchConfig,
    /// Concert pitch for A4 in Hz.
    pub reference_a4: f64,
    pub cycle_delay_ms: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            capture: default_tuner_capture(),
            gate: EnergyGate::default(),
            pitch: PitchConfig::default(),
            reference_a4: DEFAULT_REFERENCE_A4,
            cycle_delay_ms: TUNER_CYCLE_DELAY_MS,
        }
    }
}

impl TunerConfig {
    pub fn validate(&self) -> Result<()> {
        self.capture.validate()?;
        if !(self.reference_a4.is_finite() && self.reference_a4 > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "reference pitch must be positive, got {}",
                self.reference_a4
            )));
        }
        if self.pitch.min_frequency == 0 || self.pitch.min_frequency >= self.pitch.max_frequency {
            return Err(EngineError::InvalidConfig(format!(
                "pitch range {}..{} Hz is empty",
                self.pitch.min_frequency, self.pitch.max_frequency
            )));
        }
        Ok(())
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}

/// Settings for the polyphonic (chord) pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordConfig {
    #[serde(deserialize_with = "chord_capture")]
    pub capture: CaptureConfig,
    /// Transform size; must be a power of two. Frames shorter than the
    /// transform are zero padded, longer ones are truncated to it.
    pub fft_size: usize,
    pub gate: EnergyGate,
    pub chroma: ChromaConfig,
    /// Chord qualities in matching order.
    pub templates: Vec<ChordTemplate>,
    pub cycle_delay_ms: u64,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self {
            capture: default_chord_capture(),
            fft_size: DEFAULT_FFT_SIZE,
            gate: EnergyGate::default(),
            chroma: ChromaConfig::default(),
            templates: DEFAULT_TEMPLATES.clone(),
            cycle_delay_ms: CHORD_CYCLE_DELAY_MS,
        }
    }
}

impl ChordConfig {
    /// Checks everything except the FFT size, which the planner validates.
    pub fn validate(&self) -> Result<()> {
        self.capture.validate()?;
        if !(self.chroma.min_frequency >= 0.0 && self.chroma.min_frequency < self.chroma.max_frequency) {
            return Err(EngineError::InvalidConfig(format!(
                "chroma band {}..{} Hz is empty",
                self.chroma.min_frequency, self.chroma.max_frequency
            )));
        }
        if let Some(bad) = self
            .templates
            .iter()
            .find(|t| t.intervals.is_empty() || t.intervals.iter().any(|&i| i >= 12))
        {
            return Err(EngineError::InvalidConfig(format!(
                "chord template {:?} needs intervals in 0..12",
                bad.suffix
            )));
        }
        Ok(())
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}
