//! # Analysis Pipelines
//!
//! A [`Pipeline`] is everything the detection loop needs to know about one
//! kind of analysis: what to capture, how long to rest between cycles, and
//! how to turn a frame into a result. Both pipelines run the same shape:
//!
//! ```text
//! frame -> normalize -> DC removal -> energy gate -> transform -> classify
//! ```
//!
//! The tuner transforms with autocorrelation and classifies with
//! nearest-note / target cents. The chord detector windows, runs the FFT,
//! folds bins into chroma and matches chord templates.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rustfft::num_complex::Complex;
use tracing::trace;

use crate::audio::CaptureConfig;
use crate::chord::{match_chord, match_probability};
use crate::chroma::{ChromaVector, PitchClassSet, active_pitch_classes, compute_chroma};
use crate::config::{ChordConfig, TunerConfig};
use crate::error::Result;
use crate::fft::{Radix2Fft, spectrum_to_magnitudes};
use crate::pitch::{PitchDetector, PitchEstimate};
use crate::tuning::classify_pitch;
use crate::window::{GateDecision, apply_hann_window, normalize_i16, remove_dc_offset};
use crate::{ChordResult, TunerResult};

/// The per-kind half of the detection loop.
///
/// The detector keeps a pristine copy and clones it for every capture
/// session, so scratch state never leaks from one session into the next.
pub trait Pipeline: Clone + Send + 'static {
    /// The result published once per cycle.
    type Output: Send + 'static;

    /// Short name used for thread names and log fields.
    const NAME: &'static str;

    fn capture_config(&self) -> CaptureConfig;

    /// Fixed pause after each cycle.
    fn cycle_delay(&self) -> Duration;

    /// Analyzes one full frame.
    fn analyze(&mut self, frame: &[i16]) -> Self::Output;

    /// What to publish when the device returned a partial frame, if anything.
    fn on_short_read(&mut self) -> Option<Self::Output>;
}

/// Optional reference frequency for the tuner, shared between the caller and
/// the running loop.
///
/// Setting it takes effect on the next cycle. Clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct TargetFrequency(Arc<AtomicU64>);

impl TargetFrequency {
    pub fn new(target: Option<f64>) -> Self {
        let cell = Self::default();
        cell.set(target);
        cell
    }

    /// Sets or clears the target. Non-positive or non-finite values clear it.
    pub fn set(&self, target: Option<f64>) {
        let bits = match target {
            Some(hz) if hz.is_finite() && hz > 0.0 => hz.to_bits(),
            _ => 0,
        };
        self.0.store(bits, Ordering::Release);
    }

    pub fn get(&self) -> Option<f64> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            bits => Some(f64::from_bits(bits)),
        }
    }
}

/// Monophonic pipeline: autocorrelation pitch + note/cents classification.
#[derive(Debug, Clone)]
pub struct TunerPipeline {
    config: TunerConfig,
    target: TargetFrequency,
    detector: PitchDetector,
    samples: Vec<f64>,
}

impl TunerPipeline {
    pub fn new(config: TunerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            detector: PitchDetector::new(config.pitch),
            config,
            target: TargetFrequency::default(),
            samples: Vec::new(),
        })
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// Handle for changing the target while the loop runs.
    pub fn target(&self) -> TargetFrequency {
        self.target.clone()
    }

    /// Gate plus autocorrelation, without classification.
    pub fn estimate(&mut self, frame: &[i16]) -> PitchEstimate {
        normalize_i16(frame, &mut self.samples);
        remove_dc_offset(&mut self.samples);
        match self.config.gate.check(&self.samples) {
            GateDecision::Silent => PitchEstimate::NONE,
            GateDecision::Open { loudness } => PitchEstimate {
                frequency: self
                    .detector
                    .detect(&self.samples, self.config.capture.sample_rate),
                amplitude: loudness,
            },
        }
    }
}

impl Pipeline for TunerPipeline {
    type Output = TunerResult;
    const NAME: &'static str = "tuner";

    fn capture_config(&self) -> CaptureConfig {
        self.config.capture
    }

    fn cycle_delay(&self) -> Duration {
        self.config.cycle_delay()
    }

    fn analyze(&mut self, frame: &[i16]) -> TunerResult {
        let target = self.target.get();
        let estimate = self.estimate(frame);
        if estimate.amplitude == 0.0 {
            return TunerResult::silence(target);
        }

        match classify_pitch(estimate.frequency, target, self.config.reference_a4) {
            Some(reading) => {
                trace!(frequency = estimate.frequency, note = reading.note_name, cents = reading.cents_off, "tuner cycle");
                TunerResult {
                    frequency: estimate.frequency,
                    note_name: reading.note_name.to_string(),
                    cents_off: reading.cents_off,
                    is_locked: reading.is_locked,
                    amplitude: estimate.amplitude,
                    target_frequency: target,
                }
            }
            // Loud but aperiodic: no pitch, keep the level meter moving.
            None => TunerResult {
                amplitude: estimate.amplitude,
                ..TunerResult::silence(target)
            },
        }
    }

    /// The tuner skips cycles without a full frame.
    fn on_short_read(&mut self) -> Option<TunerResult> {
        None
    }
}

/// Intermediate values of one chord cycle, for inspection and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordAnalysis {
    pub chroma: ChromaVector,
    pub active: PitchClassSet,
    pub result: ChordResult,
}

/// Polyphonic pipeline: Hann window, FFT, chroma, template matching.
#[derive(Debug, Clone)]
pub struct ChordPipeline {
    config: ChordConfig,
    fft: Radix2Fft,
    samples: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    magnitudes: Vec<f64>,
}

impl ChordPipeline {
    pub fn new(config: ChordConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            fft: Radix2Fft::new(config.fft_size)?,
            config,
            samples: Vec::new(),
            spectrum: Vec::new(),
            magnitudes: Vec::new(),
        })
    }

    pub fn config(&self) -> &ChordConfig {
        &self.config
    }

    /// Runs one cycle and keeps the chroma and active set alongside the result.
    pub fn analyze_detailed(&mut self, frame: &[i16]) -> ChordAnalysis {
        normalize_i16(frame, &mut self.samples);
        remove_dc_offset(&mut self.samples);

        let loudness = match self.config.gate.check(&self.samples) {
            GateDecision::Silent => {
                return ChordAnalysis {
                    chroma: [0.0; 12],
                    active: PitchClassSet::EMPTY,
                    result: ChordResult::silence(),
                };
            }
            GateDecision::Open { loudness } => loudness,
        };

        apply_hann_window(&mut self.samples);
        self.fft.process_real(&self.samples, &mut self.spectrum);
        spectrum_to_magnitudes(&self.spectrum, &mut self.magnitudes);

        let resolution = self.config.capture.sample_rate as f64 / self.fft.len() as f64;
        let chroma = compute_chroma(&self.magnitudes, resolution, &self.config.chroma);
        let active = active_pitch_classes(&chroma, &self.config.chroma);

        let result = match match_chord(&active, &self.config.templates) {
            Some(chord) => ChordResult {
                probability: match_probability(&chroma, &chord.pitch_classes),
                chord_name: Some(chord.name),
                amplitude: loudness,
            },
            None => ChordResult {
                chord_name: None,
                probability: 0.0,
                amplitude: loudness,
            },
        };
        trace!(active = ?active.iter().collect::<Vec<_>>(), chord = ?result.chord_name, "chord cycle");

        ChordAnalysis {
            chroma,
            active,
            result,
        }
    }
}

impl Pipeline for ChordPipeline {
    type Output = ChordResult;
    const NAME: &'static str = "chords";

    fn capture_config(&self) -> CaptureConfig {
        self.config.capture
    }

    fn cycle_delay(&self) -> Duration {
        self.config.cycle_delay()
    }

    fn analyze(&mut self, frame: &[i16]) -> ChordResult {
        self.analyze_detailed(frame).result
    }

    /// The chord display falls back to "no chord" when a frame is lost.
    fn on_short_read(&mut self) -> Option<ChordResult> {
        Some(ChordResult::silence())
    }
}
