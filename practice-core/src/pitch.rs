//! # Pitch Detection Module
//!
//! Monophonic pitch estimation by time-domain autocorrelation.
//!
//! The search is bounded to lags covering 50–1500 Hz, the fundamental range
//! of guitar strings and voices. Cost is O(lags × N), which is affordable at
//! a 4096-sample frame and a ~40 ms update rate.
//!
//! ## Steps
//! 1. Raw autocorrelation `Σ x[i]·x[i+lag]` for every lag up to the search limit.
//! 2. Skip the lobe around lag 0: the search starts where the correlation
//!    first drops to zero or below. Without this the slowly decaying zero-lag
//!    lobe beats the true period for low notes.
//! 3. The lag with the largest positive raw sum is the period.
//! 4. Optional refinement: climb to the peak of the normalized correlation
//!    `r(lag) / sqrt(e_head(lag) · e_tail(lag))`, where the energies are those
//!    of the two overlapping segments, and fit a parabola through it for
//!    sub-sample accuracy. Dividing by the segment energies rather than the
//!    overlap length keeps the peak unbiased when only a few periods fit in
//!    the frame (notes below ~70 Hz).

use serde::{Deserialize, Serialize};

/// Highest fundamental the lag search covers.
pub const MAX_PITCH_HZ: u32 = 1500;
/// Lowest fundamental the lag search covers.
pub const MIN_PITCH_HZ: u32 = 50;

/// Output of the autocorrelation stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Estimated fundamental in Hz; `0.0` means no pitch was found.
    pub frequency: f64,
    /// Gate loudness of the frame the estimate came from, in [0, 1].
    pub amplitude: f64,
}

impl PitchEstimate {
    pub const NONE: PitchEstimate = PitchEstimate {
        frequency: 0.0,
        amplitude: 0.0,
    };

    pub fn is_valid(&self) -> bool {
        self.frequency > 0.0
    }
}

/// Tunables for the autocorrelation search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub min_frequency: u32,
    pub max_frequency: u32,
    /// Refine the winning lag to sub-sample precision.
    pub parabolic_refinement: bool,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            min_frequency: MIN_PITCH_HZ,
            max_frequency: MAX_PITCH_HZ,
            parabolic_refinement: true,
        }
    }
}

/// Autocorrelation pitch tracker with a reusable correlation buffer.
#[derive(Debug, Clone)]
pub struct PitchDetector {
    config: PitchConfig,
    /// `correlations[lag]` for lag in [0, max_lag].
    correlations: Vec<f64>,
    /// `energy_prefix[i]` is `Σ x[j]²` for j < i.
    energy_prefix: Vec<f64>,
}

impl PitchDetector {
    pub fn new(config: PitchConfig) -> Self {
        Self {
            config,
            correlations: Vec::new(),
            energy_prefix: Vec::new(),
        }
    }

    pub fn config(&self) -> &PitchConfig {
        &self.config
    }

    /// Estimates the fundamental of `signal` in Hz, or `0.0` when no lag
    /// correlates positively (silence, noise bursts, frames too short).
    pub fn detect(&mut self, signal: &[f64], sample_rate: u32) -> f64 {
        if self.config.max_frequency == 0 || self.config.min_frequency == 0 {
            return 0.0;
        }
        let min_lag = ((sample_rate / self.config.max_frequency) as usize).max(1);
        let max_lag = ((sample_rate / self.config.min_frequency) as usize).min(signal.len() / 2);
        if min_lag > max_lag {
            return 0.0;
        }

        self.correlations.clear();
        self.correlations
            .extend((0..=max_lag).map(|lag| raw_autocorrelation(signal, lag)));
        let corr = &self.correlations;

        let Some(first_dip) = (1..=max_lag).find(|&lag| corr[lag] <= 0.0) else {
            return 0.0;
        };
        let start = first_dip.max(min_lag);

        let mut best_lag: Option<usize> = None;
        for lag in start..=max_lag {
            if corr[lag] > 0.0 && best_lag.is_none_or(|best| corr[lag] > corr[best]) {
                best_lag = Some(lag);
            }
        }
        let Some(best_lag) = best_lag else {
            return 0.0;
        };

        let period = if self.config.parabolic_refinement {
            self.energy_prefix.clear();
            self.energy_prefix.push(0.0);
            let mut running = 0.0;
            self.energy_prefix.extend(signal.iter().map(|&x| {
                running += x * x;
                running
            }));
            refine_period(corr, &self.energy_prefix, best_lag, start, max_lag)
        } else {
            best_lag as f64
        };

        let frequency = sample_rate as f64 / period;
        if frequency.is_finite() && frequency > 0.0 {
            frequency
        } else {
            0.0
        }
    }
}

/// Raw (unnormalized) autocorrelation over the overlapping part of the frame.
fn raw_autocorrelation(signal: &[f64], lag: usize) -> f64 {
    signal
        .iter()
        .zip(signal.iter().skip(lag))
        .map(|(a, b)| a * b)
        .sum()
}

/// Sub-sample period around `lag` using the energy-normalized correlation.
///
/// `energy_prefix` holds `len + 1` running sums of squares.
fn refine_period(corr: &[f64], energy_prefix: &[f64], lag: usize, start: usize, max_lag: usize) -> f64 {
    let len = energy_prefix.len() - 1;
    let total = energy_prefix[len];
    let normalized = |l: usize| {
        let head = energy_prefix[len - l];
        let tail = total - energy_prefix[l];
        let denominator = (head * tail).sqrt();
        if denominator > 0.0 { corr[l] / denominator } else { 0.0 }
    };

    let mut peak = lag;
    while peak < max_lag && normalized(peak + 1) > normalized(peak) {
        peak += 1;
    }
    while peak > start && normalized(peak - 1) > normalized(peak) {
        peak -= 1;
    }

    if peak <= start || peak >= max_lag {
        return peak as f64;
    }

    let y1 = normalized(peak - 1);
    let y2 = normalized(peak);
    let y3 = normalized(peak + 1);
    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() <= f64::EPSILON * y2.abs() {
        return peak as f64;
    }
    let shift = 0.5 * (y1 - y3) / denominator;
    if shift.abs() <= 0.5 {
        peak as f64 + shift
    } else {
        peak as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: u32, len: usize, phase: f64) -> Vec<f64> {
        (0..len)
            .map(|i| {
                0.5 * (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64 + phase)
                    .sin()
            })
            .collect()
    }

    fn cents(measured: f64, expected: f64) -> f64 {
        1200.0 * (measured / expected).log2()
    }

    #[test]
    fn finds_a440() {
        let mut detector = PitchDetector::new(PitchConfig::default());
        let f = detector.detect(&sine(440.0, 44100, 4096, 0.0), 44100);
        assert!(cents(f, 440.0).abs() < 2.0, "got {f}");
    }

    #[test]
    fn integer_lag_without_refinement() {
        let mut detector = PitchDetector::new(PitchConfig {
            parabolic_refinement: false,
            ..PitchConfig::default()
        });
        // Period is ~100.23 samples, so the raw estimate is 44100 / 100.
        let f = detector.detect(&sine(440.0, 44100, 4096, 0.0), 44100);
        assert_eq!(f, 441.0);
    }

    #[test]
    fn low_and_high_notes_within_a_few_cents() {
        let mut detector = PitchDetector::new(PitchConfig::default());
        for &freq in &[50.0, 52.0, 55.0, 60.0, 65.41, 82.41, 110.0, 146.83, 196.0, 246.94, 329.63, 880.0, 1200.0] {
            for &phase in &[0.0, 0.7, 1.5, 2.0, 2.3] {
                let f = detector.detect(&sine(freq, 44100, 4096, phase), 44100);
                assert!(
                    cents(f, freq).abs() < 1.0,
                    "{freq} Hz at phase {phase}: got {f}"
                );
            }
        }
    }

    #[test]
    fn harmonics_do_not_cause_octave_errors() {
        let sr = 44100;
        let signal: Vec<f64> = (0..4096)
            .map(|i| {
                let t = 2.0 * std::f64::consts::PI * 110.0 * i as f64 / sr as f64;
                0.4 * t.sin() + 0.2 * (2.0 * t + 0.3).sin() + 0.12 * (3.0 * t + 1.1).sin()
            })
            .collect();
        let f = PitchDetector::new(PitchConfig::default()).detect(&signal, sr);
        assert!(cents(f, 110.0).abs() < 4.0, "got {f}");
    }

    #[test]
    fn silence_has_no_pitch() {
        let mut detector = PitchDetector::new(PitchConfig::default());
        assert_eq!(detector.detect(&[0.0; 4096], 44100), 0.0);
    }

    #[test]
    fn frame_too_short_for_any_lag() {
        // 44100 / 1500 = 29, but len / 2 = 10.
        let mut detector = PitchDetector::new(PitchConfig::default());
        assert_eq!(detector.detect(&sine(440.0, 44100, 20, 0.0), 44100), 0.0);
    }
}
