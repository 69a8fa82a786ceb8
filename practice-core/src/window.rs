//! # Windowing & Energy Gate
//!
//! Helpers that run before any transform: sample conversion, RMS loudness,
//! the silence gate, DC removal and the Hann window used on the spectral path.
//! The autocorrelation path never windows its input.

use serde::{Deserialize, Serialize};

/// Default RMS below which a frame counts as silence (samples normalized to [-1, 1)).
pub const DEFAULT_SILENCE_THRESHOLD: f64 = 0.01;

/// Converts 16-bit samples to `f64` in [-1, 1), writing into `out`.
///
/// `out` is resized to the input length so the loop can reuse one buffer.
pub fn normalize_i16(samples: &[i16], out: &mut Vec<f64>) {
    out.clear();
    out.extend(samples.iter().map(|&s| s as f64 / 32768.0));
}

/// Root-mean-square of a signal. An empty slice has zero loudness.
pub fn rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Outcome of running a frame through the [`EnergyGate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    /// Too quiet to analyze. The cycle emits a silence result.
    Silent,
    /// Loud enough; `loudness` is the RMS clamped to [0, 1] for display.
    Open { loudness: f64 },
}

impl GateDecision {
    pub fn is_open(&self) -> bool {
        matches!(self, GateDecision::Open { .. })
    }
}

/// A fixed RMS threshold separating signal from silence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyGate {
    pub silence_threshold: f64,
}

impl Default for EnergyGate {
    fn default() -> Self {
        Self {
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
        }
    }
}

impl EnergyGate {
    pub fn new(silence_threshold: f64) -> Self {
        Self { silence_threshold }
    }

    /// Measures the frame and decides whether it is worth analyzing.
    pub fn check(&self, samples: &[f64]) -> GateDecision {
        let level = rms(samples);
        if !level.is_finite() || level < self.silence_threshold {
            GateDecision::Silent
        } else {
            GateDecision::Open {
                loudness: level.clamp(0.0, 1.0),
            }
        }
    }
}

/// Removes the DC offset from a signal by making its average value zero.
///
/// A constant offset shows up as a large 0 Hz component whose leakage would
/// otherwise spill into the lowest chroma bins.
pub fn remove_dc_offset(signal: &mut [f64]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f64>() / len as f64;
    if avg.abs() > 1e-12 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window, `0.5 * (1 - cos(2π·i/(N-1)))`, in place.
pub fn apply_hann_window(buffer: &mut [f64]) {
    let n = buffer.len();
    if n <= 1 {
        return;
    }
    let n_minus_1 = (n - 1) as f64;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_constant_signal() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5; 64]) - 0.5).abs() < 1e-12);
        assert!((rms(&[-0.5, 0.5, -0.5, 0.5]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn gate_closes_on_silence() {
        let gate = EnergyGate::default();
        assert_eq!(gate.check(&[0.0; 1024]), GateDecision::Silent);
        assert_eq!(gate.check(&[0.001; 1024]), GateDecision::Silent);
        assert_eq!(gate.check(&[]), GateDecision::Silent);
    }

    #[test]
    fn gate_reports_clamped_loudness() {
        let gate = EnergyGate::default();
        match gate.check(&[0.25; 256]) {
            GateDecision::Open { loudness } => assert!((loudness - 0.25).abs() < 1e-12),
            other => panic!("expected open gate, got {other:?}"),
        }
        match gate.check(&[3.0; 16]) {
            GateDecision::Open { loudness } => assert_eq!(loudness, 1.0),
            other => panic!("expected open gate, got {other:?}"),
        }
    }

    #[test]
    fn hann_window_tapers_edges() {
        let mut buf = vec![1.0; 9];
        apply_hann_window(&mut buf);
        assert!(buf[0].abs() < 1e-12);
        assert!(buf[8].abs() < 1e-12);
        assert!((buf[4] - 1.0).abs() < 1e-12);
        assert!((buf[2] - buf[6]).abs() < 1e-12);

        let mut single = vec![0.7];
        apply_hann_window(&mut single);
        assert_eq!(single, vec![0.7]);
    }

    #[test]
    fn dc_offset_is_removed() {
        let mut buf = vec![1.0, 2.0, 3.0, 4.0];
        remove_dc_offset(&mut buf);
        assert!(buf.iter().sum::<f64>().abs() < 1e-12);
        assert_eq!(buf[0], -1.5);
    }

    #[test]
    fn i16_normalization_range() {
        let mut out = Vec::new();
        normalize_i16(&[i16::MIN, 0, i16::MAX], &mut out);
        assert_eq!(out[0], -1.0);
        assert_eq!(out[1], 0.0);
        assert!(out[2] < 1.0 && out[2] > 0.999);
    }
}
