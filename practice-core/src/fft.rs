//! # Fast Fourier Transform (FFT) Module
//!
//! An in-place, iterative radix-2 Cooley–Tukey transform in double precision.
//! The chord pipeline runs one 4096-point transform per cycle, so the plan
//! precomputes its bit-reversal permutation and twiddle factors once and is
//! reused for the lifetime of a capture session.
//!
//! The transform is unnormalized: only relative magnitudes matter downstream.

use rustfft::num_complex::Complex;

use crate::error::{EngineError, Result};

/// Default transform size for the chord pipeline.
pub const DEFAULT_FFT_SIZE: usize = 4096;

/// A precomputed forward transform of a fixed power-of-two size.
#[derive(Debug, Clone)]
pub struct Radix2Fft {
    len: usize,
    /// `bit_reversed[i]` is `i` with its `log2(len)` low bits reversed.
    bit_reversed: Vec<usize>,
    /// `e^{-2πi·k/len}` for k in [0, len/2).
    twiddles: Vec<Complex<f64>>,
}

impl Radix2Fft {
    /// Plans a transform of `len` points.
    ///
    /// The size comes from configuration, so it is checked here once rather
    /// than on every frame.
    pub fn new(len: usize) -> Result<Self> {
        if len < 2 || !len.is_power_of_two() {
            return Err(EngineError::InvalidConfig(format!(
                "FFT size must be a power of two >= 2, got {len}"
            )));
        }

        let bits = len.trailing_zeros();
        let bit_reversed = (0..len)
            .map(|i| i.reverse_bits() >> (usize::BITS - bits))
            .collect();

        let twiddles = (0..len / 2)
            .map(|k| {
                let angle = -2.0 * std::f64::consts::PI * k as f64 / len as f64;
                Complex::new(angle.cos(), angle.sin())
            })
            .collect();

        Ok(Self {
            len,
            bit_reversed,
            twiddles,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Transforms `buffer` in place.
    ///
    /// # Panics
    /// If `buffer.len()` differs from the planned size. The detection loop
    /// always hands over a buffer of the planned size.
    pub fn process(&self, buffer: &mut [Complex<f64>]) {
        assert_eq!(
            buffer.len(),
            self.len,
            "FFT buffer length must match the planned size"
        );

        for (i, &j) in self.bit_reversed.iter().enumerate() {
            if i < j {
                buffer.swap(i, j);
            }
        }

        // Butterfly stages: sub-transforms of size 2, 4, ..., len.
        let mut size = 2;
        while size <= self.len {
            let half = size / 2;
            let stride = self.len / size;
            for start in (0..self.len).step_by(size) {
                for k in 0..half {
                    let w = self.twiddles[k * stride];
                    let even = buffer[start + k];
                    let odd = buffer[start + k + half] * w;
                    buffer[start + k] = even + odd;
                    buffer[start + k + half] = even - odd;
                }
            }
            size *= 2;
        }
    }

    /// Loads real samples into `scratch` (imaginary parts zeroed) and transforms.
    ///
    /// Samples beyond the planned size are ignored; a shorter input is zero padded.
    pub fn process_real(&self, samples: &[f64], scratch: &mut Vec<Complex<f64>>) {
        scratch.clear();
        scratch.extend(
            samples
                .iter()
                .take(self.len)
                .map(|&re| Complex::new(re, 0.0)),
        );
        scratch.resize(self.len, Complex::new(0.0, 0.0));
        self.process(scratch);
    }
}

/// Magnitudes `sqrt(re² + im²)` of the first half of the spectrum (bins [0, N/2)).
pub fn spectrum_to_magnitudes(spectrum: &[Complex<f64>], out: &mut Vec<f64>) {
    out.clear();
    out.extend(spectrum.iter().take(spectrum.len() / 2).map(|c| c.norm()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    /// Deterministic pseudo-random samples in [-1, 1).
    fn noise(len: usize, mut seed: u64) -> Vec<f64> {
        (0..len)
            .map(|_| {
                seed = seed
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((seed >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn rejects_non_power_of_two() {
        assert!(matches!(Radix2Fft::new(0), Err(EngineError::InvalidConfig(_))));
        assert!(matches!(Radix2Fft::new(1), Err(EngineError::InvalidConfig(_))));
        assert!(matches!(Radix2Fft::new(1000), Err(EngineError::InvalidConfig(_))));
        assert!(Radix2Fft::new(4096).is_ok());
    }

    #[test]
    fn matches_rustfft_on_noise() {
        for &len in &[2usize, 8, 64, 1024, 4096] {
            let input = noise(len, len as u64);
            let plan = Radix2Fft::new(len).unwrap();
            let mut ours = Vec::new();
            plan.process_real(&input, &mut ours);

            let mut reference: Vec<Complex<f64>> =
                input.iter().map(|&re| Complex::new(re, 0.0)).collect();
            FftPlanner::<f64>::new()
                .plan_fft_forward(len)
                .process(&mut reference);

            let scale = len as f64;
            for (a, b) in ours.iter().zip(reference.iter()) {
                assert!((a - b).norm() < 1e-9 * scale, "len {len}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn impulse_has_flat_spectrum() {
        let plan = Radix2Fft::new(16).unwrap();
        let mut input = vec![0.0; 16];
        input[0] = 1.0;
        let mut spectrum = Vec::new();
        plan.process_real(&input, &mut spectrum);
        for c in &spectrum {
            assert!((c.re - 1.0).abs() < 1e-12 && c.im.abs() < 1e-12);
        }
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let len = 1024;
        let plan = Radix2Fft::new(len).unwrap();
        let input: Vec<f64> = (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * 37.0 * i as f64 / len as f64).sin())
            .collect();
        let mut spectrum = Vec::new();
        let mut mags = Vec::new();
        plan.process_real(&input, &mut spectrum);
        spectrum_to_magnitudes(&spectrum, &mut mags);

        assert_eq!(mags.len(), len / 2);
        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 37);
        // Unnormalized: a unit sine lands at N/2.
        assert!((mags[37] - len as f64 / 2.0).abs() < 1e-6);
    }
}
