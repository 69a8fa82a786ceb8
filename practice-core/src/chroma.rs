//! # Chroma Aggregation
//!
//! Folds a magnitude spectrum into 12 pitch-class energies and picks the
//! "active" pitch classes the chord matcher works from.

use serde::{Deserialize, Serialize};

/// Number of pitch classes (C, C#, D, ..., B).
pub const NUM_PITCH_CLASSES: usize = 12;

/// Energy per pitch class, index 0 = C.
pub type ChromaVector = [f64; NUM_PITCH_CLASSES];

/// A set of pitch classes stored as a 12-bit mask.
///
/// Iteration is always ascending from C, which fixes the order in which the
/// chord matcher tries roots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PitchClassSet(u16);

impl PitchClassSet {
    pub const EMPTY: PitchClassSet = PitchClassSet(0);

    /// Adds a pitch class; values outside 0..12 wrap modulo 12.
    pub fn insert(&mut self, pitch_class: i32) {
        self.0 |= 1 << pitch_class.rem_euclid(NUM_PITCH_CLASSES as i32);
    }

    pub fn contains(&self, pitch_class: i32) -> bool {
        self.0 & (1 << pitch_class.rem_euclid(NUM_PITCH_CLASSES as i32)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_subset(&self, other: &PitchClassSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// Pitch classes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..NUM_PITCH_CLASSES).filter(|&pc| self.0 & (1 << pc) != 0)
    }

    /// The set `{(root + interval) mod 12}`.
    pub fn transposed_from(root: usize, intervals: &[u8]) -> PitchClassSet {
        intervals.iter().fold(PitchClassSet::EMPTY, |mut set, &interval| {
            set.insert(root as i32 + interval as i32);
            set
        })
    }
}

impl FromIterator<i32> for PitchClassSet {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        let mut set = PitchClassSet::EMPTY;
        for pc in iter {
            set.insert(pc);
        }
        set
    }
}

/// Band and thresholds for chroma extraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaConfig {
    /// Lowest bin center frequency considered, in Hz.
    pub min_frequency: f64,
    /// Highest bin center frequency considered, in Hz.
    pub max_frequency: f64,
    /// Bins quieter than this are ignored.
    pub min_bin_magnitude: f64,
    /// A pitch class is active when its energy exceeds this share of the loudest one.
    pub relative_threshold: f64,
    /// If the loudest pitch class is below this, nothing is active.
    pub energy_floor: f64,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            min_frequency: 80.0,
            max_frequency: 1000.0,
            min_bin_magnitude: 1.0,
            relative_threshold: 0.6,
            energy_floor: 10.0,
        }
    }
}

/// Pitch class of a frequency, `round(12·log2(f/440) + 69) mod 12`.
pub fn pitch_class(freq: f64) -> usize {
    let midi = (12.0 * (freq / 440.0).log2() + 69.0).round() as i64;
    midi.rem_euclid(NUM_PITCH_CLASSES as i64) as usize
}

/// Accumulates bin magnitudes into pitch classes.
///
/// Only bins whose center lies inside the configured band, and below
/// Nyquist, contribute.
///
/// # Arguments
/// * `magnitudes` - Bins `[0, N/2)` of a magnitude spectrum
/// * `freq_resolution` - Hz per bin (`sample_rate / fft_size`)
/// * `config` - Band limits and the per-bin magnitude floor
///
/// # Returns
/// * Summed magnitude per pitch class, index 0 = C; all zero when
///   `freq_resolution` is not positive
pub fn compute_chroma(magnitudes: &[f64], freq_resolution: f64, config: &ChromaConfig) -> ChromaVector {
    let mut chroma = [0.0; NUM_PITCH_CLASSES];
    if !(freq_resolution > 0.0) {
        return chroma;
    }

    let first_bin = (config.min_frequency / freq_resolution).ceil().max(1.0) as usize;
    let last_bin = ((config.max_frequency / freq_resolution).floor() as usize)
        .min(magnitudes.len().saturating_sub(1));

    for bin in first_bin..=last_bin {
        let magnitude = magnitudes[bin];
        if magnitude < config.min_bin_magnitude {
            continue;
        }
        let freq = bin as f64 * freq_resolution;
        chroma[pitch_class(freq)] += magnitude;
    }
    chroma
}

/// Pitch classes whose energy exceeds `relative_threshold × max`.
///
/// Empty when the loudest class is under the absolute energy floor.
pub fn active_pitch_classes(chroma: &ChromaVector, config: &ChromaConfig) -> PitchClassSet {
    let max = chroma.iter().copied().fold(0.0_f64, f64::max);
    if !(max >= config.energy_floor) || max <= 0.0 {
        return PitchClassSet::EMPTY;
    }
    let threshold = config.relative_threshold * max;
    chroma
        .iter()
        .enumerate()
        .filter(|&(_, &energy)| energy > threshold)
        .map(|(pc, _)| pc as i32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_classes_of_reference_notes() {
        assert_eq!(pitch_class(440.0), 9);
        assert_eq!(pitch_class(261.63), 0);
        assert_eq!(pitch_class(329.63), 4);
        assert_eq!(pitch_class(392.0), 7);
        assert_eq!(pitch_class(82.41), 4);
        assert_eq!(pitch_class(880.0), pitch_class(110.0));
    }

    #[test]
    fn set_operations() {
        let c_major: PitchClassSet = [0, 4, 7].into_iter().collect();
        let wrapped: PitchClassSet = [12, 16, -5].into_iter().collect();
        assert_eq!(c_major, wrapped);
        assert_eq!(c_major.len(), 3);
        assert!(c_major.contains(4));
        assert!(!c_major.contains(5));
        assert_eq!(c_major.iter().collect::<Vec<_>>(), vec![0, 4, 7]);

        let a_minor = PitchClassSet::transposed_from(9, &[0, 3, 7]);
        assert_eq!(a_minor.iter().collect::<Vec<_>>(), vec![0, 4, 9]);

        let c_only: PitchClassSet = [0].into_iter().collect();
        assert!(c_only.is_subset(&c_major));
        assert!(!c_major.is_subset(&c_only));
        assert!(PitchClassSet::EMPTY.is_subset(&c_only));
    }

    #[test]
    fn band_limits_are_respected() {
        let resolution = 10.0;
        let mut mags = vec![0.0; 200];
        mags[5] = 100.0; // 50 Hz, below band
        mags[44] = 100.0; // 440 Hz, A
        mags[150] = 100.0; // 1500 Hz, above band
        let chroma = compute_chroma(&mags, resolution, &ChromaConfig::default());
        assert_eq!(chroma[9], 100.0);
        assert_eq!(chroma.iter().sum::<f64>(), 100.0);
    }

    #[test]
    fn quiet_bins_are_skipped() {
        let mut mags = vec![0.0; 200];
        mags[44] = 0.5;
        let chroma = compute_chroma(&mags, 10.0, &ChromaConfig::default());
        assert!(chroma.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn relative_threshold_selects_strong_classes() {
        let mut chroma = [0.0; 12];
        chroma[0] = 100.0;
        chroma[4] = 70.0;
        chroma[7] = 61.0;
        chroma[11] = 60.0; // exactly 0.6 × max, not strictly greater
        let active = active_pitch_classes(&chroma, &ChromaConfig::default());
        assert_eq!(active.iter().collect::<Vec<_>>(), vec![0, 4, 7]);
    }

    #[test]
    fn energy_floor_means_silence() {
        let mut chroma = [0.0; 12];
        chroma[3] = 5.0;
        assert!(active_pitch_classes(&chroma, &ChromaConfig::default()).is_empty());
        assert!(active_pitch_classes(&[0.0; 12], &ChromaConfig::default()).is_empty());
    }
}
