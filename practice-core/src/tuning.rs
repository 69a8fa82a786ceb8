//! # Musical Tuning Module
//!
//! Equal-temperament note math for the monophonic path: frequency to nearest
//! note, cents deviation, and the "target" mode used when the musician picks a
//! specific string to tune.
//!
//! Note names carry no octave so the display stays the same across octaves
//! (a 110 Hz and a 220 Hz A both read "A"). Octaves only appear when parsing
//! targets such as `"E2"`.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Pitch-class names, index 0 = C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Placeholder shown when no note was detected.
pub const NO_NOTE: &str = "--";

/// Default concert pitch for A4.
pub const DEFAULT_REFERENCE_A4: f64 = 440.0;

/// MIDI number of A4.
const A4_MIDI: i32 = 69;

/// Readings strictly inside this many cents count as in tune.
pub const LOCK_TOLERANCE_CENTS: i32 = 5;

/// A named note with its octave and equal-tempered frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Pitch-class name, e.g. `"C#"`.
    pub name: &'static str,
    /// Scientific pitch octave (C4 = middle C).
    pub octave: i32,
    /// MIDI note number.
    pub midi: i32,
    /// Frequency in Hz at the reference pitch the note was built with.
    pub frequency: f64,
}

impl Note {
    /// Builds a note from its MIDI number at the given reference pitch.
    pub fn from_midi(midi: i32, reference_a4: f64) -> Self {
        Self {
            name: note_name(midi),
            octave: midi.div_euclid(12) - 1,
            midi,
            frequency: midi_to_frequency(midi, reference_a4),
        }
    }

    /// `"E2"`, `"C#4"`, ...
    pub fn label(&self) -> String {
        format!("{}{}", self.name, self.octave)
    }
}

/// Name-to-pitch-class lookup, including flat spellings for parsing.
static PITCH_CLASS_MAP: Lazy<BTreeMap<&'static str, i32>> = Lazy::new(|| {
    let mut map: BTreeMap<&'static str, i32> = NOTE_NAMES
        .iter()
        .enumerate()
        .map(|(i, &name)| (name, i as i32))
        .collect();
    for (flat, pc) in [("Db", 1), ("Eb", 3), ("Gb", 6), ("Ab", 8), ("Bb", 10)] {
        map.insert(flat, pc);
    }
    map
});

/// Open strings of a six-string guitar in standard tuning, low to high.
pub static STANDARD_GUITAR: Lazy<Vec<Note>> = Lazy::new(|| {
    // E2 A2 D3 G3 B3 E4
    [40, 45, 50, 55, 59, 64]
        .into_iter()
        .map(|midi| Note::from_midi(midi, DEFAULT_REFERENCE_A4))
        .collect()
});

/// Pitch-class name of a MIDI note, wrapping modulo 12.
pub fn note_name(midi: i32) -> &'static str {
    NOTE_NAMES[midi.rem_euclid(12) as usize]
}

/// Nearest equal-tempered MIDI note, `round(12·log2(f/A4) + 69)`.
pub fn nearest_semitone(freq: f64, reference_a4: f64) -> i32 {
    (12.0 * (freq / reference_a4).log2() + A4_MIDI as f64).round() as i32
}

/// Ideal frequency of a MIDI note, `A4·2^((n-69)/12)`.
pub fn midi_to_frequency(midi: i32, reference_a4: f64) -> f64 {
    reference_a4 * 2.0_f64.powf((midi - A4_MIDI) as f64 / 12.0)
}

/// Finds the closest equal-tempered note to a frequency.
///
/// # Arguments
/// * `freq` - Input frequency in Hz
/// * `reference_a4` - Concert pitch the note grid is built on
///
/// # Returns
/// * `Some(note)` - Nearest note, its frequency at `reference_a4`
/// * `None` - `freq` is non-positive or non-finite
pub fn find_nearest_note(freq: f64, reference_a4: f64) -> Option<Note> {
    if !(freq.is_finite() && freq > 0.0) {
        return None;
    }
    Some(Note::from_midi(nearest_semitone(freq, reference_a4), reference_a4))
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat; 100 cents = 1 semitone.
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

/// Parses a note label such as `"A4"`, `"C#3"` or `"Bb2"` into its frequency.
pub fn parse_note(label: &str, reference_a4: f64) -> Option<f64> {
    let label = label.trim();
    let split = label.find(|c: char| c.is_ascii_digit() || c == '-')?;
    let (name, octave) = label.split_at(split);
    let pitch_class = *PITCH_CLASS_MAP.get(name)?;
    let octave: i32 = octave.parse().ok()?;
    Some(midi_to_frequency((octave + 1) * 12 + pitch_class, reference_a4))
}

/// How a detected frequency relates to the note it is closest to, or to the
/// target the musician chose.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteReading {
    pub note_name: &'static str,
    pub cents_off: i32,
    pub is_locked: bool,
    /// Frequency the cents are measured against.
    pub reference_frequency: f64,
}

/// Classifies a frequency for the tuner display.
///
/// With a target, cents are measured against the target and the note name is
/// the target's. Without one, the nearest chromatic note is used.
///
/// # Arguments
/// * `freq` - Detected fundamental in Hz
/// * `target` - Reference frequency chosen by the musician, if any
/// * `reference_a4` - Concert pitch for note names and nearest-note mode
///
/// # Returns
/// * `Some(reading)` - Note name, rounded cents and lock state
/// * `None` - `freq` is not a valid pitch
pub fn classify_pitch(freq: f64, target: Option<f64>, reference_a4: f64) -> Option<NoteReading> {
    if !(freq.is_finite() && freq > 0.0) {
        return None;
    }

    let (note_name, reference_frequency) = match target.filter(|t| t.is_finite() && *t > 0.0) {
        Some(target) => (note_name(nearest_semitone(target, reference_a4)), target),
        None => {
            let note = find_nearest_note(freq, reference_a4)?;
            (note.name, note.frequency)
        }
    };

    let cents_off = calculate_cents_deviation(freq, reference_frequency).round() as i32;
    Some(NoteReading {
        note_name,
        cents_off,
        is_locked: cents_off.abs() < LOCK_TOLERANCE_CENTS,
        reference_frequency,
    })
}
