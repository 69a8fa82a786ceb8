//! # Chord Matching
//!
//! Names a chord from the set of active pitch classes by template subset
//! matching.
//!
//! Every active pitch class is tried as a root, in ascending order from C, and
//! for each root the templates are tried in table order. The first template
//! whose pitch classes are all active wins. There is no scoring between
//! competing matches, so table order decides ties: with the default table a
//! C7 voicing reads as "C" because the major triad comes first.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::chroma::{ChromaVector, PitchClassSet};
use crate::tuning::NOTE_NAMES;

/// A chord quality: a name suffix and its semitone offsets from the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordTemplate {
    /// Appended to the root name; empty for major.
    pub suffix: String,
    /// Semitones above the root, including 0.
    pub intervals: Vec<u8>,
}

impl ChordTemplate {
    pub fn new(suffix: &str, intervals: &[u8]) -> Self {
        Self {
            suffix: suffix.to_string(),
            intervals: intervals.to_vec(),
        }
    }

    /// Pitch classes this template requires when built on `root`.
    pub fn pitch_classes(&self, root: usize) -> PitchClassSet {
        PitchClassSet::transposed_from(root, &self.intervals)
    }
}

/// Built-in qualities, in matching order.
pub static DEFAULT_TEMPLATES: Lazy<Vec<ChordTemplate>> = Lazy::new(|| {
    vec![
        ChordTemplate::new("", &[0, 4, 7]),
        ChordTemplate::new("m", &[0, 3, 7]),
        ChordTemplate::new("7", &[0, 4, 7, 10]),
        ChordTemplate::new("maj7", &[0, 4, 7, 11]),
        ChordTemplate::new("m7", &[0, 3, 7, 10]),
    ]
});

/// A successful template match.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordMatch {
    /// Root pitch class, 0 = C.
    pub root: usize,
    /// Index into the template table.
    pub template: usize,
    /// `<root name><suffix>`, e.g. `"Am"`.
    pub name: String,
    /// Pitch classes the matched chord is made of.
    pub pitch_classes: PitchClassSet,
}

/// Finds the first root/template combination fully contained in `active`.
///
/// # Arguments
/// * `active` - Pitch classes present in the frame
/// * `templates` - Chord qualities, tried in order for each root
///
/// # Returns
/// * `Some(chord)` - The first match, roots ascending from C
/// * `None` - No template fits, or `active` is empty
pub fn match_chord(active: &PitchClassSet, templates: &[ChordTemplate]) -> Option<ChordMatch> {
    for root in active.iter() {
        for (index, template) in templates.iter().enumerate() {
            if template.intervals.is_empty() {
                continue;
            }
            let required = template.pitch_classes(root);
            if required.is_subset(active) {
                return Some(ChordMatch {
                    root,
                    template: index,
                    name: format!("{}{}", NOTE_NAMES[root], template.suffix),
                    pitch_classes: required,
                });
            }
        }
    }
    None
}

/// Share of the total chroma energy that sits on the chord's pitch classes.
pub fn match_probability(chroma: &ChromaVector, chord: &PitchClassSet) -> f64 {
    let total: f64 = chroma.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let on_chord: f64 = chord.iter().map(|pc| chroma[pc]).sum();
    (on_chord / total).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pcs: &[i32]) -> PitchClassSet {
        pcs.iter().copied().collect()
    }

    #[test]
    fn names_major_and_minor_triads() {
        let m = match_chord(&set(&[0, 4, 7]), &DEFAULT_TEMPLATES).unwrap();
        assert_eq!(m.name, "C");
        assert_eq!(m.root, 0);

        // A minor: A C E. C is tried first as root but C-E-G is incomplete.
        let m = match_chord(&set(&[0, 4, 9]), &DEFAULT_TEMPLATES).unwrap();
        assert_eq!(m.name, "Am");

        let m = match_chord(&set(&[2, 6, 9]), &DEFAULT_TEMPLATES).unwrap();
        assert_eq!(m.name, "D");
    }

    #[test]
    fn first_match_wins() {
        // C E G Bb contains the C major triad, which precedes "7" in the table.
        let m = match_chord(&set(&[0, 4, 7, 10]), &DEFAULT_TEMPLATES).unwrap();
        assert_eq!(m.name, "C");

        // Seventh-first table changes the answer.
        let sevenths_first = vec![
            ChordTemplate::new("7", &[0, 4, 7, 10]),
            ChordTemplate::new("", &[0, 4, 7]),
        ];
        let m = match_chord(&set(&[0, 4, 7, 10]), &sevenths_first).unwrap();
        assert_eq!(m.name, "C7");
    }

    #[test]
    fn roots_tried_in_ascending_order() {
        // C E G A holds both C major and A minor; C comes first.
        let m = match_chord(&set(&[0, 4, 7, 9]), &DEFAULT_TEMPLATES).unwrap();
        assert_eq!(m.name, "C");
    }

    #[test]
    fn seventh_template_used_when_listed() {
        // D F A C: no triad on C, D minor is the first match.
        let m = match_chord(&set(&[2, 5, 9, 0]), &DEFAULT_TEMPLATES).unwrap();
        assert_eq!(m.name, "Dm");

        let only_sevenths = vec![ChordTemplate::new("m7", &[0, 3, 7, 10])];
        let m = match_chord(&set(&[2, 5, 9, 0]), &only_sevenths).unwrap();
        assert_eq!(m.name, "Dm7");
        assert_eq!(m.pitch_classes, set(&[0, 2, 5, 9]));
    }

    #[test]
    fn no_match_is_none() {
        assert!(match_chord(&PitchClassSet::EMPTY, &DEFAULT_TEMPLATES).is_none());
        assert!(match_chord(&set(&[0, 1, 2]), &DEFAULT_TEMPLATES).is_none());
        assert!(match_chord(&set(&[0, 7]), &DEFAULT_TEMPLATES).is_none());
        assert!(match_chord(&set(&[0, 4, 7]), &[]).is_none());
    }

    #[test]
    fn probability_is_share_of_energy() {
        let mut chroma = [0.0; 12];
        chroma[0] = 3.0;
        chroma[4] = 3.0;
        chroma[7] = 2.0;
        chroma[1] = 2.0;
        let p = match_probability(&chroma, &set(&[0, 4, 7]));
        assert!((p - 0.8).abs() < 1e-12);
        assert_eq!(match_probability(&[0.0; 12], &set(&[0, 4, 7])), 0.0);
    }
}
