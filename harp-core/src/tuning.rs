//! # Musical Tuning Module
//!
//! Maps note names to frequencies and back in 12-tone equal temperament,
//! relative to a configurable concert pitch (the frequency of A4).
//!
//! ## Features
//! - Note table covering C0 to B8 (108 notes)
//! - Note name parsing (`"A4"`, `"C#3"`, flats such as `"Bb2"` are accepted)
//! - Nearest-note lookup with cents deviation
//! - Supported concert pitch list for settings menus (431 Hz to 446 Hz)
//!
//! Each [`NoteLookup`] owns its concert pitch, so two lookups configured
//! differently never affect each other.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cents;
use crate::error::{check_frequency, Error, Result};

/// Concert pitch used when none is configured.
pub const DEFAULT_CONCERT_PITCH: f64 = 440.0;

/// Notes within this many cents of a table entry are reported by [`NoteLookup::get_note`].
const CENTS_TOLERANCE: f64 = 50.0;

/// Lowest and highest octave in the table.
const MIN_OCTAVE: u8 = 0;
const MAX_OCTAVE: u8 = 8;

/// Table index of A4 (counted in semitones from C0).
const A4_INDEX: i32 = 57;

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Concert pitches offered by the settings surface.
const SUPPORTED_CONCERT_PITCHES: [u32; 16] = [
    431, 432, 433, 434, 435, 436, 437, 438, 439, 440, 441, 442, 443, 444, 445, 446,
];

/// Canonical names of every table note, indexed by semitones from C0.
static NOTE_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    (MIN_OCTAVE..=MAX_OCTAVE)
        .flat_map(|octave| {
            PITCH_CLASSES
                .iter()
                .map(move |pitch_class| format!("{pitch_class}{octave}"))
        })
        .collect()
});

/// Reverse map from canonical name to table index.
static NOTE_MAP: Lazy<BTreeMap<&'static str, usize>> = Lazy::new(|| {
    NOTE_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect()
});

/// A single musical note with its name and frequency under some concert pitch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    /// Canonical note name (e.g., "A4", "C#3")
    pub name: String,
    /// Frequency in Hz
    pub frequency: f64,
}

impl Note {
    /// Deviation of `frequency` from this note in cents (positive = sharp).
    ///
    /// # Errors
    /// [`Error::InvalidFrequency`] if `frequency` is not positive.
    pub fn cents_from(&self, frequency: f64) -> Result<f64> {
        cents::get_cents(frequency, self.frequency)
    }
}

/// Note name <-> frequency lookup for one concert pitch.
///
/// Deserialized values go through [`NoteLookup::new`], so a stored lookup
/// can never carry an invalid concert pitch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredLookup")]
pub struct NoteLookup {
    concert_pitch: f64,
}

#[derive(Deserialize)]
struct StoredLookup {
    concert_pitch: f64,
}

impl TryFrom<StoredLookup> for NoteLookup {
    type Error = Error;

    fn try_from(stored: StoredLookup) -> Result<Self> {
        NoteLookup::new(stored.concert_pitch)
    }
}

impl Default for NoteLookup {
    fn default() -> Self {
        Self {
            concert_pitch: DEFAULT_CONCERT_PITCH,
        }
    }
}

impl NoteLookup {
    /// Creates a lookup for the given A4 frequency.
    ///
    /// # Errors
    /// [`Error::InvalidConcertPitch`] if `concert_pitch` is not positive and finite.
    pub fn new(concert_pitch: f64) -> Result<Self> {
        let mut lookup = Self::default();
        lookup.set_concert_pitch(concert_pitch)?;
        Ok(lookup)
    }

    /// The current A4 reference frequency in Hz.
    pub fn concert_pitch(&self) -> f64 {
        self.concert_pitch
    }

    /// Sets the A4 reference; every later lookup is computed from it.
    ///
    /// Invalid values are rejected and leave the previous concert pitch in place.
    pub fn set_concert_pitch(&mut self, concert_pitch: f64) -> Result<()> {
        if !(concert_pitch.is_finite() && concert_pitch > 0.0) {
            return Err(Error::InvalidConcertPitch(concert_pitch));
        }
        self.concert_pitch = concert_pitch;
        Ok(())
    }

    /// Concert pitches offered to users, in Hz.
    pub fn supported_concert_pitches() -> &'static [u32] {
        &SUPPORTED_CONCERT_PITCHES
    }

    /// Sets the concert pitch to entry `index` of [`Self::supported_concert_pitches`].
    pub fn set_concert_pitch_by_index(&mut self, index: usize) -> Result<()> {
        let pitch = SUPPORTED_CONCERT_PITCHES
            .get(index)
            .ok_or(Error::IndexOutOfRange {
                name: "supported concert pitches",
                index,
                len: SUPPORTED_CONCERT_PITCHES.len(),
            })?;
        self.set_concert_pitch(f64::from(*pitch))
    }

    /// Frequency of a note such as `"C4"` or `"A#3"`.
    ///
    /// Computed as `concert_pitch * 2^(semitones_from_A4 / 12)`.
    ///
    /// # Errors
    /// [`Error::InvalidNoteName`] for empty names, names that do not follow
    /// `<letter>[#|b]<octave>`, and notes outside C0..B8.
    pub fn get_note_frequency(&self, name: &str) -> Result<f64> {
        let index = parse_note_name(name)?;
        Ok(self.frequency_at(index))
    }

    /// Canonical name of the note nearest to `frequency`.
    ///
    /// Frequencies beyond the table ends resolve to C0 or B8.
    ///
    /// # Errors
    /// [`Error::InvalidFrequency`] if `frequency` is not positive and finite.
    pub fn get_note_name(&self, frequency: f64) -> Result<String> {
        let index = self.nearest_index(frequency)?;
        Ok(NOTE_NAMES[index].clone())
    }

    /// The table note nearest to `frequency`, with its frequency.
    pub fn find_nearest_note(&self, frequency: f64) -> Result<Note> {
        let index = self.nearest_index(frequency)?;
        Ok(self.note_at(index))
    }

    /// The table note within ±50 cents of `frequency`, if any.
    ///
    /// Returns `None` for frequencies off either end of the table and for
    /// invalid (non-positive) frequencies.
    pub fn get_note(&self, frequency: f64) -> Option<Note> {
        let note = self.find_nearest_note(frequency).ok()?;
        let deviation = cents::cents_between(frequency, note.frequency);
        (deviation.abs() <= CENTS_TOLERANCE).then_some(note)
    }

    /// Every note of the table, lowest first.
    pub fn notes(&self) -> impl Iterator<Item = Note> + '_ {
        (0..NOTE_NAMES.len()).map(|i| self.note_at(i))
    }

    fn note_at(&self, index: usize) -> Note {
        Note {
            name: NOTE_NAMES[index].clone(),
            frequency: self.frequency_at(index),
        }
    }

    fn frequency_at(&self, index: usize) -> f64 {
        let semitones = index as i32 - A4_INDEX;
        self.concert_pitch * 2f64.powf(f64::from(semitones) / 12.0)
    }

    fn nearest_index(&self, frequency: f64) -> Result<usize> {
        let frequency = check_frequency("frequency", frequency)?;
        let semitones = (12.0 * (frequency / self.concert_pitch).log2()).round();
        let last = (NOTE_NAMES.len() - 1) as f64;
        Ok((semitones + f64::from(A4_INDEX)).clamp(0.0, last) as usize)
    }
}

/// Parses `<letter>[#|b]<octave>` into a table index (semitones from C0).
fn parse_note_name(name: &str) -> Result<usize> {
    let invalid = || Error::InvalidNoteName(name.to_string());

    if let Some(&index) = NOTE_MAP.get(name) {
        return Ok(index);
    }

    let mut chars = name.chars();
    let letter = chars.next().ok_or_else(invalid)?;
    let base: i32 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(invalid()),
    };

    let rest = chars.as_str();
    let (accidental, octave) = match rest.chars().next() {
        Some('#') => (1, &rest[1..]),
        Some('b') => (-1, &rest[1..]),
        _ => (0, rest),
    };

    if octave.is_empty() || !octave.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let octave: u8 = octave.parse().map_err(|_| invalid())?;
    if octave > MAX_OCTAVE {
        return Err(invalid());
    }

    let index = i32::from(octave) * 12 + base + accidental;
    if index < 0 || index as usize >= NOTE_NAMES.len() {
        return Err(invalid());
    }
    Ok(index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_spans_c0_to_b8() {
        assert_eq!(NOTE_NAMES.len(), 108);
        assert_eq!(NOTE_NAMES[0], "C0");
        assert_eq!(NOTE_NAMES[A4_INDEX as usize], "A4");
        assert_eq!(NOTE_NAMES[107], "B8");
    }

    #[test]
    fn parses_sharps_and_flats() {
        assert_eq!(parse_note_name("A#3").unwrap(), parse_note_name("Bb3").unwrap());
        assert_eq!(parse_note_name("Cb4").unwrap(), parse_note_name("B3").unwrap());
        assert_eq!(parse_note_name("C0").unwrap(), 0);
    }

    #[test]
    fn rejects_malformed_names() {
        for name in ["", "H4", "A", "A#", "A-1", "A9", "a4", "A4x", "Cb0", "InvalidNote"] {
            assert!(parse_note_name(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn get_note_respects_cents_window() {
        let lookup = NoteLookup::default();
        assert_eq!(lookup.get_note(445.0).unwrap().name, "A4");
        assert!(lookup.get_note(2.0).is_none());
        assert!(lookup.get_note(-1.0).is_none());
    }

    #[test]
    fn rejected_concert_pitch_keeps_previous_value() {
        let mut lookup = NoteLookup::new(442.0).unwrap();
        assert!(lookup.set_concert_pitch(0.0).is_err());
        assert!(lookup.set_concert_pitch(f64::NAN).is_err());
        assert_eq!(lookup.concert_pitch(), 442.0);
    }

    #[test]
    fn concert_pitch_by_index() {
        let mut lookup = NoteLookup::default();
        lookup.set_concert_pitch_by_index(0).unwrap();
        assert_eq!(lookup.concert_pitch(), 431.0);
        assert!(lookup.set_concert_pitch_by_index(16).is_err());
    }

    #[test]
    fn stored_lookups_are_validated() {
        let lookup: NoteLookup = serde_json::from_str(r#"{"concert_pitch": 442.0}"#).unwrap();
        assert_eq!(lookup.concert_pitch(), 442.0);
        assert_eq!(serde_json::to_string(&lookup).unwrap(), r#"{"concert_pitch":442.0}"#);

        for bad in [r#"{"concert_pitch": -1}"#, r#"{"concert_pitch": 0}"#] {
            let err = serde_json::from_str::<NoteLookup>(bad).unwrap_err();
            assert!(err.to_string().contains("concert pitch"), "{err}");
        }
    }
}
