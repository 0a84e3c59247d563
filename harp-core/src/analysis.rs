//! # Window Analysis
//!
//! Turns one [`AudioWindow`] into an [`AnalysisResult`]: the selected
//! detector produces a pitch, the note lookup names it and measures the
//! cents deviation, and the optional chord detector adds its pitches.

use crate::chord::ChordDetector;
use crate::config::{Algorithm, FrequencyRange, PipelineConfig};
use crate::error::Result;
use crate::pitch::{rms, AudioWindow, PitchDetector};
use crate::tuning::NoteLookup;
use crate::AnalysisResult;

/// One configured detector plus the note mapping applied to its output.
pub struct Analyzer {
    algorithm: Algorithm,
    detector: Box<dyn PitchDetector>,
    chord: Option<ChordDetector>,
    lookup: NoteLookup,
}

impl Analyzer {
    pub fn new(algorithm: Algorithm, range: FrequencyRange, lookup: NoteLookup) -> Self {
        Self {
            algorithm,
            detector: algorithm.detector(range),
            chord: None,
            lookup,
        }
    }

    /// Builds an analyzer from the detection fields of `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.frequency_range.validate()?;
        let lookup = NoteLookup::new(config.concert_pitch)?;
        let mut analyzer = Self::new(config.algorithm, config.frequency_range, lookup);
        analyzer.set_chord_detection(config.chord_detection);
        Ok(analyzer)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn frequency_range(&self) -> FrequencyRange {
        self.detector.frequency_range()
    }

    pub fn lookup(&self) -> &NoteLookup {
        &self.lookup
    }

    pub fn chord_detection(&self) -> bool {
        self.chord.is_some()
    }

    /// Replaces the detector, keeping the current frequency range.
    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        if algorithm != self.algorithm {
            let range = self.detector.frequency_range();
            self.detector = algorithm.detector(range);
            self.algorithm = algorithm;
        }
    }

    pub fn set_frequency_range(&mut self, range: FrequencyRange) {
        self.detector.set_frequency_range(range);
        if let Some(chord) = self.chord.as_mut() {
            chord.set_frequency_range(range);
        }
    }

    pub fn set_concert_pitch(&mut self, concert_pitch: f64) -> Result<()> {
        self.lookup.set_concert_pitch(concert_pitch)
    }

    pub fn set_chord_detection(&mut self, enabled: bool) {
        match (enabled, self.chord.is_some()) {
            (true, false) => {
                self.chord = Some(ChordDetector::new(self.detector.frequency_range()));
            }
            (false, true) => self.chord = None,
            _ => {}
        }
    }

    /// Runs detection on one window.
    pub fn analyze(&mut self, window: &AudioWindow) -> AnalysisResult {
        let pitch = self.detector.detect_window(window);

        let note = pitch
            .is_detected()
            .then(|| self.lookup.find_nearest_note(pitch.pitch()).ok())
            .flatten();
        let cents_deviation = note
            .as_ref()
            .and_then(|note| note.cents_from(pitch.pitch()).ok());

        let chord = self
            .chord
            .as_mut()
            .map(|detector| detector.detect_chord(window.samples(), window.sample_rate()));

        AnalysisResult {
            sequence: window.sequence(),
            algorithm: self.algorithm,
            detected_frequency: pitch.is_detected().then(|| pitch.pitch()),
            confidence: pitch.confidence(),
            volume: rms(window.samples()),
            note_name: note.map(|note| note.name),
            cents_deviation,
            chord,
        }
    }
}
