//! # Chord Detection Module
//!
//! Finds several simultaneous pitches in one window from its magnitude
//! spectrum. Harmonicas play chords by sounding neighbouring holes together,
//! so the detector reports up to [`MAX_PITCHES`] notes, lowest first.
//!
//! ## Pipeline
//! 1. Spectral flatness gate: noisy windows yield an empty result
//! 2. Spectrum normalized to its maximum, local peaks above [`PEAK_THRESHOLD`]
//! 3. Peaks outside the frequency range removed
//! 4. Overtones of a stronger lower peak removed (octaves are kept)
//! 5. Peaks much weaker than a lower kept peak removed
//! 6. Peaks closer than [`MIN_PEAK_DISTANCE_HZ`] merged
//!
//! Confidence is the mean normalized magnitude of the reported peaks.

use log::debug;
use serde::Serialize;
use std::fmt;

use crate::config::FrequencyRange;
use crate::fft::{bin_to_frequency, frequency_to_bin, SpectrumAnalyzer};
use crate::pitch::{is_silent, parabolic_offset, PitchDetectionResult, PitchDetector};
use crate::tuning::NoteLookup;

/// Normalized magnitude a spectral peak must exceed.
pub const PEAK_THRESHOLD: f64 = 0.05;
/// Peaks closer than this are merged into one.
pub const MIN_PEAK_DISTANCE_HZ: f64 = 25.0;
/// Most pitches reported per window.
pub const MAX_PITCHES: usize = 4;
/// Windows whose spectrum is flatter than this are treated as noise.
pub const SPECTRAL_FLATNESS_THRESHOLD: f64 = 0.4;
/// How close a frequency ratio must be to an integer to count as an overtone.
pub const HARMONIC_TOLERANCE: f64 = 0.05;

const OCTAVE_TOLERANCE: f64 = 0.1;
/// Overtone ratios above this are treated as separate tones.
const MAX_HARMONIC_RATIO: f64 = 5.0;
/// An overtone weaker than this fraction of its fundamental is dropped.
const HARMONIC_MAGNITUDE_RATIO: f64 = 0.3;
/// A higher peak weaker than this fraction of a lower kept peak is dropped.
const LOWER_PRIORITY_RATIO: f64 = 0.6;

const MIN_FFT_SIZE: usize = 1024;

/// Pitches found in one window, lowest first, with a shared confidence.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ChordDetectionResult {
    pitches: Vec<f64>,
    confidence: f64,
}

impl ChordDetectionResult {
    /// Keeps only finite positive pitches; confidence is clamped to `[0, 1]`.
    pub fn new(pitches: Vec<f64>, confidence: f64) -> Self {
        let pitches: Vec<f64> = pitches
            .into_iter()
            .filter(|p| p.is_finite() && *p > 0.0)
            .collect();
        let confidence = if pitches.is_empty() || !confidence.is_finite() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            pitches,
            confidence,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn pitches(&self) -> &[f64] {
        &self.pitches
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn has_pitches(&self) -> bool {
        !self.pitches.is_empty()
    }

    pub fn pitch_count(&self) -> usize {
        self.pitches.len()
    }

    pub fn pitch(&self, index: usize) -> Option<f64> {
        self.pitches.get(index).copied()
    }

    /// Nearest note name of every pitch under `lookup`.
    pub fn note_names(&self, lookup: &NoteLookup) -> Vec<String> {
        self.pitches
            .iter()
            .filter_map(|&p| lookup.get_note_name(p).ok())
            .collect()
    }
}

impl From<PitchDetectionResult> for ChordDetectionResult {
    fn from(result: PitchDetectionResult) -> Self {
        if result.is_detected() {
            Self::new(vec![result.pitch()], result.confidence())
        } else {
            Self::empty()
        }
    }
}

impl fmt::Display for ChordDetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_pitches() {
            return f.write_str("no chord");
        }
        let names = self.note_names(&NoteLookup::default());
        write!(f, "{} ({:.2})", names.join(" "), self.confidence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Peak {
    frequency: f64,
    magnitude: f64,
}

/// Spectral multi-pitch detector.
pub struct ChordDetector {
    range: FrequencyRange,
    analyzer: SpectrumAnalyzer,
    normalized: Vec<f64>,
}

impl Default for ChordDetector {
    fn default() -> Self {
        Self::new(FrequencyRange::default())
    }
}

impl ChordDetector {
    pub fn new(range: FrequencyRange) -> Self {
        Self {
            range,
            analyzer: SpectrumAnalyzer::new(),
            normalized: Vec::new(),
        }
    }

    /// Detects up to [`MAX_PITCHES`] simultaneous pitches in `samples`.
    pub fn detect_chord(&mut self, samples: &[f32], sample_rate: u32) -> ChordDetectionResult {
        if samples.len() < 2 || sample_rate == 0 || is_silent(samples) {
            return ChordDetectionResult::empty();
        }

        let fft_size = samples.len().next_power_of_two().max(MIN_FFT_SIZE);
        let magnitudes = self.analyzer.magnitudes(samples, fft_size);

        let flatness = spectral_flatness(magnitudes, &self.range, sample_rate, fft_size);
        if flatness > SPECTRAL_FLATNESS_THRESHOLD {
            debug!("chord: spectral flatness {flatness:.3} above threshold, treating as noise");
            return ChordDetectionResult::empty();
        }

        let max_magnitude = magnitudes.iter().copied().fold(0.0, f64::max);
        if max_magnitude <= 0.0 {
            return ChordDetectionResult::empty();
        }
        self.normalized.clear();
        self.normalized
            .extend(magnitudes.iter().map(|m| m / max_magnitude));

        let peaks = find_peaks(&self.normalized, sample_rate, fft_size);
        let found = peaks.len();
        let peaks: Vec<Peak> = peaks
            .into_iter()
            .filter(|p| self.range.contains(p.frequency))
            .collect();
        let in_range = peaks.len();
        let peaks = filter_harmonics(peaks);
        let without_harmonics = peaks.len();
        let peaks = prioritize_lower_frequencies(peaks);
        let mut peaks = merge_peaks(peaks);
        peaks.truncate(MAX_PITCHES);
        debug!(
            "chord: {found} peaks, {in_range} in range, {without_harmonics} after harmonics, {} kept",
            peaks.len()
        );

        let confidence = if peaks.is_empty() {
            0.0
        } else {
            peaks.iter().map(|p| p.magnitude).sum::<f64>() / peaks.len() as f64
        };
        ChordDetectionResult::new(peaks.iter().map(|p| p.frequency).collect(), confidence)
    }
}

impl PitchDetector for ChordDetector {
    /// The lowest pitch of the chord.
    fn detect(&mut self, samples: &[f32], sample_rate: u32) -> PitchDetectionResult {
        let chord = self.detect_chord(samples, sample_rate);
        match chord.pitch(0) {
            Some(pitch) => PitchDetectionResult::new(pitch, chord.confidence()),
            None => PitchDetectionResult::none(),
        }
    }

    fn name(&self) -> &'static str {
        "CHORD"
    }

    fn frequency_range(&self) -> FrequencyRange {
        self.range
    }

    fn set_frequency_range(&mut self, range: FrequencyRange) {
        self.range = range;
    }
}

/// Geometric over arithmetic mean of the magnitudes inside `range`.
///
/// Close to 1 for white noise, close to 0 for a few strong tones.
fn spectral_flatness(
    magnitudes: &[f64],
    range: &FrequencyRange,
    sample_rate: u32,
    fft_size: usize,
) -> f64 {
    let last = magnitudes.len().saturating_sub(1);
    let start = frequency_to_bin(range.min(), sample_rate, fft_size).max(1);
    let end = frequency_to_bin(range.max(), sample_rate, fft_size).min(last);
    if start > end {
        return 1.0;
    }

    let (sum, log_sum) = magnitudes[start..=end]
        .iter()
        .map(|m| m + 1e-10)
        .fold((0.0, 0.0), |(sum, log_sum), m| (sum + m, log_sum + m.ln()));
    let count = (end - start + 1) as f64;
    if sum <= 0.0 {
        return 1.0;
    }
    (log_sum / count).exp() / (sum / count)
}

/// Local maxima above [`PEAK_THRESHOLD`], in ascending frequency order.
fn find_peaks(normalized: &[f64], sample_rate: u32, fft_size: usize) -> Vec<Peak> {
    if normalized.len() < 3 {
        return Vec::new();
    }
    (1..normalized.len() - 1)
        .filter(|&k| {
            let m = normalized[k];
            m > PEAK_THRESHOLD && m > normalized[k - 1] && m >= normalized[k + 1]
        })
        .map(|k| {
            let (left, centre, right) = (normalized[k - 1], normalized[k], normalized[k + 1]);
            let shift = if left > 0.0 && right > 0.0 {
                parabolic_offset(left.ln(), centre.ln(), right.ln())
            } else {
                0.0
            };
            Peak {
                frequency: bin_to_frequency(k as f64 + shift, sample_rate, fft_size),
                magnitude: centre,
            }
        })
        .collect()
}

/// Drops peaks that are weak integer multiples of a lower peak.
fn filter_harmonics(peaks: Vec<Peak>) -> Vec<Peak> {
    let mut kept = Vec::with_capacity(peaks.len());
    for (i, peak) in peaks.iter().enumerate() {
        let is_harmonic = peaks[..i].iter().any(|lower| {
            let ratio = peak.frequency / lower.frequency;
            // Near-unison neighbours are left for `merge_peaks`.
            if ratio.round() <= 1.0 {
                return false;
            }
            if (ratio - 2.0).abs() < OCTAVE_TOLERANCE || ratio > MAX_HARMONIC_RATIO {
                return false;
            }
            (ratio - ratio.round()).abs() < HARMONIC_TOLERANCE
                && peak.magnitude < lower.magnitude * HARMONIC_MAGNITUDE_RATIO
        });
        if !is_harmonic {
            kept.push(*peak);
        }
    }
    kept
}

/// Drops higher peaks that are much weaker than an already kept lower peak.
fn prioritize_lower_frequencies(mut peaks: Vec<Peak>) -> Vec<Peak> {
    peaks.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    let mut kept: Vec<Peak> = Vec::with_capacity(peaks.len());
    for peak in peaks {
        let overridden = kept.iter().any(|lower| {
            peak.frequency > lower.frequency
                && peak.magnitude < lower.magnitude * LOWER_PRIORITY_RATIO
        });
        if !overridden {
            kept.push(peak);
        }
    }
    kept
}

/// Merges neighbours closer than [`MIN_PEAK_DISTANCE_HZ`] into a magnitude-weighted peak.
fn merge_peaks(peaks: Vec<Peak>) -> Vec<Peak> {
    let mut iter = peaks.into_iter();
    let Some(mut current) = iter.next() else {
        return Vec::new();
    };
    let mut merged = Vec::new();
    for next in iter {
        if (next.frequency - current.frequency).abs() < MIN_PEAK_DISTANCE_HZ {
            let total = current.magnitude + next.magnitude;
            current = Peak {
                frequency: (current.frequency * current.magnitude
                    + next.frequency * next.magnitude)
                    / total,
                magnitude: total,
            };
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    merged
}
