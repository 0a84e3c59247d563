//! # Pitch Detection Module
//!
//! Shared vocabulary of the monophonic detectors: the [`PitchDetector`] trait,
//! its [`PitchDetectionResult`], the [`AudioWindow`] handed to it and the
//! small numeric helpers every algorithm needs.
//!
//! ## Detectors
//! - [`YinDetector`](crate::yin::YinDetector): cumulative mean normalized difference
//! - [`MpmDetector`](crate::mpm::MpmDetector): McLeod normalized square difference
//! - [`FftDetector`](crate::fft_detector::FftDetector): spectral peak picking
//! - [`HybridDetector`](crate::hybrid::HybridDetector): YIN and MPM combined

use serde::Serialize;
use std::fmt;

use crate::config::FrequencyRange;

/// Pitch value reported when no reliable pitch was found.
pub const NO_DETECTED_PITCH: f64 = -1.0;

/// Windows quieter than this root-mean-square level count as silence.
pub const SILENCE_RMS: f64 = 1e-4;

/// Outcome of one detection call: a pitch in Hz and a confidence in `[0, 1]`.
///
/// "No pitch" is an ordinary value ([`PitchDetectionResult::none`]), never an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchDetectionResult {
    pitch: f64,
    confidence: f64,
}

impl PitchDetectionResult {
    /// A detected pitch. Confidence is clamped to `[0, 1]`; a non-finite or
    /// non-positive pitch, or a non-finite confidence, yields [`Self::none`].
    pub fn new(pitch: f64, confidence: f64) -> Self {
        if !(pitch.is_finite() && pitch > 0.0 && confidence.is_finite()) {
            return Self::none();
        }
        Self {
            pitch,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// `NO_DETECTED_PITCH` with zero confidence.
    pub const fn none() -> Self {
        Self {
            pitch: NO_DETECTED_PITCH,
            confidence: 0.0,
        }
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn is_detected(&self) -> bool {
        self.pitch > 0.0
    }
}

impl Default for PitchDetectionResult {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for PitchDetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_detected() {
            write!(f, "{:.2} Hz ({:.2})", self.pitch, self.confidence)
        } else {
            f.write_str("no pitch")
        }
    }
}

/// A fixed-length block of samples cut from a stream, tagged with its
/// sample rate and its position in the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioWindow {
    samples: Vec<f32>,
    sample_rate: u32,
    sequence: u64,
}

impl AudioWindow {
    pub fn new(samples: Vec<f32>, sample_rate: u32, sequence: u64) -> Self {
        Self {
            samples,
            sample_rate,
            sequence,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Zero-based index of this window within its stream.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A monophonic pitch estimator.
///
/// Implementations may keep scratch buffers between calls but must fully
/// overwrite them, so detecting the same window twice yields the same result.
/// `&mut self` guarantees at most one detection in flight per instance.
pub trait PitchDetector: Send {
    /// Estimates the pitch of `samples` (mono, roughly `[-1, 1]`).
    fn detect(&mut self, samples: &[f32], sample_rate: u32) -> PitchDetectionResult;

    fn detect_window(&mut self, window: &AudioWindow) -> PitchDetectionResult {
        self.detect(window.samples(), window.sample_rate())
    }

    /// Short algorithm name, e.g. `"YIN"`.
    fn name(&self) -> &'static str;

    fn frequency_range(&self) -> FrequencyRange;

    /// Restricts later detections to `range`.
    fn set_frequency_range(&mut self, range: FrequencyRange);
}

/// Root-mean-square level of `samples`; zero for an empty slice.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (energy / samples.len() as f64).sqrt()
}

/// True if the window is too quiet (or empty, or not finite) to analyse.
pub(crate) fn is_silent(samples: &[f32]) -> bool {
    let level = rms(samples);
    !(level.is_finite() && level >= SILENCE_RMS)
}

/// Vertex of the parabola through `(x-1, y0)`, `(x, y1)`, `(x+1, y2)`.
///
/// Returns the offset from the centre sample, or `0.0` when the three points
/// are collinear or the vertex would fall outside `[-1, 1]`.
pub fn parabolic_offset(y0: f64, y1: f64, y2: f64) -> f64 {
    let denominator = y0 - 2.0 * y1 + y2;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }
    let shift = 0.5 * (y0 - y2) / denominator;
    if shift.is_finite() && shift.abs() <= 1.0 {
        shift
    } else {
        0.0
    }
}

/// Value of the parabola through the three points at `offset` from the centre.
pub fn parabolic_value(y0: f64, y1: f64, y2: f64, offset: f64) -> f64 {
    y1 - 0.25 * (y0 - y2) * offset
}

/// Final range gate shared by every detector.
pub(crate) fn in_range_result(
    pitch: f64,
    confidence: f64,
    range: &FrequencyRange,
) -> PitchDetectionResult {
    if range.contains(pitch) {
        PitchDetectionResult::new(pitch, confidence)
    } else {
        PitchDetectionResult::none()
    }
}
