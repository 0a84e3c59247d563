// harp-core/src/lib.rs

//! The core logic for the harmonica pitch tuner.
//! This crate is responsible for pitch detection (YIN, MPM, FFT and a
//! hybrid of them), chord detection, note/cents mapping and the streaming
//! pipeline that cuts live audio into analysis windows. It is completely
//! headless and contains no UI code.

pub mod analysis;
pub mod audio;
pub mod cents;
pub mod chord;
pub mod config;
pub mod error;
pub mod fft;
pub mod fft_detector;
pub mod hybrid;
pub mod mpm;
pub mod pitch;
pub mod stream;
pub mod tuning;
pub mod yin;

use serde::Serialize;

pub use analysis::Analyzer;
pub use chord::{ChordDetectionResult, ChordDetector};
pub use config::{Algorithm, FrequencyRange, PipelineConfig};
pub use error::{Error, Result};
pub use fft_detector::FftDetector;
pub use hybrid::HybridDetector;
pub use mpm::MpmDetector;
pub use pitch::{AudioWindow, PitchDetectionResult, PitchDetector, NO_DETECTED_PITCH};
pub use stream::{PitchHandler, PitchPipeline, SampleSink};
pub use tuning::{Note, NoteLookup};
pub use yin::YinDetector;

/// Represents the result of analysing a single audio window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    /// Position of the window in its stream, starting at 0.
    pub sequence: u64,
    /// The algorithm that produced this result.
    pub algorithm: Algorithm,
    /// The detected frequency in Hz.
    pub detected_frequency: Option<f64>,
    /// The confidence of the detected frequency (0.0 to 1.0, 0.0 without a pitch).
    pub confidence: f64,
    /// Root-mean-square level of the window.
    pub volume: f64,
    /// The name of the nearest note.
    pub note_name: Option<String>,
    /// The deviation from the nearest note in cents.
    pub cents_deviation: Option<f64>,
    /// Simultaneous pitches, when chord detection is enabled.
    pub chord: Option<ChordDetectionResult>,
}

impl AnalysisResult {
    /// True if a pitch was found with at least `threshold` confidence.
    pub fn meets(&self, threshold: f64) -> bool {
        self.detected_frequency.is_some() && self.confidence >= threshold
    }

    /// The pitch part of this result as a detector would report it.
    pub fn pitch_result(&self) -> PitchDetectionResult {
        match self.detected_frequency {
            Some(frequency) => PitchDetectionResult::new(frequency, self.confidence),
            None => PitchDetectionResult::none(),
        }
    }
}
