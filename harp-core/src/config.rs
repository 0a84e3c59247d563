//! # Configuration Module
//!
//! Plain configuration structs for detectors and the streaming pipeline.
//! Every detector instance owns its own [`FrequencyRange`] and every
//! [`NoteLookup`](crate::tuning::NoteLookup) its own concert pitch, so
//! several independently configured pipelines can run side by side.
//!
//! [`PipelineConfig`] deserializes from partial JSON documents: missing
//! fields take their defaults.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::fft_detector::FftDetector;
use crate::hybrid::HybridDetector;
use crate::mpm::MpmDetector;
use crate::pitch::PitchDetector;
use crate::tuning::DEFAULT_CONCERT_PITCH;
use crate::yin::YinDetector;

/// Lowest frequency analysed by default (Hz).
pub const DEFAULT_MIN_FREQUENCY: f64 = 80.0;
/// Highest frequency analysed by default (Hz).
pub const DEFAULT_MAX_FREQUENCY: f64 = 4835.0;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_WINDOW_SIZE: usize = 4096;
pub const DEFAULT_HOP_SIZE: usize = 2048;
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.95;

/// Smallest window any detector can work with.
const MIN_WINDOW_SIZE: usize = 64;

/// Confidence thresholds offered to users, highest first (0.95 .. 0.05).
static SUPPORTED_CONFIDENCES: Lazy<Vec<f64>> =
    Lazy::new(|| (1..=19).rev().map(|i| f64::from(i) / 20.0).collect());

/// The band of frequencies a detector reports, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    min: f64,
    max: f64,
}

impl Default for FrequencyRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_FREQUENCY,
            max: DEFAULT_MAX_FREQUENCY,
        }
    }
}

impl FrequencyRange {
    /// # Errors
    /// [`Error::InvalidFrequencyRange`] unless `0 < min < max` and both are finite.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Returns a copy with a new lower bound.
    pub fn with_min(self, min: f64) -> Result<Self> {
        Self::new(min, self.max)
    }

    /// Returns a copy with a new upper bound.
    pub fn with_max(self, max: f64) -> Result<Self> {
        Self::new(self.min, max)
    }

    /// Inclusive membership test. NaN is never contained.
    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.min && frequency <= self.max
    }

    pub fn validate(&self) -> Result<()> {
        let reason = if !(self.min.is_finite() && self.max.is_finite()) {
            Some("bounds must be finite")
        } else if self.min <= 0.0 {
            Some("min must be positive")
        } else if self.min >= self.max {
            Some("min must be below max")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(Error::InvalidFrequencyRange {
                min: self.min,
                max: self.max,
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// The selectable pitch detection algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Algorithm {
    Yin,
    #[default]
    Mpm,
    Fft,
    Hybrid,
}

impl Algorithm {
    /// All algorithms in settings-menu order.
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Yin,
        Algorithm::Mpm,
        Algorithm::Fft,
        Algorithm::Hybrid,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Yin => "YIN",
            Algorithm::Mpm => "MPM",
            Algorithm::Fft => "FFT",
            Algorithm::Hybrid => "HYBRID",
        }
    }

    /// Looks an algorithm up by its position in [`Algorithm::ALL`].
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL.get(index).copied().ok_or(Error::IndexOutOfRange {
            name: "algorithms",
            index,
            len: Self::ALL.len(),
        })
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|a| *a == self).unwrap_or(0)
    }

    /// Builds a fresh detector of this kind restricted to `range`.
    pub fn detector(self, range: FrequencyRange) -> Box<dyn PitchDetector> {
        match self {
            Algorithm::Yin => Box::new(YinDetector::new(range)),
            Algorithm::Mpm => Box::new(MpmDetector::new(range)),
            Algorithm::Fft => Box::new(FftDetector::new(range)),
            Algorithm::Hybrid => Box::new(HybridDetector::new(range)),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownAlgorithm(s.to_string()))
    }
}

/// Confidence thresholds offered to users, from 0.95 down to 0.05.
pub fn supported_confidences() -> &'static [f64] {
    &SUPPORTED_CONFIDENCES
}

/// Entry `index` of [`supported_confidences`].
pub fn confidence_by_index(index: usize) -> Result<f64> {
    SUPPORTED_CONFIDENCES
        .get(index)
        .copied()
        .ok_or(Error::IndexOutOfRange {
            name: "supported confidences",
            index,
            len: SUPPORTED_CONFIDENCES.len(),
        })
}

/// Everything needed to run a [`PitchPipeline`](crate::stream::PitchPipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample rate of the incoming stream in Hz.
    pub sample_rate: u32,
    /// Samples per analysis window.
    pub window_size: usize,
    /// Samples between the starts of consecutive windows.
    pub hop_size: usize,
    /// Completed windows that may wait for the worker before the oldest is dropped.
    pub queue_capacity: usize,
    pub algorithm: Algorithm,
    pub frequency_range: FrequencyRange,
    /// Frequency of A4 in Hz.
    pub concert_pitch: f64,
    /// Results below this confidence are not acted upon by callers.
    pub confidence_threshold: f64,
    pub chord_detection: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            window_size: DEFAULT_WINDOW_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            algorithm: Algorithm::default(),
            frequency_range: FrequencyRange::default(),
            concert_pitch: DEFAULT_CONCERT_PITCH,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            chord_detection: false,
        }
    }
}

impl PipelineConfig {
    /// Checks every field; the pipeline refuses to start on the first failure.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidSize {
                name: "sample_rate",
                value: 0,
                reason: "must be positive",
            });
        }
        if self.window_size < MIN_WINDOW_SIZE {
            return Err(Error::InvalidSize {
                name: "window_size",
                value: self.window_size,
                reason: "must be at least 64 samples",
            });
        }
        check_hop(self.hop_size, self.window_size)?;
        if self.queue_capacity == 0 {
            return Err(Error::InvalidSize {
                name: "queue_capacity",
                value: 0,
                reason: "must hold at least one window",
            });
        }
        self.frequency_range.validate()?;
        let nyquist = f64::from(self.sample_rate) / 2.0;
        if self.frequency_range.max() >= nyquist {
            return Err(Error::InvalidFrequencyRange {
                min: self.frequency_range.min(),
                max: self.frequency_range.max(),
                reason: "max must be below the Nyquist frequency",
            });
        }
        if !(self.concert_pitch.is_finite() && self.concert_pitch > 0.0) {
            return Err(Error::InvalidConcertPitch(self.concert_pitch));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::InvalidParameter {
                name: "confidence_threshold",
                value: self.confidence_threshold,
                reason: "must be between 0 and 1",
            });
        }
        Ok(())
    }
}

/// Hop sizes must satisfy `1 <= hop <= window`.
pub(crate) fn check_hop(hop_size: usize, window_size: usize) -> Result<()> {
    if hop_size == 0 || hop_size > window_size {
        return Err(Error::InvalidSize {
            name: "hop_size",
            value: hop_size,
            reason: "must be between 1 and the window size",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_range_covers_the_harmonica() {
        let range = FrequencyRange::default();
        assert_eq!(range.min(), 80.0);
        assert_eq!(range.max(), 4835.0);
        assert!(range.contains(80.0) && range.contains(4835.0));
        assert!(!range.contains(f64::NAN));
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(FrequencyRange::new(0.0, 100.0).is_err());
        assert!(FrequencyRange::new(500.0, 500.0).is_err());
        assert!(FrequencyRange::new(1000.0, 500.0).is_err());
        assert!(FrequencyRange::new(80.0, f64::INFINITY).is_err());
        assert!(FrequencyRange::default().with_min(5000.0).is_err());
    }

    #[test]
    fn algorithm_names_round_trip() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.name().parse::<Algorithm>().unwrap(), algorithm);
            assert_eq!(Algorithm::from_index(algorithm.index()).unwrap(), algorithm);
        }
        assert_eq!("hybrid".parse::<Algorithm>().unwrap(), Algorithm::Hybrid);
        assert!("zcr".parse::<Algorithm>().is_err());
        assert!(Algorithm::from_index(4).is_err());
    }

    #[test]
    fn confidences_step_down_by_five_hundredths() {
        let list = supported_confidences();
        assert_eq!(list.len(), 19);
        assert_eq!(list[0], 0.95);
        assert_eq!(list[18], 0.05);
        assert_eq!(confidence_by_index(1).unwrap(), 0.9);
        assert!(confidence_by_index(19).is_err());
    }

    #[test]
    fn default_pipeline_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn pipeline_config_rejects_bad_sizes() {
        let config = PipelineConfig {
            hop_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            hop_size: 8192,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            sample_rate: 8000,
            ..Default::default()
        };
        assert!(config.validate().is_err(), "4835 Hz is above Nyquist at 8 kHz");
    }

    #[test]
    fn confidence_threshold_must_be_a_fraction() {
        let config = PipelineConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidParameter {
                name: "confidence_threshold",
                ..
            }
        ));
        let message = err.to_string();
        assert!(message.contains("1.5"), "{message}");
        assert!(!message.contains("Hz"), "{message}");
    }
}
