//! Crate-level error type.
//!
//! Every variant is an invalid-argument condition raised synchronously by the
//! function that received the bad input. "No pitch detected" is not an error:
//! detectors report it through [`PitchDetectionResult::none`](crate::pitch::PitchDetectionResult::none).

/// Errors returned by `harp-core`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A note name did not match `<letter>[#|b]<octave>` or lies outside C0..B8.
    #[error("invalid note name `{0}`: expected <letter>[#]<octave> within C0..B8, e.g. \"A4\" or \"C#3\"")]
    InvalidNoteName(String),

    /// A frequency argument was zero, negative or not finite.
    #[error("invalid frequency for `{name}`: got {value} Hz, must be a positive finite number")]
    InvalidFrequency { name: &'static str, value: f64 },

    /// A frequency range violated `0 < min < max`.
    #[error("invalid frequency range: min={min} Hz, max={max} Hz ({reason})")]
    InvalidFrequencyRange {
        min: f64,
        max: f64,
        reason: &'static str,
    },

    /// The A4 reference frequency was zero, negative or not finite.
    #[error("invalid concert pitch {0} Hz: must be a positive finite number")]
    InvalidConcertPitch(f64),

    /// An algorithm name that is not one of YIN, MPM, FFT, HYBRID.
    #[error("unknown algorithm `{0}`: expected one of YIN, MPM, FFT, HYBRID")]
    UnknownAlgorithm(String),

    /// A size parameter (window, hop, queue, sample rate) is unusable.
    #[error("invalid size for `{name}`: {value} ({reason})")]
    InvalidSize {
        name: &'static str,
        value: usize,
        reason: &'static str,
    },

    /// A dimensionless parameter outside its allowed interval.
    #[error("invalid value for `{name}`: {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// An index into one of the supported-value lists is out of range.
    #[error("index {index} out of range for {name} (len {len})")]
    IndexOutOfRange {
        name: &'static str,
        index: usize,
        len: usize,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Checks that `value` is a positive, finite frequency.
pub(crate) fn check_frequency(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidFrequency { name, value })
    }
}
