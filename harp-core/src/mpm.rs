//! # McLeod Pitch Method (MPM)
//!
//! Builds the normalized square difference function
//!
//! ```text
//! nsdf(t) = 2 * r(t) / m(t)
//! r(t)    = sum_{i<n-t} x_i * x_{i+t}
//! m(t)    = sum_{i<n-t} (x_i^2 + x_{i+t}^2)
//! ```
//!
//! and picks the first *key maximum* (the highest point of each positive lobe
//! after the first negative-going zero crossing) that reaches
//! [`PEAK_FRACTION`] of the highest key maximum. `r(t)` comes from an FFT
//! autocorrelation, `m(t)` from a running recurrence.

use crate::config::FrequencyRange;
use crate::fft::Correlator;
use crate::pitch::{
    in_range_result, is_silent, parabolic_offset, parabolic_value, PitchDetectionResult,
    PitchDetector,
};

/// The MPM "k" constant: a key maximum must reach this fraction of the highest one.
pub const PEAK_FRACTION: f64 = 0.5;

/// Key maxima below this NSDF value are not reported as a pitch.
pub const MIN_CLARITY: f64 = 0.5;

/// Lag search margins relative to the configured range.
const MIN_FREQUENCY_MARGIN: f64 = 0.9;
const MAX_FREQUENCY_MARGIN: f64 = 1.1;

const MIN_SAMPLES: usize = 16;

/// MPM detector with its own frequency range and reusable buffers.
pub struct MpmDetector {
    range: FrequencyRange,
    correlator: Correlator,
    signal: Vec<f64>,
    correlation: Vec<f64>,
    nsdf: Vec<f64>,
    key_maxima: Vec<usize>,
}

impl Default for MpmDetector {
    fn default() -> Self {
        Self::new(FrequencyRange::default())
    }
}

impl MpmDetector {
    pub fn new(range: FrequencyRange) -> Self {
        Self {
            range,
            correlator: Correlator::new(),
            signal: Vec::new(),
            correlation: Vec::new(),
            nsdf: Vec::new(),
            key_maxima: Vec::new(),
        }
    }

    /// Fills `self.nsdf` for lags `0..=max_lag`.
    fn compute_nsdf(&mut self, samples: &[f32], max_lag: usize) {
        self.signal.clear();
        self.signal.extend(samples.iter().map(|&s| f64::from(s)));
        let n = self.signal.len();

        self.correlator
            .autocorrelation(&self.signal, max_lag, &mut self.correlation);

        let mut m = 2.0 * self.correlation.first().copied().unwrap_or(0.0);
        let floor = f64::EPSILON * m.max(1.0);
        self.nsdf.clear();
        for (tau, &r) in self.correlation.iter().enumerate() {
            if tau > 0 {
                let head = self.signal[tau - 1];
                let tail = self.signal[n - tau];
                m -= head * head + tail * tail;
            }
            let value = if m > floor { 2.0 * r / m } else { 0.0 };
            self.nsdf.push(value.clamp(-1.0, 1.0));
        }
    }

    /// Collects key maxima with lags of at least `min_lag` into `self.key_maxima`.
    fn collect_key_maxima(&mut self, min_lag: usize) {
        self.key_maxima.clear();
        let nsdf = &self.nsdf;
        let Some(last) = nsdf.len().checked_sub(1) else {
            return;
        };

        // Skip the lobe around lag zero.
        let start = (1..=last).find(|&tau| nsdf[tau] <= 0.0).unwrap_or(last);

        let mut current: Option<usize> = None;
        for tau in start..=last {
            if nsdf[tau] > 0.0 {
                if current.is_none_or(|peak| nsdf[tau] > nsdf[peak]) {
                    current = Some(tau);
                }
            } else if let Some(peak) = current.take() {
                self.key_maxima.push(peak);
            }
        }
        // An unfinished lobe counts only once it has turned down.
        if let Some(peak) = current {
            if peak < last {
                self.key_maxima.push(peak);
            }
        }

        self.key_maxima.retain(|&peak| peak >= min_lag);
    }

    fn lag_bounds(&self, n: usize, sample_rate: u32) -> (usize, usize) {
        let sample_rate = f64::from(sample_rate);
        let min_lag =
            ((sample_rate / (self.range.max() * MAX_FREQUENCY_MARGIN)).floor() as usize).max(1);
        let max_lag =
            ((sample_rate / (self.range.min() * MIN_FREQUENCY_MARGIN)).floor() as usize).min(n / 2);
        (min_lag, max_lag)
    }
}

impl PitchDetector for MpmDetector {
    fn detect(&mut self, samples: &[f32], sample_rate: u32) -> PitchDetectionResult {
        if samples.len() < MIN_SAMPLES || sample_rate == 0 || is_silent(samples) {
            return PitchDetectionResult::none();
        }

        let (min_lag, max_lag) = self.lag_bounds(samples.len(), sample_rate);
        if min_lag + 2 > max_lag {
            return PitchDetectionResult::none();
        }

        self.compute_nsdf(samples, max_lag);
        self.collect_key_maxima(min_lag);

        let nsdf = &self.nsdf;
        let highest = self
            .key_maxima
            .iter()
            .map(|&peak| nsdf[peak])
            .fold(f64::NEG_INFINITY, f64::max);
        let Some(&peak) = self
            .key_maxima
            .iter()
            .find(|&&peak| nsdf[peak] >= PEAK_FRACTION * highest)
        else {
            return PitchDetectionResult::none();
        };
        if nsdf[peak] < MIN_CLARITY {
            return PitchDetectionResult::none();
        }

        let (y0, y1, y2) = (nsdf[peak - 1], nsdf[peak], nsdf[peak + 1]);
        let offset = parabolic_offset(y0, y1, y2);
        let clarity = parabolic_value(y0, y1, y2, offset);
        let pitch = f64::from(sample_rate) / (peak as f64 + offset);

        in_range_result(pitch, clarity, &self.range)
    }

    fn name(&self) -> &'static str {
        "MPM"
    }

    fn frequency_range(&self) -> FrequencyRange {
        self.range
    }

    fn set_frequency_range(&mut self, range: FrequencyRange) {
        self.range = range;
    }
}
