//! # YIN Pitch Detector
//!
//! Estimates the fundamental from the cumulative mean normalized difference
//! function (CMNDF) of the window:
//!
//! ```text
//! d(t)  = sum_{i<W} (x_i - x_{i+t})^2,         W = n / 2
//! d'(t) = d(t) / ((1/t) * sum_{j=1..t} d(j)),   d'(0) = 1
//! ```
//!
//! `d(t)` is expanded into two energy terms and a windowed autocorrelation,
//! the latter computed with an FFT.
//!
//! The first lag whose CMNDF falls below [`ABSOLUTE_THRESHOLD`] is followed
//! down to its local minimum; without such a lag the global minimum is used
//! if it is clear enough. Parabolic interpolation refines the lag.

use crate::config::FrequencyRange;
use crate::fft::Correlator;
use crate::pitch::{
    in_range_result, is_silent, parabolic_offset, parabolic_value, PitchDetectionResult,
    PitchDetector,
};

/// CMNDF level a dip must reach to be taken as the period.
pub const ABSOLUTE_THRESHOLD: f64 = 0.5;

/// Largest CMNDF accepted when no dip crossed [`ABSOLUTE_THRESHOLD`].
pub const FALLBACK_THRESHOLD: f64 = 0.6;

/// Lag search is widened by this many cents on both ends of the range.
const LAG_MARGIN_CENTS: f64 = 25.0;

/// Smallest window worth analysing.
const MIN_SAMPLES: usize = 16;

/// YIN detector with its own frequency range and reusable buffers.
pub struct YinDetector {
    range: FrequencyRange,
    correlator: Correlator,
    signal: Vec<f64>,
    energy: Vec<f64>,
    correlation: Vec<f64>,
    cmndf: Vec<f64>,
}

impl Default for YinDetector {
    fn default() -> Self {
        Self::new(FrequencyRange::default())
    }
}

impl YinDetector {
    pub fn new(range: FrequencyRange) -> Self {
        Self {
            range,
            correlator: Correlator::new(),
            signal: Vec::new(),
            energy: Vec::new(),
            correlation: Vec::new(),
            cmndf: Vec::new(),
        }
    }

    /// Fills `self.cmndf` for lags `0..n/2`.
    fn compute_cmndf(&mut self, samples: &[f32]) {
        self.signal.clear();
        self.signal.extend(samples.iter().map(|&s| f64::from(s)));
        let window = self.signal.len() / 2;

        // energy[k] = sum of x_i^2 for i < k
        self.energy.clear();
        self.energy.push(0.0);
        let mut acc = 0.0;
        for &x in &self.signal {
            acc += x * x;
            self.energy.push(acc);
        }

        self.correlator
            .windowed_autocorrelation(&self.signal, window, &mut self.correlation);

        let base = self.energy[window];
        self.cmndf.clear();
        self.cmndf.push(1.0);
        let mut running_sum = 0.0;
        for tau in 1..window {
            let shifted = self.energy[tau + window] - self.energy[tau];
            let difference = (base + shifted - 2.0 * self.correlation[tau]).max(0.0);
            running_sum += difference;
            let value = if running_sum > f64::EPSILON * base.max(1.0) {
                difference * tau as f64 / running_sum
            } else {
                1.0
            };
            self.cmndf.push(value);
        }
    }

    /// Lag bounds for the configured range, or `None` if the window is too short.
    fn lag_bounds(&self, sample_rate: u32) -> Option<(usize, usize)> {
        let sample_rate = f64::from(sample_rate);
        let widen = 2f64.powf(LAG_MARGIN_CENTS / 1200.0);
        let tau_min = ((sample_rate / (self.range.max() * widen)).floor() as usize).max(2);
        let tau_max = ((sample_rate / (self.range.min() / widen)).floor() as usize)
            .min(self.cmndf.len().saturating_sub(2));
        (tau_min < tau_max).then_some((tau_min, tau_max))
    }

    /// First dip below the threshold, followed to its minimum.
    fn first_dip(&self, tau_min: usize, tau_max: usize) -> Option<usize> {
        let cmndf = &self.cmndf;
        let mut tau = (tau_min..=tau_max).find(|&t| cmndf[t] < ABSOLUTE_THRESHOLD)?;
        while tau < tau_max && cmndf[tau + 1] < cmndf[tau] {
            tau += 1;
        }
        // Still falling at the edge: the real minimum lies outside the range.
        (cmndf[tau + 1] >= cmndf[tau]).then_some(tau)
    }

    /// Global minimum, accepted only if it is a clear interior minimum.
    fn global_minimum(&self, tau_min: usize, tau_max: usize) -> Option<usize> {
        let cmndf = &self.cmndf;
        let tau = (tau_min..=tau_max).min_by(|&a, &b| cmndf[a].total_cmp(&cmndf[b]))?;
        let is_local_minimum = cmndf[tau - 1] >= cmndf[tau] && cmndf[tau + 1] >= cmndf[tau];
        (is_local_minimum && cmndf[tau] < FALLBACK_THRESHOLD).then_some(tau)
    }
}

impl PitchDetector for YinDetector {
    fn detect(&mut self, samples: &[f32], sample_rate: u32) -> PitchDetectionResult {
        if samples.len() < MIN_SAMPLES || sample_rate == 0 || is_silent(samples) {
            return PitchDetectionResult::none();
        }

        self.compute_cmndf(samples);

        let Some((tau_min, tau_max)) = self.lag_bounds(sample_rate) else {
            return PitchDetectionResult::none();
        };
        let Some(tau) = self
            .first_dip(tau_min, tau_max)
            .or_else(|| self.global_minimum(tau_min, tau_max))
        else {
            return PitchDetectionResult::none();
        };

        let (y0, y1, y2) = (self.cmndf[tau - 1], self.cmndf[tau], self.cmndf[tau + 1]);
        let offset = parabolic_offset(y0, y1, y2);
        let refined_tau = tau as f64 + offset;
        let value = parabolic_value(y0, y1, y2, offset).clamp(0.0, 1.0);

        let pitch = f64::from(sample_rate) / refined_tau;
        in_range_result(pitch, 1.0 - value, &self.range)
    }

    fn name(&self) -> &'static str {
        "YIN"
    }

    fn frequency_range(&self) -> FrequencyRange {
        self.range
    }

    fn set_frequency_range(&mut self, range: FrequencyRange) {
        self.range = range;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f64, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * frequency * i as f64 / f64::from(sample_rate)).sin() as f32)
            .collect()
    }

    #[test]
    fn cmndf_dips_at_the_period() {
        let mut detector = YinDetector::default();
        // 441 Hz at 44.1 kHz has a period of exactly 100 samples.
        detector.compute_cmndf(&sine(441.0, 44_100, 2048));
        assert_eq!(detector.cmndf[0], 1.0);
        assert!(detector.cmndf[100] < 0.01);
        assert!(detector.cmndf[50] > 1.0);
    }

    #[test]
    fn detects_a_sine() {
        let mut detector = YinDetector::default();
        let result = detector.detect(&sine(441.0, 44_100, 4096), 44_100);
        assert!((result.pitch() - 441.0).abs() < 0.5, "{result}");
        assert!(result.confidence() > 0.9);
    }

    #[test]
    fn short_windows_yield_nothing() {
        let mut detector = YinDetector::default();
        assert!(!detector.detect(&[0.5, -0.5, 0.5], 44_100).is_detected());
        assert!(!detector.detect(&sine(441.0, 44_100, 64), 0).is_detected());
    }
}
