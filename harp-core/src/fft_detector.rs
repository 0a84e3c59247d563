//! # FFT Pitch Detector
//!
//! Picks the strongest spectral peak inside the configured range and refines
//! it with a parabola fitted to the log magnitudes of the three bins around
//! it (exact for the Gaussian-like main lobe of a Hann window).
//!
//! Confidence measures how far the peak stands above the average magnitude
//! of the band. Flat spectra such as white noise never reach
//! [`MIN_PROMINENCE`] and are reported as no pitch. An in-band peak that is
//! dwarfed by a maximum elsewhere in the spectrum is leakage from an
//! out-of-range tone and is rejected as well.

use crate::config::FrequencyRange;
use crate::fft::{bin_to_frequency, frequency_to_bin, SpectrumAnalyzer};
use crate::pitch::{
    in_range_result, is_silent, parabolic_offset, PitchDetectionResult, PitchDetector,
};

/// Smallest transform used, so short windows still get usable resolution.
pub const MIN_FFT_SIZE: usize = 2048;

/// Peak-to-mean magnitude ratio below which no pitch is reported.
pub const MIN_PROMINENCE: f64 = 8.0;

/// Prominence that maps to full confidence.
const FULL_CONFIDENCE_PROMINENCE: f64 = 20.0;

/// Smallest in-band peak, relative to the strongest bin of the whole spectrum.
const MIN_PEAK_SHARE: f64 = 0.1;

const MIN_SAMPLES: usize = 16;

/// FFT peak-picking detector.
pub struct FftDetector {
    range: FrequencyRange,
    analyzer: SpectrumAnalyzer,
}

impl Default for FftDetector {
    fn default() -> Self {
        Self::new(FrequencyRange::default())
    }
}

impl FftDetector {
    pub fn new(range: FrequencyRange) -> Self {
        Self {
            range,
            analyzer: SpectrumAnalyzer::new(),
        }
    }
}

/// Sub-bin offset of a peak from the log magnitudes of its neighbours.
///
/// Falls back to a plain parabola when a neighbour is zero.
fn interpolate_peak(left: f64, centre: f64, right: f64) -> f64 {
    if left > 0.0 && centre > 0.0 && right > 0.0 {
        parabolic_offset(left.ln(), centre.ln(), right.ln())
    } else {
        parabolic_offset(left, centre, right)
    }
}

impl PitchDetector for FftDetector {
    fn detect(&mut self, samples: &[f32], sample_rate: u32) -> PitchDetectionResult {
        if samples.len() < MIN_SAMPLES || sample_rate == 0 || is_silent(samples) {
            return PitchDetectionResult::none();
        }

        let fft_size = samples.len().next_power_of_two().max(MIN_FFT_SIZE);
        let magnitudes = self.analyzer.magnitudes(samples, fft_size);
        let last_bin = magnitudes.len() - 1;

        let low = frequency_to_bin(self.range.min(), sample_rate, fft_size).max(1);
        let high = (frequency_to_bin(self.range.max(), sample_rate, fft_size) + 1).min(last_bin - 1);
        if low >= high {
            return PitchDetectionResult::none();
        }

        let band = &magnitudes[low..=high];
        let Some((offset, &peak)) = band
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            return PitchDetectionResult::none();
        };
        let bin = low + offset;

        // A band-edge maximum that keeps rising outside the band is leakage.
        if magnitudes[bin - 1] > peak || magnitudes[bin + 1] > peak {
            return PitchDetectionResult::none();
        }

        // So is a sidelobe of a stronger tone outside the band.
        let strongest = magnitudes[1..=last_bin].iter().copied().fold(0.0, f64::max);
        if peak < strongest * MIN_PEAK_SHARE {
            return PitchDetectionResult::none();
        }

        let mean = band.iter().sum::<f64>() / band.len() as f64;
        if !mean.is_finite() || mean <= 0.0 {
            return PitchDetectionResult::none();
        }
        let prominence = peak / mean;
        if prominence < MIN_PROMINENCE {
            return PitchDetectionResult::none();
        }

        let shift = interpolate_peak(magnitudes[bin - 1], peak, magnitudes[bin + 1]);
        let pitch = bin_to_frequency(bin as f64 + shift, sample_rate, fft_size);
        let confidence = (prominence / FULL_CONFIDENCE_PROMINENCE).min(1.0);

        in_range_result(pitch, confidence, &self.range)
    }

    fn name(&self) -> &'static str {
        "FFT"
    }

    fn frequency_range(&self) -> FrequencyRange {
        self.range
    }

    fn set_frequency_range(&mut self, range: FrequencyRange) {
        self.range = range;
    }
}
