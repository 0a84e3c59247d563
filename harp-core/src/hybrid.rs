//! # Hybrid Pitch Detector
//!
//! Runs YIN and MPM on the same window and reconciles their answers. When
//! they disagree, an FFT peak estimate acts as the deciding vote.

use crate::cents::cents_between;
use crate::config::FrequencyRange;
use crate::fft_detector::FftDetector;
use crate::mpm::MpmDetector;
use crate::pitch::{PitchDetectionResult, PitchDetector};
use crate::yin::YinDetector;

/// Two estimates closer than this many cents count as the same pitch.
pub const AGREEMENT_CENTS: f64 = 35.0;

/// Confidence a lone or disputed estimate needs to be reported.
pub const MIN_CONFIDENCE: f64 = 0.5;

/// YIN + MPM combiner with an FFT tie-break.
pub struct HybridDetector {
    yin: YinDetector,
    mpm: MpmDetector,
    fft: FftDetector,
}

impl Default for HybridDetector {
    fn default() -> Self {
        Self::new(FrequencyRange::default())
    }
}

impl HybridDetector {
    pub fn new(range: FrequencyRange) -> Self {
        Self {
            yin: YinDetector::new(range),
            mpm: MpmDetector::new(range),
            fft: FftDetector::new(range),
        }
    }
}

fn agrees(a: &PitchDetectionResult, b: &PitchDetectionResult) -> bool {
    a.is_detected()
        && b.is_detected()
        && cents_between(a.pitch(), b.pitch()).abs() <= AGREEMENT_CENTS
}

fn more_confident(a: PitchDetectionResult, b: PitchDetectionResult) -> PitchDetectionResult {
    if b.confidence() > a.confidence() { b } else { a }
}

/// Combines the YIN and MPM estimates, consulting `vote` only on a dispute.
pub(crate) fn combine(
    yin: PitchDetectionResult,
    mpm: PitchDetectionResult,
    vote: impl FnOnce() -> PitchDetectionResult,
) -> PitchDetectionResult {
    match (yin.is_detected(), mpm.is_detected()) {
        (false, false) => PitchDetectionResult::none(),
        (true, false) | (false, true) => {
            let single = if yin.is_detected() { yin } else { mpm };
            if single.confidence() >= MIN_CONFIDENCE {
                single
            } else {
                PitchDetectionResult::none()
            }
        }
        (true, true) if agrees(&yin, &mpm) => more_confident(yin, mpm),
        (true, true) => {
            let vote = vote();
            match (agrees(&vote, &yin), agrees(&vote, &mpm)) {
                (true, false) => yin,
                (false, true) => mpm,
                _ => {
                    let best = more_confident(yin, mpm);
                    let strictly_higher = yin.confidence() != mpm.confidence();
                    if strictly_higher && best.confidence() >= MIN_CONFIDENCE {
                        best
                    } else {
                        PitchDetectionResult::none()
                    }
                }
            }
        }
    }
}

impl PitchDetector for HybridDetector {
    fn detect(&mut self, samples: &[f32], sample_rate: u32) -> PitchDetectionResult {
        let yin = self.yin.detect(samples, sample_rate);
        let mpm = self.mpm.detect(samples, sample_rate);
        let fft = &mut self.fft;
        combine(yin, mpm, || fft.detect(samples, sample_rate))
    }

    fn name(&self) -> &'static str {
        "HYBRID"
    }

    fn frequency_range(&self) -> FrequencyRange {
        self.yin.frequency_range()
    }

    fn set_frequency_range(&mut self, range: FrequencyRange) {
        self.yin.set_frequency_range(range);
        self.mpm.set_frequency_range(range);
        self.fft.set_frequency_range(range);
    }
}
