use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use harp_core::{
    Algorithm, ChordDetector, FftDetector, FrequencyRange, HybridDetector, MpmDetector,
    NoteLookup, PitchDetectionResult, PitchDetector, YinDetector, NO_DETECTED_PITCH,
};

const SAMPLE_RATE: u32 = 44_100;
const ONE_SECOND: usize = SAMPLE_RATE as usize;

fn sine(frequency: f64, amplitude: f64, len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f64 / f64::from(SAMPLE_RATE)).sin())
        .collect()
}

fn mix(parts: &[Vec<f64>]) -> Vec<f32> {
    let len = parts.iter().map(Vec::len).min().unwrap_or(0);
    (0..len)
        .map(|i| parts.iter().map(|p| p[i]).sum::<f64>() as f32)
        .collect()
}

fn white_noise(len: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(123);
    (0..len).map(|_| rng.random_range(-1.0..1.0)).collect()
}

fn all_detectors(range: FrequencyRange) -> Vec<Box<dyn PitchDetector>> {
    Algorithm::ALL.iter().map(|a| a.detector(range)).collect()
}

fn assert_no_pitch(name: &str, result: PitchDetectionResult) {
    assert!(!result.is_detected(), "{name} detected {result}");
    assert_eq!(result.pitch(), NO_DETECTED_PITCH, "{name}");
    assert_eq!(result.confidence(), 0.0, "{name}");
}

#[test]
fn yin_sin_signal() {
    let signal = mix(&[sine(440.0, 1.0, ONE_SECOND)]);
    let result = YinDetector::default().detect(&signal, SAMPLE_RATE);
    assert!((result.pitch() - 440.0).abs() <= 0.5, "YIN: {result}");
    assert!(result.confidence() > 0.9, "YIN: {result}");
}

#[test]
fn mpm_sin_signal() {
    let signal = mix(&[sine(440.0, 1.0, ONE_SECOND)]);
    let result = MpmDetector::default().detect(&signal, SAMPLE_RATE);
    assert!((result.pitch() - 440.0).abs() <= 1.0, "MPM: {result}");
    assert!(result.confidence() > 0.9, "MPM: {result}");
}

#[test]
fn fft_and_hybrid_sin_signal() {
    let signal = mix(&[sine(440.0, 1.0, 4096)]);
    let fft = FftDetector::default().detect(&signal, SAMPLE_RATE);
    assert!((fft.pitch() - 440.0).abs() <= 2.0, "FFT: {fft}");

    let hybrid = HybridDetector::default().detect(&signal, SAMPLE_RATE);
    assert!((hybrid.pitch() - 440.0).abs() <= 1.0, "HYBRID: {hybrid}");
    assert!(hybrid.confidence() > 0.9, "HYBRID: {hybrid}");
}

#[test]
fn harmonica_range_sine_signals() {
    for frequency in [196.0, 261.63, 1174.66, 2349.32] {
        let signal = mix(&[sine(frequency, 0.5, 4096)]);
        for mut detector in all_detectors(FrequencyRange::default()) {
            let result = detector.detect(&signal, SAMPLE_RATE);
            let cents = 1200.0 * (result.pitch() / frequency).log2();
            assert!(cents.abs() < 10.0, "{} at {frequency} Hz: {result}", detector.name());
        }
    }
}

#[test]
fn silence_yields_no_pitch() {
    let silence = vec![0.0f32; ONE_SECOND];
    for mut detector in all_detectors(FrequencyRange::default()) {
        let result = detector.detect(&silence, SAMPLE_RATE);
        assert_no_pitch(detector.name(), result);
    }
    assert!(!ChordDetector::default().detect_chord(&silence, SAMPLE_RATE).has_pitches());
}

#[test]
fn white_noise_yields_no_pitch() {
    let noise = white_noise(ONE_SECOND);
    for mut detector in all_detectors(FrequencyRange::default()) {
        let result = detector.detect(&noise, SAMPLE_RATE);
        assert_no_pitch(detector.name(), result);
    }
    assert!(!ChordDetector::default().detect_chord(&noise, SAMPLE_RATE).has_pitches());
}

#[test]
fn dominant_tone_wins_over_weaker_interference() {
    // (interfering amplitude, tolerance in Hz, minimum confidence)
    let cases = [(0.3, 5.0, 0.8), (0.5, 10.0, 0.3)];
    let main = 934.6;

    let detectors: [Box<dyn PitchDetector>; 2] = [
        Box::new(YinDetector::default()),
        Box::new(MpmDetector::default()),
    ];
    for mut detector in detectors {
        let mut previous_confidence = f64::INFINITY;
        for (amplitude, tolerance, min_confidence) in cases {
            let signal = mix(&[sine(main, 1.0, ONE_SECOND), sine(460.0, amplitude, ONE_SECOND)]);
            let result = detector.detect(&signal, SAMPLE_RATE);
            let name = detector.name();
            assert!((result.pitch() - main).abs() <= tolerance, "{name} at {amplitude}: {result}");
            assert!(result.confidence() > min_confidence, "{name} at {amplitude}: {result}");
            assert!(
                result.confidence() < previous_confidence,
                "{name}: confidence must fall as the interference grows"
            );
            previous_confidence = result.confidence();
        }
    }
}

#[test]
fn hybrid_resolves_the_dominant_tone() {
    let signal = mix(&[sine(934.6, 1.0, ONE_SECOND), sine(460.0, 0.3, ONE_SECOND)]);
    let result = HybridDetector::default().detect(&signal, SAMPLE_RATE);
    assert!((result.pitch() - 934.6).abs() <= 5.0, "{result}");
    assert!(result.confidence() > 0.8, "{result}");
}

#[test]
fn out_of_range_tones_are_rejected() {
    let range = FrequencyRange::new(500.0, 1000.0).unwrap();
    let signal = mix(&[sine(440.0, 1.0, ONE_SECOND)]);
    for mut detector in all_detectors(range) {
        let result = detector.detect(&signal, SAMPLE_RATE);
        assert_no_pitch(detector.name(), result);
    }

    // The same tone is found once the range admits it again.
    let mut detector = MpmDetector::new(range);
    detector.set_frequency_range(FrequencyRange::default());
    assert!(detector.detect(&signal, SAMPLE_RATE).is_detected());
}

#[test]
fn detection_is_idempotent() {
    let signal = mix(&[sine(523.25, 0.8, 4096), sine(1046.5, 0.2, 4096)]);
    let other = mix(&[sine(196.0, 0.8, 8192)]);
    for mut detector in all_detectors(FrequencyRange::default()) {
        let first = detector.detect(&signal, SAMPLE_RATE);
        // A differently sized window in between must not leak into the next call.
        detector.detect(&other, SAMPLE_RATE);
        let second = detector.detect(&signal, SAMPLE_RATE);
        assert_eq!(first, second, "{}", detector.name());
    }
}

#[test]
fn detectors_are_independently_configured() {
    let narrow = FrequencyRange::new(500.0, 1000.0).unwrap();
    let mut restricted = YinDetector::new(narrow);
    let mut open = YinDetector::default();
    let signal = mix(&[sine(440.0, 1.0, 4096)]);

    assert!(!restricted.detect(&signal, SAMPLE_RATE).is_detected());
    assert!(open.detect(&signal, SAMPLE_RATE).is_detected());
    assert_eq!(restricted.frequency_range(), narrow);
}

#[test]
fn c_major_chord() {
    let len = 8192;
    let signal = mix(&[
        sine(261.63, 0.5, len),
        sine(329.63, 0.5, len),
        sine(392.0, 0.5, len),
    ]);
    let chord = ChordDetector::default().detect_chord(&signal, SAMPLE_RATE);

    assert_eq!(chord.pitch_count(), 3, "{chord}");
    for (found, expected) in chord.pitches().iter().zip([261.63, 329.63, 392.0]) {
        assert!((found - expected).abs() < 3.0, "{found} vs {expected}");
    }
    assert!(chord.confidence() > 0.5);
    assert_eq!(chord.note_names(&NoteLookup::default()), ["C4", "E4", "G4"]);
}

#[test]
fn chord_detector_reports_its_lowest_pitch() {
    let len = 8192;
    let signal = mix(&[sine(440.0, 0.5, len), sine(554.37, 0.5, len)]);
    let mut detector = ChordDetector::default();
    let result = detector.detect(&signal, SAMPLE_RATE);
    assert!((result.pitch() - 440.0).abs() < 3.0, "{result}");
    assert_eq!(detector.name(), "CHORD");
}
