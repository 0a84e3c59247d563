use std::f64::consts::PI;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver};

use harp_core::{AnalysisResult, Algorithm, FrequencyRange, PipelineConfig, PitchPipeline};

const TIMEOUT: Duration = Duration::from_secs(10);

fn sine(frequency: f64, sample_rate: u32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (2.0 * PI * frequency * i as f64 / f64::from(sample_rate)).sin() as f32 * 0.5)
        .collect()
}

fn small_config() -> PipelineConfig {
    PipelineConfig {
        sample_rate: 8000,
        window_size: 512,
        hop_size: 256,
        frequency_range: FrequencyRange::new(80.0, 3000.0).unwrap(),
        ..PipelineConfig::default()
    }
}

fn collect(results: &Receiver<AnalysisResult>, count: usize) -> Vec<AnalysisResult> {
    (0..count)
        .map(|_| results.recv_timeout(TIMEOUT).expect("pipeline produced no result"))
        .collect()
}

#[test]
fn results_arrive_in_window_order() {
    let (tx, rx) = unbounded();
    let config = PipelineConfig {
        queue_capacity: 64,
        ..small_config()
    };
    let (mut pipeline, mut sink) = PitchPipeline::start(config, move |result: AnalysisResult| {
        let _ = tx.send(result);
    })
    .unwrap();

    // 512 + 9 * 256 samples make exactly ten windows, fed in odd-sized chunks.
    let signal = sine(440.0, 8000, 512 + 9 * 256);
    for chunk in signal.chunks(333) {
        sink.push_samples(chunk);
    }

    let results = collect(&rx, 10);
    let sequences: Vec<u64> = results.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, (0..10).collect::<Vec<u64>>());
    for result in &results {
        let frequency = result.detected_frequency.expect("a clean sine is detected");
        assert!((frequency - 440.0).abs() < 5.0, "{frequency}");
        assert_eq!(result.note_name.as_deref(), Some("A4"));
        assert_eq!(result.algorithm, Algorithm::Mpm);
    }

    pipeline.stop();
    assert_eq!(pipeline.processed_windows(), 10);
    assert_eq!(pipeline.dropped_windows(), 0);
}

#[test]
fn a_slow_handler_loses_the_oldest_windows() {
    let (started_tx, started_rx) = bounded::<()>(1);
    let (gate_tx, gate_rx) = bounded::<()>(1);
    let (tx, rx) = unbounded();

    let config = PipelineConfig {
        window_size: 64,
        hop_size: 64,
        queue_capacity: 2,
        ..small_config()
    };
    let (mut pipeline, mut sink) = PitchPipeline::start(config, move |result: AnalysisResult| {
        if result.sequence == 0 {
            let _ = started_tx.send(());
            let _ = gate_rx.recv_timeout(TIMEOUT);
        }
        let _ = tx.send(result.sequence);
    })
    .unwrap();

    sink.push_samples(&[0.0; 64]);
    started_rx.recv_timeout(TIMEOUT).unwrap();

    // The worker is stuck on window 0 while ten more windows arrive.
    sink.push_samples(&[0.0; 640]);
    assert_eq!(sink.dropped_windows(), 8);
    gate_tx.send(()).unwrap();

    let sequences: Vec<u64> = (0..3).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
    assert_eq!(sequences, vec![0, 9, 10]);

    pipeline.stop();
    assert_eq!(pipeline.dropped_windows(), 8);
    assert_eq!(pipeline.processed_windows(), 3);
}

#[test]
fn stop_is_idempotent_and_silences_the_sink() {
    let (tx, rx) = unbounded();
    let (mut pipeline, mut sink) = PitchPipeline::start(small_config(), move |result: AnalysisResult| {
        let _ = tx.send(result);
    })
    .unwrap();
    assert!(pipeline.is_running());
    assert!(sink.is_active());

    pipeline.stop();
    pipeline.stop();
    assert!(!pipeline.is_running());

    sink.push_samples(&sine(440.0, 8000, 4096));
    assert!(!sink.is_active());
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(pipeline.processed_windows(), 0);
}

#[test]
fn configuration_changes_apply_to_later_windows() {
    let (tx, rx) = unbounded();
    let config = PipelineConfig {
        queue_capacity: 16,
        ..small_config()
    };
    let (mut pipeline, mut sink) = PitchPipeline::start(config, move |result: AnalysisResult| {
        let _ = tx.send(result);
    })
    .unwrap();
    // Two overlapping windows cut from one continuous tone.
    let signal = sine(440.0, 8000, 768);

    sink.push_samples(&signal[..512]);
    let before = collect(&rx, 1).remove(0);
    assert_eq!(before.algorithm, Algorithm::Mpm);
    assert!(before.chord.is_none());

    pipeline.set_algorithm(Algorithm::Yin);
    pipeline.set_chord_detection(true);
    pipeline.set_concert_pitch(442.0).unwrap();
    assert!(pipeline.set_concert_pitch(-1.0).is_err());
    assert!(pipeline.set_frequency_range(FrequencyRange::new(100.0, 1000.0).unwrap()).is_ok());
    assert_eq!(pipeline.config().concert_pitch, 442.0);
    assert_eq!(pipeline.config().algorithm, Algorithm::Yin);

    // The hop keeps 256 samples pending, so one more window needs 256 new ones.
    sink.push_samples(&signal[512..]);
    let after = collect(&rx, 1).remove(0);
    assert_eq!(after.sequence, 1);
    assert_eq!(after.algorithm, Algorithm::Yin);
    assert!(after.chord.is_some());
    // Measured against A4 = 442 Hz now.
    let cents = after.cents_deviation.unwrap();
    assert!((cents + 7.85).abs() < 5.0, "{cents}");
}

#[test]
fn invalid_configurations_refuse_to_start() {
    let cases = [
        PipelineConfig {
            hop_size: 0,
            ..PipelineConfig::default()
        },
        PipelineConfig {
            hop_size: 8192,
            ..PipelineConfig::default()
        },
        PipelineConfig {
            queue_capacity: 0,
            ..PipelineConfig::default()
        },
        PipelineConfig {
            concert_pitch: 0.0,
            ..PipelineConfig::default()
        },
        PipelineConfig {
            sample_rate: 8000,
            ..PipelineConfig::default()
        },
    ];
    for config in cases {
        assert!(PitchPipeline::start(config, |_: AnalysisResult| {}).is_err());
    }
}

#[test]
fn partial_json_config_uses_defaults() {
    let config: PipelineConfig = serde_json::from_str(
        r#"{ "algorithm": "YIN", "window_size": 2048, "hop_size": 1024 }"#,
    )
    .unwrap();
    assert_eq!(config.algorithm, Algorithm::Yin);
    assert_eq!(config.window_size, 2048);
    assert_eq!(config.hop_size, 1024);
    assert_eq!(config.sample_rate, 44_100);
    assert_eq!(config.queue_capacity, 8);
    assert_eq!(config.concert_pitch, 440.0);
    assert_eq!(config.frequency_range, FrequencyRange::default());
    assert!(config.validate().is_ok());

    let json = serde_json::to_value(PipelineConfig::default()).unwrap();
    assert_eq!(json["algorithm"], "MPM");
    assert_eq!(json["frequency_range"]["max"], 4835.0);

    let result: Result<PipelineConfig, _> = serde_json::from_str(r#"{ "algorithm": "ZCR" }"#);
    assert!(result.is_err());
}
