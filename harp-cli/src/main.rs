//! # Harmonica Tuner - Terminal Front End
//!
//! Captures audio from an input device, runs it through the `harp-core`
//! pitch pipeline and prints one status line per analysed window.
//!
//! ## Architecture
//! - **Audio callback**: feeds samples into the pipeline's sample sink
//! - **Analysis worker**: owned by [`PitchPipeline`], sends results back over a channel
//! - **Stdin thread**: forwards typed commands (algorithm switches, concert pitch, quit)
//! - **Main thread**: selects over results, commands and the optional deadline

mod display;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{after, never, select, unbounded, Receiver};
use log::{info, warn};

use harp_core::audio;
use harp_core::{
    Algorithm, AnalysisResult, FrequencyRange, NoteLookup, PipelineConfig, PitchPipeline,
};

use display::{format_result, CentSmoother};

/// Real-time harmonica pitch detection in the terminal
#[derive(Parser, Debug)]
#[command(name = "harp-tuner", version, about, long_about = None)]
struct Args {
    /// Detection algorithm: YIN, MPM, FFT or HYBRID
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    /// Frequency of A4 in Hz
    #[arg(short = 'p', long)]
    concert_pitch: Option<f64>,

    /// Lowest reported frequency in Hz
    #[arg(long)]
    min_frequency: Option<f64>,

    /// Highest reported frequency in Hz
    #[arg(long)]
    max_frequency: Option<f64>,

    /// Samples per analysis window
    #[arg(short, long)]
    window_size: Option<usize>,

    /// Samples between consecutive windows
    #[arg(long)]
    hop_size: Option<usize>,

    /// Minimum confidence for a pitch to be shown (0.0 - 1.0)
    #[arg(short, long)]
    confidence: Option<f64>,

    /// Input device name (use --list-devices to see options)
    #[arg(short, long)]
    device: Option<String>,

    /// JSON settings file; command line flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also detect simultaneous pitches
    #[arg(long, action)]
    chords: bool,

    /// Stop after this many seconds instead of waiting for an empty line
    #[arg(short, long)]
    seconds: Option<u64>,

    /// List available input devices and exit
    #[arg(long, action)]
    list_devices: bool,
}

/// A line typed while the tuner is running.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Quit,
    Algorithm(Algorithm),
    ConcertPitch(f64),
    Chords(bool),
}

impl Command {
    fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line.is_empty() || line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit") {
            return Some(Command::Quit);
        }
        if let Some(pitch) = line.strip_prefix("a=").or_else(|| line.strip_prefix("A=")) {
            return pitch.trim().parse().ok().map(Command::ConcertPitch);
        }
        match line.to_ascii_lowercase().as_str() {
            "chords on" => Some(Command::Chords(true)),
            "chords off" => Some(Command::Chords(false)),
            other => other.parse().ok().map(Command::Algorithm),
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_devices {
        for name in audio::list_input_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let device = audio::open_input(args.device.as_deref())?;
    let mut config = load_config(args.config.as_deref())?;
    config.sample_rate = device.sample_rate();
    apply_args(&mut config, &args)?;
    config.validate().context("invalid tuner settings")?;

    let mut lookup = NoteLookup::new(config.concert_pitch)?;
    let threshold = config.confidence_threshold;

    let (results_tx, results_rx) = unbounded::<AnalysisResult>();
    let (mut pipeline, sink) = PitchPipeline::start(config, move |result: AnalysisResult| {
        let _ = results_tx.send(result);
    })?;
    let stream = device.start(sink)?;

    let commands = spawn_stdin_reader();
    let deadline = match args.seconds {
        Some(seconds) => after(Duration::from_secs(seconds)),
        None => never(),
    };

    println!(
        "Listening on `{}` with {} (A4 = {} Hz). Type an algorithm name, `a=<Hz>`, `chords on|off`, or press Enter to quit.",
        device.name(),
        pipeline.config().algorithm,
        pipeline.config().concert_pitch
    );

    let mut smoother = CentSmoother::default();
    loop {
        select! {
            recv(results_rx) -> msg => match msg {
                Ok(result) => {
                    let cents = result.meets(threshold).then_some(result.cents_deviation).flatten();
                    let smoothed = smoother.push(cents);
                    println!("{}", format_result(&result, smoothed, threshold, &lookup));
                }
                Err(_) => break,
            },
            recv(commands) -> msg => match msg {
                Ok(Command::Quit) | Err(_) => break,
                Ok(Command::Algorithm(algorithm)) => {
                    pipeline.set_algorithm(algorithm);
                    println!("algorithm: {algorithm}");
                }
                Ok(Command::ConcertPitch(pitch)) => match pipeline.set_concert_pitch(pitch) {
                    Ok(()) => {
                        lookup.set_concert_pitch(pitch)?;
                        println!("concert pitch: {pitch} Hz");
                    }
                    Err(e) => warn!("{e}"),
                },
                Ok(Command::Chords(enabled)) => {
                    pipeline.set_chord_detection(enabled);
                    println!("chord detection: {}", if enabled { "on" } else { "off" });
                }
            },
            recv(deadline) -> _ => break,
        }
    }

    drop(stream);
    pipeline.stop();
    info!(
        "processed {} windows, dropped {}",
        pipeline.processed_windows(),
        pipeline.dropped_windows()
    );
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let config = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))?;
    info!("loaded settings from {}", path.display());
    Ok(config)
}

fn apply_args(config: &mut PipelineConfig, args: &Args) -> Result<()> {
    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm;
    }
    if let Some(pitch) = args.concert_pitch {
        config.concert_pitch = pitch;
    }
    let range = config.frequency_range;
    config.frequency_range = FrequencyRange::new(
        args.min_frequency.unwrap_or(range.min()),
        args.max_frequency.unwrap_or(range.max()),
    )?;
    if let Some(window) = args.window_size {
        config.window_size = window;
        // Keep the default 50% overlap unless a hop is given as well.
        if args.hop_size.is_none() {
            config.hop_size = (window / 2).max(1);
        }
    }
    if let Some(hop) = args.hop_size {
        config.hop_size = hop;
    }
    if let Some(confidence) = args.confidence {
        config.confidence_threshold = confidence;
    }
    if args.chords {
        config.chord_detection = true;
    }
    Ok(())
}

/// Forwards parsed stdin lines; unrecognised input is reported and skipped.
fn spawn_stdin_reader() -> Receiver<Command> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(command) => {
                    let quit = command == Command::Quit;
                    if tx.send(command).is_err() || quit {
                        break;
                    }
                }
                None => eprintln!("unrecognised command `{}`", line.trim()),
            }
        }
    });
    rx
}
