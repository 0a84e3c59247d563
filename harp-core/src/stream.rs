//! # Streaming Pipeline
//!
//! Cuts a continuous sample stream into overlapping analysis windows and
//! analyses them on a dedicated worker thread.
//!
//! ## Threads
//! - **Capture side**: calls [`SampleSink::push_samples`] from the audio
//!   callback. It only copies samples and enqueues finished windows; it
//!   never blocks and never runs detection.
//! - **Worker**: owns the [`Analyzer`], takes windows in FIFO order and hands
//!   every [`AnalysisResult`] to the registered [`PitchHandler`].
//!
//! The queue between them is bounded. When the worker falls behind, the
//! oldest waiting window is discarded to make room; survivors keep their
//! order. Configuration changes travel as control messages and are applied
//! between windows, never during a detection call.

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::analysis::Analyzer;
use crate::config::{check_hop, Algorithm, FrequencyRange, PipelineConfig};
use crate::error::{Error, Result};
use crate::pitch::AudioWindow;
use crate::AnalysisResult;

/// Receives analysis results on the worker thread.
///
/// Any `FnMut(AnalysisResult) + Send` closure is a handler.
pub trait PitchHandler: Send + 'static {
    fn handle(&mut self, result: AnalysisResult);
}

impl<F> PitchHandler for F
where
    F: FnMut(AnalysisResult) + Send + 'static,
{
    fn handle(&mut self, result: AnalysisResult) {
        self(result)
    }
}

/// Accumulates arbitrary-length chunks into fixed-size windows.
///
/// A window is emitted whenever `window_size` samples are pending; the
/// pending buffer then advances by `hop_size` samples.
#[derive(Debug, Clone)]
pub struct WindowAssembler {
    window_size: usize,
    hop_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    next_sequence: u64,
}

impl WindowAssembler {
    /// # Errors
    /// [`Error::InvalidSize`] unless `window_size > 0`, `1 <= hop_size <= window_size`
    /// and `sample_rate > 0`.
    pub fn new(window_size: usize, hop_size: usize, sample_rate: u32) -> Result<Self> {
        if window_size == 0 {
            return Err(Error::InvalidSize {
                name: "window_size",
                value: 0,
                reason: "must be positive",
            });
        }
        if sample_rate == 0 {
            return Err(Error::InvalidSize {
                name: "sample_rate",
                value: 0,
                reason: "must be positive",
            });
        }
        check_hop(hop_size, window_size)?;
        Ok(Self {
            window_size,
            hop_size,
            sample_rate,
            pending: Vec::with_capacity(window_size * 2),
            next_sequence: 0,
        })
    }

    /// Appends `chunk` and calls `emit` for every window it completes.
    pub fn push(&mut self, chunk: &[f32], mut emit: impl FnMut(AudioWindow)) {
        self.pending.extend_from_slice(chunk);

        while self.pending.len() >= self.window_size {
            let samples = self.pending[..self.window_size].to_vec();
            emit(AudioWindow::new(samples, self.sample_rate, self.next_sequence));
            self.next_sequence += 1;
            self.pending.drain(..self.hop_size);
        }
    }

    /// Samples waiting for the next window.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Windows emitted so far.
    pub fn windows_emitted(&self) -> u64 {
        self.next_sequence
    }
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    dropped: AtomicU64,
}

/// Capture-side end of the bounded window queue.
struct WindowQueue {
    tx: Sender<AudioWindow>,
    // Used only to evict the oldest window when the queue is full.
    evict: Receiver<AudioWindow>,
    counters: Arc<Counters>,
}

impl WindowQueue {
    /// Enqueues without blocking, dropping the oldest windows if full.
    fn push(&self, mut window: AudioWindow) {
        loop {
            match self.tx.try_send(window) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.evict.try_recv().is_ok() {
                        let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if dropped.is_power_of_two() {
                            warn!("analysis is falling behind: {dropped} windows dropped so far");
                        }
                    }
                    window = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Entry point for raw samples, held by the capture side.
///
/// After the pipeline stops, pushing is a silent no-op.
pub struct SampleSink {
    assembler: WindowAssembler,
    queue: Option<WindowQueue>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl SampleSink {
    /// Feeds mono samples in `[-1, 1]`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        if !self.running.load(Ordering::Acquire) {
            // Release the queue so the worker's channel can close.
            self.queue = None;
            return;
        }
        let Some(queue) = self.queue.as_ref() else {
            return;
        };
        self.assembler.push(samples, |window| queue.push(window));
    }

    /// False once the pipeline has stopped.
    pub fn is_active(&self) -> bool {
        self.queue.is_some() && self.running.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.assembler.sample_rate
    }

    /// Windows discarded because the worker fell behind.
    pub fn dropped_windows(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}

/// Configuration changes applied by the worker between windows.
#[derive(Debug, Clone, PartialEq)]
enum Control {
    Algorithm(Algorithm),
    FrequencyRange(FrequencyRange),
    ConcertPitch(f64),
    ChordDetection(bool),
}

/// A running analysis worker.
///
/// Stopping is idempotent and also happens on drop.
pub struct PitchPipeline {
    config: PipelineConfig,
    control_tx: Sender<Control>,
    shutdown_tx: Sender<()>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    worker: Option<JoinHandle<()>>,
}

impl PitchPipeline {
    /// Validates `config`, spawns the worker and returns the pipeline handle
    /// together with the sink the capture side should feed.
    pub fn start<H: PitchHandler>(config: PipelineConfig, handler: H) -> Result<(Self, SampleSink)> {
        config.validate()?;
        let assembler =
            WindowAssembler::new(config.window_size, config.hop_size, config.sample_rate)?;
        let analyzer = Analyzer::from_config(&config)?;

        let (window_tx, window_rx) = bounded::<AudioWindow>(config.queue_capacity);
        let (control_tx, control_rx) = unbounded::<Control>();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(Counters::default());

        let queue = WindowQueue {
            tx: window_tx,
            evict: window_rx.clone(),
            counters: Arc::clone(&counters),
        };

        let worker = {
            let worker = Worker {
                analyzer,
                handler,
                window_rx,
                control_rx,
                shutdown_rx,
                running: Arc::clone(&running),
                counters: Arc::clone(&counters),
            };
            thread::spawn(move || worker.run())
        };

        info!(
            "pitch pipeline started: {} window {} hop {} at {} Hz, range {:.0}-{:.0} Hz",
            config.algorithm,
            config.window_size,
            config.hop_size,
            config.sample_rate,
            config.frequency_range.min(),
            config.frequency_range.max()
        );

        let sink = SampleSink {
            assembler,
            queue: Some(queue),
            running: Arc::clone(&running),
            counters: Arc::clone(&counters),
        };
        let pipeline = Self {
            config,
            control_tx,
            shutdown_tx,
            running,
            counters,
            worker: Some(worker),
        };
        Ok((pipeline, sink))
    }

    /// The configuration as last set through this handle.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Windows analysed so far.
    pub fn processed_windows(&self) -> u64 {
        self.counters.processed.load(Ordering::Relaxed)
    }

    /// Windows discarded because the worker fell behind.
    pub fn dropped_windows(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Switches the detector from the next window on.
    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.config.algorithm = algorithm;
        self.send(Control::Algorithm(algorithm));
    }

    pub fn set_frequency_range(&mut self, range: FrequencyRange) -> Result<()> {
        range.validate()?;
        self.config.frequency_range = range;
        self.send(Control::FrequencyRange(range));
        Ok(())
    }

    /// # Errors
    /// [`Error::InvalidConcertPitch`] for non-positive or non-finite values;
    /// the running configuration is left untouched.
    pub fn set_concert_pitch(&mut self, concert_pitch: f64) -> Result<()> {
        if !(concert_pitch.is_finite() && concert_pitch > 0.0) {
            return Err(Error::InvalidConcertPitch(concert_pitch));
        }
        self.config.concert_pitch = concert_pitch;
        self.send(Control::ConcertPitch(concert_pitch));
        Ok(())
    }

    pub fn set_chord_detection(&mut self, enabled: bool) {
        self.config.chord_detection = enabled;
        self.send(Control::ChordDetection(enabled));
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// Windows still queued are discarded. Later calls do nothing.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown_tx.try_send(());
        if worker.join().is_err() {
            warn!("analysis worker panicked");
        }
        info!(
            "pitch pipeline stopped: {} windows processed, {} dropped",
            self.processed_windows(),
            self.dropped_windows()
        );
    }

    fn send(&self, control: Control) {
        if self.control_tx.send(control).is_err() {
            debug!("analysis worker already gone, control message ignored");
        }
    }
}

impl Drop for PitchPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved onto the worker thread.
struct Worker<H> {
    analyzer: Analyzer,
    handler: H,
    window_rx: Receiver<AudioWindow>,
    control_rx: Receiver<Control>,
    shutdown_rx: Receiver<()>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl<H: PitchHandler> Worker<H> {
    fn run(self) {
        let Worker {
            mut analyzer,
            mut handler,
            window_rx,
            control_rx,
            shutdown_rx,
            running,
            counters,
        } = self;

        debug!("analysis worker running");
        loop {
            select! {
                recv(shutdown_rx) -> _ => break,
                recv(control_rx) -> msg => match msg {
                    Ok(control) => apply(&mut analyzer, control),
                    Err(_) => break,
                },
                recv(window_rx) -> msg => match msg {
                    Ok(window) => {
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        // Controls sent before this window was queued apply to it.
                        for control in control_rx.try_iter() {
                            apply(&mut analyzer, control);
                        }
                        let result = analyzer.analyze(&window);
                        counters.processed.fetch_add(1, Ordering::Relaxed);
                        handler.handle(result);
                    }
                    Err(_) => break,
                },
            }
        }
        debug!("analysis worker finished");
    }
}

fn apply(analyzer: &mut Analyzer, control: Control) {
    debug!("applying {control:?}");
    match control {
        Control::Algorithm(algorithm) => analyzer.set_algorithm(algorithm),
        Control::FrequencyRange(range) => analyzer.set_frequency_range(range),
        Control::ConcertPitch(pitch) => {
            if let Err(e) = analyzer.set_concert_pitch(pitch) {
                warn!("ignoring concert pitch change: {e}");
            }
        }
        Control::ChordDetection(enabled) => analyzer.set_chord_detection(enabled),
    }
}
