//! # Fast Fourier Transform (FFT) Module
//!
//! Spectral and correlation machinery shared by the detectors.
//!
//! ## Features
//! - Hann windowing and DC offset removal
//! - Magnitude spectra of zero-padded windows ([`SpectrumAnalyzer`])
//! - Linear and windowed autocorrelation via FFT ([`Correlator`])
//!
//! Both workers keep their FFT plans and scratch buffers between calls. Every
//! buffer is fully rewritten on each call, so results never depend on what a
//! previous call left behind.
//!
//! Plans are cached as `Arc<dyn Fft>` so the workers stay `Send`.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::HashMap;
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
///
/// A DC component leaks into the lowest bins and into every autocorrelation lag.
pub fn remove_dc_offset(signal: &mut [f64]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f64>() / len as f64;
    if avg.abs() > 1e-12 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window in place to reduce spectral leakage.
pub fn apply_hann_window(buffer: &mut [f64]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f64;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Frequency in Hz of (possibly fractional) bin `bin` of an `fft_size`-point transform.
pub fn bin_to_frequency(bin: f64, sample_rate: u32, fft_size: usize) -> f64 {
    bin * f64::from(sample_rate) / fft_size as f64
}

/// Nearest bin index for `frequency`, rounded down.
pub fn frequency_to_bin(frequency: f64, sample_rate: u32, fft_size: usize) -> usize {
    (frequency * fft_size as f64 / f64::from(sample_rate)).max(0.0) as usize
}

type FftPair = (Arc<dyn Fft<f64>>, Arc<dyn Fft<f64>>);

/// Forward and inverse plans keyed by transform size.
#[derive(Default)]
struct PlanCache {
    plans: HashMap<usize, FftPair>,
}

impl PlanCache {
    fn get(&mut self, size: usize) -> FftPair {
        self.plans
            .entry(size)
            .or_insert_with(|| {
                let mut planner = FftPlanner::new();
                (
                    planner.plan_fft_forward(size),
                    planner.plan_fft_inverse(size),
                )
            })
            .clone()
    }
}

/// Computes magnitude spectra of DC-free, Hann-windowed, zero-padded windows.
pub struct SpectrumAnalyzer {
    plans: PlanCache,
    windowed: Vec<f64>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    magnitudes: Vec<f64>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            plans: PlanCache::default(),
            windowed: Vec::new(),
            buffer: Vec::new(),
            scratch: Vec::new(),
            magnitudes: Vec::new(),
        }
    }

    /// Magnitude spectrum of `signal`, zero-padded to `fft_size`.
    ///
    /// Returns bins `0..fft_size / 2` (DC up to just below Nyquist). Signals
    /// longer than `fft_size` are truncated.
    pub fn magnitudes(&mut self, signal: &[f32], fft_size: usize) -> &[f64] {
        let used = signal.len().min(fft_size);

        self.windowed.clear();
        self.windowed
            .extend(signal[..used].iter().map(|&s| f64::from(s)));
        remove_dc_offset(&mut self.windowed);
        apply_hann_window(&mut self.windowed);

        self.buffer.clear();
        self.buffer
            .extend(self.windowed.iter().map(|&re| Complex { re, im: 0.0 }));
        self.buffer.resize(fft_size, Complex { re: 0.0, im: 0.0 });

        let (fft, _) = self.plans.get(fft_size);
        self.scratch
            .resize(fft.get_inplace_scratch_len(), Complex::default());
        fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        self.magnitudes.clear();
        self.magnitudes
            .extend(self.buffer.iter().take(fft_size / 2).map(|c| c.norm()));
        &self.magnitudes
    }
}

/// FFT-based correlation of real signals.
pub struct Correlator {
    plans: PlanCache,
    signal: Vec<Complex<f64>>,
    kernel: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            plans: PlanCache::default(),
            signal: Vec::new(),
            kernel: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Linear autocorrelation `r(t) = sum_{i=0}^{n-1-t} x_i * x_{i+t}` for `t` in `0..=max_lag`.
    ///
    /// The signal is zero-padded to at least `n + max_lag` points so that
    /// circular wrap-around never reaches the requested lags.
    pub fn autocorrelation(&mut self, signal: &[f64], max_lag: usize, result: &mut Vec<f64>) {
        let n = signal.len();
        let max_lag = max_lag.min(n.saturating_sub(1));
        result.clear();
        if n == 0 {
            return;
        }
        let size = (n + max_lag + 1).next_power_of_two();

        fill_complex(&mut self.signal, signal, size);

        let (fft, inv_fft) = self.plans.get(size);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(inv_fft.get_inplace_scratch_len());
        self.scratch.resize(scratch_len, Complex::default());

        fft.process_with_scratch(&mut self.signal, &mut self.scratch);
        let normalization = 1.0 / size as f64;
        for c in self.signal.iter_mut() {
            *c = Complex {
                re: c.norm_sqr() * normalization,
                im: 0.0,
            };
        }
        inv_fft.process_with_scratch(&mut self.signal, &mut self.scratch);

        result.extend(self.signal[..=max_lag].iter().map(|c| c.re));
    }

    /// Windowed autocorrelation `r(t) = sum_{i=0}^{w-1} x_i * x_{i+t}` for `t` in `0..w`.
    ///
    /// Computed as the cross correlation of the signal with its first `w`
    /// samples. `window` is clamped to half the signal length, where the
    /// result stays free of circular wrap-around.
    pub fn windowed_autocorrelation(
        &mut self,
        signal: &[f64],
        window: usize,
        result: &mut Vec<f64>,
    ) {
        let n = signal.len();
        let window = window.min(n / 2);
        result.clear();
        if window == 0 {
            return;
        }
        let size = n.next_power_of_two();

        fill_complex(&mut self.signal, signal, size);
        fill_complex(&mut self.kernel, &signal[..window], size);

        let (fft, inv_fft) = self.plans.get(size);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(inv_fft.get_inplace_scratch_len());
        self.scratch.resize(scratch_len, Complex::default());

        fft.process_with_scratch(&mut self.signal, &mut self.scratch);
        fft.process_with_scratch(&mut self.kernel, &mut self.scratch);
        // rustfft does not normalize, so divide once for the forward/inverse pair.
        let normalization = 1.0 / size as f64;
        for (a, b) in self.signal.iter_mut().zip(self.kernel.iter()) {
            *a = *a * b.conj() * normalization;
        }
        inv_fft.process_with_scratch(&mut self.signal, &mut self.scratch);

        result.extend(self.signal[..window].iter().map(|c| c.re));
    }
}

fn fill_complex(buffer: &mut Vec<Complex<f64>>, values: &[f64], size: usize) {
    buffer.clear();
    buffer.extend(values.iter().map(|&re| Complex { re, im: 0.0 }));
    buffer.resize(size, Complex::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_autocorrelation(x: &[f64], lag: usize) -> f64 {
        x.iter().zip(&x[lag..]).map(|(a, b)| a * b).sum()
    }

    #[test]
    fn dc_offset_is_removed() {
        let mut signal = vec![1.5, 2.5, 1.5, 2.5];
        remove_dc_offset(&mut signal);
        assert!(signal.iter().sum::<f64>().abs() < 1e-12);
    }

    #[test]
    fn hann_window_tapers_edges() {
        let mut buffer = vec![1.0; 9];
        apply_hann_window(&mut buffer);
        assert!(buffer[0].abs() < 1e-12);
        assert!(buffer[8].abs() < 1e-12);
        assert!((buffer[4] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn autocorrelation_matches_direct_sum() {
        let x: Vec<f64> = (0..100).map(|i| ((i * 7 % 13) as f64 - 6.0) / 6.0).collect();
        let mut correlator = Correlator::new();
        let mut result = Vec::new();
        correlator.autocorrelation(&x, 40, &mut result);
        assert_eq!(result.len(), 41);
        for lag in [0, 1, 17, 40] {
            assert!((result[lag] - direct_autocorrelation(&x, lag)).abs() < 1e-9);
        }
    }

    #[test]
    fn windowed_autocorrelation_matches_direct_sum() {
        let x: Vec<f64> = (0..64).map(|i| (i as f64 * 0.3).sin()).collect();
        let mut correlator = Correlator::new();
        let mut result = Vec::new();
        correlator.windowed_autocorrelation(&x, 32, &mut result);
        assert_eq!(result.len(), 32);
        for lag in [0, 5, 31] {
            let expected: f64 = (0..32).map(|i| x[i] * x[i + lag]).sum();
            assert!((result[lag] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn spectrum_peaks_at_tone_bin() {
        let sample_rate = 8000;
        let size = 1024;
        // 1000 Hz sits exactly on bin 128.
        let signal: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        let mut analyzer = SpectrumAnalyzer::new();
        let magnitudes = analyzer.magnitudes(&signal, size);
        assert_eq!(magnitudes.len(), size / 2);
        let peak = magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(128));
        assert_eq!(frequency_to_bin(1000.0, sample_rate, size), 128);
        assert_eq!(bin_to_frequency(128.0, sample_rate, size), 1000.0);
    }
}
