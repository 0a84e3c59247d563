//! # Audio Capture Module
//!
//! This module handles real-time audio capture using CPAL (Cross-Platform Audio Library).
//! It selects an input device and stream format and forwards the captured samples
//! to a [`SampleSink`]. The audio callback only converts and copies samples;
//! detection runs on the pipeline's worker thread.
//!
//! ## Features
//! - Input device listing and selection by name
//! - Format selection: mono preferred, `f32` preferred over `i16`, rate closest to 44.1 kHz
//! - Integer PCM normalization and multi-channel downmix

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};
use log::{info, warn};

use crate::config::DEFAULT_SAMPLE_RATE;
use crate::stream::SampleSink;

/// Names of all available input devices.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .context("failed to enumerate input devices")?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

/// An input device together with the stream format chosen for it.
pub struct InputDevice {
    device: cpal::Device,
    name: String,
    config: SupportedStreamConfig,
}

/// Opens the input device called `name`, or the default input device.
///
/// # Errors
/// Fails if no such device exists or it offers neither `f32` nor `i16` input.
pub fn open_input(name: Option<&str>) -> Result<InputDevice> {
    let host = cpal::default_host();
    let device = match name {
        Some(wanted) => host
            .input_devices()
            .context("failed to enumerate input devices")?
            .find(|device| device.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| anyhow!("No input device named `{wanted}`"))?,
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?,
    };
    let name = device.name().unwrap_or_else(|_| "unknown device".to_string());

    let configs = device
        .supported_input_configs()
        .with_context(|| format!("failed to query formats of `{name}`"))?
        .collect::<Vec<_>>();
    let config = find_supported_config(configs, DEFAULT_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 or i16 input format found on `{name}`"))?;

    info!(
        "using audio input device `{}`: {} Hz, {} channel(s), {:?}",
        name,
        config.sample_rate().0,
        config.channels(),
        config.sample_format()
    );

    Ok(InputDevice {
        device,
        name,
        config,
    })
}

impl InputDevice {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels()
    }

    /// Builds and starts the input stream feeding `sink`.
    ///
    /// The returned stream must be kept alive for capture to continue.
    pub fn start(&self, mut sink: SampleSink) -> Result<cpal::Stream> {
        let channels = usize::from(self.channels());
        let stream_config: cpal::StreamConfig = self.config.config();
        let err_fn = |err| warn!("An error occurred on the audio stream: {err}");
        let mut mono = Vec::new();

        let stream = match self.config.sample_format() {
            SampleFormat::F32 => self.device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if channels == 1 {
                        sink.push_samples(data);
                    } else {
                        downmix_to_mono(data, channels, &mut mono);
                        sink.push_samples(&mono);
                    }
                },
                err_fn,
                None,
            )?,
            SampleFormat::I16 => {
                let mut normalized = Vec::new();
                self.device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        normalize_i16(data, &mut normalized);
                        if channels == 1 {
                            sink.push_samples(&normalized);
                        } else {
                            downmix_to_mono(&normalized, channels, &mut mono);
                            sink.push_samples(&mono);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("Unsupported sample format {other:?}")),
        };

        stream.play().context("failed to start the input stream")?;
        Ok(stream)
    }
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Mono beats stereo, `f32` beats `i16`, then the smallest distance to
/// `target_rate`. The rate is clamped into the chosen range.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfig> {
    configs
        .into_iter()
        .filter_map(|c| {
            let (rank, rate) = rank_config(
                c.channels(),
                c.sample_format(),
                c.min_sample_rate().0,
                c.max_sample_rate().0,
                target_rate,
            )?;
            Some((rank, rate, c))
        })
        .min_by_key(|(rank, _, _)| *rank)
        .map(|(_, rate, c)| c.with_sample_rate(cpal::SampleRate(rate)))
}

/// Sort key of a format range (lower is better) and the rate to request from it.
///
/// The key is `(not mono, not f32, distance to target)`. `None` for unusable formats.
fn rank_config(
    channels: u16,
    format: SampleFormat,
    min_rate: u32,
    max_rate: u32,
    target_rate: u32,
) -> Option<((u8, u8, u32), u32)> {
    let format_rank = match format {
        SampleFormat::F32 => 0,
        SampleFormat::I16 => 1,
        _ => return None,
    };
    if channels == 0 || min_rate > max_rate {
        return None;
    }
    let rate = target_rate.clamp(min_rate, max_rate);
    let rank = (u8::from(channels != 1), format_rank, rate.abs_diff(target_rate));
    Some((rank, rate))
}

/// Converts 16-bit PCM to floats in `[-1, 1)`.
pub fn normalize_i16(input: &[i16], output: &mut Vec<f32>) {
    output.clear();
    output.extend(input.iter().map(|&s| f32::from(s) / 32768.0));
}

/// Averages interleaved frames of `channels` samples into one mono sample each.
///
/// A trailing partial frame is ignored.
pub fn downmix_to_mono(input: &[f32], channels: usize, output: &mut Vec<f32>) {
    output.clear();
    if channels <= 1 {
        output.extend_from_slice(input);
        return;
    }
    let scale = 1.0 / channels as f32;
    output.extend(
        input
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}
