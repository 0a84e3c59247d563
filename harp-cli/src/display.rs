//! # Text Display
//!
//! Renders analysis results as single terminal lines: note name, frequency,
//! smoothed cents deviation and a text cent meter with accuracy zones.

use std::collections::VecDeque;

use harp_core::{AnalysisResult, NoteLookup};

/// Maximum cent deviation shown by the meter (-50 to +50 cents).
const METER_RANGE: f64 = 50.0;
/// Characters on each side of the meter's centre mark.
const METER_HALF_WIDTH: usize = 20;
/// Deviations below this many cents count as in tune.
const IN_TUNE_CENTS: f64 = 5.0;
/// Deviations below this many cents count as close.
const CLOSE_CENTS: f64 = 20.0;
/// Number of results averaged for the displayed cents.
const SMOOTHING_FACTOR: usize = 5;

/// Accuracy zone of a cents deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    InTune,
    Close,
    Off,
}

impl Accuracy {
    pub fn of(cents: f64) -> Self {
        if cents.abs() < IN_TUNE_CENTS {
            Accuracy::InTune
        } else if cents.abs() < CLOSE_CENTS {
            Accuracy::Close
        } else {
            Accuracy::Off
        }
    }

    fn label(self) -> &'static str {
        match self {
            Accuracy::InTune => "in tune",
            Accuracy::Close => "close",
            Accuracy::Off => "off",
        }
    }
}

/// Moving average over the last few cents readings.
///
/// A result without a pitch clears the history so the needle does not lag
/// behind a new note.
#[derive(Debug, Default)]
pub struct CentSmoother {
    buffer: VecDeque<f64>,
}

impl CentSmoother {
    pub fn push(&mut self, cents: Option<f64>) -> Option<f64> {
        let Some(cents) = cents else {
            self.buffer.clear();
            return None;
        };
        self.buffer.push_back(cents);
        if self.buffer.len() > SMOOTHING_FACTOR {
            self.buffer.pop_front();
        }
        Some(self.buffer.iter().sum::<f64>() / self.buffer.len() as f64)
    }
}

/// Draws the meter, e.g. `[--------------------|---#----------------]`.
///
/// Deviations beyond the meter range pin the needle to the end.
pub fn render_meter(cents: Option<f64>) -> String {
    let width = METER_HALF_WIDTH * 2 + 1;
    let mut cells = vec!['-'; width];
    cells[METER_HALF_WIDTH] = '|';

    if let Some(c) = cents {
        let clamped = c.clamp(-METER_RANGE, METER_RANGE);
        let position = (clamped + METER_RANGE) / (2.0 * METER_RANGE) * (width - 1) as f64;
        cells[position.round() as usize] = '#';
    }

    let mut meter = String::with_capacity(width + 2);
    meter.push('[');
    meter.extend(cells);
    meter.push(']');
    meter
}

/// Formats one result as a status line.
///
/// Results below `threshold` are shown as "no pitch", with the meter empty.
pub fn format_result(
    result: &AnalysisResult,
    smoothed_cents: Option<f64>,
    threshold: f64,
    lookup: &NoteLookup,
) -> String {
    let mut line = match (result.meets(threshold), result.detected_frequency) {
        (true, Some(frequency)) => {
            let note = result.note_name.as_deref().unwrap_or("?");
            let cents = smoothed_cents.or(result.cents_deviation);
            let deviation = cents.map_or_else(|| "   --   ".to_string(), |c| format!("{c:+6.1} ct"));
            let accuracy = cents.map_or("", |c| Accuracy::of(c).label());
            format!(
                "{note:<4} {frequency:8.2} Hz {deviation} {} {accuracy:<7} conf {:.2}",
                render_meter(cents),
                result.confidence
            )
        }
        _ => format!(
            "{:<4} {:>8}    {:>8} {} {:<7} vol {:.3}",
            "--",
            "no pitch",
            "",
            render_meter(None),
            "",
            result.volume
        ),
    };

    if let Some(chord) = result.chord.as_ref().filter(|c| c.has_pitches()) {
        line.push_str(&format!(
            "  chord {} ({:.2})",
            chord.note_names(lookup).join(" "),
            chord.confidence()
        ));
    }
    line
}
