//! # Cents Module
//!
//! Interval math between frequencies. Cents are a logarithmic unit where
//! 100 cents = 1 equal-tempered semitone and 1200 cents = 1 octave.

use crate::error::{check_frequency, Result};

/// Number of decimal digits kept by [`round`].
const DECIMAL_PRECISION: i32 = 3;

/// Calculates the interval from `f2` to `f1` in cents.
///
/// Positive values mean `f1` is sharp relative to `f2`, negative values mean flat.
///
/// # Errors
/// [`Error::InvalidFrequency`](crate::Error::InvalidFrequency) if either frequency is not
/// a positive finite number.
pub fn get_cents(f1: f64, f2: f64) -> Result<f64> {
    let f1 = check_frequency("f1", f1)?;
    let f2 = check_frequency("f2", f2)?;
    Ok(cents_between(f1, f2))
}

/// Shifts `frequency` by `cents`: `frequency * 2^(cents / 1200)`.
///
/// # Errors
/// [`Error::InvalidFrequency`](crate::Error::InvalidFrequency) if `frequency` is not
/// a positive finite number.
pub fn add_cents_to_frequency(cents: f64, frequency: f64) -> Result<f64> {
    let frequency = check_frequency("frequency", frequency)?;
    Ok(shift_by_cents(frequency, cents))
}

/// Truncates `value` towards negative infinity at three decimal digits.
///
/// This is a floor, not round-half-up: `round(1.2349) == 1.234` and
/// `round(-1.2341) == -1.235`. Values that are already exact at three digits but
/// carry binary representation noise (`1.001 * 1000 = 1000.9999999999999`) are
/// kept as written.
pub fn round(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(DECIMAL_PRECISION);
    let scaled = value * scale;
    let nearest = scaled.round();
    let floored = if (scaled - nearest).abs() < 1e-7 {
        nearest
    } else {
        scaled.floor()
    };
    floored / scale
}

/// Unchecked interval in cents; callers guarantee positive inputs.
pub(crate) fn cents_between(f1: f64, f2: f64) -> f64 {
    1200.0 * (f1 / f2).log2()
}

/// Unchecked cents shift; callers guarantee a positive frequency.
pub(crate) fn shift_by_cents(frequency: f64, cents: f64) -> f64 {
    frequency * 2f64.powf(cents / 1200.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unison_is_zero_cents() {
        assert_eq!(get_cents(440.0, 440.0).unwrap(), 0.0);
    }

    #[test]
    fn semitone_is_one_hundred_cents() {
        let cents = get_cents(466.16, 440.0).unwrap();
        assert!((cents - 100.0).abs() < 1.0, "got {cents}");
        let cents = get_cents(440.0, 466.16).unwrap();
        assert!((cents + 100.0).abs() < 1.0, "got {cents}");
    }

    #[test]
    fn octave_is_twelve_hundred_cents() {
        assert!((get_cents(880.0, 440.0).unwrap() - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn non_positive_inputs_fail() {
        assert!(get_cents(0.0, 440.0).is_err());
        assert!(get_cents(440.0, -1.0).is_err());
        assert!(add_cents_to_frequency(10.0, 0.0).is_err());
    }

    #[test]
    fn adding_cents_inverts_get_cents() {
        let shifted = add_cents_to_frequency(-25.0, 80.0).unwrap();
        assert!((get_cents(shifted, 80.0).unwrap() + 25.0).abs() < 1e-9);
        assert!((add_cents_to_frequency(1200.0, 440.0).unwrap() - 880.0).abs() < 1e-9);
    }

    #[test]
    fn round_truncates_towards_negative_infinity() {
        assert_eq!(round(1.2349), 1.234);
        assert_eq!(round(1.001), 1.001);
        assert_eq!(round(-1.2341), -1.235);
        assert_eq!(round(440.0), 440.0);
        assert_eq!(round(2.9999), 2.999);
    }
}
