//! Magnus-formula dew point approximation.
//!
//! Given air temperature T (°C) and relative humidity RH (%):
//!
//! ```text
//! alpha     = (a * T) / (b + T) + ln(RH / 100)
//! dew_point = (b * alpha) / (a - alpha)
//! ```
//!
//! with a = 17.27 and b = 237.7. The result is rounded to one decimal place.

use thiserror::Error;

/// Magnus coefficient `a` (dimensionless).
pub const MAGNUS_A: f64 = 17.27;

/// Magnus coefficient `b` (°C).
pub const MAGNUS_B: f64 = 237.7;

/// Arithmetic or domain fault while evaluating the formula.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ComputationError {
    /// ln(RH / 100) is undefined for RH <= 0 (and for NaN).
    #[error("relative humidity {0}% is outside the logarithm's domain")]
    HumidityOutOfDomain(f64),

    /// Either `b + T` or `a - alpha` evaluated to zero.
    #[error("division by zero")]
    DivisionByZero,

    /// The inputs produced an infinite or NaN dew point.
    #[error("dew point is not a finite number")]
    NonFinite,
}

/// Compute the dew point in °C, rounded to one decimal place.
pub fn dew_point(temperature: f64, humidity: f64) -> Result<f64, ComputationError> {
    if humidity.is_nan() || humidity <= 0.0 {
        return Err(ComputationError::HumidityOutOfDomain(humidity));
    }

    let denominator = MAGNUS_B + temperature;
    if denominator == 0.0 {
        return Err(ComputationError::DivisionByZero);
    }

    let alpha = (MAGNUS_A * temperature) / denominator + (humidity / 100.0).ln();

    let divisor = MAGNUS_A - alpha;
    if divisor == 0.0 {
        return Err(ComputationError::DivisionByZero);
    }

    let dew_point = (MAGNUS_B * alpha) / divisor;
    if !dew_point.is_finite() {
        return Err(ComputationError::NonFinite);
    }

    Ok(round_one_decimal(dew_point))
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
