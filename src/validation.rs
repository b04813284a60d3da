//! Small validators shared by configuration loading and timing derivation.
use std::ops::RangeInclusive;

/// Log levels accepted by the `[application]` section.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validates that a frequency or rate is a finite, strictly positive number.
///
/// # Arguments
///
/// * `value` - The value in Hz.
///
/// # Returns
///
/// * `Ok(())` if the value is usable as a clock or rate.
/// * `Err(&'static str)` otherwise.
pub fn is_positive_frequency(value: f64) -> Result<(), &'static str> {
    if !value.is_finite() {
        return Err("Frequency must be a finite number");
    }
    if value <= 0.0 {
        return Err("Frequency must be greater than 0 Hz");
    }
    Ok(())
}

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates a log level name (case insensitive).
pub fn is_valid_log_level(level: &str) -> Result<(), &'static str> {
    if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err("Log level must be one of: trace, debug, info, warn, error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_positive_frequency() {
        assert!(is_positive_frequency(48e6).is_ok());
        assert!(is_positive_frequency(0.0).is_err());
        assert!(is_positive_frequency(-1.0).is_err());
        assert!(is_positive_frequency(f64::NAN).is_err());
        assert!(is_positive_frequency(f64::INFINITY).is_err());
    }

    #[test]
    fn test_is_in_range() {
        assert!(is_in_range(5, 1..=10).is_ok());
        assert!(is_in_range(11, 1..=10).is_err());
    }

    #[test]
    fn test_is_not_empty() {
        assert!(is_not_empty("/dev/ttyACM0").is_ok());
        assert!(is_not_empty("").is_err());
        assert!(is_not_empty("   ").is_err());
    }

    #[test]
    fn test_is_valid_log_level() {
        assert!(is_valid_log_level("debug").is_ok());
        assert!(is_valid_log_level("WARN").is_ok());
        assert!(is_valid_log_level("verbose").is_err());
    }
}
