//! Custom error types for the acquisition rig.
//!
//! This module defines the primary error type, `ScaError`, for the whole crate.
//! Using the `thiserror` crate, it provides one consistent place for every failure
//! that can surface from the capture path and the target command protocol.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: invalid physical or timing parameters. Detected before any
//!   hardware is touched and always fatal to the current setup attempt.
//! - **`Config`**: wraps `figment` errors raised while loading the TOML/env configuration.
//! - **`InstrumentLockTimeout`**: the scope ADC never reported lock within the bounded
//!   poll budget. Fatal; the caller decides whether to power-cycle and retry.
//! - **`Arm`**: the capture state machine was driven out of order (arm before lock,
//!   capture before arm, mode switch mid-session).
//! - **`Desynchronized`**: the target never produced a parseable `RESP_OK:` frame within
//!   budget, or produced a malformed one. Never retried internally: only an explicit
//!   target/instrument reset can recover the session.
//! - **`UnknownOperation`**: a workload name outside the closed FVSR set.
//! - **`Instrument`**: a communication fault reported by a driver or the serial link.
//!
//! A capture timeout is deliberately *not* in this list. It is reported as a
//! [`crate::capture::CaptureWarning`] next to the returned traces.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, ScaError>;

/// Primary error type for the acquisition and command layer.
#[derive(Error, Debug)]
pub enum ScaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration loading error: {0}")]
    Config(#[from] figment::Error),

    #[error("ADC failed to lock (attempts: {attempts})")]
    InstrumentLockTimeout { attempts: u32 },

    #[error("Arm error: {0}")]
    Arm(String),

    #[error("Acknowledge error: device and host not in sync ({0})")]
    Desynchronized(String),

    #[error("Unknown FVSR operation: '{0}'")]
    UnknownOperation(String),

    #[error("Frame encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Instrument(#[from] anyhow::Error),
}

impl ScaError {
    /// Whether the session can continue after this error without a reset.
    ///
    /// Only configuration mistakes are recoverable in place (fix the value and retry
    /// the setup). Everything else leaves the instrument or the target protocol in an
    /// unknown state.
    pub fn is_recoverable_without_reset(&self) -> bool {
        matches!(
            self,
            ScaError::Configuration(_) | ScaError::Config(_) | ScaError::UnknownOperation(_)
        )
    }

    /// Whether the error indicates the target and host disagree on protocol state.
    pub fn is_desync(&self) -> bool {
        matches!(self, ScaError::Desynchronized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_message_names_attempts() {
        let err = ScaError::InstrumentLockTimeout { attempts: 3 };
        assert_eq!(err.to_string(), "ADC failed to lock (attempts: 3)");
    }

    #[test]
    fn instrument_faults_are_transparent() {
        let err: ScaError = anyhow::anyhow!("USB endpoint stalled").into();
        assert_eq!(err.to_string(), "USB endpoint stalled");
        assert!(!err.is_recoverable_without_reset());
    }

    #[test]
    fn desync_requires_reset() {
        let err = ScaError::Desynchronized("no RESP_OK within 100 lines".into());
        assert!(err.is_desync());
        assert!(!err.is_recoverable_without_reset());
        assert!(ScaError::UnknownOperation("Foo".into()).is_recoverable_without_reset());
    }
}
