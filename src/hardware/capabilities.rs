//! Hardware Capabilities
//!
//! The capture and command layers never talk to a vendor SDK directly. Instead they
//! consume small capability traits that a concrete driver (or a mock) implements:
//!
//! - A capture scope implements: `ScopeDriver`
//! - A voltage glitcher implements: `GlitchDriver`
//! - The target's serial console implements: `TargetLink` (and therefore `DoneProbe`)
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is synchronous and blocking (one control thread per experiment iteration)
//! - Requires `Send` so a rig can be moved onto a worker thread as a whole
//! - Uses anyhow::Result for driver-level faults
//! - Mirrors the register-level surface of the instrument, nothing more
//!
//! Interpretation of those faults (fatal vs. warning) belongs to the controllers in
//! [`crate::capture`] and [`crate::protocol`], not to the drivers.
//!
//! # Example
//!
//! ```rust,ignore
//! fn wait_for_lock<S: ScopeDriver + ?Sized>(scope: &mut S) -> Result<bool> {
//!     scope.set_clock_source(ClockSource::External)?;
//!     scope.is_adc_locked()
//! }
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Raw ADC codes of one acquisition window, as read back in integer mode.
pub type Trace = Vec<u16>;

/// Scope sample clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSource {
    /// Clock generator locked to the target's external clock.
    External,
    /// Scope-internal PLL.
    Internal,
}

/// Physical trigger input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPin {
    Tio1,
    Tio2,
    Tio3,
    Tio4,
}

/// Edge the ADC trigger reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEdge {
    Rising,
    Falling,
}

/// Glitch MOSFET selection for crowbar voltage glitching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlitchMode {
    /// High-power MOSFET.
    HighPower,
    /// Low-power MOSFET.
    LowPower,
}

/// Source that starts the glitch delay counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlitchTrigger {
    /// One glitch per external trigger edge.
    ExtSingle,
    /// Glitch on every external trigger edge while armed.
    ExtContinuous,
    /// Software-triggered.
    Manual,
}

/// Modem-status line the target drives to signal "operation complete".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneSignal {
    /// Clear To Send.
    #[default]
    Cts,
    /// Data Set Ready.
    Dsr,
    /// No completion line wired; the target is always considered done.
    Always,
}

/// Capability: Trace Capture
///
/// Register-level view of an oscilloscope-class capture device.
///
/// # Contract
/// - Setters only write configuration; nothing is acquired until `arm` + `capture`
/// - `capture` returns `Ok(true)` when the *hardware* reports a capture timeout
/// - `last_trace` returns exactly `sample_count` samples of the last single capture
/// - `captured_segments` returns one trace per segment of the last batch capture,
///   in trigger order
pub trait ScopeDriver: Send {
    /// Front-end gain in dB.
    fn set_gain(&mut self, db: f64) -> Result<()>;

    /// Select the clock generator's reference.
    fn set_clock_source(&mut self, source: ClockSource) -> Result<()>;

    /// Clock generator frequency in Hz.
    fn set_clock_frequency(&mut self, hz: f64) -> Result<()>;

    /// Integer multiplier from the clock generator to the ADC sample clock.
    fn set_adc_multiplier(&mut self, multiplier: u32) -> Result<()>;

    /// Enable or disable the external-clock frequency monitor.
    fn set_extclk_monitor(&mut self, enabled: bool) -> Result<()>;

    /// Samples per capture (per segment in batch mode).
    fn set_sample_count(&mut self, samples: u32) -> Result<()>;

    /// Samples to skip after the trigger before recording.
    fn set_sample_offset(&mut self, samples: u32) -> Result<()>;

    /// Samples to record before the trigger.
    fn set_presamples(&mut self, samples: u32) -> Result<()>;

    /// Trigger input pin.
    fn set_trigger_source(&mut self, pin: TriggerPin) -> Result<()>;

    /// Trigger edge.
    fn set_trigger_edge(&mut self, edge: TriggerEdge) -> Result<()>;

    /// Route the target UART through the scope's TIO pins.
    fn route_target_uart(&mut self) -> Result<()>;

    /// Number of consecutive triggers packed into one capture window.
    /// `1` disables segmented capture.
    fn set_segment_count(&mut self, segments: u32) -> Result<()>;

    /// Whether the ADC sample clock is phase-locked to its reference.
    fn is_adc_locked(&mut self) -> Result<bool>;

    /// Prepare to trigger on the next external edge.
    fn arm(&mut self) -> Result<()>;

    /// Run the capture. Returns `true` if the hardware timed out waiting for triggers.
    fn capture(&mut self, blocking: bool) -> Result<bool>;

    /// Samples of the last single capture.
    fn last_trace(&mut self) -> Result<Trace>;

    /// Segments of the last batch capture.
    fn captured_segments(&mut self) -> Result<Vec<Trace>>;

    /// Re-open the instrument after a target crash.
    ///
    /// # Default Implementation
    /// Does nothing; drivers without persistent connections need no reconnect.
    fn reconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Capability: Voltage Glitching
///
/// Interface boundary of the crowbar glitch path. Parameter-space sampling is left to
/// the caller.
pub trait GlitchDriver: Send {
    /// Clock generator frequency in Hz; one glitch cycle lasts one clock period.
    fn set_clock_frequency(&mut self, hz: f64) -> Result<()>;

    /// Select glitch MOSFET.
    fn setup_voltage_glitch(&mut self, mode: GlitchMode) -> Result<()>;

    /// `true` keeps the output high only for the glitch repeat count.
    fn set_glitch_output_enable_only(&mut self, enable_only: bool) -> Result<()>;

    /// What starts the glitch delay counter.
    fn set_glitch_trigger_source(&mut self, trigger: GlitchTrigger) -> Result<()>;

    /// Physical trigger input.
    fn set_trigger_source(&mut self, pin: TriggerPin) -> Result<()>;

    /// Glitch width in clock cycles.
    fn set_pulse_width(&mut self, cycles: u32) -> Result<()>;

    /// Delay from trigger to glitch in clock cycles.
    fn set_trigger_delay(&mut self, cycles: u32) -> Result<()>;

    /// Arm the glitcher for the next trigger.
    fn arm(&mut self) -> Result<()>;

    /// Re-open the instrument after a target crash.
    fn reconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Capability: Target Console
///
/// Line-oriented byte transport to the device under test. There are no message
/// boundaries beyond line breaks, and debug output may be interleaved with replies.
pub trait TargetLink: Send {
    /// Write raw bytes.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read one line without its terminator.
    ///
    /// Returns an empty string when nothing arrived before the link's read timeout.
    fn read_line(&mut self) -> Result<String>;

    /// Non-blocking poll of the target's "operation complete" signal.
    fn is_done(&mut self) -> Result<bool>;
}

/// Anything that can be polled for target completion during a single capture.
pub trait DoneProbe {
    /// Non-blocking completion poll.
    fn is_done(&mut self) -> Result<bool>;
}

impl<T: TargetLink + ?Sized> DoneProbe for T {
    fn is_done(&mut self) -> Result<bool> {
        TargetLink::is_done(self)
    }
}

impl<T: ScopeDriver + ?Sized> ScopeDriver for Box<T> {
    fn set_gain(&mut self, db: f64) -> Result<()> {
        (**self).set_gain(db)
    }
    fn set_clock_source(&mut self, source: ClockSource) -> Result<()> {
        (**self).set_clock_source(source)
    }
    fn set_clock_frequency(&mut self, hz: f64) -> Result<()> {
        (**self).set_clock_frequency(hz)
    }
    fn set_adc_multiplier(&mut self, multiplier: u32) -> Result<()> {
        (**self).set_adc_multiplier(multiplier)
    }
    fn set_extclk_monitor(&mut self, enabled: bool) -> Result<()> {
        (**self).set_extclk_monitor(enabled)
    }
    fn set_sample_count(&mut self, samples: u32) -> Result<()> {
        (**self).set_sample_count(samples)
    }
    fn set_sample_offset(&mut self, samples: u32) -> Result<()> {
        (**self).set_sample_offset(samples)
    }
    fn set_presamples(&mut self, samples: u32) -> Result<()> {
        (**self).set_presamples(samples)
    }
    fn set_trigger_source(&mut self, pin: TriggerPin) -> Result<()> {
        (**self).set_trigger_source(pin)
    }
    fn set_trigger_edge(&mut self, edge: TriggerEdge) -> Result<()> {
        (**self).set_trigger_edge(edge)
    }
    fn route_target_uart(&mut self) -> Result<()> {
        (**self).route_target_uart()
    }
    fn set_segment_count(&mut self, segments: u32) -> Result<()> {
        (**self).set_segment_count(segments)
    }
    fn is_adc_locked(&mut self) -> Result<bool> {
        (**self).is_adc_locked()
    }
    fn arm(&mut self) -> Result<()> {
        (**self).arm()
    }
    fn capture(&mut self, blocking: bool) -> Result<bool> {
        (**self).capture(blocking)
    }
    fn last_trace(&mut self) -> Result<Trace> {
        (**self).last_trace()
    }
    fn captured_segments(&mut self) -> Result<Vec<Trace>> {
        (**self).captured_segments()
    }
    fn reconnect(&mut self) -> Result<()> {
        (**self).reconnect()
    }
}

impl<T: TargetLink + ?Sized> TargetLink for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }
    fn read_line(&mut self) -> Result<String> {
        (**self).read_line()
    }
    fn is_done(&mut self) -> Result<bool> {
        TargetLink::is_done(&mut **self)
    }
}
