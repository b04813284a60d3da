//! Hardware Abstractions
//!
//! Capability traits consumed by the capture and command layers, plus the mock and
//! serial implementations shipped with the crate.

pub mod capabilities;
pub mod mock;
#[cfg(feature = "instrument_serial")]
pub mod serial;

pub use capabilities::{
    ClockSource, DoneProbe, DoneSignal, GlitchDriver, GlitchMode, GlitchTrigger, ScopeDriver,
    TargetLink, Trace, TriggerEdge, TriggerPin,
};
#[cfg(feature = "instrument_serial")]
pub use serial::SerialTarget;
