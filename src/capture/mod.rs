//! Trace acquisition.
//!
//! - [`clock_plan`] derives sample clock, window length and trigger offset from the
//!   physical limits of the rig.
//! - [`controller`] owns the scope and runs the lock / arm / capture cycle.
//! - [`segmented`] packs several triggers into one batch capture.

pub mod clock_plan;
pub mod controller;
pub mod segmented;

pub use clock_plan::{ClockPlan, ClockPlanParams, TriggerOffset, SAMPLING_RATE_MAX};
pub use controller::{CaptureController, CaptureMode, PollPolicy, SessionState};
pub use segmented::SegmentedCapture;

use crate::hardware::Trace;

/// Non-fatal conditions observed during a capture.
///
/// The traces are returned regardless; filtering degenerate traces is left to the
/// consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureWarning {
    /// The scope reported a capture timeout.
    HardwareTimeout,
    /// The target never signalled completion within the poll budget.
    TargetNotDone { polls: u32 },
}

/// Traces of one `capture_and_transfer` call, in trigger order.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    pub traces: Vec<Trace>,
    pub warnings: Vec<CaptureWarning>,
}

impl Acquisition {
    /// Whether any warning was raised for this capture.
    pub fn is_suspect(&self) -> bool {
        !self.warnings.is_empty()
    }
}
