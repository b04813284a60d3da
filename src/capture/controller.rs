//! Capture controller: scope lifecycle and the single/segmented capture algorithm.
//!
//! State machine:
//!
//! ```text
//! Unconfigured --lock--> Locked --arm--> Armed --capture_and_transfer--> Captured
//!                          ^               ^                                 |
//!                          |               +-------------arm-----------------+
//!     reset (from any state) returns to Unconfigured
//! ```
//!
//! `lock` may be called again without `reset`: it re-applies the same register values and
//! re-polls the ADC lock, leaving the instrument in the same configuration. A `lock` that
//! fails part way leaves the controller Unconfigured until the next successful `lock`.

use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info, instrument, warn};

use super::clock_plan::ClockPlan;
use super::segmented::SegmentedCapture;
use super::{Acquisition, CaptureWarning};
use crate::error::{AppResult, ScaError};
use crate::hardware::{ClockSource, DoneProbe, ScopeDriver, TriggerEdge, TriggerPin};

/// Fixed-interval retry with a hard attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    /// ADC lock: 3 re-polls, 500 ms apart.
    pub const ADC_LOCK: PollPolicy = PollPolicy {
        interval: Duration::from_millis(500),
        max_attempts: 3,
    };

    /// Target completion during a single capture: 100 polls, 50 ms apart.
    pub const TARGET_DONE: PollPolicy = PollPolicy {
        interval: Duration::from_millis(50),
        max_attempts: 100,
    };

    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    fn pause(&self) {
        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
    }
}

/// Lifecycle position of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Locked,
    Armed,
    Captured,
}

/// How many traces one capture produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// One trigger, one trace.
    Single,
    /// `segments` triggers packed into one capture window.
    Batch { segments: u32 },
}

impl CaptureMode {
    /// Traces returned per `capture_and_transfer` call.
    pub fn traces_per_capture(&self) -> u32 {
        match self {
            CaptureMode::Single => 1,
            CaptureMode::Batch { segments } => *segments,
        }
    }
}

/// Owns the scope and drives it through the capture state machine.
pub struct CaptureController<S: ScopeDriver> {
    scope: S,
    plan: ClockPlan,
    gain_db: f64,
    trigger_pin: TriggerPin,
    state: SessionState,
    mode: Option<CaptureMode>,
    segmented: Option<SegmentedCapture>,
    lock_policy: PollPolicy,
    done_policy: PollPolicy,
}

impl<S: ScopeDriver> CaptureController<S> {
    /// Bind a scope to a pre-validated clock plan. Nothing is written until [`Self::lock`].
    pub fn new(scope: S, plan: ClockPlan, gain_db: f64) -> Self {
        Self {
            scope,
            plan,
            gain_db,
            trigger_pin: TriggerPin::Tio4,
            state: SessionState::Unconfigured,
            mode: None,
            segmented: None,
            lock_policy: PollPolicy::ADC_LOCK,
            done_policy: PollPolicy::TARGET_DONE,
        }
    }

    pub fn with_lock_policy(mut self, policy: PollPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn with_done_policy(mut self, policy: PollPolicy) -> Self {
        self.done_policy = policy;
        self
    }

    pub fn with_trigger_pin(mut self, pin: TriggerPin) -> Self {
        self.trigger_pin = pin;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Capture mode, once decided.
    pub fn mode(&self) -> Option<CaptureMode> {
        self.mode
    }

    pub fn plan(&self) -> &ClockPlan {
        &self.plan
    }

    /// Apply the clock plan to the scope and wait for the ADC to lock.
    ///
    /// # Errors
    /// - `ScaError::InstrumentLockTimeout` when the ADC is still unlocked after the
    ///   poll budget
    /// - `ScaError::Instrument` on any driver fault
    #[instrument(skip(self))]
    pub fn lock(&mut self) -> AppResult<()> {
        // A failed re-lock must not leave a previous session armable.
        self.state = SessionState::Unconfigured;
        let plan = &self.plan;
        let scope = &mut self.scope;

        scope.set_gain(self.gain_db)?;
        scope.set_trigger_edge(TriggerEdge::Rising)?;
        scope.set_clock_source(ClockSource::External)?;
        scope.set_clock_frequency(plan.clock_frequency())?;
        scope.set_adc_multiplier(plan.adc_multiplier())?;
        scope.set_extclk_monitor(false)?;
        scope.set_sample_count(plan.sample_count())?;

        let offset = plan.trigger_offset();
        scope.set_sample_offset(offset.offset)?;
        if offset.presamples > 0 {
            scope.set_presamples(offset.presamples)?;
        }
        debug!(
            offset = offset.offset,
            presamples = offset.presamples,
            adc_mul = plan.adc_multiplier(),
            "Applied clock plan"
        );

        scope.set_trigger_source(self.trigger_pin)?;
        scope.route_target_uart()?;

        // Re-asserting the source makes the clock generator re-acquire lock.
        scope.set_clock_source(ClockSource::External)?;

        if let Some(adapter) = &self.segmented {
            adapter.configure(scope)?;
        }

        self.wait_for_adc_lock()?;
        self.state = SessionState::Locked;
        info!(
            sampling_rate = self.plan.sampling_rate(),
            samples = self.plan.sample_count(),
            "Scope locked"
        );
        Ok(())
    }

    fn wait_for_adc_lock(&mut self) -> AppResult<()> {
        let mut retries = 0;
        while !self.scope.is_adc_locked()? {
            if retries == self.lock_policy.max_attempts {
                return Err(ScaError::InstrumentLockTimeout { attempts: retries });
            }
            retries += 1;
            debug!(retries, "ADC not locked yet");
            self.lock_policy.pause();
        }
        Ok(())
    }

    /// Decide the capture mode for this session.
    ///
    /// `1` selects single captures; anything larger packs that many triggers into one
    /// batch capture. The mode cannot change until [`Self::reset`].
    pub fn configure_mode(&mut self, segment_count: u32) -> AppResult<CaptureMode> {
        if self.state == SessionState::Unconfigured {
            return Err(ScaError::Arm(
                "capture mode must be configured after lock()".into(),
            ));
        }
        if segment_count == 0 {
            return Err(ScaError::Configuration(
                "segment count must be at least 1".into(),
            ));
        }

        let requested = if segment_count == 1 {
            CaptureMode::Single
        } else {
            CaptureMode::Batch {
                segments: segment_count,
            }
        };

        match self.mode {
            Some(current) if current == requested => return Ok(current),
            Some(current) => {
                return Err(ScaError::Configuration(format!(
                    "capture mode already set to {current:?} for this session"
                )))
            }
            None => {}
        }

        if let CaptureMode::Batch { segments } = requested {
            let adapter = SegmentedCapture::new(segments, self.plan.sample_count());
            adapter.configure(&mut self.scope)?;
            self.segmented = Some(adapter);
        }
        self.mode = Some(requested);
        info!(mode = ?requested, "Capture mode configured");
        Ok(requested)
    }

    /// Arm the scope for the next trigger.
    ///
    /// # Errors
    /// `ScaError::Arm` if the scope has not been locked.
    pub fn arm(&mut self) -> AppResult<()> {
        if self.state == SessionState::Unconfigured {
            return Err(ScaError::Arm("arm() called before lock()".into()));
        }
        if self.mode.is_none() {
            self.mode = Some(CaptureMode::Single);
        }
        self.scope.arm()?;
        self.state = SessionState::Armed;
        Ok(())
    }

    /// Capture and read back the traces of the armed acquisition.
    ///
    /// In single mode the capture is started without blocking and `probe` is polled
    /// until the target reports completion. A target that never finishes, or a hardware
    /// capture timeout, only produces a [`CaptureWarning`]; the trace is still returned.
    pub fn capture_and_transfer<P: DoneProbe + ?Sized>(
        &mut self,
        probe: &mut P,
    ) -> AppResult<Acquisition> {
        if self.state != SessionState::Armed {
            return Err(ScaError::Arm(format!(
                "capture requested in state {:?}, expected Armed",
                self.state
            )));
        }

        let (traces, warnings) = match self.segmented {
            Some(adapter) => adapter.capture_and_transfer(&mut self.scope)?,
            None => self.capture_single(probe)?,
        };

        self.state = SessionState::Captured;
        Ok(Acquisition { traces, warnings })
    }

    fn capture_single<P: DoneProbe + ?Sized>(
        &mut self,
        probe: &mut P,
    ) -> AppResult<(Vec<crate::hardware::Trace>, Vec<CaptureWarning>)> {
        let mut warnings = Vec::new();
        let timed_out = self.scope.capture(false)?;

        let mut polls = 0;
        while !probe.is_done()? {
            polls += 1;
            if polls >= self.done_policy.max_attempts {
                warn!(polls, "Target did not finish operation");
                warnings.push(CaptureWarning::TargetNotDone { polls });
                break;
            }
            self.done_policy.pause();
        }

        if timed_out {
            warn!("Timeout happened during capture");
            warnings.push(CaptureWarning::HardwareTimeout);
        }

        let trace = self.scope.last_trace()?;
        let expected = self.plan.sample_count() as usize;
        if trace.len() != expected {
            return Err(anyhow!(
                "Scope returned {} samples, expected {}",
                trace.len(),
                expected
            )
            .into());
        }
        Ok((vec![trace], warnings))
    }

    /// Drop the session and reconnect the scope, e.g. after a target crash.
    pub fn reset(&mut self) -> AppResult<()> {
        info!("Resetting capture session");
        self.scope.reconnect()?;
        self.state = SessionState::Unconfigured;
        self.mode = None;
        self.segmented = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::clock_plan::ClockPlanParams;
    use crate::hardware::mock::{MockScope, ScriptedTarget};
    use tracing_test::traced_test;

    fn fast() -> PollPolicy {
        PollPolicy::new(Duration::ZERO, PollPolicy::TARGET_DONE.max_attempts)
    }

    fn controller(scope: &MockScope) -> CaptureController<MockScope> {
        let plan = ClockPlan::derive(ClockPlanParams::new(48e6, 2.0, 100)).unwrap();
        CaptureController::new(scope.clone(), plan, 27.0)
            .with_lock_policy(PollPolicy::new(Duration::ZERO, 3))
            .with_done_policy(fast())
    }

    #[test]
    #[traced_test]
    fn target_that_never_finishes_is_a_warning() {
        let scope = MockScope::new();
        let mut ctrl = controller(&scope);
        let mut target = ScriptedTarget::new(Vec::<String>::new()).with_done_after(None);

        ctrl.lock().unwrap();
        ctrl.arm().unwrap();
        let acq = ctrl.capture_and_transfer(&mut target).unwrap();

        assert_eq!(acq.traces.len(), 1);
        assert_eq!(acq.warnings, vec![CaptureWarning::TargetNotDone { polls: 100 }]);
        assert_eq!(target.done_polls(), 100);
        assert!(logs_contain("Target did not finish operation"));
    }

    #[test]
    #[traced_test]
    fn hardware_timeout_still_returns_trace() {
        let scope = MockScope::new();
        scope.set_capture_timeout(true);
        let mut ctrl = controller(&scope);
        let mut target = ScriptedTarget::new(Vec::<String>::new());

        ctrl.lock().unwrap();
        ctrl.arm().unwrap();
        let acq = ctrl.capture_and_transfer(&mut target).unwrap();

        assert_eq!(acq.traces[0].len(), 201);
        assert_eq!(acq.warnings, vec![CaptureWarning::HardwareTimeout]);
        assert!(logs_contain("Timeout happened during capture"));
    }

    #[test]
    fn lock_applies_clock_plan() {
        let scope = MockScope::new();
        let mut ctrl = controller(&scope);
        ctrl.lock().unwrap();

        let s = scope.settings();
        assert_eq!(s.gain_db, Some(27.0));
        assert_eq!(s.clock_source, Some(ClockSource::External));
        assert_eq!(s.clock_frequency, Some(48e6));
        assert_eq!(s.adc_multiplier, Some(4));
        assert_eq!(s.extclk_monitor, Some(false));
        assert_eq!(s.sample_count, Some(201));
        assert_eq!(s.sample_offset, Some(0));
        assert_eq!(s.presamples, None);
        assert_eq!(s.trigger_source, Some(TriggerPin::Tio4));
        assert_eq!(s.trigger_edge, Some(TriggerEdge::Rising));
        assert!(s.uart_routed);
        assert_eq!(ctrl.state(), SessionState::Locked);
    }

    #[test]
    fn lock_gives_up_after_three_retries() {
        let scope = MockScope::with_lock_after(None);
        let mut ctrl = controller(&scope);
        let err = ctrl.lock().unwrap_err();

        assert!(matches!(err, ScaError::InstrumentLockTimeout { attempts: 3 }));
        assert_eq!(scope.lock_polls(), 4);
        assert_eq!(ctrl.state(), SessionState::Unconfigured);
    }

    #[test]
    #[traced_test]
    fn failed_relock_drops_the_locked_state() {
        let scope = MockScope::new();
        let mut ctrl = controller(&scope);
        ctrl.lock().unwrap();
        ctrl.configure_mode(1).unwrap();

        scope.set_lock_after(None);
        assert!(ctrl.lock().is_err());
        assert_eq!(ctrl.state(), SessionState::Unconfigured);
        assert!(matches!(ctrl.configure_mode(1), Err(ScaError::Arm(_))));
        assert!(logs_contain("ADC not locked yet"));
    }

    #[test]
    fn lock_succeeds_on_last_retry() {
        let scope = MockScope::with_lock_after(Some(4));
        let mut ctrl = controller(&scope);
        ctrl.lock().unwrap();
        assert_eq!(scope.lock_polls(), 4);
    }

    #[test]
    fn mode_cannot_change_mid_session() {
        let scope = MockScope::new();
        let mut ctrl = controller(&scope);
        assert!(matches!(ctrl.configure_mode(5), Err(ScaError::Arm(_))));

        ctrl.lock().unwrap();
        assert_eq!(ctrl.configure_mode(5).unwrap(), CaptureMode::Batch { segments: 5 });
        assert_eq!(ctrl.configure_mode(5).unwrap(), CaptureMode::Batch { segments: 5 });
        assert!(matches!(ctrl.configure_mode(1), Err(ScaError::Configuration(_))));
        assert!(matches!(ctrl.configure_mode(0), Err(ScaError::Configuration(_))));
        assert_eq!(scope.settings().segment_count, Some(5));
    }

    #[test]
    fn reset_returns_to_unconfigured() {
        let scope = MockScope::new();
        let mut ctrl = controller(&scope);
        ctrl.lock().unwrap();
        ctrl.configure_mode(4).unwrap();
        ctrl.reset().unwrap();

        assert_eq!(ctrl.state(), SessionState::Unconfigured);
        assert_eq!(ctrl.mode(), None);
        assert_eq!(scope.reconnects(), 1);
        assert!(matches!(ctrl.arm(), Err(ScaError::Arm(_))));

        ctrl.lock().unwrap();
        assert_eq!(ctrl.configure_mode(1).unwrap(), CaptureMode::Single);
    }
}
