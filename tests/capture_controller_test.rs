//! Capture controller lifecycle against the mock scope.

use std::time::Duration;

use sca_daq::capture::{
    CaptureController, CaptureMode, ClockPlan, ClockPlanParams, PollPolicy, SessionState,
};
use sca_daq::hardware::mock::{MockScope, ScriptedTarget};
use sca_daq::ScaError;

fn plan() -> ClockPlan {
    ClockPlan::derive(ClockPlanParams::new(48e6, 2.0, 100)).unwrap()
}

fn controller(scope: &MockScope, plan: ClockPlan) -> CaptureController<MockScope> {
    CaptureController::new(scope.clone(), plan, 20.0)
        .with_lock_policy(PollPolicy::new(Duration::ZERO, 3))
        .with_done_policy(PollPolicy::new(Duration::ZERO, 100))
}

fn idle_target() -> ScriptedTarget {
    ScriptedTarget::new(Vec::<String>::new())
}

#[test]
fn single_mode_returns_one_full_trace_per_capture() {
    let scope = MockScope::new();
    let mut ctrl = controller(&scope, plan());
    let mut target = idle_target();

    ctrl.lock().unwrap();
    for _ in 0..3 {
        ctrl.arm().unwrap();
        let acq = ctrl.capture_and_transfer(&mut target).unwrap();
        assert_eq!(acq.traces.len(), 1);
        assert_eq!(acq.traces[0].len(), 201);
        assert!(!acq.is_suspect());
        assert_eq!(ctrl.state(), SessionState::Captured);
    }
    assert_eq!(ctrl.mode(), Some(CaptureMode::Single));
    assert_eq!(scope.capture_count(), 3);
}

#[test]
fn batch_mode_returns_k_traces_in_trigger_order() {
    for k in [2, 3, 10, 50] {
        let scope = MockScope::new();
        let mut ctrl = controller(&scope, plan());
        let mut target = idle_target();

        ctrl.lock().unwrap();
        ctrl.configure_mode(k).unwrap();
        ctrl.arm().unwrap();
        let acq = ctrl.capture_and_transfer(&mut target).unwrap();

        assert_eq!(acq.traces.len(), k as usize);
        assert!(acq.traces.iter().all(|t| t.len() == 201));
        // Batch captures never poll the target.
        assert_eq!(target.done_polls(), 0);
        assert_ne!(acq.traces[0], acq.traces[1]);
    }
}

#[test]
fn lock_twice_is_idempotent() {
    let scope = MockScope::new();
    let mut ctrl = controller(&scope, plan());

    ctrl.lock().unwrap();
    let first = scope.settings();
    ctrl.lock().unwrap();

    assert_eq!(scope.settings(), first);
    assert_eq!(ctrl.state(), SessionState::Locked);
}

#[test]
fn relock_keeps_batch_geometry() {
    let scope = MockScope::new();
    let mut ctrl = controller(&scope, plan());
    ctrl.lock().unwrap();
    ctrl.configure_mode(8).unwrap();
    ctrl.lock().unwrap();
    assert_eq!(scope.settings().segment_count, Some(8));
}

#[test]
fn negative_offset_programs_presamples() {
    let scope = MockScope::new();
    let plan = ClockPlan::derive(ClockPlanParams::new(48e6, 2.0, 100).with_offset_cycles(-25)).unwrap();
    let mut ctrl = controller(&scope, plan);
    ctrl.lock().unwrap();

    assert_eq!(scope.settings().sample_offset, Some(0));
    assert_eq!(scope.settings().presamples, Some(50));
}

#[test]
fn arm_before_lock_fails() {
    let scope = MockScope::new();
    let mut ctrl = controller(&scope, plan());
    assert!(matches!(ctrl.arm(), Err(ScaError::Arm(_))));
    assert_eq!(scope.arm_count(), 0);
}

#[test]
fn capture_without_arm_fails() {
    let scope = MockScope::new();
    let mut ctrl = controller(&scope, plan());
    ctrl.lock().unwrap();
    assert!(matches!(
        ctrl.capture_and_transfer(&mut idle_target()),
        Err(ScaError::Arm(_))
    ));
}

#[test]
fn lock_timeout_is_reported() {
    let scope = MockScope::with_lock_after(None);
    let mut ctrl = controller(&scope, plan());
    let err = ctrl.lock().unwrap_err();
    assert!(matches!(err, ScaError::InstrumentLockTimeout { .. }));
    assert!(!err.is_recoverable_without_reset());
}

#[test]
fn failed_relock_cannot_be_armed() {
    let scope = MockScope::new();
    let mut ctrl = controller(&scope, plan());
    ctrl.lock().unwrap();
    ctrl.arm().unwrap();

    scope.set_lock_after(None);
    assert!(matches!(
        ctrl.lock(),
        Err(ScaError::InstrumentLockTimeout { .. })
    ));
    assert_eq!(ctrl.state(), SessionState::Unconfigured);
    assert!(matches!(ctrl.arm(), Err(ScaError::Arm(_))));
    assert_eq!(scope.arm_count(), 1);

    scope.set_lock_after(Some(1));
    ctrl.lock().unwrap();
    ctrl.arm().unwrap();
}

#[test]
fn transfer_fault_is_fatal() {
    let scope = MockScope::new();
    let mut ctrl = controller(&scope, plan());
    ctrl.lock().unwrap();
    ctrl.arm().unwrap();
    scope.set_capture_failure(true);

    let err = ctrl.capture_and_transfer(&mut idle_target()).unwrap_err();
    assert!(matches!(err, ScaError::Instrument(_)));
}
