//! Mock Hardware Implementations
//!
//! Provides simulated hardware for testing without a scope, glitcher or target board.
//! Every mock is a cheap `Clone` handle around shared state, so a test can hand one
//! clone to a controller and keep another to inspect what the controller did.
//!
//! # Available Mocks
//!
//! - `MockScope` - register-recording scope with configurable lock latency and
//!   deterministic synthetic traces
//! - `MockGlitcher` - records glitch configuration and arm count
//! - `ScriptedTarget` - replays a fixed list of console lines and records writes
//! - `SimulatedMlDsaTarget` - answers uJSON frames the way the ML-DSA SCA firmware does

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::hardware::capabilities::{
    ClockSource, GlitchDriver, GlitchMode, GlitchTrigger, ScopeDriver, TargetLink, Trace,
    TriggerEdge, TriggerPin,
};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// MockScope - Simulated Capture Scope
// =============================================================================

/// Register values written to a [`MockScope`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeSettings {
    pub gain_db: Option<f64>,
    pub clock_source: Option<ClockSource>,
    pub clock_frequency: Option<f64>,
    pub adc_multiplier: Option<u32>,
    pub extclk_monitor: Option<bool>,
    pub sample_count: Option<u32>,
    pub sample_offset: Option<u32>,
    pub presamples: Option<u32>,
    pub trigger_source: Option<TriggerPin>,
    pub trigger_edge: Option<TriggerEdge>,
    pub uart_routed: bool,
    pub segment_count: Option<u32>,
}

#[derive(Debug, Default)]
struct MockScopeState {
    settings: ScopeSettings,
    /// `None` never locks, `Some(n)` locks on the n-th poll (1-based).
    lock_after_polls: Option<u32>,
    lock_polls: u32,
    armed: bool,
    arm_count: u32,
    capture_count: u32,
    report_capture_timeout: bool,
    fail_captures: bool,
    reconnects: u32,
}

/// Mock scope that records every register write
///
/// Simulates a capture scope with:
/// - ADC lock after a configurable number of polls
/// - Synthetic 12-bit traces exactly `sample_count` long
/// - One trace per configured segment in batch mode
///
/// # Example
///
/// ```rust,ignore
/// let scope = MockScope::new();
/// let mut controller = CaptureController::new(scope.clone(), plan, 0.0);
/// controller.lock()?;
/// assert_eq!(scope.settings().adc_multiplier, Some(4));
/// ```
#[derive(Debug, Clone)]
pub struct MockScope {
    state: Arc<Mutex<MockScopeState>>,
}

impl MockScope {
    /// Scope whose ADC reports lock on the first poll.
    pub fn new() -> Self {
        Self::with_lock_after(Some(1))
    }

    /// Scope whose ADC locks on the given poll, or never for `None`.
    pub fn with_lock_after(polls: Option<u32>) -> Self {
        let state = MockScopeState {
            lock_after_polls: polls,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Change when the ADC locks, counting polls from zero again.
    pub fn set_lock_after(&self, polls: Option<u32>) {
        let mut state = locked(&self.state);
        state.lock_after_polls = polls;
        state.lock_polls = 0;
    }

    /// Make subsequent captures report a hardware timeout.
    pub fn set_capture_timeout(&self, timeout: bool) {
        locked(&self.state).report_capture_timeout = timeout;
    }

    /// Make subsequent captures fail with a communication fault.
    pub fn set_capture_failure(&self, fail: bool) {
        locked(&self.state).fail_captures = fail;
    }

    /// Snapshot of the registers written so far.
    pub fn settings(&self) -> ScopeSettings {
        locked(&self.state).settings.clone()
    }

    /// Number of `is_adc_locked` polls since the last reconnect.
    pub fn lock_polls(&self) -> u32 {
        locked(&self.state).lock_polls
    }

    pub fn arm_count(&self) -> u32 {
        locked(&self.state).arm_count
    }

    pub fn capture_count(&self) -> u32 {
        locked(&self.state).capture_count
    }

    pub fn reconnects(&self) -> u32 {
        locked(&self.state).reconnects
    }

    fn synth_trace(capture: u32, segment: u32, samples: u32) -> Trace {
        (0..samples)
            .map(|i| {
                let v = 2048 + ((i * 37 + segment * 101 + capture * 13) % 512);
                (v & 0x0FFF) as u16
            })
            .collect()
    }
}

impl Default for MockScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeDriver for MockScope {
    fn set_gain(&mut self, db: f64) -> Result<()> {
        locked(&self.state).settings.gain_db = Some(db);
        Ok(())
    }

    fn set_clock_source(&mut self, source: ClockSource) -> Result<()> {
        locked(&self.state).settings.clock_source = Some(source);
        Ok(())
    }

    fn set_clock_frequency(&mut self, hz: f64) -> Result<()> {
        locked(&self.state).settings.clock_frequency = Some(hz);
        Ok(())
    }

    fn set_adc_multiplier(&mut self, multiplier: u32) -> Result<()> {
        locked(&self.state).settings.adc_multiplier = Some(multiplier);
        Ok(())
    }

    fn set_extclk_monitor(&mut self, enabled: bool) -> Result<()> {
        locked(&self.state).settings.extclk_monitor = Some(enabled);
        Ok(())
    }

    fn set_sample_count(&mut self, samples: u32) -> Result<()> {
        locked(&self.state).settings.sample_count = Some(samples);
        Ok(())
    }

    fn set_sample_offset(&mut self, samples: u32) -> Result<()> {
        locked(&self.state).settings.sample_offset = Some(samples);
        Ok(())
    }

    fn set_presamples(&mut self, samples: u32) -> Result<()> {
        locked(&self.state).settings.presamples = Some(samples);
        Ok(())
    }

    fn set_trigger_source(&mut self, pin: TriggerPin) -> Result<()> {
        locked(&self.state).settings.trigger_source = Some(pin);
        Ok(())
    }

    fn set_trigger_edge(&mut self, edge: TriggerEdge) -> Result<()> {
        locked(&self.state).settings.trigger_edge = Some(edge);
        Ok(())
    }

    fn route_target_uart(&mut self) -> Result<()> {
        locked(&self.state).settings.uart_routed = true;
        Ok(())
    }

    fn set_segment_count(&mut self, segments: u32) -> Result<()> {
        locked(&self.state).settings.segment_count = Some(segments);
        Ok(())
    }

    fn is_adc_locked(&mut self) -> Result<bool> {
        let mut state = locked(&self.state);
        state.lock_polls += 1;
        Ok(matches!(state.lock_after_polls, Some(n) if state.lock_polls >= n))
    }

    fn arm(&mut self) -> Result<()> {
        let mut state = locked(&self.state);
        state.armed = true;
        state.arm_count += 1;
        Ok(())
    }

    fn capture(&mut self, _blocking: bool) -> Result<bool> {
        let mut state = locked(&self.state);
        if state.fail_captures {
            return Err(anyhow!("MockScope: USB transfer failed"));
        }
        if !state.armed {
            return Err(anyhow!("MockScope: capture without arm"));
        }
        state.armed = false;
        state.capture_count += 1;
        Ok(state.report_capture_timeout)
    }

    fn last_trace(&mut self) -> Result<Trace> {
        let state = locked(&self.state);
        let samples = state.settings.sample_count.unwrap_or(0);
        Ok(Self::synth_trace(state.capture_count, 0, samples))
    }

    fn captured_segments(&mut self) -> Result<Vec<Trace>> {
        let state = locked(&self.state);
        let samples = state.settings.sample_count.unwrap_or(0);
        let segments = state.settings.segment_count.unwrap_or(1);
        Ok((0..segments)
            .map(|segment| Self::synth_trace(state.capture_count, segment, samples))
            .collect())
    }

    fn reconnect(&mut self) -> Result<()> {
        let mut state = locked(&self.state);
        let lock_after_polls = state.lock_after_polls;
        let reconnects = state.reconnects + 1;
        *state = MockScopeState {
            lock_after_polls,
            reconnects,
            ..Default::default()
        };
        Ok(())
    }
}

// =============================================================================
// MockGlitcher - Simulated Crowbar Glitcher
// =============================================================================

/// Glitch configuration written to a [`MockGlitcher`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlitchSettings {
    pub clock_frequency: Option<f64>,
    pub mode: Option<GlitchMode>,
    pub enable_only: Option<bool>,
    pub glitch_trigger: Option<GlitchTrigger>,
    pub trigger_source: Option<TriggerPin>,
    pub pulse_width: Option<u32>,
    pub trigger_delay: Option<u32>,
}

#[derive(Debug, Default)]
struct MockGlitcherState {
    settings: GlitchSettings,
    arm_count: u32,
    reconnects: u32,
}

/// Mock glitcher recording its configuration.
#[derive(Debug, Clone, Default)]
pub struct MockGlitcher {
    state: Arc<Mutex<MockGlitcherState>>,
}

impl MockGlitcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> GlitchSettings {
        locked(&self.state).settings.clone()
    }

    pub fn arm_count(&self) -> u32 {
        locked(&self.state).arm_count
    }

    pub fn reconnects(&self) -> u32 {
        locked(&self.state).reconnects
    }
}

impl GlitchDriver for MockGlitcher {
    fn set_clock_frequency(&mut self, hz: f64) -> Result<()> {
        locked(&self.state).settings.clock_frequency = Some(hz);
        Ok(())
    }

    fn setup_voltage_glitch(&mut self, mode: GlitchMode) -> Result<()> {
        locked(&self.state).settings.mode = Some(mode);
        Ok(())
    }

    fn set_glitch_output_enable_only(&mut self, enable_only: bool) -> Result<()> {
        locked(&self.state).settings.enable_only = Some(enable_only);
        Ok(())
    }

    fn set_glitch_trigger_source(&mut self, trigger: GlitchTrigger) -> Result<()> {
        locked(&self.state).settings.glitch_trigger = Some(trigger);
        Ok(())
    }

    fn set_trigger_source(&mut self, pin: TriggerPin) -> Result<()> {
        locked(&self.state).settings.trigger_source = Some(pin);
        Ok(())
    }

    fn set_pulse_width(&mut self, cycles: u32) -> Result<()> {
        locked(&self.state).settings.pulse_width = Some(cycles);
        Ok(())
    }

    fn set_trigger_delay(&mut self, cycles: u32) -> Result<()> {
        locked(&self.state).settings.trigger_delay = Some(cycles);
        Ok(())
    }

    fn arm(&mut self) -> Result<()> {
        locked(&self.state).arm_count += 1;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<()> {
        let mut state = locked(&self.state);
        state.settings = GlitchSettings::default();
        state.reconnects += 1;
        Ok(())
    }
}

// =============================================================================
// ScriptedTarget - Replayed Console Output
// =============================================================================

#[derive(Debug, Default)]
struct ScriptedTargetState {
    incoming: VecDeque<String>,
    written: Vec<Vec<u8>>,
    lines_read: usize,
    /// `None` never reports done, `Some(n)` reports done on the n-th poll.
    done_after_polls: Option<u32>,
    done_polls: u32,
}

/// Target link that replays scripted console lines.
///
/// Once the script is exhausted, `read_line` behaves like a read timeout and returns
/// an empty line.
#[derive(Debug, Clone)]
pub struct ScriptedTarget {
    state: Arc<Mutex<ScriptedTargetState>>,
}

impl ScriptedTarget {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = ScriptedTargetState {
            incoming: lines.into_iter().map(Into::into).collect(),
            done_after_polls: Some(1),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Report done on the n-th poll, or never for `None`.
    pub fn with_done_after(self, polls: Option<u32>) -> Self {
        locked(&self.state).done_after_polls = polls;
        self
    }

    /// Append more console output.
    pub fn push_line(&self, line: impl Into<String>) {
        locked(&self.state).incoming.push_back(line.into());
    }

    /// Every write, one entry per `write` call.
    pub fn written(&self) -> Vec<Vec<u8>> {
        locked(&self.state).written.clone()
    }

    /// Writes decoded as UTF-8 frames.
    pub fn written_frames(&self) -> Vec<String> {
        self.written()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    pub fn lines_read(&self) -> usize {
        locked(&self.state).lines_read
    }

    pub fn done_polls(&self) -> u32 {
        locked(&self.state).done_polls
    }
}

impl TargetLink for ScriptedTarget {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        locked(&self.state).written.push(bytes.to_vec());
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut state = locked(&self.state);
        state.lines_read += 1;
        Ok(state.incoming.pop_front().unwrap_or_default())
    }

    fn is_done(&mut self) -> Result<bool> {
        let mut state = locked(&self.state);
        state.done_polls += 1;
        Ok(matches!(state.done_after_polls, Some(n) if state.done_polls >= n))
    }
}

// =============================================================================
// SimulatedMlDsaTarget - uJSON Firmware Emulation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FirmwareState {
    Idle,
    AppSelected,
    AwaitingPayload,
}

#[derive(Debug)]
struct SimulatedState {
    firmware: FirmwareState,
    outgoing: VecDeque<String>,
    written: Vec<String>,
    device_id: Vec<u32>,
}

/// Emulation of the ML-DSA SCA firmware command handler.
///
/// Accepts the `"MlDsaSca"` selector, then `"Init"` (answers with the device id) or one
/// of the `*Fvsr` commands followed by a payload object (answers with the number of
/// iterations executed). Every reply is preceded by a debug line, as on a shared UART.
#[derive(Debug, Clone)]
pub struct SimulatedMlDsaTarget {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedMlDsaTarget {
    pub fn new(device_id: Vec<u32>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatedState {
                firmware: FirmwareState::Idle,
                outgoing: VecDeque::new(),
                written: Vec::new(),
                device_id,
            })),
        }
    }

    /// Frames written by the host, in order.
    pub fn written_frames(&self) -> Vec<String> {
        locked(&self.state).written.clone()
    }

    fn reply(state: &mut SimulatedState, body: &serde_json::Value) {
        let body = body.to_string();
        let crc = body.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        state
            .outgoing
            .push_back(format!("[dbg] handler state {:?}", state.firmware));
        state
            .outgoing
            .push_back(format!("RESP_OK:{body} CRC:{crc:08x}"));
    }
}

impl TargetLink for SimulatedMlDsaTarget {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let frame = String::from_utf8_lossy(bytes).into_owned();
        let mut state = locked(&self.state);
        state.written.push(frame.clone());

        let value: serde_json::Value = serde_json::from_str(&frame)
            .map_err(|e| anyhow!("SimulatedMlDsaTarget: unparseable frame '{frame}': {e}"))?;

        match (state.firmware, &value) {
            (_, serde_json::Value::String(tag)) if tag == "MlDsaSca" => {
                state.firmware = FirmwareState::AppSelected;
            }
            (FirmwareState::AppSelected, serde_json::Value::String(tag)) if tag == "Init" => {
                let id = serde_json::json!({ "device_id": state.device_id });
                Self::reply(&mut state, &id);
                state.firmware = FirmwareState::Idle;
            }
            (FirmwareState::AppSelected, serde_json::Value::String(tag)) if tag.ends_with("Fvsr") => {
                state.firmware = FirmwareState::AwaitingPayload;
            }
            (FirmwareState::AwaitingPayload, serde_json::Value::Object(obj)) => {
                let iterations = obj
                    .get("iterations")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                Self::reply(&mut state, &serde_json::json!({ "result": iterations }));
                state.firmware = FirmwareState::Idle;
            }
            _ => {
                state
                    .outgoing
                    .push_back(format!("[err] unexpected frame {frame}"));
                state.firmware = FirmwareState::Idle;
            }
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        Ok(locked(&self.state).outgoing.pop_front().unwrap_or_default())
    }

    fn is_done(&mut self) -> Result<bool> {
        Ok(locked(&self.state).firmware == FirmwareState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_scope_locks_on_configured_poll() {
        let mut scope = MockScope::with_lock_after(Some(3));
        assert!(!scope.is_adc_locked().unwrap());
        assert!(!scope.is_adc_locked().unwrap());
        assert!(scope.is_adc_locked().unwrap());
        assert_eq!(scope.lock_polls(), 3);
    }

    #[test]
    fn mock_scope_refuses_capture_without_arm() {
        let mut scope = MockScope::new();
        assert!(scope.capture(false).is_err());
        scope.arm().unwrap();
        assert!(!scope.capture(false).unwrap());
    }

    #[test]
    fn mock_scope_reconnect_clears_registers() {
        let mut scope = MockScope::new();
        scope.set_sample_count(300).unwrap();
        scope.reconnect().unwrap();
        assert_eq!(scope.settings(), ScopeSettings::default());
        assert_eq!(scope.reconnects(), 1);
    }

    #[test]
    fn scripted_target_returns_empty_line_when_exhausted() {
        let mut target = ScriptedTarget::new(["first"]);
        assert_eq!(target.read_line().unwrap(), "first");
        assert_eq!(target.read_line().unwrap(), "");
        assert_eq!(target.lines_read(), 2);
    }

    #[test]
    fn simulated_target_answers_init() {
        let mut target = SimulatedMlDsaTarget::new(vec![1, 2]);
        target.write(b"\"MlDsaSca\"").unwrap();
        target.write(b"\"Init\"").unwrap();
        assert!(target.read_line().unwrap().starts_with("[dbg]"));
        let reply = target.read_line().unwrap();
        assert!(reply.starts_with("RESP_OK:{\"device_id\":[1,2]} CRC:"));
    }
}
