//! Crowbar voltage glitching.
//!
//! Configures the glitch path so that one glitch lasts one clock-generator period and
//! the output is driven only for the repeat count. The controller arms one glitch per
//! external trigger; choosing the width/delay points is up to the caller.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppResult, ScaError};
use crate::hardware::{GlitchDriver, GlitchMode, GlitchTrigger, TriggerPin};
use crate::validation::is_positive_frequency;

/// Width and delay of one glitch, both in clock-generator cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlitchParameters {
    pub width: u32,
    pub delay: u32,
}

/// Owns the glitcher and keeps it configured across target crashes.
pub struct GlitchController<G: GlitchDriver> {
    glitcher: G,
    pll_frequency: f64,
    trigger_pin: TriggerPin,
    initialised: bool,
}

impl<G: GlitchDriver> GlitchController<G> {
    /// # Errors
    /// `ScaError::Configuration` for a non-positive PLL frequency.
    pub fn new(glitcher: G, pll_frequency: f64) -> AppResult<Self> {
        is_positive_frequency(pll_frequency)
            .map_err(|e| ScaError::Configuration(format!("glitch PLL frequency: {e}")))?;
        Ok(Self {
            glitcher,
            pll_frequency,
            trigger_pin: TriggerPin::Tio4,
            initialised: false,
        })
    }

    pub fn with_trigger_pin(mut self, pin: TriggerPin) -> Self {
        self.trigger_pin = pin;
        self
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Program clock, MOSFET and trigger path.
    pub fn init(&mut self) -> AppResult<()> {
        let g = &mut self.glitcher;
        g.set_clock_frequency(self.pll_frequency)?;
        g.setup_voltage_glitch(GlitchMode::HighPower)?;
        g.set_glitch_output_enable_only(true)?;
        g.set_glitch_trigger_source(GlitchTrigger::ExtSingle)?;
        g.set_trigger_source(self.trigger_pin)?;
        self.initialised = true;
        info!(pll_frequency = self.pll_frequency, "Glitcher initialised");
        Ok(())
    }

    /// Load one glitch and arm for the next trigger.
    ///
    /// # Errors
    /// `ScaError::Arm` before [`Self::init`]; `ScaError::Configuration` for a zero width.
    pub fn arm_trigger(&mut self, params: GlitchParameters) -> AppResult<()> {
        if !self.initialised {
            return Err(ScaError::Arm("arm_trigger() called before init()".into()));
        }
        if params.width == 0 {
            return Err(ScaError::Configuration(
                "glitch width must be at least one cycle".into(),
            ));
        }
        self.glitcher.set_pulse_width(params.width)?;
        self.glitcher.set_trigger_delay(params.delay)?;
        self.glitcher.arm()?;
        debug!(width = params.width, delay = params.delay, "Glitch armed");
        Ok(())
    }

    /// Reconnect and re-initialise after a target crash.
    pub fn reset(&mut self) -> AppResult<()> {
        info!("Resetting glitcher");
        self.initialised = false;
        self.glitcher.reconnect()?;
        self.init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockGlitcher;

    #[test]
    fn init_configures_high_power_single_glitch() {
        let mock = MockGlitcher::new();
        let mut ctrl = GlitchController::new(mock.clone(), 100e6).unwrap();
        ctrl.init().unwrap();

        let s = mock.settings();
        assert_eq!(s.clock_frequency, Some(100e6));
        assert_eq!(s.mode, Some(GlitchMode::HighPower));
        assert_eq!(s.enable_only, Some(true));
        assert_eq!(s.glitch_trigger, Some(GlitchTrigger::ExtSingle));
        assert_eq!(s.trigger_source, Some(TriggerPin::Tio4));
    }

    #[test]
    fn arm_requires_init() {
        let mut ctrl = GlitchController::new(MockGlitcher::new(), 100e6).unwrap();
        let err = ctrl
            .arm_trigger(GlitchParameters { width: 2, delay: 10 })
            .unwrap_err();
        assert!(matches!(err, ScaError::Arm(_)));
    }

    #[test]
    fn arm_loads_width_and_delay() {
        let mock = MockGlitcher::new();
        let mut ctrl = GlitchController::new(mock.clone(), 100e6).unwrap();
        ctrl.init().unwrap();
        ctrl.arm_trigger(GlitchParameters { width: 3, delay: 250 }).unwrap();

        assert_eq!(mock.settings().pulse_width, Some(3));
        assert_eq!(mock.settings().trigger_delay, Some(250));
        assert_eq!(mock.arm_count(), 1);
    }

    #[test]
    fn reset_reinitialises() {
        let mock = MockGlitcher::new();
        let mut ctrl = GlitchController::new(mock.clone(), 100e6).unwrap();
        ctrl.init().unwrap();
        ctrl.reset().unwrap();
        assert_eq!(mock.reconnects(), 1);
        assert_eq!(mock.settings().mode, Some(GlitchMode::HighPower));
        assert!(ctrl.is_initialised());
    }

    #[test]
    fn rejects_zero_pll() {
        assert!(GlitchController::new(MockGlitcher::new(), 0.0).is_err());
    }
}
