//! Sample-clock and window derivation.
//!
//! The scope runs off the target's PLL clock and multiplies it by an integer to obtain
//! its sampling rate, which must stay at or below the scope's maximum. The target block
//! itself runs at an integer multiple of the same PLL clock, so a window requested in
//! *target cycles* maps to a fixed number of *samples*.
//!
//! [`ClockPlan`] is computed once, before any hardware is touched, and is immutable.

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ScaError};
use crate::validation::is_positive_frequency;

/// Maximum ADC sampling rate of the capture scope in Hz.
pub const SAMPLING_RATE_MAX: f64 = 200e6;

/// Batch captures require the per-segment sample count to be a multiple of this.
pub const DEFAULT_SEGMENT_DIVISOR: u32 = 3;

/// Physical inputs of a [`ClockPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockPlanParams {
    /// Target PLL frequency in Hz, also used as the scope's clock generator frequency.
    pub base_pll_frequency: f64,
    /// Scope ADC limit in Hz.
    pub max_sampling_rate: f64,
    /// Target block clock = PLL clock * this multiplier.
    pub target_clock_multiplier: f64,
    /// Length of the capture window in target cycles.
    pub requested_cycle_count: u32,
    /// Trigger offset in target cycles. Negative values capture before the trigger.
    pub requested_offset_cycles: i64,
    /// Sample counts are rounded up to a multiple of this.
    pub segment_divisor: u32,
}

impl ClockPlanParams {
    /// Parameters with the scope's default rate limit and segment divisor.
    pub fn new(base_pll_frequency: f64, target_clock_multiplier: f64, cycles: u32) -> Self {
        Self {
            base_pll_frequency,
            max_sampling_rate: SAMPLING_RATE_MAX,
            target_clock_multiplier,
            requested_cycle_count: cycles,
            requested_offset_cycles: 0,
            segment_divisor: DEFAULT_SEGMENT_DIVISOR,
        }
    }

    pub fn with_offset_cycles(mut self, offset: i64) -> Self {
        self.requested_offset_cycles = offset;
        self
    }

    pub fn with_max_sampling_rate(mut self, rate: f64) -> Self {
        self.max_sampling_rate = rate;
        self
    }

    pub fn with_segment_divisor(mut self, divisor: u32) -> Self {
        self.segment_divisor = divisor;
        self
    }
}

/// How a signed sample offset is realised on the scope.
///
/// The offset register is unsigned: a negative offset becomes a zero offset plus the
/// same number of pre-trigger samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerOffset {
    pub offset: u32,
    pub presamples: u32,
}

/// Timing constants derived from [`ClockPlanParams`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockPlan {
    params: ClockPlanParams,
    adc_multiplier: u32,
    sampling_rate: f64,
    target_frequency: f64,
    raw_sample_count: u64,
    sample_count: u32,
    offset_samples: i64,
}

impl ClockPlan {
    /// Derive the plan.
    ///
    /// # Errors
    /// `ScaError::Configuration` when a frequency is not positive, when the PLL clock is
    /// faster than the scope can sample (`adc_multiplier < 1`), or when the window
    /// collapses to zero samples.
    pub fn derive(params: ClockPlanParams) -> AppResult<Self> {
        is_positive_frequency(params.base_pll_frequency)
            .map_err(|e| ScaError::Configuration(format!("base PLL frequency: {e}")))?;
        is_positive_frequency(params.max_sampling_rate)
            .map_err(|e| ScaError::Configuration(format!("max sampling rate: {e}")))?;
        if !params.target_clock_multiplier.is_finite() || params.target_clock_multiplier <= 0.0 {
            return Err(ScaError::Configuration(format!(
                "target clock multiplier must be > 0, got {}",
                params.target_clock_multiplier
            )));
        }
        if params.segment_divisor == 0 {
            return Err(ScaError::Configuration(
                "segment divisor must be at least 1".into(),
            ));
        }

        let adc_multiplier = (params.max_sampling_rate / params.base_pll_frequency).floor();
        if adc_multiplier < 1.0 {
            return Err(ScaError::Configuration(format!(
                "PLL frequency {} Hz exceeds the maximum sampling rate {} Hz",
                params.base_pll_frequency, params.max_sampling_rate
            )));
        }
        let adc_multiplier = adc_multiplier as u32;

        let sampling_rate = params.base_pll_frequency * f64::from(adc_multiplier);
        let target_frequency = params.base_pll_frequency * params.target_clock_multiplier;
        let ratio = sampling_rate / target_frequency;

        let raw = (f64::from(params.requested_cycle_count) * ratio).round();
        if !raw.is_finite() || raw > f64::from(u32::MAX) {
            return Err(ScaError::Configuration(format!(
                "{} cycles at {:.3e} samples/cycle exceeds the scope range",
                params.requested_cycle_count, ratio
            )));
        }
        if raw <= 0.0 {
            return Err(ScaError::Configuration(format!(
                "{} cycles at {:.3} samples/cycle yields no samples",
                params.requested_cycle_count, ratio
            )));
        }
        let raw_sample_count = raw as u64;

        let divisor = u64::from(params.segment_divisor);
        let sample_count = raw_sample_count
            .div_ceil(divisor)
            .checked_mul(divisor)
            .and_then(|rounded| u32::try_from(rounded).ok())
            .ok_or_else(|| {
                ScaError::Configuration(format!(
                    "sample count {raw_sample_count} rounded to a multiple of {divisor} exceeds the scope range"
                ))
            })?;

        let offset = (params.requested_offset_cycles as f64 * ratio).round();
        if !offset.is_finite() || offset.abs() > f64::from(u32::MAX) {
            return Err(ScaError::Configuration(format!(
                "offset of {} cycles exceeds the scope range",
                params.requested_offset_cycles
            )));
        }
        let offset_samples = offset as i64;

        Ok(Self {
            params,
            adc_multiplier,
            sampling_rate,
            target_frequency,
            raw_sample_count,
            sample_count,
            offset_samples,
        })
    }

    pub fn params(&self) -> &ClockPlanParams {
        &self.params
    }

    /// Clock generator frequency programmed into the scope.
    pub fn clock_frequency(&self) -> f64 {
        self.params.base_pll_frequency
    }

    pub fn adc_multiplier(&self) -> u32 {
        self.adc_multiplier
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn target_frequency(&self) -> f64 {
        self.target_frequency
    }

    /// Samples per target cycle.
    pub fn samples_per_cycle(&self) -> f64 {
        self.sampling_rate / self.target_frequency
    }

    /// Window length before rounding to the segment divisor.
    pub fn raw_sample_count(&self) -> u64 {
        self.raw_sample_count
    }

    /// Window length in samples, a multiple of the segment divisor.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Signed trigger offset in samples.
    pub fn offset_samples(&self) -> i64 {
        self.offset_samples
    }

    /// Register values realising [`Self::offset_samples`].
    ///
    /// Presamples are not range-checked against the scope's buffer; the driver is
    /// trusted to accept them.
    pub fn trigger_offset(&self) -> TriggerOffset {
        let clamp = |v: i64| u32::try_from(v).unwrap_or(u32::MAX);
        if self.offset_samples >= 0 {
            TriggerOffset {
                offset: clamp(self.offset_samples),
                presamples: 0,
            }
        } else {
            TriggerOffset {
                offset: 0,
                presamples: clamp(-self.offset_samples),
            }
        }
    }
}
