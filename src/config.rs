//! Rig configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, `config/sca.toml` by default)
//! 2. Environment variables prefixed with `SCA_DAQ_`, sections separated by `__`
//!
//! Example: `SCA_DAQ_TARGET__PORT=/dev/ttyUSB1` overrides `[target] port`.
//!
//! Everything is validated before any hardware is touched.
//!
//! # Example
//! ```no_run
//! use sca_daq::config::ScaConfig;
//!
//! let config = ScaConfig::load()?;
//! config.validate()?;
//! let plan = config.clock_plan()?;
//! println!("{} samples per trace", plan.sample_count());
//! # Ok::<(), sca_daq::error::ScaError>(())
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::capture::clock_plan::{
    ClockPlan, ClockPlanParams, DEFAULT_SEGMENT_DIVISOR, SAMPLING_RATE_MAX,
};
use crate::error::{AppResult, ScaError};
use crate::fvsr::{FvsrJob, FvsrOperation};
use crate::glitch::GlitchParameters;
use crate::hardware::DoneSignal;
use crate::validation::{is_in_range, is_not_empty, is_positive_frequency, is_valid_log_level};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/sca.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SCA_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaConfig {
    pub application: ApplicationConfig,
    pub scope: ScopeConfig,
    pub target: TargetConfig,
    pub fvsr: FvsrConfig,
    /// Voltage glitching; absent for pure side-channel captures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glitch: Option<GlitchConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Scope and sample-window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Front-end gain in dB.
    pub gain_db: f64,
    /// Window length in target cycles.
    pub num_cycles: u32,
    /// Triggers per capture; 1 for single captures.
    #[serde(default = "default_num_segments")]
    pub num_segments: u32,
    /// Trigger offset in target cycles; negative captures before the trigger.
    #[serde(default)]
    pub offset_cycles: i64,
    /// Target PLL frequency in Hz.
    pub pll_frequency: f64,
    pub target_clk_mult: f64,
    #[serde(default = "default_max_sampling_rate")]
    pub max_sampling_rate: f64,
    #[serde(default = "default_segment_divisor")]
    pub segment_divisor: u32,
}

/// Target console settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-line read timeout.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub done_signal: DoneSignal,
    /// Delay between the frames of a multi-part command.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl TargetConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Workload settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FvsrConfig {
    /// Operation name: short (`vec_add`), legacy (`ml_dsa_vec_add_batch_fvsr`) or
    /// firmware tag (`VecAddFvsr`).
    pub operation: String,
    pub fixed_vector: Vec<u32>,
    pub iterations: u32,
    #[serde(default = "default_num_batches")]
    pub num_batches: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlitchConfig {
    pub pll_frequency: f64,
    /// Glitch width in clock cycles.
    pub glitch_width: u32,
    /// Trigger-to-glitch delay in clock cycles.
    pub trigger_delay: u32,
}

impl GlitchConfig {
    pub fn parameters(&self) -> GlitchParameters {
        GlitchParameters {
            width: self.glitch_width,
            delay: self.trigger_delay,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_num_segments() -> u32 {
    1
}

fn default_max_sampling_rate() -> f64 {
    SAMPLING_RATE_MAX
}

fn default_segment_divisor() -> u32 {
    DEFAULT_SEGMENT_DIVISOR
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_settle_delay_ms() -> u64 {
    10
}

fn default_num_batches() -> u32 {
    1
}

impl Default for ScaConfig {
    /// ML-DSA vector-add capture on a 100 MHz target.
    fn default() -> Self {
        Self {
            application: ApplicationConfig {
                name: "sca-daq".to_string(),
                log_level: default_log_level(),
            },
            scope: ScopeConfig {
                gain_db: 27.0,
                num_cycles: 100,
                num_segments: 10,
                offset_cycles: 0,
                pll_frequency: 100e6,
                target_clk_mult: 1.0,
                max_sampling_rate: default_max_sampling_rate(),
                segment_divisor: default_segment_divisor(),
            },
            target: TargetConfig {
                port: "/dev/ttyACM1".to_string(),
                baud_rate: default_baud_rate(),
                read_timeout_ms: default_read_timeout_ms(),
                done_signal: DoneSignal::default(),
                settle_delay_ms: default_settle_delay_ms(),
            },
            fvsr: FvsrConfig {
                operation: FvsrOperation::VecAdd.name().to_string(),
                fixed_vector: vec![1, 2, 3, 4],
                iterations: 10,
                num_batches: default_num_batches(),
            },
            glitch: None,
        }
    }
}

impl ScaConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error by itself, but every required key must then come
    /// from the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// Load on top of [`ScaConfig::default`], so the file only needs the keys it changes.
    pub fn load_with_defaults<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Figment::from(Serialized::defaults(ScaConfig::default()))
            .merge(Self::figment(path))
            .extract()?)
    }

    fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Check every value that would otherwise only fail on the hardware.
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |field: &str, e: &str| ScaError::Configuration(format!("{field}: {e}"));

        is_not_empty(&self.application.name).map_err(|e| invalid("application.name", e))?;
        is_valid_log_level(&self.application.log_level)
            .map_err(|e| invalid("application.log_level", e))?;

        is_in_range(self.scope.gain_db, -6.5..=56.0).map_err(|e| invalid("scope.gain_db", e))?;
        if self.scope.num_segments == 0 {
            return Err(invalid("scope.num_segments", "must be at least 1"));
        }
        is_positive_frequency(self.scope.pll_frequency)
            .map_err(|e| invalid("scope.pll_frequency", e))?;

        is_not_empty(&self.target.port).map_err(|e| invalid("target.port", e))?;
        if self.target.baud_rate == 0 {
            return Err(invalid("target.baud_rate", "must be greater than 0"));
        }
        if self.target.read_timeout_ms == 0 {
            return Err(invalid("target.read_timeout_ms", "must be greater than 0"));
        }

        if self.fvsr.iterations == 0 {
            return Err(invalid("fvsr.iterations", "must be at least 1"));
        }
        if self.scope.num_segments > 1 && self.scope.num_segments != self.fvsr.iterations {
            return Err(invalid(
                "scope.num_segments",
                "must be 1 or equal to fvsr.iterations (one segment per firmware iteration)",
            ));
        }
        let job = self.fvsr_job()?;
        job.operation.payload(&job.fixed_vector, job.iterations)?;

        if let Some(glitch) = &self.glitch {
            is_positive_frequency(glitch.pll_frequency)
                .map_err(|e| invalid("glitch.pll_frequency", e))?;
            if glitch.glitch_width == 0 {
                return Err(invalid("glitch.glitch_width", "must be at least 1 cycle"));
            }
        }

        self.clock_plan().map(|_| ())
    }

    pub fn clock_plan_params(&self) -> ClockPlanParams {
        let s = &self.scope;
        ClockPlanParams::new(s.pll_frequency, s.target_clk_mult, s.num_cycles)
            .with_offset_cycles(s.offset_cycles)
            .with_max_sampling_rate(s.max_sampling_rate)
            .with_segment_divisor(s.segment_divisor)
    }

    /// Derive the clock plan for the `[scope]` section.
    pub fn clock_plan(&self) -> AppResult<ClockPlan> {
        ClockPlan::derive(self.clock_plan_params())
    }

    /// Resolve the `[fvsr]` section into a job.
    ///
    /// # Errors
    /// `ScaError::UnknownOperation` for an operation name outside the closed set.
    pub fn fvsr_job(&self) -> AppResult<FvsrJob> {
        let operation: FvsrOperation = self.fvsr.operation.parse()?;
        Ok(FvsrJob::new(
            operation,
            self.fvsr.fixed_vector.clone(),
            self.fvsr.iterations,
        ))
    }

    /// Render as TOML, e.g. to seed a new configuration file.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ScaError::Configuration(format!("cannot serialise configuration: {e}")))
    }
}
