//! CLI Entry Point for sca-daq
//!
//! - `plan`: derive and print the clock plan of a configuration
//! - `probe`: open the target serial port, initialise the firmware, print its device id
//! - `simulate`: run a full campaign against simulated scope and target
//! - `init-config`: write a starter configuration file
//!
//! # Usage
//!
//! ```bash
//! sca-daq --config config/sca.toml plan
//! sca-daq --config config/sca.toml simulate --batches 5
//! SCA_DAQ_TARGET__PORT=/dev/ttyUSB0 sca-daq probe
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

use sca_daq::campaign::FvsrCampaign;
use sca_daq::capture::CaptureController;
use sca_daq::config::{ScaConfig, DEFAULT_CONFIG_PATH};
use sca_daq::fvsr::FvsrOrchestrator;
use sca_daq::glitch::GlitchController;
use sca_daq::hardware::mock::{MockGlitcher, MockScope, SimulatedMlDsaTarget};
use sca_daq::logging::{self, OutputFormat, TracingConfig};
use sca_daq::protocol::CommandChannel;

#[derive(Parser)]
#[command(name = "sca-daq")]
#[command(about = "Side-channel trace acquisition and FVSR command orchestration", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override `[application] log_level`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Compact)]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the clock plan derived from the configuration
    Plan,

    /// Initialise the target over its serial port and print the device id
    Probe,

    /// Run a campaign against simulated hardware
    Simulate {
        /// Number of batches (defaults to `[fvsr] num_batches`)
        #[arg(long)]
        batches: Option<u32>,
    },

    /// Write a starter configuration file
    InitConfig {
        /// Destination path
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path, force } = &cli.command {
        return write_default_config(path, *force);
    }

    let config = ScaConfig::load_with_defaults(&cli.config)
        .with_context(|| format!("Failed to load configuration from '{}'", cli.config.display()))?;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(config.application.log_level.as_str());
    logging::init(TracingConfig::new(logging::parse_log_level(level)?).with_format(cli.log_format))?;

    config.validate()?;
    info!(name = %config.application.name, "Configuration loaded");

    match cli.command {
        Commands::Plan => print_plan(&config),
        Commands::Probe => probe(&config),
        Commands::Simulate { batches } => simulate(&config, batches.unwrap_or(config.fvsr.num_batches)),
        Commands::InitConfig { .. } => Ok(()),
    }
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("'{}' already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, ScaConfig::default().to_toml()?)
        .with_context(|| format!("Failed to write '{}'", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn print_plan(config: &ScaConfig) -> Result<()> {
    let plan = config.clock_plan()?;
    let offset = plan.trigger_offset();
    let summary = json!({
        "clock_frequency": plan.clock_frequency(),
        "adc_multiplier": plan.adc_multiplier(),
        "sampling_rate": plan.sampling_rate(),
        "target_frequency": plan.target_frequency(),
        "samples_per_cycle": plan.samples_per_cycle(),
        "raw_sample_count": plan.raw_sample_count(),
        "sample_count": plan.sample_count(),
        "offset_samples": plan.offset_samples(),
        "sample_offset": offset.offset,
        "presamples": offset.presamples,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(feature = "instrument_serial")]
fn probe(config: &ScaConfig) -> Result<()> {
    use sca_daq::hardware::SerialTarget;

    let target = &config.target;
    let link = SerialTarget::open(
        &target.port,
        target.baud_rate,
        target.read_timeout(),
        target.done_signal,
    )?;
    let channel = CommandChannel::new(link).with_settle_delay(target.settle_delay());
    let device_id = FvsrOrchestrator::new(channel).init()?;
    println!("{device_id}");
    Ok(())
}

#[cfg(not(feature = "instrument_serial"))]
fn probe(_config: &ScaConfig) -> Result<()> {
    bail!("sca-daq was built without the `instrument_serial` feature")
}

fn simulate(config: &ScaConfig, batches: u32) -> Result<()> {
    let plan = config.clock_plan()?;
    let job = config.fvsr_job()?;

    let capture = CaptureController::new(MockScope::new(), plan, config.scope.gain_db);
    let channel = CommandChannel::new(SimulatedMlDsaTarget::new(vec![0x5ca, 0xda9]))
        .with_settle_delay(config.target.settle_delay());
    let mut campaign = FvsrCampaign::new(capture, FvsrOrchestrator::new(channel), job)
        .with_segments(config.scope.num_segments);

    let mut glitcher = match &config.glitch {
        Some(glitch) => {
            let mut ctrl = GlitchController::new(MockGlitcher::new(), glitch.pll_frequency)?;
            ctrl.init()?;
            Some((ctrl, glitch.parameters()))
        }
        None => None,
    };

    let device_id = campaign.prepare()?;
    info!(%device_id, batches, "Simulated campaign started");

    for _ in 0..batches {
        if let Some((ctrl, params)) = glitcher.as_mut() {
            ctrl.arm_trigger(*params)?;
        }
        let record = campaign.run_batch()?;
        let line = json!({
            "batch": record.index,
            "traces": record.traces.len(),
            "samples": record.traces.first().map_or(0, Vec::len),
            "response": record.response,
            "warnings": record.warnings.len(),
        });
        println!("{line}");
    }
    Ok(())
}
