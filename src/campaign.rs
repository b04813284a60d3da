//! Capture campaign: one FVSR workload per batch, correlated with its traces.
//!
//! Per batch the order is fixed: send the workload, arm, capture and transfer, read the
//! target's result. By default the scope packs one segment per firmware iteration;
//! [`FvsrCampaign::with_segments`] sets the segment count from the scope configuration.

use serde_json::Value;
use tracing::{info, instrument};

use crate::capture::{CaptureController, CaptureWarning};
use crate::error::AppResult;
use crate::fvsr::{FvsrJob, FvsrOrchestrator};
use crate::hardware::{ScopeDriver, TargetLink, Trace};

/// Traces and target response of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    /// Zero-based batch index within the campaign.
    pub index: u32,
    pub traces: Vec<Trace>,
    /// `result` payload returned by the target.
    pub response: Value,
    pub warnings: Vec<CaptureWarning>,
}

/// Drives a capture controller and an orchestrator in lockstep.
pub struct FvsrCampaign<S: ScopeDriver, L: TargetLink> {
    capture: CaptureController<S>,
    orchestrator: FvsrOrchestrator<L>,
    job: FvsrJob,
    segments: u32,
    batches_run: u32,
}

impl<S: ScopeDriver, L: TargetLink> FvsrCampaign<S, L> {
    pub fn new(capture: CaptureController<S>, orchestrator: FvsrOrchestrator<L>, job: FvsrJob) -> Self {
        let segments = job.iterations.max(1);
        Self {
            capture,
            orchestrator,
            job,
            segments,
            batches_run: 0,
        }
    }

    /// Triggers captured per batch; `1` selects single captures.
    pub fn with_segments(mut self, segments: u32) -> Self {
        self.segments = segments;
        self
    }

    pub fn segments(&self) -> u32 {
        self.segments
    }

    pub fn job(&self) -> &FvsrJob {
        &self.job
    }

    pub fn capture(&self) -> &CaptureController<S> {
        &self.capture
    }

    pub fn orchestrator(&self) -> &FvsrOrchestrator<L> {
        &self.orchestrator
    }

    /// Lock the scope, select the capture mode and initialise the target.
    ///
    /// Returns the target's device identifier.
    #[instrument(skip(self), fields(operation = %self.job.operation))]
    pub fn prepare(&mut self) -> AppResult<Value> {
        self.capture.lock()?;
        self.capture.configure_mode(self.segments)?;
        self.orchestrator.init()
    }

    /// Run one batch.
    pub fn run_batch(&mut self) -> AppResult<BatchRecord> {
        let job = &self.job;
        self.orchestrator
            .start_workload(job.operation, &job.fixed_vector, job.iterations)?;
        self.capture.arm()?;

        let link = self.orchestrator.channel_mut().link_mut();
        let acquisition = self.capture.capture_and_transfer(link)?;
        let response = self.orchestrator.read_result()?;

        let record = BatchRecord {
            index: self.batches_run,
            traces: acquisition.traces,
            response,
            warnings: acquisition.warnings,
        };
        self.batches_run += 1;
        Ok(record)
    }

    /// Run `batches` batches, stopping at the first error.
    pub fn run(&mut self, batches: u32) -> AppResult<Vec<BatchRecord>> {
        let mut records = Vec::with_capacity(batches as usize);
        for _ in 0..batches {
            records.push(self.run_batch()?);
        }
        let suspect = records.iter().filter(|r| !r.warnings.is_empty()).count();
        info!(batches, suspect, "Campaign finished");
        Ok(records)
    }

    /// Drop the capture session after a target crash. Call [`Self::prepare`] again
    /// before the next batch.
    pub fn reset(&mut self) -> AppResult<()> {
        self.capture.reset()
    }

    pub fn into_parts(self) -> (CaptureController<S>, FvsrOrchestrator<L>) {
        (self.capture, self.orchestrator)
    }
}
