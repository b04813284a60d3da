//! Fixed-vs-random workload orchestration.
//!
//! Each workload is a two-stage command sequence on the target's uJSON console:
//!
//! ```text
//! "MlDsaSca"                       sub-application selector
//!   <settle>
//! "VecAddFvsr"                     operation command
//!   <settle>
//! {"data":[..],"data_length":4n,"iterations":k}
//! ```
//!
//! The orchestrator does not wait for the reply; the caller interleaves arm/capture
//! between [`FvsrOrchestrator::start_workload`] and the result read.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::{AppResult, ScaError};
use crate::hardware::TargetLink;
use crate::protocol::{CommandChannel, CommandRequest, CommandResponse, PayloadFrame};

/// Sub-application selector of the ML-DSA firmware.
pub const MODE_SELECTOR: &str = "MlDsaSca";

/// Initialisation command; answered with the device identifier.
pub const INIT_COMMAND: &str = "Init";

/// Line budget for the `Init` acknowledgement.
pub const INIT_RESPONSE_ATTEMPTS: u32 = 30;

/// Closed set of FVSR workloads the firmware implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FvsrOperation {
    RejectSampling,
    Decompose,
    VecAdd,
    VecSub,
    VecMul,
    VecMac,
    Ntt,
    Intt,
}

impl FvsrOperation {
    pub const ALL: [FvsrOperation; 8] = [
        FvsrOperation::RejectSampling,
        FvsrOperation::Decompose,
        FvsrOperation::VecAdd,
        FvsrOperation::VecSub,
        FvsrOperation::VecMul,
        FvsrOperation::VecMac,
        FvsrOperation::Ntt,
        FvsrOperation::Intt,
    ];

    /// Firmware command tag.
    pub fn command(&self) -> &'static str {
        match self {
            FvsrOperation::RejectSampling => "RejectFvsr",
            FvsrOperation::Decompose => "DecomposeFvsr",
            FvsrOperation::VecAdd => "VecAddFvsr",
            FvsrOperation::VecSub => "VecSubFvsr",
            FvsrOperation::VecMul => "VecMulFvsr",
            FvsrOperation::VecMac => "VecMacFvsr",
            FvsrOperation::Ntt => "NttFvsr",
            FvsrOperation::Intt => "InttFvsr",
        }
    }

    /// Short configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            FvsrOperation::RejectSampling => "reject_sampling",
            FvsrOperation::Decompose => "decompose",
            FvsrOperation::VecAdd => "vec_add",
            FvsrOperation::VecSub => "vec_sub",
            FvsrOperation::VecMul => "vec_mul",
            FvsrOperation::VecMac => "vec_mac",
            FvsrOperation::Ntt => "ntt",
            FvsrOperation::Intt => "intt",
        }
    }

    /// Test name used by older capture configurations.
    pub fn legacy_name(&self) -> &'static str {
        match self {
            FvsrOperation::RejectSampling => "ml_dsa_vec_reject_batch_fvsr",
            FvsrOperation::Decompose => "ml_dsa_decompose_batch_fvsr",
            FvsrOperation::VecAdd => "ml_dsa_vec_add_batch_fvsr",
            FvsrOperation::VecSub => "ml_dsa_vec_sub_batch_fvsr",
            FvsrOperation::VecMul => "ml_dsa_vec_mul_batch_fvsr",
            FvsrOperation::VecMac => "ml_dsa_vec_mac_batch_fvsr",
            FvsrOperation::Ntt => "ml_dsa_vec_ntt_batch_fvsr",
            FvsrOperation::Intt => "ml_dsa_vec_intt_batch_fvsr",
        }
    }

    /// Build the payload frame for a fixed vector.
    ///
    /// Decompose operates on a single coefficient and sends it as a scalar; every other
    /// operation sends the whole vector.
    ///
    /// # Errors
    /// `ScaError::Configuration` for an empty vector, or a decompose vector that is not
    /// exactly one element long.
    pub fn payload(&self, fixed_vector: &[u32], iterations: u32) -> AppResult<PayloadFrame> {
        match (self, fixed_vector) {
            (FvsrOperation::Decompose, [value]) => Ok(PayloadFrame::scalar(*value, iterations)),
            (FvsrOperation::Decompose, other) => Err(ScaError::Configuration(format!(
                "decompose takes exactly one coefficient, got {}",
                other.len()
            ))),
            (_, []) => Err(ScaError::Configuration(format!(
                "{} needs a non-empty fixed vector",
                self.name()
            ))),
            (_, values) => Ok(PayloadFrame::vector(values.to_vec(), iterations)),
        }
    }
}

impl fmt::Display for FvsrOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FvsrOperation {
    type Err = ScaError;

    /// Accepts the short name, the legacy test name or the firmware command tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|op| {
                op.name() == wanted || op.legacy_name() == wanted || op.command() == wanted
            })
            .ok_or_else(|| ScaError::UnknownOperation(s.to_string()))
    }
}

/// One orchestration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FvsrJob {
    pub operation: FvsrOperation,
    pub fixed_vector: Vec<u32>,
    pub iterations: u32,
}

impl FvsrJob {
    pub fn new(operation: FvsrOperation, fixed_vector: Vec<u32>, iterations: u32) -> Self {
        Self {
            operation,
            fixed_vector,
            iterations,
        }
    }
}

/// Issues FVSR workloads and reads back their results.
pub struct FvsrOrchestrator<L: TargetLink> {
    channel: CommandChannel<L>,
}

impl<L: TargetLink> FvsrOrchestrator<L> {
    pub fn new(channel: CommandChannel<L>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &CommandChannel<L> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut CommandChannel<L> {
        &mut self.channel
    }

    pub fn into_inner(self) -> CommandChannel<L> {
        self.channel
    }

    fn select_application(&mut self) -> AppResult<()> {
        self.channel.send(&CommandRequest::tag(MODE_SELECTOR))
    }

    /// Initialise the firmware application and return its device identifier.
    ///
    /// # Errors
    /// `ScaError::Desynchronized` if no acknowledgement arrives within
    /// [`INIT_RESPONSE_ATTEMPTS`] lines, the reply is malformed, or it carries no
    /// `device_id`.
    #[instrument(skip(self))]
    pub fn init(&mut self) -> AppResult<Value> {
        self.select_application()?;
        self.channel.settle();
        self.channel.send(&CommandRequest::tag(INIT_COMMAND))?;

        match self.channel.read_response(INIT_RESPONSE_ATTEMPTS)? {
            CommandResponse::Result(body) => {
                let device_id = body.get("device_id").cloned().ok_or_else(|| {
                    ScaError::Desynchronized(format!("init acknowledgement without device_id: {body}"))
                })?;
                info!(%device_id, "Target initialised");
                Ok(device_id)
            }
            other => other.into_result(INIT_RESPONSE_ATTEMPTS),
        }
    }

    /// Send the command sequence for one workload. Does not wait for the reply.
    ///
    /// # Errors
    /// `ScaError::Configuration` for a vector the operation cannot take; transport faults.
    pub fn start_workload(
        &mut self,
        operation: FvsrOperation,
        fixed_vector: &[u32],
        iterations: u32,
    ) -> AppResult<()> {
        let payload = operation.payload(fixed_vector, iterations)?;
        debug!(%operation, iterations, elements = fixed_vector.len(), "Starting FVSR workload");

        self.select_application()?;
        self.channel.settle();
        self.channel
            .send(&CommandRequest::with_payload(operation.command(), payload))
    }

    /// [`Self::start_workload`] for a prepared job.
    pub fn start_job(&mut self, job: &FvsrJob) -> AppResult<()> {
        self.start_workload(job.operation, &job.fixed_vector, job.iterations)
    }

    /// Start a workload selected by name.
    ///
    /// # Errors
    /// `ScaError::UnknownOperation` when `name` is outside the closed operation set.
    pub fn start_test(&mut self, name: &str, fixed_vector: &[u32], iterations: u32) -> AppResult<()> {
        let operation: FvsrOperation = name.parse()?;
        self.start_workload(operation, fixed_vector, iterations)
    }

    /// Read the `result` of the last workload with the default line budget.
    pub fn read_result(&mut self) -> AppResult<Value> {
        self.channel.read_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::ScriptedTarget;
    use std::time::Duration;

    fn orchestrator(lines: &[&str]) -> (FvsrOrchestrator<ScriptedTarget>, ScriptedTarget) {
        let target = ScriptedTarget::new(lines.iter().copied());
        let channel = CommandChannel::new(target.clone()).with_settle_delay(Duration::ZERO);
        (FvsrOrchestrator::new(channel), target)
    }

    #[test]
    fn parses_every_name_form() {
        for op in FvsrOperation::ALL {
            assert_eq!(op.name().parse::<FvsrOperation>().unwrap(), op);
            assert_eq!(op.legacy_name().parse::<FvsrOperation>().unwrap(), op);
            assert_eq!(op.command().parse::<FvsrOperation>().unwrap(), op);
        }
    }

    #[test]
    fn rejects_unknown_operation() {
        let err = "vec_div".parse::<FvsrOperation>().unwrap_err();
        assert!(matches!(err, ScaError::UnknownOperation(name) if name == "vec_div"));
    }

    #[test]
    fn decompose_sends_scalar() {
        let (mut orch, target) = orchestrator(&[]);
        orch.start_workload(FvsrOperation::Decompose, &[17], 3).unwrap();
        assert_eq!(
            target.written_frames()[2],
            r#"{"data":17,"data_length":4,"iterations":3}"#
        );
    }

    #[test]
    fn decompose_rejects_vectors() {
        let (mut orch, target) = orchestrator(&[]);
        let err = orch
            .start_workload(FvsrOperation::Decompose, &[1, 2], 3)
            .unwrap_err();
        assert!(matches!(err, ScaError::Configuration(_)));
        assert!(target.written().is_empty());
    }

    #[test]
    fn unknown_test_name_writes_nothing() {
        let (mut orch, target) = orchestrator(&[]);
        assert!(orch.start_test("getattr_me", &[1], 1).is_err());
        assert!(target.written().is_empty());
    }

    #[test]
    fn init_returns_device_id() {
        let (mut orch, target) = orchestrator(&["boot", "RESP_OK:{\"device_id\":[1,2,3]} CRC:0"]);
        assert_eq!(orch.init().unwrap(), serde_json::json!([1, 2, 3]));
        assert_eq!(target.written_frames(), vec!["\"MlDsaSca\"", "\"Init\""]);
    }

    #[test]
    fn init_reply_without_device_id_is_desync() {
        let (mut orch, _) = orchestrator(&["RESP_OK:{\"status\":0} CRC:0"]);
        let err = orch.init().unwrap_err();
        assert!(err.is_desync());
        assert!(err.to_string().contains("device_id"));
    }

    #[test]
    fn init_without_reply_is_desync() {
        let (mut orch, target) = orchestrator(&[]);
        assert!(orch.init().unwrap_err().is_desync());
        assert_eq!(target.lines_read(), INIT_RESPONSE_ATTEMPTS as usize);
    }
}
