//! Command channel: framed writes and acknowledgement-scanning reads.
//!
//! The target shares its UART between replies and free-form debug output, so a reply
//! is located by scanning lines for the `RESP_OK:` marker rather than assuming the next
//! line answers the last command. Noise is tolerated; a malformed body is not, since it
//! means the two ends disagree on protocol state and the bytes in between are lost.

use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace, warn};

use super::frame::{scan_line, CommandRequest, LineScan};
use crate::error::{AppResult, ScaError};
use crate::hardware::TargetLink;

/// Delay the firmware's command dispatcher needs between frames.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(10);

/// Line budget of the strict acknowledgement reader.
pub const DEFAULT_RESPONSE_ATTEMPTS: u32 = 1;

/// Line budget of the result reader, sized for targets doing real work first.
pub const DEFAULT_RESULT_ATTEMPTS: u32 = 100;

/// Outcome of scanning the console for a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResponse {
    /// A well-formed reply; the body object or its `result` member.
    Result(Value),
    /// No acknowledgement within the line budget.
    NotYetReady,
    /// A marker was found but its body could not be trusted.
    Desynchronized(String),
}

impl CommandResponse {
    /// Convert to a payload, treating both non-result outcomes as desynchronisation.
    pub fn into_result(self, budget: u32) -> AppResult<Value> {
        match self {
            CommandResponse::Result(value) => Ok(value),
            CommandResponse::NotYetReady => Err(ScaError::Desynchronized(format!(
                "no acknowledgement within {budget} line(s)"
            ))),
            CommandResponse::Desynchronized(reason) => Err(ScaError::Desynchronized(reason)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extract {
    /// Return the whole body object.
    Body,
    /// Return `body["result"]`, skipping acknowledgements without one.
    ResultKey,
}

/// Request/response framing over a [`TargetLink`].
pub struct CommandChannel<L: TargetLink> {
    link: L,
    settle_delay: Duration,
}

impl<L: TargetLink> CommandChannel<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Direct access to the link, e.g. to poll its done signal during a capture.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_inner(self) -> L {
        self.link
    }

    /// Sleep for the dispatcher settling delay.
    pub fn settle(&self) {
        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }
    }

    /// Write a request: its tag frame, then (after settling) its payload frame.
    pub fn send(&mut self, request: &CommandRequest) -> AppResult<()> {
        debug!(command = request.name(), "Sending command");
        self.link.write(&request.encode_tag()?)?;

        if let Some(payload) = request.payload() {
            self.settle();
            let frame = payload.encode()?;
            trace!(frame = %String::from_utf8_lossy(&frame), "Sending payload");
            self.link.write(&frame)?;
        }
        Ok(())
    }

    /// Strict acknowledgement reader.
    ///
    /// Reads at most `max_tries` lines. Returns the first well-formed reply body, or
    /// `NotYetReady` if no marker showed up.
    ///
    /// # Errors
    /// `ScaError::Desynchronized` when a marker line carries a malformed body.
    pub fn read_response(&mut self, max_tries: u32) -> AppResult<CommandResponse> {
        match self.scan(max_tries, Extract::Body)? {
            CommandResponse::Desynchronized(reason) => Err(ScaError::Desynchronized(reason)),
            other => Ok(other),
        }
    }

    /// Read back the `result` payload of a command.
    ///
    /// Reads at most `max_attempts` lines. Acknowledgements without a `result` member
    /// are skipped.
    ///
    /// # Errors
    /// `ScaError::Desynchronized` when no result arrives within budget or when a marker
    /// line carries a malformed body.
    pub fn receive(&mut self, max_attempts: u32) -> AppResult<Value> {
        self.scan(max_attempts, Extract::ResultKey)?
            .into_result(max_attempts)
    }

    /// [`Self::receive`] with the default budget of 100 lines.
    pub fn read_result(&mut self) -> AppResult<Value> {
        self.receive(DEFAULT_RESULT_ATTEMPTS)
    }

    fn scan(&mut self, max_attempts: u32, extract: Extract) -> AppResult<CommandResponse> {
        for attempt in 1..=max_attempts {
            let line = self.link.read_line()?;
            let body = match scan_line(&line) {
                LineScan::Noise => {
                    trace!(attempt, line = %line.escape_default(), "Skipping console line");
                    continue;
                }
                LineScan::Unterminated => {
                    warn!(line = %line.escape_default(), "Acknowledgement without checksum delimiter");
                    return Ok(CommandResponse::Desynchronized(format!(
                        "acknowledgement without checksum delimiter: '{line}'"
                    )));
                }
                LineScan::Body(body) => body,
            };

            let parsed: Value = match serde_json::from_str(body) {
                Ok(Value::Object(map)) => Value::Object(map),
                Ok(other) => {
                    warn!(body, "Acknowledgement body is not an object");
                    return Ok(CommandResponse::Desynchronized(format!(
                        "acknowledgement body is not an object: {other}"
                    )));
                }
                Err(e) => {
                    warn!(body, error = %e, "Malformed acknowledgement body");
                    return Ok(CommandResponse::Desynchronized(format!(
                        "malformed acknowledgement body '{body}': {e}"
                    )));
                }
            };

            match extract {
                Extract::Body => return Ok(CommandResponse::Result(parsed)),
                Extract::ResultKey => {
                    if let Some(result) = parsed.get("result") {
                        debug!(attempt, "Received result");
                        return Ok(CommandResponse::Result(result.clone()));
                    }
                    trace!(attempt, body, "Acknowledgement without result");
                }
            }
        }
        Ok(CommandResponse::NotYetReady)
    }
}
