//! Target command protocol.
//!
//! - [`frame`] defines the uJSON frames and the `RESP_OK:`/` CRC:` reply framing.
//! - [`channel`] writes commands and scans the console for replies with a bounded
//!   line budget.

pub mod channel;
pub mod frame;

pub use channel::{
    CommandChannel, CommandResponse, DEFAULT_RESPONSE_ATTEMPTS, DEFAULT_RESULT_ATTEMPTS,
    DEFAULT_SETTLE_DELAY,
};
pub use frame::{CommandRequest, PayloadData, PayloadFrame, ACK_MARKER, CHECKSUM_DELIMITER};
