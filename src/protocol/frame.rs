//! uJSON wire format.
//!
//! Host to target: every frame is one JSON document written without a terminator.
//! A command is a JSON string tag (`"MlDsaSca"`), optionally followed by a payload
//! object `{"data":...,"data_length":...,"iterations":...}`.
//!
//! Target to host: replies are console lines of the shape
//! `...RESP_OK:<json object> CRC:<checksum>`. Only the text strictly between the
//! marker and the checksum delimiter is the response body.

use serde::Serialize;

use crate::error::AppResult;

/// Acknowledgement marker opening a structured reply.
pub const ACK_MARKER: &str = "RESP_OK:";

/// Delimiter closing the reply body.
pub const CHECKSUM_DELIMITER: &str = " CRC:";

/// Bytes per element of the fixed vector on the wire.
pub const ELEMENT_BYTES: usize = 4;

/// The `data` member of a payload frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PayloadData {
    Vector(Vec<u32>),
    Scalar(u32),
}

impl PayloadData {
    /// Encoded byte length announced in `data_length`.
    pub fn byte_len(&self) -> usize {
        match self {
            PayloadData::Vector(v) => ELEMENT_BYTES * v.len(),
            PayloadData::Scalar(_) => ELEMENT_BYTES,
        }
    }
}

/// Payload object sent after a command tag.
///
/// Field order is part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadFrame {
    pub data: PayloadData,
    pub data_length: usize,
    pub iterations: u32,
}

impl PayloadFrame {
    pub fn new(data: PayloadData, iterations: u32) -> Self {
        let data_length = data.byte_len();
        Self {
            data,
            data_length,
            iterations,
        }
    }

    pub fn vector(values: Vec<u32>, iterations: u32) -> Self {
        Self::new(PayloadData::Vector(values), iterations)
    }

    pub fn scalar(value: u32, iterations: u32) -> Self {
        Self::new(PayloadData::Scalar(value), iterations)
    }

    pub fn encode(&self) -> AppResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// One command: a tag plus an optional payload frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    tag: String,
    payload: Option<PayloadFrame>,
}

impl CommandRequest {
    /// A bare command tag.
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            payload: None,
        }
    }

    /// A tag followed by a payload frame.
    pub fn with_payload(tag: impl Into<String>, payload: PayloadFrame) -> Self {
        Self {
            tag: tag.into(),
            payload: Some(payload),
        }
    }

    pub fn name(&self) -> &str {
        &self.tag
    }

    pub fn payload(&self) -> Option<&PayloadFrame> {
        self.payload.as_ref()
    }

    /// The JSON-encoded tag, e.g. `"Init"` including the quotes.
    pub fn encode_tag(&self) -> AppResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.tag)?)
    }
}

/// Classification of one console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineScan<'a> {
    /// No acknowledgement marker: log output, echo, or an empty read.
    Noise,
    /// Marker and checksum delimiter both present; the text between them.
    Body(&'a str),
    /// Marker present but no checksum delimiter after it.
    Unterminated,
}

/// Locate a reply body inside a console line.
pub fn scan_line(line: &str) -> LineScan<'_> {
    let Some(start) = line.find(ACK_MARKER) else {
        return LineScan::Noise;
    };
    let rest = &line[start + ACK_MARKER.len()..];
    match rest.find(CHECKSUM_DELIMITER) {
        Some(end) => LineScan::Body(&rest[..end]),
        None => LineScan::Unterminated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_frame_matches_firmware_layout() {
        let frame = PayloadFrame::vector(vec![1, 2, 3, 4], 10);
        assert_eq!(
            String::from_utf8(frame.encode().unwrap()).unwrap(),
            r#"{"data":[1,2,3,4],"data_length":16,"iterations":10}"#
        );
    }

    #[test]
    fn scalar_payload_announces_one_word() {
        let frame = PayloadFrame::scalar(77, 5);
        assert_eq!(
            String::from_utf8(frame.encode().unwrap()).unwrap(),
            r#"{"data":77,"data_length":4,"iterations":5}"#
        );
    }

    #[test]
    fn tag_is_json_string() {
        let req = CommandRequest::tag("MlDsaSca");
        assert_eq!(req.encode_tag().unwrap(), br#""MlDsaSca""#.to_vec());
    }

    #[test]
    fn scan_extracts_body_between_marker_and_crc() {
        assert_eq!(
            scan_line(r#"junk RESP_OK:{"result":42} CRC:abc"#),
            LineScan::Body(r#"{"result":42}"#)
        );
        assert_eq!(scan_line("boot: ok"), LineScan::Noise);
        assert_eq!(scan_line(""), LineScan::Noise);
        assert_eq!(scan_line(r#"RESP_OK:{"result":1}"#), LineScan::Unterminated);
    }
}
