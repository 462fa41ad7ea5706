use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::message::{ControlRequest, ControlResponse};

/// Longest accepted request line, a full `setDirect` fits comfortably
const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum JsonCodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid line: {0}")]
    Lines(#[from] LinesCodecError),
    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON-lines codec for the control protocol
///
/// Requests that are not valid JSON or name an unknown command are yielded as errors so the
/// connection can answer them and keep going. Framing errors end the connection.
pub struct JsonCodec {
    lines: LinesCodec,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        }
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonCodec {
    type Item = serde_json::Result<ControlRequest>;
    type Error = JsonCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.lines.decode(src)? {
                // Skip blank keep-alive lines
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(serde_json::from_str(&line))),
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.lines.decode_eof(src)? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(serde_json::from_str(&line))),
                None => return Ok(None),
            }
        }
    }
}

impl Encoder<ControlResponse> for JsonCodec {
    type Error = JsonCodecError;

    fn encode(&mut self, item: ControlResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = serde_json::to_string(&item)?;
        Ok(self.lines.encode(encoded, dst)?)
    }
}
