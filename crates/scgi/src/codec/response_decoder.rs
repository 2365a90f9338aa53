//! Decoder for the response preamble, used on the client side.
//!
//! Lines end with CRLF. When the stream ends, the last line may end with a lone CR,
//! a lone LF or nothing at all. The first line must be `Status: <digits> <text>`,
//! every following `Name: Value` line is a header until a blank line ends the preamble.

use bytes::BytesMut;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, ResponseHead};
use crate::utils::latin1_to_string;

/// Maximum size in bytes allowed for the entire preamble
const MAX_PREAMBLE_BYTES: usize = 8 * 1024;

const STATUS_PREFIX: &str = "Status: ";

/// Decoder for the response preamble implementing the [`Decoder`] trait.
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    status: Option<(StatusCode, String)>,
    headers: HeaderMap,
    consumed: usize,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Feeds one line without its terminator, returns the head once the blank line is seen.
    fn on_line(&mut self, line: &[u8]) -> Result<Option<ResponseHead>, ParseError> {
        if self.status.is_none() {
            self.status = Some(parse_status_line(line)?);
            return Ok(None);
        }

        if line.is_empty() {
            return Ok(Some(self.take_head()));
        }

        let line = latin1_to_string(line);
        let Some((name, value)) = line.split_once(':') else {
            trace!(%line, "ignoring response line without a header separator");
            return Ok(None);
        };

        let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| ParseError::invalid_header(format!("{name:?}: {e}")))?;
        let value = HeaderValue::from_str(value.trim()).map_err(|e| ParseError::invalid_header(format!("{name}: {e}")))?;
        self.headers.append(name, value);
        Ok(None)
    }

    fn take_head(&mut self) -> ResponseHead {
        let (status, reason) = self.status.take().unwrap_or((StatusCode::OK, String::new()));
        self.consumed = 0;
        ResponseHead::new(status, reason, std::mem::take(&mut self.headers))
    }
}

fn parse_status_line(line: &[u8]) -> Result<(StatusCode, String), ParseError> {
    let text = latin1_to_string(line);
    let bad_status = || ParseError::bad_status_line(&text);

    let (code, reason) = text.strip_prefix(STATUS_PREFIX).and_then(|rest| rest.split_once(' ')).ok_or_else(bad_status)?;

    ensure!(!code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()), bad_status());
    ensure!(!reason.is_empty(), bad_status());

    let status = code.parse::<u16>().ok().and_then(|code| StatusCode::from_u16(code).ok()).ok_or_else(bad_status)?;
    Ok((status, reason.to_string()))
}

impl Decoder for ResponseDecoder {
    type Item = ResponseHead;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(line_end) = src.windows(2).position(|w| w == b"\r\n") else {
                let current_size = self.consumed + src.len();
                ensure!(current_size <= MAX_PREAMBLE_BYTES, ParseError::too_large_header(current_size, MAX_PREAMBLE_BYTES));
                return Ok(None);
            };

            let line = src.split_to(line_end + 2);
            self.consumed += line.len();
            ensure!(self.consumed <= MAX_PREAMBLE_BYTES, ParseError::too_large_header(self.consumed, MAX_PREAMBLE_BYTES));

            if let Some(head) = self.on_line(&line[..line_end])? {
                return Ok(Some(head));
            }
        }
    }

    /// At end of stream the remaining bytes form the last line, and the preamble ends with it.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(head) = self.decode(src)? {
            return Ok(Some(head));
        }

        if !src.is_empty() {
            let mut line = src.split();
            if matches!(line.last(), Some(b'\r' | b'\n')) {
                line.truncate(line.len() - 1);
            }
            if let Some(head) = self.on_line(&line)? {
                return Ok(Some(head));
            }
        }

        ensure!(self.status.is_some(), ParseError::bad_status_line(""));
        Ok(Some(self.take_head()))
    }
}

/// Parses a complete preamble held in `bytes`, leaving the body bytes in place.
pub fn parse_response_preamble(bytes: &mut BytesMut) -> Result<ResponseHead, ParseError> {
    let mut decoder = ResponseDecoder::new();
    decoder.decode_eof(bytes)?.ok_or_else(|| ParseError::bad_status_line(""))
}
