//! SCGI envelope decoder
//!
//! The envelope is a netstring: `<decimal length>:<block>,` where the block holds
//! NUL-terminated name/value tokens. The decoder works byte by byte through three
//! states so that a request split over many reads is handled without reparsing:
//!
//! 1. `Length`: accumulating the decimal length prefix up to the `:`
//! 2. `Block`: waiting until the whole declared block is buffered, then splitting it
//! 3. `Separator`: checking the single `,` that precedes the body
//!
//! Whatever follows the separator is left in the buffer untouched, it is the start
//! of the request body.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{Envelope, ParseError};
use crate::utils::latin1_to_string;

/// Maximum size in bytes allowed for the envelope block
pub const MAX_ENVELOPE_BYTES: usize = 1024 * 1024;

/// Enough digits for any length below [`MAX_ENVELOPE_BYTES`], a longer run is rejected outright
const MAX_LENGTH_DIGITS: usize = 10;

const LENGTH_DELIMITER: u8 = b':';
const PAIR_DELIMITER: u8 = 0;
const BODY_SEPARATOR: u8 = b',';

#[derive(Debug)]
enum State {
    Length { length: usize, digits: usize },
    Block { length: usize },
    Separator { length: usize, envelope: Envelope },
}

impl Default for State {
    fn default() -> Self {
        State::Length { length: 0, digits: 0 }
    }
}

/// Decoder for the SCGI envelope implementing the [`Decoder`] trait.
///
/// One decoder yields one [`Envelope`] and then starts over, ready for the next one.
#[derive(Debug, Default)]
pub struct EnvelopeDecoder {
    state: State,
}

impl EnvelopeDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Decoder for EnvelopeDecoder {
    type Item = Envelope;
    type Error = ParseError;

    /// Attempts to decode an envelope from the provided bytes buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(envelope))` once the separator has been consumed
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` as soon as the bytes seen so far can't be a valid envelope
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match std::mem::take(&mut self.state) {
                State::Length { mut length, mut digits } => loop {
                    let Some(&byte) = src.first() else {
                        self.state = State::Length { length, digits };
                        return Ok(None);
                    };

                    match byte {
                        b'0'..=b'9' => {
                            ensure!(digits < MAX_LENGTH_DIGITS, ParseError::malformed_length("too many digits"));
                            length = length * 10 + usize::from(byte - b'0');
                            ensure!(
                                length <= MAX_ENVELOPE_BYTES,
                                ParseError::malformed_length(format!("length exceeds the limit {MAX_ENVELOPE_BYTES}"))
                            );
                            digits += 1;
                            src.advance(1);
                        }
                        LENGTH_DELIMITER if digits > 0 => {
                            src.advance(1);
                            trace!(length, "parsed envelope length");
                            self.state = State::Block { length };
                            break;
                        }
                        other => {
                            return Err(ParseError::malformed_length(format!("unexpected byte {other:#04x} in length prefix")));
                        }
                    }
                },

                State::Block { length } => {
                    if src.len() < length {
                        src.reserve(length - src.len() + 1);
                        self.state = State::Block { length };
                        return Ok(None);
                    }

                    let block = src.split_to(length);
                    let envelope = parse_pairs(&block)?;
                    self.state = State::Separator { length, envelope };
                }

                State::Separator { length, envelope } => {
                    let Some(&byte) = src.first() else {
                        self.state = State::Separator { length, envelope };
                        return Ok(None);
                    };

                    ensure!(byte == BODY_SEPARATOR, ParseError::missing_separator(Some(byte)));
                    src.advance(1);
                    return Ok(Some(envelope));
                }
            }
        }
    }

    /// Decodes what is left once the stream has ended.
    ///
    /// A stream that ends before sending anything yields `Ok(None)`, any other end of
    /// stream in the middle of an envelope is reported against the part being read.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(envelope) = self.decode(src)? {
            return Ok(Some(envelope));
        }

        match std::mem::take(&mut self.state) {
            State::Length { digits: 0, .. } if src.is_empty() => Ok(None),
            State::Length { .. } => Err(ParseError::malformed_length("unterminated length prefix")),
            State::Block { length } => Err(ParseError::truncated_envelope(length, src.len())),
            State::Separator { .. } => Err(ParseError::missing_separator(None)),
        }
    }
}

/// Splits an envelope block into name/value pairs.
///
/// Every token, values included, must be terminated by a NUL byte.
fn parse_pairs(block: &[u8]) -> Result<Envelope, ParseError> {
    if block.is_empty() {
        return Ok(Envelope::new());
    }

    ensure!(block.last() == Some(&PAIR_DELIMITER), ParseError::malformed_envelope("last token is not NUL terminated"));

    let tokens = block[..block.len() - 1].split(|b| *b == PAIR_DELIMITER);
    let mut envelope = Envelope::with_capacity(16);
    let mut name = None;
    for token in tokens {
        match name.take() {
            None => name = Some(latin1_to_string(token)),
            Some(name) => {
                let value = latin1_to_string(token);
                trace!(%name, %value, "scgi variable");
                envelope.push(name, value);
            }
        }
    }

    match name {
        Some(name) => Err(ParseError::malformed_envelope(format!("variable {name:?} has no value"))),
        None => Ok(envelope),
    }
}

/// Decodes a complete envelope held in `bytes`, leaving the body bytes in place.
///
/// Unlike the streaming [`Decoder`] interface the input is treated as everything there
/// is, so running out of bytes is an error.
pub fn decode_envelope(bytes: &mut BytesMut) -> Result<Envelope, ParseError> {
    let mut decoder = EnvelopeDecoder::new();
    decoder.decode_eof(bytes)?.ok_or_else(|| ParseError::malformed_length("empty input"))
}
