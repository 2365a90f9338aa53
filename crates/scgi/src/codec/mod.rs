//! SCGI codec module for encoding and decoding the two preambles on the wire
//!
//! A request travels as a netstring envelope followed by the raw body, the response
//! travels back as CGI style header lines followed by the raw body. Both directions
//! are implemented here so the server and the client share a single definition of
//! the format.
//!
//! # Architecture
//!
//! - Request side:
//!   - [`EnvelopeDecoder`]: decodes the `<length>:<pairs>,` envelope, used by the server
//!   - [`EnvelopeEncoder`]: writes an envelope, used by the client
//!
//! - Response side:
//!   - [`ResponseEncoder`]: writes the `Status:` line and headers, used by the server
//!   - [`ResponseDecoder`]: parses them back, used by the client
//!
//! Decoders leave everything that follows the preamble in the buffer, those bytes are
//! the beginning of the body.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_scgi::codec::{decode_envelope, encode_envelope};
//! use micro_scgi::protocol::Envelope;
//!
//! let envelope: Envelope = [("CONTENT_LENGTH", "5"), ("SCGI", "1")].into_iter().collect();
//! let mut wire = BytesMut::from(&encode_envelope(&envelope).unwrap()[..]);
//! wire.extend_from_slice(b"hello");
//!
//! let decoded = decode_envelope(&mut wire).unwrap();
//! assert_eq!(decoded, envelope);
//! assert_eq!(&wire[..], b"hello");
//! ```

mod envelope_decoder;
mod envelope_encoder;
mod response_decoder;
mod response_encoder;

pub use envelope_decoder::{decode_envelope, EnvelopeDecoder, MAX_ENVELOPE_BYTES};
pub use envelope_encoder::{encode_envelope, EnvelopeEncoder};
pub use response_decoder::{parse_response_preamble, ResponseDecoder};
pub use response_encoder::{encode_response_preamble, ResponseEncoder, ResponsePreamble};
