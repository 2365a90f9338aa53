//! Encoder for the CGI style response preamble a SCGI application sends back.
//!
//! ```text
//! Status: 200 OK\r\n
//! Content-Type: text/plain; charset=utf-8\r\n
//! Cache-Control: no-cache\r\n
//! \r\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use http::StatusCode;
use mime::Mime;
use tokio_util::codec::Encoder;

use crate::protocol::SendError;

/// Initial buffer size allocated for preamble serialization
const INIT_HEADER_SIZE: usize = 1024;

/// Everything that goes on the wire ahead of a response body.
#[derive(Debug, Clone, Copy)]
pub struct ResponsePreamble<'a> {
    pub status: StatusCode,
    pub content_type: &'a Mime,
    pub charset: &'a str,
    pub cache_control: Option<&'a str>,
    pub expires: Option<&'a str>,
    /// Complete `Name: value` lines, without line terminators
    pub headers: &'a [String],
}

/// Encoder for [`ResponsePreamble`] implementing the [`Encoder`] trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<ResponsePreamble<'_>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: ResponsePreamble<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);

        dst.put_slice(b"Status: ");
        dst.put_slice(item.status.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(item.status.canonical_reason().unwrap_or("Unknown").as_bytes());
        dst.put_slice(b"\r\n");

        dst.put_slice(b"Content-Type: ");
        dst.put_slice(item.content_type.essence_str().as_bytes());
        dst.put_slice(b"; charset=");
        dst.put_slice(item.charset.as_bytes());
        dst.put_slice(b"\r\n");

        if let Some(cache_control) = item.cache_control {
            put_header_line(dst, "Cache-Control", cache_control);
        }

        if let Some(expires) = item.expires {
            put_header_line(dst, "Expires", expires);
        }

        for header in item.headers {
            dst.put_slice(header.as_bytes());
            dst.put_slice(b"\r\n");
        }

        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn put_header_line(dst: &mut BytesMut, name: &str, value: &str) {
    dst.put_slice(name.as_bytes());
    dst.put_slice(b": ");
    dst.put_slice(value.as_bytes());
    dst.put_slice(b"\r\n");
}

/// Encodes `preamble` into a fresh buffer.
pub fn encode_response_preamble(preamble: ResponsePreamble<'_>) -> Bytes {
    let mut dst = BytesMut::new();
    // writing into a BytesMut can't fail
    let _ = ResponseEncoder.encode(preamble, &mut dst);
    dst.freeze()
}
