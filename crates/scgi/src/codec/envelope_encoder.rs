//! SCGI envelope encoder, the inverse of [`EnvelopeDecoder`](super::EnvelopeDecoder).

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Encoder;

use crate::ensure;
use crate::protocol::{Envelope, SendError};
use crate::utils::{latin1_len, put_latin1};

/// Encoder writing `<length>:<name>\0<value>\0...,` for an [`Envelope`].
///
/// Text is written as ISO-8859-1, like the decoder reads it. Variables that contain a NUL
/// byte or a char above `U+00FF` can't be represented and are rejected before anything is
/// written to the destination buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeEncoder;

impl Encoder<&Envelope> for EnvelopeEncoder {
    type Error = SendError;

    fn encode(&mut self, item: &Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut length = 0;
        for (name, value) in item {
            ensure!(!name.contains('\0'), SendError::invalid_variable(format!("variable name {name:?} contains NUL")));
            ensure!(!value.contains('\0'), SendError::invalid_variable(format!("variable {name} contains NUL")));
            length += latin1_len(name) + latin1_len(value) + 2;
        }

        let mut block = BytesMut::with_capacity(length);
        for (name, value) in item {
            put_latin1(name, &mut block).map_err(|c| unrepresentable(name, c))?;
            block.put_u8(0);
            put_latin1(value, &mut block).map_err(|c| unrepresentable(name, c))?;
            block.put_u8(0);
        }

        dst.reserve(length + 12);
        dst.put_slice(length.to_string().as_bytes());
        dst.put_u8(b':');
        dst.put_slice(&block);
        dst.put_u8(b',');
        Ok(())
    }
}

fn unrepresentable(name: &str, c: char) -> SendError {
    SendError::invalid_variable(format!("variable {name} contains {c:?} which is not ISO-8859-1"))
}

/// Encodes `envelope` into a fresh buffer.
pub fn encode_envelope(envelope: &Envelope) -> Result<Bytes, SendError> {
    let mut dst = BytesMut::new();
    EnvelopeEncoder.encode(envelope, &mut dst)?;
    Ok(dst.freeze())
}
