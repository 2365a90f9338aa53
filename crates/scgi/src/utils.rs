//! Utility macros and functions for the SCGI crate.
//!
//! This module provides helper macros and functions that are used internally
//! by the codec and the request model.

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
/// It's useful for validation checks where you want to return early with an error
/// if some condition is not satisfied.
///
/// # Example
///
/// ```ignore
/// ensure!(digits < MAX_LENGTH_DIGITS, ParseError::malformed_length("too many digits"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Decodes ISO-8859-1 bytes, every byte maps to exactly one char.
pub(crate) fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Encodes `text` as ISO-8859-1 into `dst`, returning the offending char when
/// something outside `U+0000..=U+00FF` is found.
pub(crate) fn put_latin1(text: &str, dst: &mut bytes::BytesMut) -> Result<(), char> {
    use bytes::BufMut;

    dst.reserve(text.len());
    for c in text.chars() {
        let Ok(byte) = u8::try_from(u32::from(c)) else {
            return Err(c);
        };
        dst.put_u8(byte);
    }
    Ok(())
}

/// Byte length of `text` once encoded as ISO-8859-1.
#[inline]
pub(crate) fn latin1_len(text: &str) -> usize {
    text.chars().count()
}
