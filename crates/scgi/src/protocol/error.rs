use std::error::Error;
use std::io;
use thiserror::Error;

/// Error raised by application logic running inside a processing chain.
pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ScgiError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("processing error: {source}")]
    ProcessError {
        #[source]
        source: BoxError,
    },
}

impl ScgiError {
    pub fn process(source: BoxError) -> Self {
        Self::ProcessError { source }
    }

    /// Framing and envelope errors, the peer sent something that is not SCGI.
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::RequestError { source } if source.is_framing())
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed length prefix: {reason}")]
    MalformedLength { reason: String },

    #[error("truncated envelope, expected {expected} bytes but stream ended after {actual}")]
    TruncatedEnvelope { expected: usize, actual: usize },

    #[error("malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("missing body separator, found {found:?}")]
    MissingSeparator { found: Option<u8> },

    #[error("missing required variable {name}")]
    MissingVariable { name: &'static str },

    #[error("invalid value {value:?} for variable {name}")]
    InvalidVariable { name: String, value: String },

    #[error("bad status line: {line:?}")]
    BadStatusLine { line: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn malformed_length<S: ToString>(str: S) -> Self {
        Self::MalformedLength { reason: str.to_string() }
    }

    pub fn truncated_envelope(expected: usize, actual: usize) -> Self {
        Self::TruncatedEnvelope { expected, actual }
    }

    pub fn malformed_envelope<S: ToString>(str: S) -> Self {
        Self::MalformedEnvelope { reason: str.to_string() }
    }

    pub fn missing_separator(found: Option<u8>) -> Self {
        Self::MissingSeparator { found }
    }

    pub fn missing_variable(name: &'static str) -> Self {
        Self::MissingVariable { name }
    }

    pub fn invalid_variable<N: ToString, V: ToString>(name: N, value: V) -> Self {
        Self::InvalidVariable { name: name.to_string(), value: value.to_string() }
    }

    pub fn bad_status_line<S: ToString>(line: S) -> Self {
        Self::BadStatusLine { line: line.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Whether this error comes from the envelope framing itself rather than the transport.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::MalformedLength { .. }
                | Self::TruncatedEnvelope { .. }
                | Self::MalformedEnvelope { .. }
                | Self::MissingSeparator { .. }
                | Self::MissingVariable { .. }
                | Self::InvalidVariable { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("response headers have already been sent")]
    HeadersSent,

    #[error("response has already been finished")]
    Finished,

    #[error("response is not attached to a connection")]
    Detached,

    #[error("invalid variable: {reason}")]
    InvalidVariable { reason: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_variable<S: ToString>(str: S) -> Self {
        Self::InvalidVariable { reason: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// An `after` hook failed while the wrapped processor had already failed.
///
/// The processor's error stays the primary cause and is what [`Error::source`] returns;
/// the hook's error is kept alongside it so neither is lost.
#[derive(Debug, Error)]
#[error("{primary} (after hook also failed: {suppressed})")]
pub struct SuppressedError {
    #[source]
    primary: BoxError,
    suppressed: BoxError,
}

impl SuppressedError {
    pub fn new(primary: BoxError, suppressed: BoxError) -> Self {
        Self { primary, suppressed }
    }

    pub fn primary(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.primary.as_ref()
    }

    pub fn suppressed(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.suppressed.as_ref()
    }

    pub fn into_parts(self) -> (BoxError, BoxError) {
        (self.primary, self.suppressed)
    }
}
