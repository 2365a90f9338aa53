use std::io;
use std::string::FromUtf8Error;

use thiserror::Error;

use crate::protocol::{ParseError, SendError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid response: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("failed to send request: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("response body is not valid text: {source}")]
    InvalidBody {
        #[from]
        source: FromUtf8Error,
    },

    #[error("invalid query string: {source}")]
    InvalidQuery {
        #[from]
        source: serde_urlencoded::ser::Error,
    },
}

impl ClientError {
    pub fn connect<A: ToString>(address: A, source: io::Error) -> Self {
        Self::Connect { address: address.to_string(), source }
    }
}
