//! Core SCGI protocol types.
//!
//! - **Wire level** ([`Envelope`], [`vars`]): the decoded variables exactly as they
//!   arrived, and the names of the well-known ones
//! - **Request** ([`Request`], [`Parameter`], [`body::ReqBody`]): the typed view handed to
//!   processors, with the body streamed from the connection
//! - **Response** ([`Response`], [`ResponseHead`]): the writer side used by processors and
//!   the parsed preamble the client reads back
//! - **Errors** ([`ScgiError`], [`ParseError`], [`SendError`], [`SuppressedError`])
//!
//! Processors normally meet these types through the connection layer, see
//! [`ScgiConnection`](crate::connection::ScgiConnection).

mod envelope;
pub use envelope::Envelope;

mod parameter;
pub use parameter::Parameter;

mod request;
pub use request::Request;

mod response;
pub use response::{Response, DEFAULT_CACHE_CONTROL, DEFAULT_CHARSET, DEFAULT_EXPIRES};

mod response_head;
pub use response_head::ResponseHead;

mod error;
pub use error::BoxError;
pub use error::ParseError;
pub use error::ScgiError;
pub use error::SendError;
pub use error::SuppressedError;

pub mod body;
pub mod vars;
