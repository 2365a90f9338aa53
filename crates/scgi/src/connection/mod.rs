//! Serving a single SCGI request over an accepted connection.
//!
//! SCGI has no keep-alive: the front-end opens a connection, sends one envelope and body,
//! reads the response until the connection is closed. [`ScgiConnection`] runs that
//! exchange once, from decoding the envelope to shutting the outbound half down.

mod read_timeout;
mod scgi_connection;

pub use scgi_connection::ScgiConnection;
