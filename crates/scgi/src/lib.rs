//! An asynchronous SCGI protocol implementation
//!
//! SCGI is the simple alternative to FastCGI: a front-end web server opens a connection to
//! an application server, sends the request as a netstring of NUL separated variables
//! followed by the body, and relays back whatever CGI style response the application writes
//! before closing the connection.
//!
//! This crate holds everything both ends of that exchange need, built on top of tokio. The
//! worker pool that serves connections lives in `micro-scgi-server`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use micro_scgi::chain::{Chain, Processor};
//! use micro_scgi::connection::ScgiConnection;
//! use micro_scgi::protocol::{BoxError, Request, Response};
//! use tokio::net::TcpListener;
//! use tracing::error;
//!
//! struct HelloWorld;
//!
//! #[async_trait::async_trait]
//! impl Processor for HelloWorld {
//!     async fn process(&self, _request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
//!         response.plain()?;
//!         response.write_str("Hello World").await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8090").await.unwrap();
//!     let chain = Chain::builder(HelloWorld).build();
//!
//!     loop {
//!         let Ok((stream, _peer)) = listener.accept().await else { continue };
//!         let chain = Arc::clone(&chain);
//!         tokio::spawn(async move {
//!             let (reader, writer) = stream.into_split();
//!             let (mut request, mut response) = (Request::new(), Response::new());
//!             if let Err(e) = ScgiConnection::new(reader, writer).process(&mut request, &mut response, &*chain).await {
//!                 error!(cause = %e, "request failed");
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: the envelope and response preamble, both directions
//! - [`protocol`]: request, response and error types
//! - [`chain`]: processors and the middleware stages wrapped around them
//! - [`connection`]: serving one request on an accepted connection
//! - [`client`]: sending requests to a SCGI application
//!
//! # Limitations
//!
//! - One request per connection, as SCGI has no keep-alive
//! - Envelope text is ISO-8859-1, the envelope is limited to 1 MiB
//! - Maximum response preamble size on the client side: 8KB

pub mod chain;
pub mod client;
pub mod codec;
pub mod connection;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
