//! A SCGI application server built on [`micro_scgi`].
//!
//! A [`Listener`] accepts connections on one task and hands them to a fixed pool of
//! workers through a bounded queue. When every worker is busy and the queue is full the
//! listener stops accepting until a slot frees up, so a slow application pushes back on
//! the front-end web server rather than buffering connections without limit.
//!
//! Each worker serves one connection at a time and reuses its request and response for the
//! next one. A failing or panicking processor only costs the connection it was serving.
//!
//! # Example
//!
//! ```no_run
//! use micro_scgi::chain::{Chain, Processor};
//! use micro_scgi::protocol::{BoxError, Request, Response};
//! use micro_scgi_server::middleware::{LoggingMiddleware, QueryStringMiddleware};
//! use micro_scgi_server::Listener;
//!
//! struct Greeter;
//!
//! #[async_trait::async_trait]
//! impl Processor for Greeter {
//!     async fn process(&self, request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
//!         let name = request.parameter("name").and_then(|name| name.as_str()).unwrap_or("World").to_string();
//!         response.plain()?;
//!         response.write_str(&format!("Hello {name}")).await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let chain = Chain::builder(Greeter).wrap(QueryStringMiddleware::new()).wrap(LoggingMiddleware::new()).build();
//!     let mut listener = Listener::builder().port(8090).pool_size(8).chain(chain).build()?;
//!
//!     listener.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     listener.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
mod error;
pub mod listener;
pub mod middleware;

pub use config::ListenerConfig;
pub use error::{ServerBuildError, ServerError};
pub use listener::{Listener, ListenerBuilder, ListenerState, ListenerStats};
