//! A small SCGI client, mostly useful for testing applications without a front-end server.
//!
//! The client starts out with a plausible set of variables for a `GET /` request coming
//! from a browser, so only what matters for a test needs to be set:
//!
//! ```no_run
//! use micro_scgi::client::Client;
//!
//! # async fn run() -> Result<(), micro_scgi::client::ClientError> {
//! let mut client = Client::new("127.0.0.1", 8090);
//! let mut response = client.https().server("example.com").get("/hello?name=world").execute().await?;
//!
//! println!("{} {}", response.status(), response.message());
//! println!("{}", response.text().await?);
//! # Ok(())
//! # }
//! ```

mod error;
mod query_string;
mod response;
mod scgi_client;

pub use error::ClientError;
pub use query_string::QueryStringBuilder;
pub use response::ClientResponse;
pub use scgi_client::Client;
