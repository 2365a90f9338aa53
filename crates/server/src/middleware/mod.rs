//! Stock [`Middleware`](micro_scgi::chain::Middleware) stages.

mod logging;
mod query_string;

pub use logging::LoggingMiddleware;
pub use query_string::QueryStringMiddleware;
