//! Processing chains: application logic wrapped in before/after middleware stages.
//!
//! A [`Processor`] does the actual work for a request. A [`Middleware`] wraps a processor
//! with a `before` hook that may stop the request from going any further, and an `after`
//! hook that runs once the inner processor is done, whether it succeeded or not.
//!
//! ```
//! use micro_scgi::chain::{Chain, Middleware, Processor};
//! use micro_scgi::protocol::{BoxError, Request, Response};
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Processor for Hello {
//!     async fn process(&self, _request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
//!         response.plain()?;
//!         response.write_str("Hello World").await?;
//!         Ok(())
//!     }
//! }
//!
//! struct Timing;
//!
//! #[async_trait::async_trait]
//! impl Middleware for Timing {
//!     async fn before(&self, request: &mut Request, _response: &mut Response) -> Result<bool, BoxError> {
//!         request.start_processing();
//!         Ok(true)
//!     }
//! }
//!
//! let chain = Chain::builder(Hello).wrap(Timing).build();
//! ```

use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::{BoxError, Request, Response};

mod builder;
mod middleware_processor;

pub use builder::{Chain, ChainBuilder};
pub use middleware_processor::MiddlewareProcessor;

/// Application logic run for every request.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, request: &mut Request, response: &mut Response) -> Result<(), BoxError>;
}

/// A stage wrapped around a [`Processor`].
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Runs ahead of the inner processor, returning `false` ends processing right here.
    async fn before(&self, _request: &mut Request, _response: &mut Response) -> Result<bool, BoxError> {
        Ok(true)
    }

    /// Runs after the inner processor, also when it failed.
    async fn after(&self, _request: &mut Request, _response: &mut Response) -> Result<(), BoxError> {
        Ok(())
    }
}

pub trait ProcessorExt: Processor {
    /// Wraps this processor in `middleware`.
    fn with<M>(self, middleware: M) -> MiddlewareProcessor<M, Self>
    where
        M: Middleware,
        Self: Sized,
    {
        MiddlewareProcessor::new(middleware, self)
    }
}

impl<T: Processor + ?Sized> ProcessorExt for T {}

#[async_trait]
impl<P: Processor + ?Sized> Processor for Arc<P> {
    async fn process(&self, request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
        (**self).process(request, response).await
    }
}

#[async_trait]
impl<P: Processor + ?Sized> Processor for Box<P> {
    async fn process(&self, request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
        (**self).process(request, response).await
    }
}

/// The future returned by a function used as a processor.
pub type ProcessFuture<'a, E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'a>>;

#[derive(Debug)]
pub struct ProcessorFn<F> {
    f: F,
}

#[async_trait]
impl<F, E> Processor for ProcessorFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> ProcessFuture<'a, E> + Send + Sync,
    E: Into<Box<dyn Error + Send + Sync>> + 'static,
{
    async fn process(&self, request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
        (self.f)(request, response).await.map_err(Into::into)
    }
}

/// Turns a function into a [`Processor`].
///
/// ```
/// use micro_scgi::chain::make_processor;
/// use micro_scgi::protocol::BoxError;
///
/// let hello = make_processor(|_request, response| {
///     Box::pin(async move {
///         response.write_str("Hello World").await?;
///         Ok::<_, BoxError>(())
///     })
/// });
/// ```
pub fn make_processor<F, E>(f: F) -> ProcessorFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> ProcessFuture<'a, E>,
{
    ProcessorFn { f }
}
