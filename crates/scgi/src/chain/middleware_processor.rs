use std::panic::{self, AssertUnwindSafe};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::trace;

use crate::chain::{Middleware, Processor};
use crate::protocol::{BoxError, Request, Response, SuppressedError};

/// One stage of a processing chain: a [`Middleware`] around an inner [`Processor`].
///
/// - `before` returning `false` ends processing, neither the inner processor nor `after` run
/// - an error from `before` is returned as is, neither the inner processor nor `after` run
/// - otherwise `after` always runs once the inner processor is done, even if it failed or
///   panicked; a panic resumes after the hook
/// - if both the inner processor and `after` fail, the inner error stays the primary cause
///   of a [`SuppressedError`] carrying the hook's error too
#[derive(Debug, Clone)]
pub struct MiddlewareProcessor<M, P> {
    middleware: M,
    inner: P,
}

impl<M, P> MiddlewareProcessor<M, P> {
    pub fn new(middleware: M, inner: P) -> Self {
        Self { middleware, inner }
    }

    pub fn middleware(&self) -> &M {
        &self.middleware
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<M, P> Processor for MiddlewareProcessor<M, P>
where
    M: Middleware,
    P: Processor,
{
    async fn process(&self, request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
        if !self.middleware.before(request, response).await? {
            trace!("middleware ended processing before the inner processor");
            return Ok(());
        }

        let outcome = AssertUnwindSafe(self.inner.process(request, response)).catch_unwind().await;
        let after = self.middleware.after(request, response).await;

        match (outcome, after) {
            (Err(payload), _) => panic::resume_unwind(payload),
            (Ok(Ok(())), after) => after,
            (Ok(Err(e)), Ok(())) => Err(e),
            (Ok(Err(e)), Err(suppressed)) => Err(Box::new(SuppressedError::new(e, suppressed))),
        }
    }
}
