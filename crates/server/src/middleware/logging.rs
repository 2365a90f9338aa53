use async_trait::async_trait;
use micro_scgi::chain::Middleware;
use micro_scgi::protocol::{BoxError, Request, Response};
use tracing::debug;

/// Stamps the processing time on the request and logs one line per request at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn before(&self, request: &mut Request, _response: &mut Response) -> Result<bool, BoxError> {
        request.start_processing();
        Ok(true)
    }

    async fn after(&self, request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
        request.end_processing();
        let elapsed = request.processing_time().unwrap_or_default();
        let method = request.request_method().unwrap_or("-");
        let path = request.path_info().unwrap_or("");

        match request.query_string().filter(|query| !query.is_empty()) {
            Some(query) => debug!(status = %response.get_status(), "{method} {path}?{query} in {}us", elapsed.as_micros()),
            None => debug!(status = %response.get_status(), "{method} {path} in {}us", elapsed.as_micros()),
        }
        Ok(())
    }
}
