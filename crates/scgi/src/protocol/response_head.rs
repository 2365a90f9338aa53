use http::{HeaderMap, HeaderValue, StatusCode};

/// The parsed preamble of a response received by the [`Client`](crate::client::Client).
#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: StatusCode,
    reason: String,
    headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode, reason: String, headers: HeaderMap) -> Self {
        Self { status, reason, headers }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The reason text exactly as sent, which may differ from the canonical one.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn into_parts(self) -> (StatusCode, String, HeaderMap) {
        (self.status, self.reason, self.headers)
    }
}
