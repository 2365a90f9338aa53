use crate::client::{Client, ClientError};
use crate::protocol::vars;

/// Builds the `QUERY_STRING` variable of a [`Client`] request.
///
/// Names and values are percent-encoded as `application/x-www-form-urlencoded`.
#[derive(Debug)]
pub struct QueryStringBuilder<'a> {
    client: &'a mut Client,
    params: Vec<(String, String)>,
}

impl<'a> QueryStringBuilder<'a> {
    pub(crate) fn new(client: &'a mut Client) -> Self {
        Self { client, params: Vec::new() }
    }

    #[must_use]
    pub fn param<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// A parameter without a value, sent as `name=`.
    #[must_use]
    pub fn flag<N: Into<String>>(self, name: N) -> Self {
        self.param(name, "")
    }

    /// Sets the encoded query string on the client.
    pub fn complete(self) -> Result<&'a mut Client, ClientError> {
        let query = serde_urlencoded::to_string(&self.params)?;
        Ok(self.client.set_var(vars::QUERY_STRING, query))
    }
}
