//! The response written back to the front-end server.
//!
//! Status, content type and headers can be changed freely until the preamble goes out,
//! which happens on [`send_headers`](Response::send_headers) or implicitly on the first
//! body write or flush. From then on they are frozen and every mutator fails with
//! [`SendError::HeadersSent`].

use std::fmt;

use http::StatusCode;
use mime::Mime;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::trace;

use crate::codec::{encode_response_preamble, ResponsePreamble};
use crate::ensure;
use crate::protocol::SendError;

pub const DEFAULT_CHARSET: &str = "utf-8";
pub const DEFAULT_CACHE_CONTROL: &str = "no-cache, no-store, max-age=0, must-revalidate";
pub const DEFAULT_EXPIRES: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024;

type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum HeaderState {
    #[default]
    Unsent,
    Sent,
    Finished,
}

/// A SCGI response, reused across connections by the worker that owns it.
pub struct Response {
    output: Option<BufWriter<BoxWriter>>,
    status: StatusCode,
    charset: String,
    content_type: Mime,
    cache_control: Option<String>,
    expires: Option<String>,
    headers: Vec<String>,
    state: HeaderState,
    body_size: u64,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            output: None,
            status: StatusCode::OK,
            charset: DEFAULT_CHARSET.to_string(),
            content_type: mime::TEXT_HTML,
            cache_control: Some(DEFAULT_CACHE_CONTROL.to_string()),
            expires: Some(DEFAULT_EXPIRES.to_string()),
            headers: Vec::new(),
            state: HeaderState::Unsent,
            body_size: 0,
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("attached", &self.output.is_some())
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("charset", &self.charset)
            .field("headers", &self.headers)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the outbound half of a connection, the preamble and body are written there.
    pub fn attach<W>(&mut self, writer: W)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: BoxWriter = Box::new(writer);
        self.output = Some(BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, writer));
    }

    pub fn is_attached(&self) -> bool {
        self.output.is_some()
    }

    fn check_unsent(&self) -> Result<(), SendError> {
        ensure!(self.state == HeaderState::Unsent, SendError::HeadersSent);
        Ok(())
    }

    pub fn get_status(&self) -> StatusCode {
        self.status
    }

    pub fn status(&mut self, status: StatusCode) -> Result<&mut Self, SendError> {
        self.check_unsent()?;
        self.status = status;
        Ok(self)
    }

    pub fn ok(&mut self) -> Result<&mut Self, SendError> {
        self.status(StatusCode::OK)
    }

    pub fn not_found(&mut self) -> Result<&mut Self, SendError> {
        self.status(StatusCode::NOT_FOUND)
    }

    pub fn error(&mut self) -> Result<&mut Self, SendError> {
        self.status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Redirects to `location` with `301 Moved Permanently` or `302 Found`.
    pub fn redirect(&mut self, location: &str, permanent: bool) -> Result<&mut Self, SendError> {
        self.status(if permanent { StatusCode::MOVED_PERMANENTLY } else { StatusCode::FOUND })?;
        self.header("Location", location)
    }

    pub fn get_content_type(&self) -> &Mime {
        &self.content_type
    }

    /// Sets the content type, any parameter on `content_type` is dropped in favour of the charset.
    pub fn content_type(&mut self, content_type: Mime) -> Result<&mut Self, SendError> {
        self.check_unsent()?;
        self.content_type = content_type;
        Ok(self)
    }

    pub fn plain(&mut self) -> Result<&mut Self, SendError> {
        self.content_type(mime::TEXT_PLAIN)
    }

    pub fn html(&mut self) -> Result<&mut Self, SendError> {
        self.content_type(mime::TEXT_HTML)
    }

    pub fn json(&mut self) -> Result<&mut Self, SendError> {
        self.content_type(mime::APPLICATION_JSON)
    }

    pub fn javascript(&mut self) -> Result<&mut Self, SendError> {
        self.content_type(mime::TEXT_JAVASCRIPT)
    }

    pub fn css(&mut self) -> Result<&mut Self, SendError> {
        self.content_type(mime::TEXT_CSS)
    }

    pub fn get_charset(&self) -> &str {
        &self.charset
    }

    pub fn charset(&mut self, charset: &str) -> Result<&mut Self, SendError> {
        self.check_unsent()?;
        check_header_text("charset", charset)?;
        self.charset = charset.to_ascii_lowercase();
        Ok(self)
    }

    pub fn get_cache_control(&self) -> Option<&str> {
        self.cache_control.as_deref()
    }

    /// Sets the `Cache-Control` value, `None` leaves the line out.
    pub fn cache_control(&mut self, value: Option<&str>) -> Result<&mut Self, SendError> {
        self.check_unsent()?;
        if let Some(value) = value {
            check_header_text("Cache-Control", value)?;
        }
        self.cache_control = value.map(str::to_string);
        Ok(self)
    }

    pub fn get_expires(&self) -> Option<&str> {
        self.expires.as_deref()
    }

    /// Sets the `Expires` value, `None` leaves the line out.
    pub fn expires(&mut self, value: Option<&str>) -> Result<&mut Self, SendError> {
        self.check_unsent()?;
        if let Some(value) = value {
            check_header_text("Expires", value)?;
        }
        self.expires = value.map(str::to_string);
        Ok(self)
    }

    /// Adds a header line, headers with the same name are all sent.
    pub fn header(&mut self, name: &str, value: &str) -> Result<&mut Self, SendError> {
        self.check_unsent()?;
        ensure!(
            !name.is_empty() && !name.contains(':') && !name.contains(char::is_whitespace),
            SendError::invalid_header(format!("invalid header name {name:?}"))
        );
        check_header_text(name, value)?;
        self.headers.push(format!("{name}: {value}"));
        Ok(self)
    }

    /// Adds a `Set-Cookie` header.
    pub fn set_cookie(&mut self, name: &str, value: &str) -> Result<&mut Self, SendError> {
        ensure!(
            !name.is_empty() && !name.contains(['=', ';']),
            SendError::invalid_header(format!("invalid cookie name {name:?}"))
        );
        self.header("Set-Cookie", &format!("{name}={value}"))
    }

    pub fn get_headers(&self) -> &[String] {
        &self.headers
    }

    pub fn is_headers_sent(&self) -> bool {
        self.state != HeaderState::Unsent
    }

    pub fn is_finished(&self) -> bool {
        self.state == HeaderState::Finished
    }

    /// Body bytes written so far.
    pub fn body_size(&self) -> u64 {
        self.body_size
    }

    /// Writes the preamble, doing nothing when it has already been sent.
    pub async fn send_headers(&mut self) -> Result<(), SendError> {
        match self.state {
            HeaderState::Sent => return Ok(()),
            HeaderState::Finished => return Err(SendError::Finished),
            HeaderState::Unsent => {}
        }

        let preamble = encode_response_preamble(ResponsePreamble {
            status: self.status,
            content_type: &self.content_type,
            charset: &self.charset,
            cache_control: self.cache_control.as_deref(),
            expires: self.expires.as_deref(),
            headers: &self.headers,
        });

        let output = self.output.as_mut().ok_or(SendError::Detached)?;
        output.write_all(&preamble).await?;
        self.state = HeaderState::Sent;
        trace!(status = %self.status, "sent response headers");
        Ok(())
    }

    /// Writes body bytes, sending the preamble first if needed.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        self.send_headers().await?;
        let output = self.output.as_mut().ok_or(SendError::Detached)?;
        output.write_all(bytes).await?;
        self.body_size += bytes.len() as u64;
        Ok(())
    }

    pub async fn write_str(&mut self, text: &str) -> Result<(), SendError> {
        self.write(text.as_bytes()).await
    }

    /// Sends the preamble if needed and pushes everything buffered to the connection.
    pub async fn flush(&mut self) -> Result<(), SendError> {
        if self.state == HeaderState::Finished {
            return Ok(());
        }
        self.send_headers().await?;
        let output = self.output.as_mut().ok_or(SendError::Detached)?;
        output.flush().await?;
        Ok(())
    }

    /// Restores the defaults so that an error response can replace whatever was prepared.
    ///
    /// Fails once the preamble is on the wire, the front-end has already seen a status.
    pub fn abort_on_error(&mut self) -> Result<(), SendError> {
        self.check_unsent()?;
        let Self { status, charset, content_type, cache_control, expires, headers, .. } = Self::default();
        self.status = status;
        self.charset = charset;
        self.content_type = content_type;
        self.cache_control = cache_control;
        self.expires = expires;
        self.headers = headers;
        Ok(())
    }

    /// Flushes and shuts the outbound half down, nothing can be written afterwards.
    pub async fn finish(&mut self) -> Result<(), SendError> {
        if self.state == HeaderState::Finished {
            return Ok(());
        }
        self.flush().await?;
        if let Some(output) = self.output.as_mut() {
            output.shutdown().await?;
        }
        self.state = HeaderState::Finished;
        Ok(())
    }

    /// Drops the connection and restores every default.
    pub fn reset(&mut self) {
        let Self { output, status, charset, content_type, cache_control, expires, headers, state, body_size } = self;
        *output = None;
        *status = StatusCode::OK;
        DEFAULT_CHARSET.clone_into(charset);
        *content_type = mime::TEXT_HTML;
        *cache_control = Some(DEFAULT_CACHE_CONTROL.to_string());
        *expires = Some(DEFAULT_EXPIRES.to_string());
        headers.clear();
        *state = HeaderState::Unsent;
        *body_size = 0;
    }
}

/// Header text ends up verbatim on a line of its own.
fn check_header_text(name: &str, value: &str) -> Result<(), SendError> {
    ensure!(!value.contains(['\r', '\n']), SendError::invalid_header(format!("{name} contains a line break")));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn written(client: &mut tokio::io::DuplexStream) -> String {
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn first_write_sends_the_preamble() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut response = Response::new();
        response.attach(server);
        response.plain().unwrap().header("X-Answer", "42").unwrap();

        response.write_str("Hello World").await.unwrap();
        response.finish().await.unwrap();

        let expected = "Status: 200 OK\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            Cache-Control: no-cache, no-store, max-age=0, must-revalidate\r\n\
            Expires: Thu, 01 Jan 1970 00:00:00 GMT\r\n\
            X-Answer: 42\r\n\
            \r\n\
            Hello World";
        assert_eq!(written(&mut client).await, expected);
        assert_eq!(response.body_size(), 11);
    }

    #[tokio::test]
    async fn headers_freeze_after_first_write() {
        let (_client, server) = tokio::io::duplex(1024);
        let mut response = Response::new();
        response.attach(server);
        response.write(b"x").await.unwrap();

        assert!(response.is_headers_sent());
        assert!(matches!(response.header("X-Late", "1"), Err(SendError::HeadersSent)));
        assert!(matches!(response.not_found(), Err(SendError::HeadersSent)));
        assert!(matches!(response.json(), Err(SendError::HeadersSent)));
        assert!(matches!(response.abort_on_error(), Err(SendError::HeadersSent)));
        assert_eq!(response.get_status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_writes_after_finish() {
        let (_client, server) = tokio::io::duplex(1024);
        let mut response = Response::new();
        response.attach(server);
        response.finish().await.unwrap();

        assert!(response.is_finished());
        assert!(matches!(response.write(b"late").await, Err(SendError::Finished)));
        response.finish().await.unwrap();
    }

    #[tokio::test]
    async fn detached_response_cannot_send() {
        let mut response = Response::new();
        assert!(matches!(response.send_headers().await, Err(SendError::Detached)));
    }

    #[test]
    fn redirect_sets_status_and_location() {
        let mut response = Response::new();
        response.redirect("/login", false).unwrap();
        assert_eq!(response.get_status(), StatusCode::FOUND);
        assert_eq!(response.get_headers(), ["Location: /login"]);

        response.redirect("/home", true).unwrap();
        assert_eq!(response.get_status(), StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn rejects_line_breaks_in_headers() {
        let mut response = Response::new();
        assert!(matches!(response.header("X-Evil", "a\r\nStatus: 200 OK"), Err(SendError::InvalidHeader { .. })));
        assert!(matches!(response.header("Bad Name", "v"), Err(SendError::InvalidHeader { .. })));
        assert!(response.get_headers().is_empty());
    }

    #[test]
    fn abort_on_error_restores_defaults() {
        let mut response = Response::new();
        response.json().unwrap().not_found().unwrap().cache_control(None).unwrap().header("X-A", "1").unwrap();

        response.abort_on_error().unwrap();

        assert_eq!(response.get_status(), StatusCode::OK);
        assert_eq!(response.get_content_type(), &mime::TEXT_HTML);
        assert_eq!(response.get_cache_control(), Some(DEFAULT_CACHE_CONTROL));
        assert!(response.get_headers().is_empty());
    }

    #[tokio::test]
    async fn reset_detaches_and_restores_defaults() {
        let (_client, server) = tokio::io::duplex(1024);
        let mut response = Response::new();
        response.attach(server);
        response.css().unwrap().charset("ISO-8859-1").unwrap();
        response.write(b"body").await.unwrap();

        response.reset();

        assert!(!response.is_attached());
        assert!(!response.is_headers_sent());
        assert_eq!(response.get_charset(), DEFAULT_CHARSET);
        assert_eq!(response.get_content_type(), &mime::TEXT_HTML);
        assert_eq!(response.body_size(), 0);
    }
}
