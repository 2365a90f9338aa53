use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::client::{ClientError, ClientResponse, QueryStringBuilder};
use crate::codec::encode_envelope;
use crate::protocol::vars::{self, cgify_header_name, HTTP_PREFIX, SCGI_VERSION};
use crate::protocol::{Envelope, SendError};

const DEFAULT_VARS: [(&str, &str); 18] = [
    (vars::CONTENT_LENGTH, "0"),
    (vars::CONTENT_TYPE, ""),
    (vars::SCGI, SCGI_VERSION),
    (vars::SERVER_SOFTWARE, concat!("micro-scgi-client/", env!("CARGO_PKG_VERSION"))),
    (vars::SERVER_NAME, "localhost"),
    (vars::SERVER_ADDR, ""),
    (vars::SERVER_PORT, "80"),
    (vars::SERVER_PROTOCOL, "HTTP/1.1"),
    (vars::REMOTE_ADDR, "127.0.0.1"),
    (vars::REMOTE_PORT, "37184"),
    (vars::REQUEST_METHOD, "GET"),
    (vars::REQUEST_SCHEME, "http"),
    (vars::REQUEST_URI, "/"),
    (vars::PATH_INFO, "/"),
    (vars::QUERY_STRING, ""),
    (vars::SCRIPT_NAME, ""),
    (vars::SCRIPT_FILENAME, ""),
    (vars::DOCUMENT_ROOT, "/var/www/"),
];

const DEFAULT_HTTP_HEADERS: [(&str, &str); 6] = [
    ("Host", "localhost"),
    ("User-Agent", "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0"),
    ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    ("Accept-Language", "en-GB,en;q=0.5"),
    ("Accept-Encoding", "gzip, deflate"),
    ("Connection", "keep-alive"),
];

/// A SCGI client sending one request per [`execute`](Client::execute).
///
/// Variables keep the order they were first set in, setting one again replaces its value
/// in place. `CONTENT_LENGTH` is always recomputed from the content before sending.
#[derive(Debug, Clone)]
pub struct Client {
    host: String,
    port: u16,
    envelope: Envelope,
    content: Option<Bytes>,
}

impl Client {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        let mut client = Self { host: host.into(), port, envelope: Envelope::with_capacity(32), content: None };
        client.reset();
        client
    }

    /// Restores the default variables and headers and drops any content.
    pub fn reset(&mut self) -> &mut Self {
        self.envelope.clear();
        self.content = None;
        for (name, value) in DEFAULT_VARS {
            self.envelope.set(name, value);
        }
        for (name, value) in DEFAULT_HTTP_HEADERS {
            self.set_http_header(name, value);
        }
        self
    }

    pub fn set_var<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) -> &mut Self {
        self.envelope.set(name, value);
        self
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.envelope.get(name)
    }

    pub fn remove_var(&mut self, name: &str) -> &mut Self {
        self.envelope.remove(name);
        self
    }

    /// Every variable, in the order they will be sent.
    pub fn vars(&self) -> &Envelope {
        &self.envelope
    }

    /// Sets a header variable, `User-Agent` is sent as `HTTP_USER_AGENT`.
    pub fn set_http_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.set_var(format!("{HTTP_PREFIX}{}", cgify_header_name(name)), value)
    }

    /// Prepares a `GET` for `uri`, the part after `?` becomes the query string.
    pub fn get(&mut self, uri: &str) -> &mut Self {
        self.request("GET", uri)
    }

    /// Prepares a `POST` of `body` to `uri`.
    pub fn post<B: Into<Bytes>>(&mut self, uri: &str, content_type: &str, body: B) -> &mut Self {
        self.request("POST", uri).set_var(vars::CONTENT_TYPE, content_type).content(body)
    }

    fn request(&mut self, method: &str, uri: &str) -> &mut Self {
        self.set_var(vars::REQUEST_METHOD, method).set_var(vars::REQUEST_URI, uri);
        match uri.split_once('?') {
            Some((path, query)) => self.set_var(vars::PATH_INFO, path).set_var(vars::QUERY_STRING, query),
            None => self.set_var(vars::PATH_INFO, uri),
        }
    }

    /// Sets `SERVER_NAME` and the `Host` header.
    pub fn server(&mut self, name: &str) -> &mut Self {
        self.set_var(vars::SERVER_NAME, name).set_http_header("Host", name)
    }

    pub fn http(&mut self) -> &mut Self {
        self.set_var(vars::REQUEST_SCHEME, "http").set_var(vars::SERVER_PORT, "80")
    }

    pub fn https(&mut self) -> &mut Self {
        self.set_var(vars::REQUEST_SCHEME, "https").set_var(vars::SERVER_PORT, "443")
    }

    pub fn content<B: Into<Bytes>>(&mut self, body: B) -> &mut Self {
        self.content = Some(body.into());
        self
    }

    pub fn query_string(&mut self) -> QueryStringBuilder<'_> {
        QueryStringBuilder::new(self)
    }

    /// The envelope as it would be sent now, with `CONTENT_LENGTH` matching the content.
    pub fn encode(&mut self) -> Result<Bytes, ClientError> {
        let length = self.content.as_ref().map_or(0, Bytes::len);
        self.envelope.set(vars::CONTENT_LENGTH, length.to_string());
        Ok(encode_envelope(&self.envelope)?)
    }

    /// Opens a connection, sends the request and reads the response preamble.
    pub async fn execute(&mut self) -> Result<ClientResponse, ClientError> {
        let preamble = self.encode()?;
        let address = format!("{}:{}", self.host, self.port);

        let mut stream =
            TcpStream::connect((self.host.as_str(), self.port)).await.map_err(|e| ClientError::connect(&address, e))?;
        debug!(
            %address,
            method = self.var(vars::REQUEST_METHOD).unwrap_or("-"),
            uri = self.var(vars::REQUEST_URI).unwrap_or("-"),
            "sending scgi request"
        );

        stream.write_all(&preamble).await.map_err(SendError::io)?;
        if let Some(content) = &self.content {
            stream.write_all(content).await.map_err(SendError::io)?;
        }
        stream.flush().await.map_err(SendError::io)?;

        ClientResponse::read_from(stream).await
    }
}
