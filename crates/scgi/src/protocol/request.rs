//! The request handed to a processing chain.
//!
//! A [`Request`] is filled from a decoded [`Envelope`]: the well-known variables land in
//! typed fields, `HTTP_*` variables become headers (stored without the prefix) and every
//! other variable is kept in a plain map. The body stays on the connection until it is read.
//!
//! Workers keep one `Request` for their whole life and [`reset`](Request::reset) it after
//! every connection, so nothing may survive from one request to the next.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::trace;

use crate::ensure;
use crate::protocol::body::ReqBody;
use crate::protocol::vars::{self, cgify_header_name, HTTP_PREFIX};
use crate::protocol::{Envelope, Parameter, ParseError};

/// The well-known variables that get a typed getter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ContentLength,
    ContentType,
    Scgi,
    ServerSoftware,
    ServerName,
    ServerAddr,
    ServerPort,
    ServerProtocol,
    RemoteAddr,
    RemotePort,
    RequestMethod,
    RequestScheme,
    RequestUri,
    PathInfo,
    QueryString,
    ScriptName,
    ScriptFilename,
    DocumentRoot,
}

const FIELD_COUNT: usize = 18;

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        let field = match name {
            vars::CONTENT_LENGTH => Self::ContentLength,
            vars::CONTENT_TYPE => Self::ContentType,
            vars::SCGI => Self::Scgi,
            vars::SERVER_SOFTWARE => Self::ServerSoftware,
            vars::SERVER_NAME => Self::ServerName,
            vars::SERVER_ADDR => Self::ServerAddr,
            vars::SERVER_PORT => Self::ServerPort,
            vars::SERVER_PROTOCOL => Self::ServerProtocol,
            vars::REMOTE_ADDR => Self::RemoteAddr,
            vars::REMOTE_PORT => Self::RemotePort,
            vars::REQUEST_METHOD => Self::RequestMethod,
            vars::REQUEST_SCHEME => Self::RequestScheme,
            vars::REQUEST_URI => Self::RequestUri,
            vars::PATH_INFO => Self::PathInfo,
            vars::QUERY_STRING => Self::QueryString,
            vars::SCRIPT_NAME => Self::ScriptName,
            vars::SCRIPT_FILENAME => Self::ScriptFilename,
            vars::DOCUMENT_ROOT => Self::DocumentRoot,
            _ => return None,
        };
        Some(field)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A SCGI request as seen by processors and middleware.
#[derive(Debug, Default)]
pub struct Request {
    fields: [Option<String>; FIELD_COUNT],
    content_length: u64,
    server_port: Option<u16>,
    remote_port: Option<u16>,
    variables: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    parameters: BTreeMap<String, Parameter>,
    peer_addr: Option<SocketAddr>,
    processing_start: Option<Instant>,
    processing_end: Option<Instant>,
    body: ReqBody,
    body_bytes: Option<Bytes>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills this request from a decoded envelope, later pairs overwrite earlier ones.
    ///
    /// `CONTENT_LENGTH` and `SCGI` must both be present, numeric variables must parse.
    pub fn populate(&mut self, envelope: Envelope) -> Result<(), ParseError> {
        for (name, value) in envelope {
            self.set_variable(name, value)?;
        }

        ensure!(self.field(Field::ContentLength).is_some(), ParseError::missing_variable(vars::CONTENT_LENGTH));
        ensure!(self.field(Field::Scgi).is_some(), ParseError::missing_variable(vars::SCGI));
        Ok(())
    }

    /// Sets a variable, routing it to its typed field, to the headers or to the other variables.
    pub fn set_variable<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) -> Result<(), ParseError> {
        let name = name.into();
        let value = value.into();
        trace!(%name, %value, "set request variable");

        if let Some(header) = name.strip_prefix(HTTP_PREFIX) {
            self.headers.insert(header.to_string(), value);
            return Ok(());
        }

        let Some(field) = Field::from_name(&name) else {
            self.variables.insert(name, value);
            return Ok(());
        };

        match field {
            Field::ContentLength => {
                let Ok(length) = value.trim().parse() else {
                    return Err(ParseError::invalid_variable(&name, &value));
                };
                self.content_length = length;
            }
            Field::ServerPort => self.server_port = parse_port(&name, &value)?,
            Field::RemotePort => self.remote_port = parse_port(&name, &value)?,
            _ => {}
        }
        self.fields[field.index()] = Some(value);
        Ok(())
    }

    /// Looks a variable up by its wire name, `HTTP_*` names included.
    pub fn variable(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_uppercase();
        if let Some(header) = name.strip_prefix(HTTP_PREFIX) {
            return self.headers.get(header).map(String::as_str);
        }

        match Field::from_name(&name) {
            Some(field) => self.field(field),
            None => self.variables.get(&name).map(String::as_str),
        }
    }

    /// Variables that are neither well-known nor headers.
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Looks a header up by its HTTP name, `User-Agent` and `user_agent` both work.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&cgify_header_name(name)).map(String::as_str)
    }

    /// Headers keyed by their variable name without the `HTTP_` prefix, `USER_AGENT` for instance.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    fn field(&self, field: Field) -> Option<&str> {
        self.fields[field.index()].as_deref()
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn content_type(&self) -> Option<&str> {
        self.field(Field::ContentType)
    }

    pub fn scgi_version(&self) -> Option<&str> {
        self.field(Field::Scgi)
    }

    pub fn server_software(&self) -> Option<&str> {
        self.field(Field::ServerSoftware)
    }

    pub fn server_name(&self) -> Option<&str> {
        self.field(Field::ServerName)
    }

    pub fn server_addr(&self) -> Option<&str> {
        self.field(Field::ServerAddr)
    }

    pub fn server_port(&self) -> Option<u16> {
        self.server_port
    }

    pub fn server_protocol(&self) -> Option<&str> {
        self.field(Field::ServerProtocol)
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.field(Field::RemoteAddr)
    }

    pub fn remote_port(&self) -> Option<u16> {
        self.remote_port
    }

    pub fn request_method(&self) -> Option<&str> {
        self.field(Field::RequestMethod)
    }

    pub fn request_scheme(&self) -> Option<&str> {
        self.field(Field::RequestScheme)
    }

    pub fn request_uri(&self) -> Option<&str> {
        self.field(Field::RequestUri)
    }

    pub fn path_info(&self) -> Option<&str> {
        self.field(Field::PathInfo)
    }

    pub fn query_string(&self) -> Option<&str> {
        self.field(Field::QueryString)
    }

    pub fn script_name(&self) -> Option<&str> {
        self.field(Field::ScriptName)
    }

    pub fn script_filename(&self) -> Option<&str> {
        self.field(Field::ScriptFilename)
    }

    pub fn document_root(&self) -> Option<&str> {
        self.field(Field::DocumentRoot)
    }

    /// The address of the front-end server that opened the connection.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn set_peer_addr(&mut self, peer_addr: SocketAddr) {
        self.peer_addr = Some(peer_addr);
    }

    /// Adds a parameter value, a name seen before turns into a list.
    pub fn add_parameter<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        match self.parameters.entry(name.into()) {
            Entry::Occupied(mut entry) => entry.get_mut().push(value.into()),
            Entry::Vacant(entry) => {
                entry.insert(Parameter::Single(value.into()));
            }
        }
    }

    /// Adds a parameter value that is a list even when it is the only one.
    pub fn add_list_parameter<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        match self.parameters.entry(name.into()) {
            Entry::Occupied(mut entry) => entry.get_mut().push(value.into()),
            Entry::Vacant(entry) => {
                entry.insert(Parameter::List(vec![value.into()]));
            }
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    pub fn contains_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    pub fn start_processing(&mut self) {
        self.processing_start = Some(Instant::now());
    }

    pub fn end_processing(&mut self) {
        self.processing_end = Some(Instant::now());
    }

    pub fn processing_start(&self) -> Option<Instant> {
        self.processing_start
    }

    pub fn processing_end(&self) -> Option<Instant> {
        self.processing_end
    }

    /// Time between the two processing stamps, `None` until both are set.
    pub fn processing_time(&self) -> Option<Duration> {
        Some(self.processing_end?.saturating_duration_since(self.processing_start?))
    }

    /// Attaches the body stream read by [`body`](Self::body) and [`read_body`](Self::read_body).
    pub fn set_body(&mut self, body: ReqBody) {
        self.body = body;
        self.body_bytes = None;
    }

    /// The body stream, bounded to `CONTENT_LENGTH` bytes.
    pub fn body(&mut self) -> &mut ReqBody {
        &mut self.body
    }

    /// Reads what is left of the body into memory.
    ///
    /// The bytes are kept, later calls return them again without touching the connection.
    pub async fn read_body(&mut self) -> io::Result<Bytes> {
        if let Some(bytes) = &self.body_bytes {
            return Ok(bytes.clone());
        }

        let bytes = self.body.to_bytes().await?;
        self.body_bytes = Some(bytes.clone());
        Ok(bytes)
    }

    /// Renders every field in a human readable form.
    pub fn dump(&self) -> String {
        let mut out = String::with_capacity(512);
        let _ = writeln!(out, "Request");
        let _ = writeln!(out, "  content length: {}", self.content_length);
        for (field, name) in FIELD_NAMES.iter().enumerate() {
            if let Some(value) = &self.fields[field] {
                let _ = writeln!(out, "  {name}: {value}");
            }
        }

        let _ = writeln!(out, "Variables");
        for (name, value) in &self.variables {
            let _ = writeln!(out, "  {name}: {value}");
        }

        let _ = writeln!(out, "Headers");
        for (name, value) in &self.headers {
            let _ = writeln!(out, "  {name}: {value}");
        }

        let _ = writeln!(out, "Parameters");
        for (name, parameter) in &self.parameters {
            let _ = writeln!(out, "  {name}: {:?}", parameter.values());
        }
        out
    }

    /// Clears every field so the request can be reused for the next connection.
    pub fn reset(&mut self) {
        let Self {
            fields,
            content_length,
            server_port,
            remote_port,
            variables,
            headers,
            parameters,
            peer_addr,
            processing_start,
            processing_end,
            body,
            body_bytes,
        } = self;

        fields.iter_mut().for_each(|field| *field = None);
        *content_length = 0;
        *server_port = None;
        *remote_port = None;
        variables.clear();
        headers.clear();
        parameters.clear();
        *peer_addr = None;
        *processing_start = None;
        *processing_end = None;
        *body = ReqBody::empty();
        *body_bytes = None;
    }
}

/// Wire names in [`Field`] order.
const FIELD_NAMES: [&str; FIELD_COUNT] = [
    vars::CONTENT_LENGTH,
    vars::CONTENT_TYPE,
    vars::SCGI,
    vars::SERVER_SOFTWARE,
    vars::SERVER_NAME,
    vars::SERVER_ADDR,
    vars::SERVER_PORT,
    vars::SERVER_PROTOCOL,
    vars::REMOTE_ADDR,
    vars::REMOTE_PORT,
    vars::REQUEST_METHOD,
    vars::REQUEST_SCHEME,
    vars::REQUEST_URI,
    vars::PATH_INFO,
    vars::QUERY_STRING,
    vars::SCRIPT_NAME,
    vars::SCRIPT_FILENAME,
    vars::DOCUMENT_ROOT,
];

/// An empty port is treated as absent, front-ends send one for unix sockets.
fn parse_port(name: &str, value: &str) -> Result<Option<u16>, ParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse() {
        Ok(port) => Ok(Some(port)),
        Err(_) => Err(ParseError::invalid_variable(name, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(pairs: &[(&str, &str)]) -> Envelope {
        pairs.iter().copied().collect()
    }

    #[test]
    fn populates_typed_fields_headers_and_variables() {
        let mut request = Request::new();
        request
            .populate(envelope(&[
                ("CONTENT_LENGTH", "27"),
                ("SCGI", "1"),
                ("REQUEST_METHOD", "POST"),
                ("REQUEST_URI", "/deepthought?q=42"),
                ("SERVER_PORT", "80"),
                ("HTTP_USER_AGENT", "curl/8.0"),
                ("HTTP_HOST", "example.com"),
                ("GATEWAY_INTERFACE", "CGI/1.1"),
            ]))
            .unwrap();

        assert_eq!(request.content_length(), 27);
        assert_eq!(request.scgi_version(), Some("1"));
        assert_eq!(request.request_method(), Some("POST"));
        assert_eq!(request.request_uri(), Some("/deepthought?q=42"));
        assert_eq!(request.server_port(), Some(80));
        assert_eq!(request.header("User-Agent"), Some("curl/8.0"));
        assert_eq!(request.header("host"), Some("example.com"));
        assert_eq!(request.variable("HTTP_HOST"), Some("example.com"));
        assert_eq!(request.variable("GATEWAY_INTERFACE"), Some("CGI/1.1"));
        assert_eq!(request.variable("content_length"), Some("27"));
        assert_eq!(request.variables().len(), 1);
        assert_eq!(request.headers().len(), 2);
    }

    #[test]
    fn later_duplicates_win() {
        let mut request = Request::new();
        request.populate(envelope(&[("CONTENT_LENGTH", "1"), ("SCGI", "1"), ("CONTENT_LENGTH", "2")])).unwrap();
        assert_eq!(request.content_length(), 2);
    }

    #[test]
    fn required_variables_are_checked() {
        let err = Request::new().populate(envelope(&[("SCGI", "1")])).unwrap_err();
        assert!(matches!(err, ParseError::MissingVariable { name: "CONTENT_LENGTH" }));

        let err = Request::new().populate(envelope(&[("CONTENT_LENGTH", "0")])).unwrap_err();
        assert!(matches!(err, ParseError::MissingVariable { name: "SCGI" }));
    }

    #[test]
    fn numeric_variables_must_parse() {
        let err = Request::new().populate(envelope(&[("CONTENT_LENGTH", "lots"), ("SCGI", "1")])).unwrap_err();
        assert!(matches!(err, ParseError::InvalidVariable { .. }));

        let err = Request::new().populate(envelope(&[("CONTENT_LENGTH", "0"), ("SCGI", "1"), ("REMOTE_PORT", "99999")])).unwrap_err();
        assert!(matches!(err, ParseError::InvalidVariable { .. }));
    }

    #[test]
    fn repeated_parameters_become_lists() {
        let mut request = Request::new();
        request.add_parameter("a", "1");
        request.add_parameter("a", "2");
        request.add_parameter("b", "3");
        request.add_list_parameter("c", "4");

        assert_eq!(request.parameter("a").unwrap().values(), ["1", "2"]);
        assert_eq!(request.parameter("b"), Some(&Parameter::Single("3".into())));
        assert!(request.parameter("c").unwrap().is_list());
        assert!(request.contains_parameter("c"));
        assert!(!request.contains_parameter("d"));
    }

    #[tokio::test]
    async fn read_body_is_kept() {
        let (_client, server) = tokio::io::duplex(16);
        let mut request = Request::new();
        request.set_body(ReqBody::new(Bytes::from_static(b"hello world"), server, 5));

        assert_eq!(&request.read_body().await.unwrap()[..], b"hello");
        assert_eq!(&request.read_body().await.unwrap()[..], b"hello");
    }

    #[test]
    fn reset_clears_everything() {
        let mut request = Request::new();
        request
            .populate(envelope(&[("CONTENT_LENGTH", "5"), ("SCGI", "1"), ("REMOTE_PORT", "5000"), ("HTTP_HOST", "h"), ("X", "y")]))
            .unwrap();
        request.add_parameter("a", "1");
        request.start_processing();
        request.end_processing();
        request.set_peer_addr("127.0.0.1:4000".parse().unwrap());

        request.reset();

        assert_eq!(request.content_length(), 0);
        assert_eq!(request.scgi_version(), None);
        assert_eq!(request.remote_port(), None);
        assert!(request.headers().is_empty());
        assert!(request.variables().is_empty());
        assert!(request.parameters().is_empty());
        assert!(request.processing_time().is_none());
        assert!(request.peer_addr().is_none());
        assert_eq!(request.body().length(), 0);
    }

    #[test]
    fn dump_lists_what_was_received() {
        let mut request = Request::new();
        request.populate(envelope(&[("CONTENT_LENGTH", "0"), ("SCGI", "1"), ("HTTP_HOST", "example.com")])).unwrap();
        let dump = request.dump();
        assert!(dump.contains("SCGI: 1"));
        assert!(dump.contains("HOST: example.com"));
    }
}
