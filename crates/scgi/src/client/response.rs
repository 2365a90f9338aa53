use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::{HeaderMap, StatusCode};
use mime::Mime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;

use crate::client::ClientError;
use crate::codec::ResponseDecoder;
use crate::protocol::{ParseError, ResponseHead};
use crate::utils::latin1_to_string;

/// The response to a [`Client`](crate::client::Client) request.
///
/// The preamble is parsed as soon as the response is created, the body is read lazily by
/// [`bytes`](Self::bytes) or [`text`](Self::text) and kept once read.
#[derive(Debug)]
pub struct ClientResponse {
    head: ResponseHead,
    buffered: BytesMut,
    stream: Option<TcpStream>,
    content: Option<Bytes>,
}

impl ClientResponse {
    pub(crate) async fn read_from(stream: TcpStream) -> Result<Self, ClientError> {
        let mut framed = FramedRead::new(stream, ResponseDecoder::new());
        let head = match framed.next().await {
            Some(head) => head?,
            None => return Err(ParseError::bad_status_line("").into()),
        };

        let buffered = framed.read_buffer_mut().split();
        Ok(Self { head, buffered, stream: Some(framed.into_inner()), content: None })
    }

    pub fn status(&self) -> StatusCode {
        self.head.status()
    }

    /// The reason text from the status line.
    pub fn message(&self) -> &str {
        self.head.reason()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    /// The first value of a header, if it is visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name).and_then(|value| value.to_str().ok())
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// Reads the body until the server closes the connection.
    pub async fn bytes(&mut self) -> Result<Bytes, ClientError> {
        if let Some(content) = &self.content {
            return Ok(content.clone());
        }

        let mut body = std::mem::take(&mut self.buffered);
        if let Some(mut stream) = self.stream.take() {
            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await.map_err(ParseError::io)?;
            body.extend_from_slice(&rest);
        }

        let content = body.freeze();
        self.content = Some(content.clone());
        Ok(content)
    }

    /// The body as text, decoded with the charset of the content type.
    ///
    /// `iso-8859-1` bodies are decoded byte for byte, everything else must be UTF-8.
    pub async fn text(&mut self) -> Result<String, ClientError> {
        let latin1 = self
            .header(http::header::CONTENT_TYPE.as_str())
            .and_then(|value| value.parse::<Mime>().ok())
            .and_then(|mime| mime.get_param(mime::CHARSET).map(|charset| charset.as_str().eq_ignore_ascii_case("iso-8859-1")))
            .unwrap_or(false);

        let bytes = self.bytes().await?;
        if latin1 {
            return Ok(latin1_to_string(&bytes));
        }
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Closes the connection without reading the rest of the body.
    pub async fn close(mut self) -> Result<(), ClientError> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await.map_err(ParseError::io)?;
        }
        Ok(())
    }
}
