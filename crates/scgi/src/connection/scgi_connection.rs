use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;
use tracing::{error, warn};

use crate::chain::Processor;
use crate::codec::EnvelopeDecoder;
use crate::connection::read_timeout::ReadTimeout;
use crate::protocol::body::ReqBody;
use crate::protocol::{BoxError, ParseError, Request, Response, ScgiError};

const READ_BUFFER_SIZE: usize = 8 * 1024;

const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// A SCGI connection carrying exactly one request.
///
/// # Type Parameters
///
/// * `R`: the inbound half the envelope and body are read from
/// * `W`: the outbound half the response is written to
#[derive(Debug)]
pub struct ScgiConnection<R, W> {
    framed_read: FramedRead<ReadTimeout<R>, EnvelopeDecoder>,
    writer: W,
}

impl<R, W> ScgiConnection<R, W>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_read_timeout(reader, writer, None)
    }

    /// Like [`new`](Self::new), but a read of the envelope or body that receives nothing
    /// for `read_timeout` fails with [`std::io::ErrorKind::TimedOut`].
    pub fn with_read_timeout(reader: R, writer: W, read_timeout: Option<Duration>) -> Self {
        let reader = ReadTimeout::new(reader, read_timeout);
        Self { framed_read: FramedRead::with_capacity(reader, EnvelopeDecoder::new(), READ_BUFFER_SIZE), writer }
    }

    /// Decodes the request into `request`, runs `processor` and completes `response`.
    ///
    /// `request` and `response` are expected to be freshly reset, they are left populated
    /// so the caller can log from them before resetting.
    ///
    /// # Errors
    ///
    /// - [`ScgiError::RequestError`] when the peer did not send a valid envelope, nothing
    ///   is written back in that case
    /// - [`ScgiError::ProcessError`] when the processor failed; the failure is logged here
    ///   and a `500 Internal Server Error` is sent if the headers were still unsent
    /// - [`ScgiError::ResponseError`] when the response could not be written
    pub async fn process<P>(self, request: &mut Request, response: &mut Response, processor: &P) -> Result<(), ScgiError>
    where
        P: Processor + ?Sized,
    {
        let Self { mut framed_read, writer } = self;

        let envelope = match framed_read.next().await {
            Some(Ok(envelope)) => envelope,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ParseError::malformed_length("connection closed before the length prefix").into()),
        };
        request.populate(envelope)?;

        let buffered = framed_read.read_buffer_mut().split().freeze();
        let reader = framed_read.into_inner();
        let content_length = request.content_length();
        request.set_body(ReqBody::new(buffered, reader, content_length));
        response.attach(writer);

        match processor.process(request, response).await {
            Ok(()) => {
                response.finish().await?;
                Ok(())
            }
            Err(e) => {
                error!(
                    method = request.request_method().unwrap_or("-"),
                    uri = request.request_uri().unwrap_or("-"),
                    cause = %e,
                    "processor failed"
                );
                if let Err(send_error) = send_internal_error(response).await {
                    warn!(cause = %send_error, "failed to complete response after processor error");
                }
                Err(ScgiError::process(e))
            }
        }
    }
}

/// Replaces the response with a plain 500 when nothing has been sent yet, then finishes it.
async fn send_internal_error(response: &mut Response) -> Result<(), BoxError> {
    if response.abort_on_error().is_ok() {
        response.error()?.plain()?;
        response.write_str(INTERNAL_ERROR_BODY).await?;
    }
    response.finish().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::BytesMut;
    use http::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use super::*;
    use crate::codec::parse_response_preamble;

    struct Echo;

    #[async_trait]
    impl Processor for Echo {
        async fn process(&self, request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
            let body = request.read_body().await?;
            response.plain()?;
            response.write_str(request.request_uri().unwrap_or("")).await?;
            response.write_str(" ").await?;
            response.write(&body).await?;
            Ok(())
        }
    }

    struct Fails {
        after_write: bool,
    }

    #[async_trait]
    impl Processor for Fails {
        async fn process(&self, _request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
            response.json()?;
            if self.after_write {
                response.write_str("{").await?;
            }
            Err("database unavailable".into())
        }
    }

    async fn serve<P: Processor>(input: &[u8], processor: &P) -> (Result<(), ScgiError>, Vec<u8>) {
        let (mut client, server) = tokio::io::duplex(16 * 1024);
        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();

        let (reader, writer) = tokio::io::split(server);
        let mut request = Request::new();
        let mut response = Response::new();
        let result = ScgiConnection::new(reader, writer).process(&mut request, &mut response, processor).await;
        drop(response);

        (result, read_all(&mut client).await)
    }

    async fn read_all(client: &mut DuplexStream) -> Vec<u8> {
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn serves_one_request() {
        let input = b"70:CONTENT_LENGTH\x0027\x00SCGI\x001\x00REQUEST_METHOD\x00POST\x00REQUEST_URI\x00/deepthought\x00,What is the answer to life?";
        let (result, output) = serve(input, &Echo).await;
        result.unwrap();

        let mut output = BytesMut::from(&output[..]);
        let head = parse_response_preamble(&mut output).unwrap();
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(head.header("content-type").unwrap(), "text/plain; charset=utf-8");
        assert_eq!(&output[..], b"/deepthought What is the answer to life?");
    }

    #[tokio::test]
    async fn body_ends_at_content_length() {
        let input = b"24:CONTENT_LENGTH\x005\x00SCGI\x001\x00,hello and then some more";
        let (result, output) = serve(input, &Echo).await;
        result.unwrap();

        let mut output = BytesMut::from(&output[..]);
        parse_response_preamble(&mut output).unwrap();
        assert_eq!(&output[..], b" hello");
    }

    #[tokio::test]
    async fn processor_failure_sends_internal_error() {
        let input = b"24:CONTENT_LENGTH\x000\x00SCGI\x001\x00,";
        let (result, output) = serve(input, &Fails { after_write: false }).await;
        assert!(matches!(result, Err(ScgiError::ProcessError { .. })));

        let mut output = BytesMut::from(&output[..]);
        let head = parse_response_preamble(&mut output).unwrap();
        assert_eq!(head.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(head.header("content-type").unwrap(), "text/plain; charset=utf-8");
        assert_eq!(&output[..], INTERNAL_ERROR_BODY.as_bytes());
    }

    #[tokio::test]
    async fn failure_after_headers_keeps_what_was_sent() {
        let input = b"24:CONTENT_LENGTH\x000\x00SCGI\x001\x00,";
        let (result, output) = serve(input, &Fails { after_write: true }).await;
        assert!(matches!(result, Err(ScgiError::ProcessError { .. })));

        let mut output = BytesMut::from(&output[..]);
        let head = parse_response_preamble(&mut output).unwrap();
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(&output[..], b"{");
    }

    #[tokio::test]
    async fn malformed_envelope_writes_nothing() {
        let (result, output) = serve(b"abc:junk", &Echo).await;
        let err = result.unwrap_err();
        assert!(err.is_framing());
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn missing_scgi_marker_is_rejected() {
        let (result, output) = serve(b"17:CONTENT_LENGTH\x000\x00,", &Echo).await;
        assert!(matches!(
            result,
            Err(ScgiError::RequestError { source: ParseError::MissingVariable { name: "SCGI" } })
        ));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (_client, server) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(server);
        let connection = ScgiConnection::with_read_timeout(reader, writer, Some(Duration::from_millis(20)));

        let result = connection.process(&mut Request::new(), &mut Response::new(), &Echo).await;
        assert!(matches!(
            result,
            Err(ScgiError::RequestError { source: ParseError::Io { ref source } }) if source.kind() == std::io::ErrorKind::TimedOut
        ));
    }

    #[tokio::test]
    async fn stalled_body_times_out() {
        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(b"24:CONTENT_LENGTH\x005\x00SCGI\x001\x00,he").await.unwrap();
        let (reader, writer) = tokio::io::split(server);
        let connection = ScgiConnection::with_read_timeout(reader, writer, Some(Duration::from_millis(20)));

        let result = connection.process(&mut Request::new(), &mut Response::new(), &Echo).await;
        assert!(matches!(result, Err(ScgiError::ProcessError { .. })));
    }

    #[tokio::test]
    async fn closed_before_anything_is_malformed() {
        let (result, _) = serve(b"", &Echo).await;
        assert!(matches!(result, Err(ScgiError::RequestError { source: ParseError::MalformedLength { .. } })));
    }
}
