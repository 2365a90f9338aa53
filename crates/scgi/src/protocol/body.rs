//! The request body, read straight from the connection.
//!
//! The decoder usually reads past the `,` separator, so the first body bytes sit in its
//! buffer while the rest is still on the socket. [`ReqBody`] chains the two and cuts the
//! stream at `CONTENT_LENGTH`, whatever the peer sends after that is never seen. A peer
//! that closes before sending `CONTENT_LENGTH` bytes fails the read with
//! [`io::ErrorKind::UnexpectedEof`] instead of passing for a shorter body.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, Chain, ReadBuf, Take};

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Request body bounded to the declared content length.
///
/// An empty body, or one that has not been attached to a connection yet, reads as end of
/// data right away.
pub struct ReqBody {
    inner: Option<Take<Chain<Cursor<Bytes>, BoxReader>>>,
    length: u64,
}

impl ReqBody {
    /// Creates a body reading `buffered` first and then `reader`, `length` bytes in total.
    pub fn new<R>(buffered: Bytes, reader: R, length: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let reader: BoxReader = Box::new(reader);
        Self { inner: Some(Cursor::new(buffered).chain(reader).take(length)), length }
    }

    /// A body without content.
    pub fn empty() -> Self {
        Self { inner: None, length: 0 }
    }

    /// The declared length of the body.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Bytes left before the declared length is reached.
    pub fn remaining(&self) -> u64 {
        self.inner.as_ref().map_or(0, Take::limit)
    }

    /// Reads the rest of the body into memory.
    pub async fn to_bytes(&mut self) -> io::Result<Bytes> {
        let capacity = usize::try_from(self.remaining()).unwrap_or(usize::MAX).min(64 * 1024);
        let mut buf = Vec::with_capacity(capacity);
        self.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl Default for ReqBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for ReqBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqBody").field("length", &self.length).field("remaining", &self.remaining()).finish()
    }
}

impl AsyncRead for ReqBody {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let length = self.length;
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(Ok(()));
        };

        let filled = buf.filled().len();
        ready!(Pin::new(&mut *inner).poll_read(cx, buf))?;

        let missing = inner.limit();
        if buf.filled().len() == filled && buf.remaining() > 0 && missing > 0 {
            let message = format!("connection closed {missing} bytes short of the {length} byte body");
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::UnexpectedEof, message)));
        }
        Poll::Ready(Ok(()))
    }
}
