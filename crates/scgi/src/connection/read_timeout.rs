use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{sleep, Sleep};

/// Fails a read that makes no progress for longer than `timeout`.
///
/// The clock restarts whenever the inner reader returns, so a slow but steady peer is fine
/// while a silent one ends with [`io::ErrorKind::TimedOut`]. Without a timeout reads pass
/// straight through.
#[derive(Debug)]
pub(crate) struct ReadTimeout<R> {
    inner: R,
    timeout: Option<Duration>,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<R> ReadTimeout<R> {
    pub(crate) fn new(inner: R, timeout: Option<Duration>) -> Self {
        Self { inner, timeout, deadline: None }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ReadTimeout<R> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if let Poll::Ready(result) = Pin::new(&mut this.inner).poll_read(cx, buf) {
            this.deadline = None;
            return Poll::Ready(result);
        }

        let Some(timeout) = this.timeout else {
            return Poll::Pending;
        };

        let deadline = this.deadline.get_or_insert_with(|| Box::pin(sleep(timeout)));
        match deadline.as_mut().poll(cx) {
            Poll::Ready(()) => {
                this.deadline = None;
                Poll::Ready(Err(io::Error::new(io::ErrorKind::TimedOut, format!("no data received for {timeout:?}"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (_client, server) = tokio::io::duplex(64);
        let mut reader = ReadTimeout::new(server, Some(Duration::from_millis(20)));

        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn data_resets_the_clock() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = ReadTimeout::new(server, Some(Duration::from_millis(200)));

        let writer = tokio::spawn(async move {
            for chunk in [&b"ab"[..], b"cd", b"ef"] {
                tokio::time::sleep(Duration::from_millis(60)).await;
                client.write_all(chunk).await.unwrap();
            }
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        writer.await.unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[tokio::test]
    async fn no_timeout_passes_through() {
        let mut reader = ReadTimeout::new(&b"abc"[..], None);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");
    }
}
