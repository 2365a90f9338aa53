use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use micro_scgi::chain::Processor;
use micro_scgi::connection::ScgiConnection;
use micro_scgi::protocol::{Request, Response, ScgiError};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::mpsc::Receiver;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn, Instrument};

use crate::listener::stats::Counters;

pub(crate) type WorkQueue = Arc<Mutex<Receiver<WorkItem>>>;

/// An accepted connection waiting for a worker.
#[derive(Debug)]
pub(crate) struct WorkItem {
    stream: TcpStream,
    peer_addr: SocketAddr,
    accepted_at: Instant,
}

impl WorkItem {
    pub(crate) fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self { stream, peer_addr, accepted_at: Instant::now() }
    }

    pub(crate) fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

/// Timing limits applied to every connection a worker serves.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) shutdown_grace: Duration,
}

/// A long lived task taking connections off the queue one at a time.
///
/// The worker owns one [`Request`] and one [`Response`] and resets both after every
/// connection, whatever the outcome.
pub(crate) struct Worker {
    id: usize,
    queue: WorkQueue,
    processor: Arc<dyn Processor>,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
    limits: Limits,
    request: Request,
    response: Response,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        queue: WorkQueue,
        processor: Arc<dyn Processor>,
        shutdown: CancellationToken,
        counters: Arc<Counters>,
        limits: Limits,
    ) -> Self {
        Self { id, queue, processor, shutdown, counters, limits, request: Request::new(), response: Response::new() }
    }

    pub(crate) async fn run(mut self) {
        let span = tracing::info_span!("worker", id = self.id);
        async move {
            debug!("worker started");
            while let Some(item) = next_item(&self.queue, &self.shutdown).await {
                self.serve(item).await;
            }
            self.drain().await;
            debug!("worker stopped");
        }
        .instrument(span)
        .await;
    }

    async fn serve(&mut self, item: WorkItem) {
        let WorkItem { stream, peer_addr, accepted_at } = item;
        trace!(%peer_addr, queue_wait = ?accepted_at.elapsed(), "picked up connection");

        let started = Instant::now();
        self.request.set_peer_addr(peer_addr);
        let (reader, writer) = stream.into_split();
        let connection = ScgiConnection::with_read_timeout(reader, writer, self.limits.read_timeout);

        let serving = AssertUnwindSafe(connection.process(&mut self.request, &mut self.response, &*self.processor));
        let outcome = select! {
            biased;
            outcome = serving.catch_unwind() => Some(outcome),
            () = grace_expired(&self.shutdown, self.limits.shutdown_grace) => None,
        };

        let Some(outcome) = outcome else {
            self.counters.failed();
            warn!(%peer_addr, grace = ?self.limits.shutdown_grace, "request still in progress after shutdown grace period, connection abandoned");
            self.request.reset();
            self.response.reset();
            return;
        };

        match outcome {
            Ok(Ok(())) => {
                self.counters.processed();
                debug!(
                    %peer_addr,
                    method = self.request.request_method().unwrap_or("-"),
                    uri = self.request.request_uri().unwrap_or("-"),
                    status = %self.response.get_status(),
                    elapsed = ?started.elapsed(),
                    "request served"
                );
            }
            Ok(Err(ScgiError::ProcessError { .. })) => {
                // already logged with the request context by the connection
                self.counters.failed();
            }
            Ok(Err(e)) if e.is_framing() => {
                self.counters.failed();
                warn!(%peer_addr, cause = %e, "malformed request, closing connection");
            }
            Ok(Err(e)) => {
                self.counters.failed();
                warn!(%peer_addr, cause = %e, "connection failed");
            }
            Err(payload) => {
                self.counters.failed();
                error!(
                    %peer_addr,
                    method = self.request.request_method().unwrap_or("-"),
                    uri = self.request.request_uri().unwrap_or("-"),
                    panic = panic_message(payload.as_ref()),
                    "fatal error while processing request, connection abandoned"
                );
            }
        }

        self.request.reset();
        self.response.reset();
    }

    /// Closes connections that were queued but will never be served.
    async fn drain(&mut self) {
        let mut queue = self.queue.lock().await;
        while let Ok(item) = queue.try_recv() {
            self.counters.dropped();
            info!(peer_addr = %item.peer_addr(), "closing queued connection on shutdown");
        }
    }
}

/// Waits for the next connection, `None` once shutdown is requested or the queue is closed.
async fn next_item(queue: &WorkQueue, shutdown: &CancellationToken) -> Option<WorkItem> {
    select! {
        biased;
        () = shutdown.cancelled() => None,
        item = async { queue.lock().await.recv().await } => item,
    }
}

/// Completes `grace` after shutdown is requested.
async fn grace_expired(shutdown: &CancellationToken, grace: Duration) {
    shutdown.cancelled().await;
    tokio::time::sleep(grace).await;
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
