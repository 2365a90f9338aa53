use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::listener::stats::Counters;
use crate::listener::worker::WorkItem;

/// Accepts connections and hands them to the worker pool until `shutdown` is cancelled.
///
/// When the queue is full the loop stops accepting, so pending connections back up
/// into the kernel backlog instead of piling up in memory.
pub(crate) async fn accept_loop(
    tcp_listener: TcpListener,
    queue: Sender<WorkItem>,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
) {
    debug!("accept loop started");
    loop {
        let (stream, peer_addr) = select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = tcp_listener.accept() => match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
        };

        counters.accepted();
        let item = WorkItem::new(stream, peer_addr);

        let permit = select! {
            biased;
            () = shutdown.cancelled() => None,
            permit = queue.reserve() => permit.ok(),
        };

        let Some(permit) = permit else {
            counters.dropped();
            info!(peer_addr = %item.peer_addr(), "closing connection accepted during shutdown");
            break;
        };
        permit.send(item);
    }
    // dropping the listener closes the socket, dropping the sender lets workers see the queue close
    debug!("accept loop stopped");
}
