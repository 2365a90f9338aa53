//! The listener: one accept loop feeding a fixed pool of workers through a bounded queue.
//!
//! ```text
//!               +-------------+     bounded queue     +----------+
//!  TcpListener  | accept loop | ---> [ | | | | ] ---> | worker 0 |  Request / Response
//!               +-------------+                       | worker 1 |  reused per connection
//!                                                     |   ...    |
//!                                                     +----------+
//! ```
//!
//! A listener moves through [`ListenerState`]s in one direction only:
//! `Created -> Starting -> Running -> Stopping -> Stopped`. A failed bind sends it
//! back to `Created` so [`Listener::start`] may be retried.

mod accept;
mod stats;
mod worker;

pub use stats::ListenerStats;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use micro_scgi::chain::Processor;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ListenerConfig;
use crate::error::{ServerBuildError, ServerError};
use accept::accept_loop;
use stats::Counters;
use worker::{Limits, Worker};

/// Lifecycle of a [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct Tasks {
    accept: Option<JoinHandle<()>>,
    workers: JoinSet<()>,
}

/// A SCGI listener serving every accepted connection with one shared [`Processor`].
///
/// ```no_run
/// use micro_scgi::chain::make_processor;
/// use micro_scgi::protocol::{Request, Response, SendError};
/// use micro_scgi_server::Listener;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let hello = make_processor(|_req: &mut Request, resp: &mut Response| {
///         Box::pin(async move {
///             resp.plain()?;
///             resp.write_str("Hello World").await?;
///             Ok::<_, SendError>(())
///         })
///     });
///
///     let mut listener = Listener::builder().port(8090).pool_size(4).processor(hello).build()?;
///     listener.start().await?;
///     tokio::signal::ctrl_c().await?;
///     listener.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct Listener {
    config: ListenerConfig,
    processor: Arc<dyn Processor>,
    state: ListenerState,
    shutdown: CancellationToken,
    local_addr: Option<SocketAddr>,
    tasks: Tasks,
    counters: Arc<Counters>,
}

impl Listener {
    pub fn builder() -> ListenerBuilder {
        ListenerBuilder::new()
    }

    pub fn new(config: ListenerConfig, processor: Arc<dyn Processor>) -> Result<Self, ServerBuildError> {
        if config.pool_size == 0 {
            return Err(ServerBuildError::EmptyPool);
        }

        Ok(Self {
            config,
            processor,
            state: ListenerState::Created,
            shutdown: CancellationToken::new(),
            local_addr: None,
            tasks: Tasks::default(),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Binds the socket and spawns the accept loop and the workers.
    ///
    /// Returns the bound address, which differs from the configured one when port 0 was asked for.
    /// Must be called from within a tokio runtime.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.state != ListenerState::Created {
            return Err(ServerError::invalid_state(ListenerState::Created, self.state));
        }
        if self.shutdown.is_cancelled() {
            self.state = ListenerState::Stopped;
            return Err(ServerError::Cancelled);
        }
        self.state = ListenerState::Starting;

        let address = self.config.socket_addr();
        let tcp_listener = match bind(address).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(%address, cause = %e, "bind listener error");
                self.state = ListenerState::Created;
                return Err(e);
            }
        };
        let local_addr = tcp_listener.local_addr().unwrap_or(address);

        let limits = Limits { read_timeout: self.config.read_timeout(), shutdown_grace: self.config.shutdown_grace() };
        let (sender, receiver) = mpsc::channel(self.config.queue_capacity());
        let queue = Arc::new(Mutex::new(receiver));

        for id in 0..self.config.pool_size {
            let worker = Worker::new(
                id,
                Arc::clone(&queue),
                Arc::clone(&self.processor),
                self.shutdown.clone(),
                Arc::clone(&self.counters),
                limits,
            );
            self.tasks.workers.spawn(worker.run());
        }

        self.tasks.accept =
            Some(tokio::spawn(accept_loop(tcp_listener, sender, self.shutdown.clone(), Arc::clone(&self.counters))));

        self.local_addr = Some(local_addr);
        self.state = ListenerState::Running;
        info!(%local_addr, pool_size = self.config.pool_size, queue_capacity = self.config.queue_capacity(), "listener started");
        Ok(local_addr)
    }

    /// Requests shutdown without waiting for it. Calling it more than once is harmless.
    ///
    /// A listener that was never started is left untouched and can still be started.
    pub fn stop(&mut self) {
        match self.state {
            ListenerState::Created => {}
            ListenerState::Starting | ListenerState::Running => {
                info!("listener stopping");
                self.state = ListenerState::Stopping;
                self.shutdown.cancel();
            }
            ListenerState::Stopping | ListenerState::Stopped => self.shutdown.cancel(),
        }
    }

    /// A token that stops this listener when cancelled, usable from other tasks.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Waits until the accept loop and every worker have exited.
    ///
    /// While the listener is running this waits for [`stop`](Self::stop) or for the
    /// [`shutdown_token`](Self::shutdown_token) to be cancelled. Requests in progress
    /// are allowed to complete.
    pub async fn await_shutdown(&mut self) {
        match self.state {
            ListenerState::Created | ListenerState::Stopped => return,
            ListenerState::Starting | ListenerState::Running => {
                self.shutdown.cancelled().await;
                self.state = ListenerState::Stopping;
            }
            ListenerState::Stopping => {}
        }

        if let Some(accept) = self.tasks.accept.take()
            && let Err(e) = accept.await
        {
            error!(cause = %e, "accept loop ended abnormally");
        }

        while let Some(joined) = self.tasks.workers.join_next().await {
            if let Err(e) = joined {
                error!(cause = %e, "worker ended abnormally");
            }
        }

        self.state = ListenerState::Stopped;
        info!(stats = ?self.counters.snapshot(), "listener stopped");
    }

    /// [`stop`](Self::stop) followed by [`await_shutdown`](Self::await_shutdown).
    pub async fn shutdown(&mut self) {
        self.stop();
        self.await_shutdown().await;
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn stats(&self) -> ListenerStats {
        self.counters.snapshot()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("local_addr", &self.local_addr)
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn bind(address: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(address).await.map_err(|e| ServerError::bind(address, e))
}

/// Builder for [`Listener`], starting from [`ListenerConfig::default`].
pub struct ListenerBuilder {
    config: ListenerConfig,
    processor: Option<Arc<dyn Processor>>,
}

impl ListenerBuilder {
    fn new() -> Self {
        Self { config: ListenerConfig::default(), processor: None }
    }

    pub fn config(mut self, config: ListenerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn address(mut self, address: IpAddr) -> Self {
        self.config.address = address;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.config.pool_size = pool_size;
        self
    }

    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.config.queue_capacity = Some(queue_capacity);
        self
    }

    /// How long a connection may stay silent while its envelope or body is read.
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.config.read_timeout_ms = u64::try_from(read_timeout.as_millis()).unwrap_or(u64::MAX).max(1);
        self
    }

    /// How long requests in progress may keep running once shutdown is requested.
    pub fn shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.config.shutdown_grace_ms = u64::try_from(shutdown_grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    /// Uses an already shared processor, such as the one [`Chain::builder`](micro_scgi::chain::Chain::builder) builds.
    pub fn chain(mut self, chain: Arc<dyn Processor>) -> Self {
        self.processor = Some(chain);
        self
    }

    pub fn build(self) -> Result<Listener, ServerBuildError> {
        let processor = self.processor.ok_or(ServerBuildError::MissingProcessor)?;
        Listener::new(self.config, processor)
    }
}

impl fmt::Debug for ListenerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBuilder")
            .field("config", &self.config)
            .field("processor", &self.processor.is_some())
            .finish()
    }
}
