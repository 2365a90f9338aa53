//! Serves `Hello <name>` on port 8090 until ctrl-c.
//!
//! Try it with any SCGI capable front-end, or with the bundled client:
//! `Client::new("127.0.0.1", 8090).get("/?name=scgi").execute()`.

use micro_scgi::chain::{Chain, Processor};
use micro_scgi::protocol::{BoxError, Request, Response};
use micro_scgi_server::middleware::{LoggingMiddleware, QueryStringMiddleware};
use micro_scgi_server::Listener;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

struct HelloWorld;

#[async_trait::async_trait]
impl Processor for HelloWorld {
    async fn process(&self, request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
        let name = request.parameter("name").and_then(|name| name.as_str()).unwrap_or("World").to_string();

        if request.path_info() == Some("/dump") {
            response.plain()?;
            response.write_str(&request.dump()).await?;
            return Ok(());
        }

        response.html()?;
        response.write_str(&format!("<h1>Hello {name}</h1>")).await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let chain = Chain::builder(HelloWorld).wrap(QueryStringMiddleware::new()).wrap(LoggingMiddleware::new()).build();

    let mut listener = match Listener::builder().port(8090).pool_size(4).chain(chain).build() {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, "invalid listener configuration");
            return;
        }
    };

    if let Err(e) = listener.start().await {
        error!(cause = %e, "failed to start");
        return;
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(cause = %e, "failed to listen for ctrl-c");
    }
    info!("shutting down");
    listener.shutdown().await;
}
