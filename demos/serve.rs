//! Serves a directory over HTTP and logs every request.
//!
//! ```text
//! cargo run --example serve -- --port 8010 --root ./public
//! curl http://localhost:8010/
//! ```

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use loghttp::AccessLogLayer;
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    services::ServeDir,
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Upper bound for receiving a request body.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves a directory over HTTP and logs the requests.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Port number
    #[arg(long, default_value_t = 8010)]
    port: u16,

    /// Root directory; defaults to the current directory
    #[arg(long)]
    root: Option<PathBuf>,

    /// Write timeout in seconds; default 24h
    #[arg(long, default_value_t = 24 * 60 * 60)]
    timeout: u64,
}

/// Echoes text messages back; the upgrade shows up as HIJACKED in the log.
async fn echo_ws(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(echo_socket)
}

async fn echo_socket(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        if let Message::Text(_) | Message::Binary(_) = message {
            if socket.send(message).await.is_err() {
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    let app = Router::new()
        .route("/_ws", get(echo_ws))
        .fallback_service(ServeDir::new(&root))
        .layer(
            ServiceBuilder::new()
                .layer(AccessLogLayer::default())
                .layer(TimeoutLayer::new(Duration::from_secs(args.timeout)))
                .layer(RequestBodyTimeoutLayer::new(READ_TIMEOUT))
                .into_inner(),
        );

    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], args.port))).await?;
    info!("Serving {} on port {}", root.display(), args.port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
