//! # loghttp
//!
//! Access logging for HTTP handlers that never touches the response. Every
//! request produces exactly one line with the client address, status code,
//! response size, method, elapsed time and URI:
//!
//! ```text
//! 127.0.0.1:51234 - 200      5b GET  1.235ms /foo
//! 127.0.0.1:51240 - 404      0b GET  412.3µs /missing
//! 127.0.0.1:51241 - 101      0b HIJACKED 2.01ms /ws
//! ```
//!
//! ## Features
//!
//! - **Transparent**: response bytes, headers and status reach the client unchanged
//! - **Stream-aware**: bytes are counted as the body streams, no buffering
//! - **Upgrade-aware**: hijacked connections are logged with `HIJACKED` in place of the method
//! - **Always logs once**: the line is emitted on completion, error, panic or cancellation
//! - **Pluggable sink**: implement [`AccessLogger`] to send records elsewhere
//!
//! ## Quick Start
//!
//! Wrap an axum router with [`AccessLogLayer`]:
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use loghttp::AccessLogLayer;
//! use std::net::SocketAddr;
//!
//! async fn hello() -> &'static str {
//!     "hello"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     tracing_subscriber::fmt().init();
//!
//!     let app = Router::new()
//!         .route("/foo", get(hello))
//!         .layer(AccessLogLayer::default());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     // ConnectInfo provides the client address for the log line
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Synchronous handlers
//!
//! Handlers that write into a [`ResponseWriter`] are wrapped with
//! [`LoggingHandler`]. The writer handed to the inner handler supports
//! hijacking exactly when the real one does:
//!
//! ```rust
//! use axum::http::Request;
//! use loghttp::{Handler, LoggingHandler, ResponseRecorder, ResponseWriter};
//!
//! let handler = LoggingHandler::new(|w: &mut dyn ResponseWriter, _req: &Request<()>| {
//!     assert!(w.hijacker().is_none());
//!     w.write(b"hello").unwrap();
//! });
//!
//! let mut recorder = ResponseRecorder::new();
//! handler.serve_http(&mut recorder, &Request::get("/foo").body(()).unwrap());
//! ```
//!
//! ## Custom Loggers
//!
//! Implement the [`AccessLogger`] trait to route records somewhere else:
//!
//! ```rust
//! use loghttp::{AccessLogLayer, AccessLogger, AccessRecord};
//!
//! #[derive(Debug)]
//! struct SlowRequests;
//!
//! impl AccessLogger for SlowRequests {
//!     fn log(&self, record: &AccessRecord) {
//!         if record.duration.as_millis() > 1000 {
//!             eprintln!("SLOW: {record}");
//!         }
//!     }
//! }
//!
//! let layer = AccessLogLayer::new(SlowRequests);
//! ```

use axum::{extract::Request, http::StatusCode, response::Response};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, instrument};

pub mod types;
pub use types::{AccessRecord, Observed, RequestContext, HIJACKED};

pub mod duration;

pub mod writer;
pub use writer::{
    HijackError, HijackObserver, Hijacked, Hijacker, Observer, RawConn, ResponseObserver,
    ResponseWriter,
};

pub mod recorder;
pub use recorder::ResponseRecorder;

pub mod completion;
pub use completion::{Completion, Observe};

pub mod sink;
pub use sink::{AccessLogger, TracingLogger};

pub mod body_wrapper;
use body_wrapper::observe_body;

pub mod logging_handler;
pub use logging_handler::{Handler, LoggingHandler};

/// Tower layer for access logging.
///
/// This is the main entry point for axum applications. Every request passing
/// through the wrapped service produces one [`AccessRecord`] for the
/// configured [`AccessLogger`].
///
/// # Examples
///
/// ```rust,no_run
/// use loghttp::{AccessLogLayer, TracingLogger};
/// use axum::{routing::get, Router};
/// use tower::ServiceBuilder;
///
/// # async fn hello() -> &'static str { "Hello" }
/// # #[tokio::main]
/// # async fn main() {
/// let layer = AccessLogLayer::new(TracingLogger);
///
/// let app = Router::new()
///     .route("/hello", get(hello))
///     .layer(ServiceBuilder::new().layer(layer));
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
/// axum::serve(listener, app).await.unwrap();
/// # }
/// ```
pub struct AccessLogLayer<L = TracingLogger> {
    logger: Arc<L>,
}

impl<L: AccessLogger> AccessLogLayer<L> {
    /// Create a layer handing every finished record to `logger`.
    pub fn new(logger: L) -> Self {
        Self {
            logger: Arc::new(logger),
        }
    }
}

impl Default for AccessLogLayer<TracingLogger> {
    fn default() -> Self {
        Self::new(TracingLogger)
    }
}

impl<L> Clone for AccessLogLayer<L> {
    fn clone(&self) -> Self {
        Self {
            logger: self.logger.clone(),
        }
    }
}

impl<L> fmt::Debug for AccessLogLayer<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessLogLayer").finish_non_exhaustive()
    }
}

impl<S, L> Layer<S> for AccessLogLayer<L> {
    type Service = AccessLogService<S, L>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Tower service implementation for access logging.
///
/// Records the status of the response head, counts the body bytes as they
/// stream and treats `101 Switching Protocols` as a hijacked connection. The
/// record is emitted when the response body is finished or dropped, or when
/// the request fails or is cancelled before a response exists (status `0`).
///
/// Users typically don't interact with this type directly - it's created by [`AccessLogLayer`].
pub struct AccessLogService<S, L = TracingLogger> {
    inner: S,
    logger: Arc<L>,
}

impl<S: Clone, L> Clone for AccessLogService<S, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            logger: self.logger.clone(),
        }
    }
}

impl<S: fmt::Debug, L> fmt::Debug for AccessLogService<S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessLogService")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<S, L> Service<Request> for AccessLogService<S, L>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    L: AccessLogger,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, request: Request) -> Self::Future {
        let context = RequestContext::from_request(&request);
        // Dropped with the future if the inner service fails, panics or is cancelled
        let mut completion = Completion::new(context, Observed::default(), self.logger.clone());

        let future = self.inner.call(request);

        Box::pin(async move {
            let response = future.await?;
            debug!(status = %response.status(), "Inner service response received");

            let observed = completion.source_mut();
            observed.record_status(response.status());
            if response.status() == StatusCode::SWITCHING_PROTOCOLS {
                // The connection now belongs to the upgrade handler; only
                // bytes sent before the switch are counted.
                observed.record_hijack();
            }

            Ok(response.map(|body| observe_body(body, completion)))
        })
    }
}
