//! Access logging for synchronous handlers.
//!
//! This module provides the [`Handler`] trait for handlers that write their
//! response into a [`ResponseWriter`], and [`LoggingHandler`], which wraps such
//! a handler and logs one line per request.

use axum::http::Request;
use std::sync::Arc;

use crate::completion::Completion;
use crate::sink::{AccessLogger, TracingLogger};
use crate::types::RequestContext;
use crate::writer::{Observer, ResponseWriter};

/// A handler producing its response through a [`ResponseWriter`].
///
/// Implemented for every `Fn(&mut dyn ResponseWriter, &Request<B>)`.
pub trait Handler<B> {
    fn serve_http(&self, w: &mut dyn ResponseWriter, request: &Request<B>);
}

impl<B, F> Handler<B> for F
where
    F: Fn(&mut dyn ResponseWriter, &Request<B>),
{
    fn serve_http(&self, w: &mut dyn ResponseWriter, request: &Request<B>) {
        self(w, request)
    }
}

/// Wraps a [`Handler`] and logs the status, size and duration of every response.
///
/// The writer passed to the inner handler supports hijacking exactly when the
/// writer given to [`serve_http`](Handler::serve_http) does. The log line is
/// emitted when the inner handler returns and also when it panics.
///
/// # Examples
///
/// ```rust
/// use loghttp::{Handler, LoggingHandler, ResponseRecorder, ResponseWriter};
/// use axum::http::{Request, StatusCode};
///
/// let hello = |w: &mut dyn ResponseWriter, _req: &Request<()>| {
///     w.write(b"hello").unwrap();
/// };
/// let handler = LoggingHandler::new(hello);
///
/// let mut recorder = ResponseRecorder::new();
/// let request = Request::get("/foo").body(()).unwrap();
/// handler.serve_http(&mut recorder, &request);
/// assert_eq!(recorder.status(), Some(StatusCode::OK));
/// assert_eq!(recorder.body(), "hello");
/// ```
#[derive(Debug, Clone)]
pub struct LoggingHandler<H, L = TracingLogger> {
    handler: H,
    logger: Arc<L>,
}

impl<H> LoggingHandler<H> {
    /// Wraps `handler`, logging through [`TracingLogger`].
    pub fn new(handler: H) -> Self {
        Self::with_logger(handler, TracingLogger)
    }
}

impl<H, L: AccessLogger> LoggingHandler<H, L> {
    /// Wraps `handler`, handing every finished record to `logger`.
    pub fn with_logger(handler: H, logger: L) -> Self {
        Self {
            handler,
            logger: Arc::new(logger),
        }
    }

    pub fn inner(&self) -> &H {
        &self.handler
    }
}

impl<B, H, L> Handler<B> for LoggingHandler<H, L>
where
    H: Handler<B>,
    L: AccessLogger,
{
    fn serve_http(&self, w: &mut dyn ResponseWriter, request: &Request<B>) {
        let context = RequestContext::from_request(request);
        let observer = Observer::new(w);
        let mut completion = Completion::new(context, observer, self.logger.clone());
        self.handler
            .serve_http(completion.source_mut().writer(), request);
    }
}
