//! Data types for observed HTTP requests and responses.
//!
//! This module contains the per-request context captured when a request enters
//! the middleware, the state collected while the response is written, and the
//! finished record handed to an [`AccessLogger`](crate::AccessLogger).

use axum::extract::ConnectInfo;
use axum::http::{Method, Request, StatusCode, Uri};
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::duration::{format_duration, round_duration};

/// Method label logged in place of the request method once the connection was hijacked.
pub const HIJACKED: &str = "HIJACKED";

/// Placeholder logged when the remote address of a request is unknown.
pub const UNKNOWN_REMOTE: &str = "-";

/// Request attributes captured when a request enters the middleware.
///
/// Read-only once created; dropped after the log line is emitted.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Client address (`ip:port`), or `-` when the server did not provide one
    pub remote_addr: String,
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request URI as received
    pub uri: Uri,
    /// When the request was received by the middleware
    pub received: Instant,
}

impl RequestContext {
    /// Captures the context of `request`, starting the clock now.
    ///
    /// The remote address is read from the [`ConnectInfo<SocketAddr>`] extension that
    /// `axum::serve` inserts when the app is served with
    /// `into_make_service_with_connect_info::<SocketAddr>()`.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_else(|| UNKNOWN_REMOTE.to_owned());

        Self {
            remote_addr,
            method: request.method().clone(),
            uri: request.uri().clone(),
            received: Instant::now(),
        }
    }
}

/// Metadata collected while a response is written.
///
/// Starts zero-valued for every request. The status stays `None` until it is
/// set explicitly or implied by the first body write.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Observed {
    /// Recorded status code, `None` while not yet set
    pub status: Option<StatusCode>,
    /// Bytes accepted by the wrapped writer
    pub length: u64,
    /// Whether the connection was taken over by the handler
    pub hijacked: bool,
}

impl Observed {
    /// Status code as logged; `0` when none was recorded.
    pub fn status_code(&self) -> u16 {
        self.status.map_or(0, |s| s.as_u16())
    }

    pub(crate) fn record_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Records the implicit 200 a body write commits when no status was set.
    pub(crate) fn record_implicit_ok(&mut self) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
    }

    pub(crate) fn record_bytes(&mut self, n: usize) {
        self.length += n as u64;
    }

    pub(crate) fn record_hijack(&mut self) {
        self.hijacked = true;
    }
}

/// One finished access-log record, produced exactly once per request.
///
/// Its [`Display`](fmt::Display) implementation renders the access line:
///
/// ```text
/// 127.0.0.1:51234 - 200      5b GET  1.235ms /foo
/// ```
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub remote_addr: String,
    pub method: Method,
    pub uri: Uri,
    /// Status code, `0` when the response never got that far
    pub status: u16,
    pub length: u64,
    pub hijacked: bool,
    /// Elapsed time, already rounded to four significant digits
    pub duration: Duration,
}

impl AccessRecord {
    /// Builds the record for `context` from the state observed so far, measuring
    /// the elapsed time now.
    pub fn new(context: &RequestContext, observed: Observed) -> Self {
        Self {
            remote_addr: context.remote_addr.clone(),
            method: context.method.clone(),
            uri: context.uri.clone(),
            status: observed.status_code(),
            length: observed.length,
            hijacked: observed.hijacked,
            duration: round_duration(context.received.elapsed()),
        }
    }

    /// The request method, or `HIJACKED` if the connection was taken over.
    pub fn method_label(&self) -> &str {
        if self.hijacked {
            HIJACKED
        } else {
            self.method.as_str()
        }
    }
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let duration = format_duration(self.duration);
        write!(
            f,
            "{} - {:>3} {:>6}b {:<4} {:>6} {}",
            self.remote_addr,
            self.status,
            self.length,
            self.method_label(),
            duration,
            self.uri
        )
    }
}
