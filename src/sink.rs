//! Destinations for finished access records.
//!
//! This module provides the [`AccessLogger`] trait invoked once per request by
//! the completion step, and [`TracingLogger`], the default implementation that
//! emits the access line through the `tracing` crate.

use std::sync::Arc;
use tracing::info;

use crate::types::AccessRecord;

/// Receives the record of every finished request.
///
/// Called exactly once per request, from the completion step, on whichever
/// thread finished the request. Implementations must not panic: the call may
/// happen while the inner handler is already unwinding.
///
/// # Examples
///
/// ```rust
/// use loghttp::{AccessLogger, AccessRecord};
///
/// #[derive(Debug)]
/// struct StderrLogger;
///
/// impl AccessLogger for StderrLogger {
///     fn log(&self, record: &AccessRecord) {
///         eprintln!("{record}");
///     }
/// }
/// ```
pub trait AccessLogger: Send + Sync + 'static {
    /// Handle the record of a finished request.
    fn log(&self, record: &AccessRecord);
}

impl<L: AccessLogger + ?Sized> AccessLogger for Arc<L> {
    fn log(&self, record: &AccessRecord) {
        (**self).log(record)
    }
}

/// Emits one access line per request at `INFO` level under the `loghttp` target.
///
/// The line has the fixed layout
/// `{remote} - {status} {bytes}b {method} {duration} {uri}`, for example:
///
/// ```text
/// 127.0.0.1:51234 - 200   2048b GET  812.5µs /large
/// ```
///
/// # Examples
///
/// ```rust,no_run
/// use loghttp::{AccessLogLayer, TracingLogger};
///
/// let layer = AccessLogLayer::new(TracingLogger);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl AccessLogger for TracingLogger {
    fn log(&self, record: &AccessRecord) {
        info!(target: "loghttp", "{record}");
    }
}
