//! The completion step: emits the access record exactly once per request.

use std::sync::Arc;
use tracing::debug;

use crate::sink::AccessLogger;
use crate::types::{AccessRecord, Observed, RequestContext};
use crate::writer::{Observer, ResponseWriter};

/// Anything the completion step can read the observed response state from.
pub trait Observe {
    fn observed(&self) -> Observed;
}

impl Observe for Observed {
    fn observed(&self) -> Observed {
        *self
    }
}

impl<W: ResponseWriter> Observe for Observer<W> {
    fn observed(&self) -> Observed {
        Observer::observed(self)
    }
}

/// Guard that logs the request when dropped.
///
/// Created before the inner handler runs and dropped when the request is done,
/// whether the handler returned, unwound from a panic or was cancelled. The
/// record reflects whatever was observed up to that point.
pub struct Completion<S: Observe, L: AccessLogger> {
    context: RequestContext,
    source: S,
    logger: Arc<L>,
}

impl<S: Observe, L: AccessLogger> Completion<S, L> {
    pub fn new(context: RequestContext, source: S, logger: Arc<L>) -> Self {
        debug!(method = %context.method, uri = %context.uri, "Request started");
        Self {
            context,
            source,
            logger,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: Observe, L: AccessLogger> Drop for Completion<S, L> {
    fn drop(&mut self) {
        let record = AccessRecord::new(&self.context, self.source.observed());
        debug!(
            status = record.status,
            length = record.length,
            hijacked = record.hijacked,
            "Request completed"
        );
        self.logger.log(&record);
    }
}
