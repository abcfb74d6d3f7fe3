//! Body streaming with byte accounting.
//!
//! This module wraps a response body so every data frame is counted as it
//! flows to the client, while the frames themselves pass through untouched.
//! Size hints and end-of-stream are forwarded as-is, so the server keeps
//! choosing the same framing (`content-length` vs chunked) and trailers still
//! reach the client.

use axum::body::{Body, Bytes, HttpBody};
use http_body::{Frame, SizeHint};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tracing::debug;

use crate::completion::Completion;
use crate::sink::AccessLogger;
use crate::types::Observed;

/// Response body that counts the data frames it yields.
///
/// Owns the completion guard of its request, so the record is logged when the
/// body is dropped: once it has been fully sent, or earlier if the client goes
/// away and the server drops it.
pub struct ObservedBody<L: AccessLogger> {
    inner: Body,
    completion: Completion<Observed, L>,
}

impl<L: AccessLogger> ObservedBody<L> {
    pub fn new(inner: Body, completion: Completion<Observed, L>) -> Self {
        Self { inner, completion }
    }
}

impl<L: AccessLogger> HttpBody for ObservedBody<L> {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        match &frame {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.completion.source_mut().record_bytes(data.len());
                }
            }
            Some(Err(e)) => debug!(error = %e, "Response body error"),
            None => {}
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Wraps `body` so streamed data frames are added to the pending record.
///
/// The completion guard moves into the returned body and is dropped with it.
/// Either way the record is logged exactly once, with the bytes sent so far.
/// Errors and trailer frames are passed through unchanged and do not count.
///
/// # Examples
///
/// ```rust
/// use loghttp::body_wrapper::observe_body;
/// use loghttp::{Completion, Observed, RequestContext, TracingLogger};
/// use axum::body::{Body, HttpBody};
/// use axum::http::Request;
/// use std::sync::Arc;
///
/// let request = Request::get("/").body(()).unwrap();
/// let completion = Completion::new(
///     RequestContext::from_request(&request),
///     Observed::default(),
///     Arc::new(TracingLogger),
/// );
/// let body = observe_body(Body::from("Hello, World!"), completion);
/// assert_eq!(body.size_hint().exact(), Some(13));
/// ```
pub fn observe_body<L: AccessLogger>(body: Body, completion: Completion<Observed, L>) -> Body {
    Body::new(ObservedBody::new(body, completion))
}
