//! Response-writing interface and the observing decorators around it.
//!
//! A [`ResponseWriter`] is the target a synchronous [`Handler`](crate::Handler)
//! writes its response into. Writers that can hand the raw connection over to
//! the handler (for protocol upgrades such as WebSockets) advertise this through
//! [`ResponseWriter::hijacker`].
//!
//! The observers in this module forward every call unchanged while recording
//! the status code, the number of bytes accepted and whether the connection was
//! hijacked. Because callers discover hijack support by probing, there are two
//! observer shapes: [`ResponseObserver`] never advertises hijacking, while
//! [`HijackObserver`] does. [`Observer::new`] probes the wrapped writer and
//! picks the matching one, so the decorated writer never claims a capability
//! the real one lacks.

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use std::io::{self, Read, Write};
use tracing::debug;

use crate::types::Observed;

/// Target of a handler's response: headers, status and body bytes.
pub trait ResponseWriter {
    /// Response headers; changes after the status is written have no effect on the wire.
    fn headers(&mut self) -> &mut HeaderMap;

    /// Writes body bytes, returning how many were accepted.
    ///
    /// Writing without a prior [`write_header`](Self::write_header) commits `200 OK`.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Sends the response head with `status`.
    fn write_header(&mut self, status: StatusCode);

    /// Capability query for connection hijacking.
    ///
    /// Returns `None` unless the writer can hand over its raw connection.
    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        None
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers(&mut self) -> &mut HeaderMap {
        (**self).headers()
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn write_header(&mut self, status: StatusCode) {
        (**self).write_header(status)
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        (**self).hijacker()
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for Box<W> {
    fn headers(&mut self) -> &mut HeaderMap {
        (**self).headers()
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn write_header(&mut self, status: StatusCode) {
        (**self).write_header(status)
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        (**self).hijacker()
    }
}

/// Raw bidirectional transport handed out by a hijack.
pub trait RawConn: Read + Write + Send {}

impl<T: Read + Write + Send> RawConn for T {}

/// A connection taken over from the HTTP server.
pub struct Hijacked {
    /// The raw connection; the server no longer reads from or writes to it
    pub conn: Box<dyn RawConn>,
    /// Bytes the server had already read from the client but not consumed
    pub read_buf: Bytes,
}

impl std::fmt::Debug for Hijacked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hijacked")
            .field("read_buf", &self.read_buf)
            .finish_non_exhaustive()
    }
}

/// Error type for hijack operations
#[derive(Debug, thiserror::Error)]
pub enum HijackError {
    #[error("response writer does not support hijacking")]
    Unsupported,
    #[error("hijack failed: {0}")]
    Io(#[from] io::Error),
}

/// Writers that can hand over their underlying connection.
pub trait Hijacker {
    /// Takes over the connection. The HTTP server stops managing it afterwards.
    fn hijack(&mut self) -> Result<Hijacked, HijackError>;
}

/// Observing decorator for writers without hijack support.
///
/// Its [`hijacker`](ResponseWriter::hijacker) always returns `None`.
#[derive(Debug)]
pub struct ResponseObserver<W> {
    inner: W,
    observed: Observed,
}

impl<W: ResponseWriter> ResponseObserver<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            observed: Observed::default(),
        }
    }

    /// State recorded so far.
    pub fn observed(&self) -> Observed {
        self.observed
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for ResponseObserver<W> {
    fn headers(&mut self) -> &mut HeaderMap {
        self.inner.headers()
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.observed.record_implicit_ok();
        let n = self.inner.write(buf)?;
        self.observed.record_bytes(n);
        Ok(n)
    }

    fn write_header(&mut self, status: StatusCode) {
        self.inner.write_header(status);
        self.observed.record_status(status);
    }
}

/// Observing decorator for writers that support hijacking.
///
/// Advertises [`Hijacker`] and marks the observed state as hijacked before
/// delegating. Bytes written on the raw connection afterwards are not counted.
#[derive(Debug)]
pub struct HijackObserver<W> {
    observer: ResponseObserver<W>,
}

impl<W: ResponseWriter> HijackObserver<W> {
    pub fn new(inner: W) -> Self {
        Self {
            observer: ResponseObserver::new(inner),
        }
    }

    /// State recorded so far.
    pub fn observed(&self) -> Observed {
        self.observer.observed
    }

    pub fn into_inner(self) -> W {
        self.observer.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for HijackObserver<W> {
    fn headers(&mut self) -> &mut HeaderMap {
        self.observer.headers()
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.observer.write(buf)
    }

    fn write_header(&mut self, status: StatusCode) {
        self.observer.write_header(status)
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        Some(self)
    }
}

impl<W: ResponseWriter> Hijacker for HijackObserver<W> {
    fn hijack(&mut self) -> Result<Hijacked, HijackError> {
        self.observer.observed.record_hijack();
        debug!("Connection hijacked");
        self.observer
            .inner
            .hijacker()
            .ok_or(HijackError::Unsupported)?
            .hijack()
    }
}

/// An observer in the shape matching the capabilities of the writer it wraps.
#[derive(Debug)]
pub enum Observer<W> {
    /// Wrapped writer cannot hijack
    Plain(ResponseObserver<W>),
    /// Wrapped writer can hijack
    Hijackable(HijackObserver<W>),
}

impl<W: ResponseWriter> Observer<W> {
    /// Probes `inner` for hijack support and wraps it in the matching shape.
    pub fn new(mut inner: W) -> Self {
        if inner.hijacker().is_some() {
            debug!("Wrapped writer supports hijacking");
            Self::Hijackable(HijackObserver::new(inner))
        } else {
            Self::Plain(ResponseObserver::new(inner))
        }
    }

    /// The decorated writer to hand to the inner handler.
    pub fn writer(&mut self) -> &mut dyn ResponseWriter {
        match self {
            Self::Plain(observer) => observer,
            Self::Hijackable(observer) => observer,
        }
    }

    /// State recorded so far.
    pub fn observed(&self) -> Observed {
        match self {
            Self::Plain(observer) => observer.observed(),
            Self::Hijackable(observer) => observer.observed(),
        }
    }
}
