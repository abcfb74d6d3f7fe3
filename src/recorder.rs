//! In-memory [`ResponseWriter`] for driving handlers without a network.

use axum::http::{HeaderMap, StatusCode};
use bytes::{Bytes, BytesMut};
use std::io;
use tracing::debug;

use crate::writer::ResponseWriter;

/// Records the response a handler writes.
///
/// Follows the protocol's own rules: the first status written sticks, later
/// [`write_header`](ResponseWriter::write_header) calls are ignored, and the
/// first body write without a status commits `200 OK`. Does not support
/// hijacking.
///
/// ```rust
/// use loghttp::{ResponseRecorder, ResponseWriter};
/// use axum::http::StatusCode;
///
/// let mut recorder = ResponseRecorder::new();
/// recorder.write(b"hello").unwrap();
/// assert_eq!(recorder.status(), Some(StatusCode::OK));
/// assert_eq!(recorder.body(), "hello");
/// ```
#[derive(Debug, Default, Clone)]
pub struct ResponseRecorder {
    headers: HeaderMap,
    status: Option<StatusCode>,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed status, `None` if the handler wrote nothing at all.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Bytes {
        self.body.clone().freeze()
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn write_header(&mut self, status: StatusCode) {
        match self.status {
            Some(committed) => {
                debug!(%committed, ignored = %status, "Superfluous write_header call");
            }
            None => self.status = Some(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_recorder() {
        let recorder = ResponseRecorder::new();
        assert_eq!(recorder.status(), None);
        assert!(recorder.body().is_empty());
        assert!(recorder.headers().is_empty());
    }

    #[test]
    fn test_first_status_sticks() {
        let mut recorder = ResponseRecorder::new();
        recorder.write_header(StatusCode::NOT_FOUND);
        recorder.write_header(StatusCode::OK);
        recorder.write(b"missing").unwrap();
        assert_eq!(recorder.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(recorder.body(), "missing");
    }

    #[test]
    fn test_write_commits_ok() {
        let mut recorder = ResponseRecorder::new();
        recorder.write(b"").unwrap();
        assert_eq!(recorder.status(), Some(StatusCode::OK));
        assert!(recorder.hijacker().is_none());
    }
}
