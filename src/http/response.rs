//! Responses and their replayable snapshots.
//!
//! A live [`Response`] owns a one-shot [`Body`]: once drained it is gone. The
//! cache therefore never stores a live response. It drains the body into a
//! [`ResponseSnapshot`] (status, headers, and an immutable byte buffer) and
//! hands the caller a response backed by that same buffer.

use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{Headers, StatusCode};

/// A response body that can be consumed exactly once.
///
/// Bodies are either already buffered (built in memory, or replayed from a
/// snapshot) or a stream read straight off the transport.
pub struct Body {
    inner: Inner,
}

enum Inner {
    Empty,
    Full(Bytes),
    Stream(Pin<Box<dyn AsyncRead + Send>>),
}

impl Body {
    pub fn empty() -> Self {
        Self {
            inner: Inner::Empty,
        }
    }

    /// Wraps a reader; the body ends when the reader reports EOF.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            inner: Inner::Stream(Box::pin(reader)),
        }
    }

    /// `true` when the whole body is already in memory.
    pub fn is_buffered(&self) -> bool {
        !matches!(self.inner, Inner::Stream(_))
    }

    /// Consumes the body, reading any remaining stream to the end.
    pub async fn read_all(self) -> io::Result<Bytes> {
        match self.inner {
            Inner::Empty => Ok(Bytes::new()),
            Inner::Full(bytes) => Ok(bytes),
            Inner::Stream(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Empty => f.write_str("Body::Empty"),
            Inner::Full(bytes) => write!(f, "Body::Full({} bytes)", bytes.len()),
            Inner::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self {
            inner: Inner::Full(bytes),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

/// An HTTP response as seen by interceptors and the caller.
///
/// # Examples
///
/// ```
/// use rttp_client::http::{Response, StatusCode};
///
/// # async fn example() -> std::io::Result<()> {
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// assert!(!response.is_from_cache());
/// assert_eq!(response.text().await?, r#"{"status":"ok"}"#);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    from_cache: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::empty(),
            from_cache: false,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Appends a header in place, for interceptors that decorate a response
    /// they received from further down the pipeline.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.append(name, value);
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// `true` when this response was replayed from the cache rather than
    /// received from the transport.
    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    /// Consumes the response and returns the full body.
    pub async fn bytes(self) -> io::Result<Bytes> {
        self.body.read_all().await
    }

    /// Consumes the response and returns the body as UTF-8 text.
    pub async fn text(self) -> io::Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Drains the body into a [`ResponseSnapshot`].
    ///
    /// The live body is replaced by a buffered copy of the same bytes, so the
    /// response can still be delivered to the caller afterwards.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the body stream fails mid-read.
    pub async fn snapshot(&mut self) -> io::Result<ResponseSnapshot> {
        let bytes = std::mem::take(&mut self.body).read_all().await?;
        self.body = Body::from(bytes.clone());
        Ok(ResponseSnapshot {
            status: self.status,
            headers: self.headers.clone(),
            body: bytes,
        })
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

/// An immutable, replayable copy of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl ResponseSnapshot {
    pub fn new(status: StatusCode, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Builds a fresh response from this snapshot, marked as served from cache.
    pub fn to_response(&self) -> Response {
        Response {
            status: self.status,
            headers: self.headers.clone(),
            body: Body::from(self.body.clone()),
            from_cache: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_keeps_live_body_readable() {
        let mut response = Response::new(StatusCode::PARTIAL_CONTENT)
            .header("X-Foo", "x-bar")
            .body(Body::from_reader(io::Cursor::new(b"streamed".to_vec())));

        let snapshot = response.snapshot().await.unwrap();
        assert_eq!(snapshot.body().as_ref(), b"streamed");
        assert_eq!(response.text().await.unwrap(), "streamed");
    }

    #[tokio::test]
    async fn snapshot_replay_preserves_status_and_headers() {
        let snapshot = ResponseSnapshot::new(
            StatusCode::PARTIAL_CONTENT,
            [("x-foo", "x-bar")].into_iter().collect(),
            "mock response",
        );

        let first = snapshot.to_response();
        let second = snapshot.to_response();
        assert!(first.is_from_cache());
        assert_eq!(first.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(first.headers().get("X-Foo"), Some("x-bar"));
        assert_eq!(first.text().await.unwrap(), "mock response");
        assert_eq!(second.text().await.unwrap(), "mock response");
    }

    #[test]
    fn body_buffering() {
        assert!(Body::from("abc").is_buffered());
        assert!(Body::empty().is_buffered());
        assert!(!Body::from_reader(io::Cursor::new(Vec::new())).is_buffered());
    }

    #[tokio::test]
    async fn text_rejects_invalid_utf8() {
        let response = Response::new(StatusCode::OK).body(vec![0xff, 0xfe]);
        let err = response.text().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
