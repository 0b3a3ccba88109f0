//! Transports perform the actual network I/O for a [`Request`].
//!
//! [`HttpClient`](crate::client::HttpClient) only ever talks to the
//! [`Transport`] trait, so tests and embedders can swap in anything that turns
//! a request into a response. [`TcpTransport`] is the built-in HTTP/1.1
//! implementation; [`from_fn`] adapts an async closure.

use std::future::Future;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tracing::{debug, trace};
use url::Url;

use crate::http::{Body, Headers, Method, Request, Response, StatusCode};
use crate::interceptor::BoxFuture;

/// Errors produced while sending a request or reading its response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported URL scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },

    #[error("URL has no host")]
    MissingHost,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("connection closed before the response was complete")]
    Incomplete,

    #[error("response head exceeds maximum allowed size of {max_bytes} bytes")]
    HeadTooLarge { max_bytes: usize },

    #[error("response carries an invalid status code")]
    InvalidStatus,

    #[error("malformed chunked response body")]
    InvalidChunk,

    #[error("chunked response body exceeds maximum allowed size of {max_bytes} bytes")]
    BodyTooLarge { max_bytes: usize },

    #[error("header `{name}` contains a forbidden control character")]
    InvalidHeader { name: String },

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Sends one request and produces its response.
///
/// Non-2xx statuses are ordinary responses. Only failures to exchange bytes
/// with the peer are errors.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, TransportError>>;
}

/// Wraps an async closure as a [`Transport`]. The closure receives its own
/// copy of the request.
///
/// # Examples
///
/// ```rust
/// use rttp_client::http::{Response, StatusCode};
/// use rttp_client::transport::from_fn;
///
/// let transport = from_fn(|request| async move {
///     let body = format!("you asked for {}", request.url().path());
///     Ok(Response::new(StatusCode::OK).body(body))
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn Transport>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, TransportError>> + Send + 'static,
{
    Arc::new(FnTransport(f))
}

struct FnTransport<F>(F);

impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, TransportError>> + Send + 'static,
{
    fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, TransportError>> {
        Box::pin((self.0)(request.clone()))
    }
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Default cap on the status line plus headers (64 KiB).
const DEFAULT_MAX_HEAD_BYTES: usize = 64 * 1024;

/// Default cap on a chunked body, which is buffered before decoding (16 MiB).
const DEFAULT_MAX_CHUNKED_BYTES: usize = 16 * 1024 * 1024;

/// Maximum number of response headers we parse.
const MAX_HEADERS: usize = 64;

/// A minimal HTTP/1.1 transport over `tokio::net::TcpStream`.
///
/// One connection per request (`Connection: close`), plain `http://` only.
/// The response body is handed out as a stream when it is framed by
/// `Content-Length` or by connection close; chunked bodies are read in full
/// and decoded before the response is returned. A `Content-Length` body that
/// ends early fails the read with [`io::ErrorKind::UnexpectedEof`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rttp_client::client::HttpClient;
/// use rttp_client::transport::TcpTransport;
///
/// let client = HttpClient::new(Arc::new(TcpTransport::new()));
/// ```
#[derive(Debug, Clone)]
pub struct TcpTransport {
    max_head_bytes: usize,
    max_chunked_bytes: usize,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
            max_chunked_bytes: DEFAULT_MAX_CHUNKED_BYTES,
        }
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps how many bytes of status line and headers are buffered.
    #[must_use]
    pub fn max_head_bytes(mut self, max_head_bytes: usize) -> Self {
        self.max_head_bytes = max_head_bytes;
        self
    }

    /// Caps how many raw bytes of a chunked body are buffered.
    #[must_use]
    pub fn max_chunked_bytes(mut self, max_chunked_bytes: usize) -> Self {
        self.max_chunked_bytes = max_chunked_bytes;
        self
    }

    async fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        let url = request.target_url();
        if url.scheme() != "http" {
            return Err(TransportError::UnsupportedScheme {
                scheme: url.scheme().to_owned(),
            });
        }
        let host = url.host_str().ok_or(TransportError::MissingHost)?;
        let encoded = encode_request(request, &url)?;
        let addr = format!("{}:{}", host, url.port_or_known_default().unwrap_or(80));

        debug!(addr = %addr, method = %request.method(), "connecting");
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.clone(),
                source,
            })?;

        stream.write_all(&encoded).await?;
        stream.flush().await?;

        let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
        let head = loop {
            let bytes_read = stream.read_buf(&mut buf).await?;
            if let Some(head) = parse_head(&buf)? {
                break head;
            }
            if bytes_read == 0 {
                return Err(TransportError::Incomplete);
            }
            if buf.len() > self.max_head_bytes {
                return Err(TransportError::HeadTooLarge {
                    max_bytes: self.max_head_bytes,
                });
            }
        };
        trace!(status = %head.status, headers = head.headers.len(), "response head parsed");

        let prefix = buf.split_off(head.len).freeze();
        let body = if !has_body(request.method(), head.status) {
            Body::empty()
        } else if is_chunked(&head.headers) {
            let mut raw = BytesMut::from(&prefix[..]);
            loop {
                if raw.len() > self.max_chunked_bytes {
                    return Err(TransportError::BodyTooLarge {
                        max_bytes: self.max_chunked_bytes,
                    });
                }
                if stream.read_buf(&mut raw).await? == 0 {
                    break;
                }
            }
            Body::from(decode_chunked(&raw)?)
        } else if let Some(len) = content_length(&head.headers) {
            Body::from_reader(ExactLength::new(Cursor::new(prefix).chain(stream), len))
        } else {
            Body::from_reader(Cursor::new(prefix).chain(stream))
        };

        let mut response = Response::new(head.status).body(body);
        *response.headers_mut() = head.headers;
        Ok(response)
    }
}

impl Transport for TcpTransport {
    fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, TransportError>> {
        Box::pin(self.execute(request))
    }
}

/// Reads exactly `len` bytes; EOF before that is an error instead of a short
/// body.
struct ExactLength<R> {
    inner: tokio::io::Take<R>,
    remaining: u64,
}

impl<R: AsyncRead + Unpin> ExactLength<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner: inner.take(len),
            remaining: len,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ExactLength<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let before = buf.filled().len();
        ready!(Pin::new(&mut self.inner).poll_read(cx, buf))?;
        let read = buf.filled().len() - before;
        if read == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed with {} body bytes missing", self.remaining),
            )));
        }
        self.remaining -= read as u64;
        Poll::Ready(Ok(()))
    }
}

fn check_header(name: &str, value: &str) -> Result<(), TransportError> {
    let forbidden = |c: char| matches!(c, '\r' | '\n' | '\0');
    if name.contains(forbidden) || value.contains(forbidden) {
        return Err(TransportError::InvalidHeader {
            name: name.escape_debug().to_string(),
        });
    }
    Ok(())
}

/// Serializes the request line, headers, and body.
///
/// Header names and values carrying CR, LF, or NUL are rejected.
fn encode_request(request: &Request, url: &Url) -> Result<BytesMut, TransportError> {
    let body = request.body().cloned().unwrap_or_default();
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE + body.len());

    let target = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_owned(),
    };
    buf.extend_from_slice(format!("{} {} HTTP/1.1\r\n", request.method(), target).as_bytes());

    if !request.headers().contains("host") {
        let host = url.host_str().unwrap_or_default();
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };
        buf.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
    }

    for (name, value) in request.headers().iter() {
        if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection") {
            continue;
        }
        check_header(name, value)?;
        buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    if !body.is_empty() || !request.method().is_safe() {
        buf.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    buf.extend_from_slice(b"Connection: close\r\n\r\n");
    buf.extend_from_slice(&body);
    Ok(buf)
}

struct ResponseHead {
    status: StatusCode,
    headers: Headers,
    /// Byte length of the status line and headers, terminator included.
    len: usize,
}

/// Returns `None` while the head is still incomplete.
fn parse_head(buf: &[u8]) -> Result<Option<ResponseHead>, TransportError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut raw = httparse::Response::new(&mut headers);

    let len = match raw.parse(buf)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(None),
    };

    let status = raw
        .code
        .and_then(StatusCode::from_u16)
        .ok_or(TransportError::InvalidStatus)?;

    let mut header_map = Headers::with_capacity(raw.headers.len());
    for header in raw.headers.iter() {
        if let Ok(value) = std::str::from_utf8(header.value) {
            header_map.append(header.name, value);
        }
    }

    Ok(Some(ResponseHead {
        status,
        headers: header_map,
        len,
    }))
}

fn has_body(method: &Method, status: StatusCode) -> bool {
    !(*method == Method::Head
        || status.as_u16() < 200
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn is_chunked(headers: &Headers) -> bool {
    headers
        .get_all("transfer-encoding")
        .any(|value| value.to_ascii_lowercase().contains("chunked"))
}

fn content_length(headers: &Headers) -> Option<u64> {
    headers.get("content-length")?.trim().parse().ok()
}

/// Decodes a complete chunked body. Trailers are discarded.
fn decode_chunked(mut data: &[u8]) -> Result<Bytes, TransportError> {
    let mut body = BytesMut::new();
    loop {
        let (offset, size) = match httparse::parse_chunk_size(data) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) => return Err(TransportError::Incomplete),
            Err(_) => return Err(TransportError::InvalidChunk),
        };
        data = &data[offset..];
        if size == 0 {
            return Ok(body.freeze());
        }

        let size = usize::try_from(size).map_err(|_| TransportError::InvalidChunk)?;
        if data.len() < size + 2 {
            return Err(TransportError::Incomplete);
        }
        if &data[size..size + 2] != b"\r\n" {
            return Err(TransportError::InvalidChunk);
        }
        body.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}
