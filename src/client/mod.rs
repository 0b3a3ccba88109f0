//! The HTTP client: interceptor chains in front of a transport.
//!
//! ```text
//! fetch(url, options)
//!   └─ Request ──► request chain ──┬─► transport ──┐
//!                                  └─ short-circuit┴─► response chain ──► Response
//! ```
//!
//! Build one with [`HttpClient::builder`], which wires the built-in header
//! interceptors and, optionally, the response cache.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};
use url::Url;

use crate::cache::{CacheConfigError, CacheOptions, CacheStore, SessionFn, create_cache_interceptors};
use crate::http::{Headers, Request, RequestOptions, Response, StatusCode};
use crate::interceptor::{
    AcceptLanguageInterceptor, CookieSource, Interceptors, RequestInterceptor, ResponseInterceptor,
    XsrfInterceptor,
};
use crate::transport::{TcpTransport, Transport, TransportError};

/// Everything that can fail a [`HttpClient::fetch`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Config(#[from] CacheConfigError),

    #[error("Invalid cache identifier")]
    InvalidCacheIdentifier,

    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to read response body: {0}")]
    Body(#[from] io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Interceptor(Box<dyn StdError + Send + Sync>),
}

impl FetchError {
    /// Wraps an arbitrary error raised by a custom interceptor.
    pub fn interceptor(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        FetchError::Interceptor(err.into())
    }
}

/// Client settings, deserializable from camelCase data.
///
/// ```
/// use rttp_client::client::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{ "locale": "nl-NL" }"#).unwrap();
/// assert_eq!(config.locale, "nl-NL");
/// assert!(config.add_accept_language);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Relative request URLs are resolved against this.
    pub base_url: String,
    pub add_accept_language: bool,
    pub locale: String,
    pub xsrf_cookie_name: String,
    pub xsrf_header_name: String,
    /// Anti-XSSI prefix stripped from JSON bodies before parsing.
    pub json_prefix: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/".to_owned(),
            add_accept_language: true,
            locale: "en".to_owned(),
            xsrf_cookie_name: "XSRF-TOKEN".to_owned(),
            xsrf_header_name: "X-XSRF-TOKEN".to_owned(),
            json_prefix: None,
        }
    }
}

/// A decoded JSON response.
#[derive(Debug, Clone)]
pub struct JsonResponse<T> {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: T,
}

/// An HTTP client with ordered request and response interceptors.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use rttp_client::cache::CacheOptions;
/// use rttp_client::client::HttpClient;
/// use rttp_client::http::RequestOptions;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = HttpClient::builder()
///         .cache(
///             Arc::new(|| Some("session-1".to_owned())),
///             CacheOptions::new().use_cache(true).max_age(Duration::from_secs(30)),
///         )
///         .build()?;
///
///     let response = client.fetch("/posts", RequestOptions::new().param("page", 1)).await?;
///     println!("{} (cached: {})", response.status(), response.is_from_cache());
///     Ok(())
/// }
/// ```
pub struct HttpClient {
    interceptors: Interceptors,
    transport: Arc<dyn Transport>,
    base_url: Option<Url>,
    json_prefix: Option<String>,
    cache_store: Option<Arc<CacheStore>>,
}

impl HttpClient {
    /// A bare client: no interceptors and no base URL, so every URL passed
    /// to [`fetch`](Self::fetch) must be absolute.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            interceptors: Interceptors::new(),
            transport,
            base_url: None,
            json_prefix: None,
            cache_store: None,
        }
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }

    /// Both chains are plain vectors and may be edited freely between calls.
    pub fn interceptors_mut(&mut self) -> &mut Interceptors {
        &mut self.interceptors
    }

    pub fn add_request_interceptor(&mut self, interceptor: Arc<dyn RequestInterceptor>) {
        self.interceptors.request.push(interceptor);
    }

    pub fn add_response_interceptor(&mut self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.interceptors.response.push(interceptor);
    }

    /// The store behind the cache interceptors, if the builder installed them.
    pub fn cache_store(&self) -> Option<&Arc<CacheStore>> {
        self.cache_store.as_ref()
    }

    /// Resolves `url` against the base URL, if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if the result is not a valid URL.
    pub fn resolve_url(&self, url: &str) -> Result<Url, FetchError> {
        let resolved = match &self.base_url {
            Some(base) => base.join(url),
            None => Url::parse(url),
        };
        resolved.map_err(|source| FetchError::InvalidUrl {
            url: url.to_owned(),
            source,
        })
    }

    /// Performs one call through both interceptor chains.
    ///
    /// A non-2xx status is an ordinary response, not an error.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] — `url` cannot be resolved.
    /// - [`FetchError::Transport`] — the transport failed; response
    ///   interceptors do not run.
    /// - Any error an interceptor returns, including
    ///   [`FetchError::Config`] and [`FetchError::InvalidCacheIdentifier`]
    ///   from the cache.
    pub async fn fetch(&self, url: &str, options: RequestOptions) -> Result<Response, FetchError> {
        let start = Instant::now();
        let mut request = Request::from_options(self.resolve_url(url)?, options);

        let response = match self.interceptors.run_request(&mut request).await? {
            Some(response) => response,
            None => self.transport.send(&request).await.inspect_err(|e| {
                warn!(method = %request.method(), url = %request.url(), error = %e, "transport failed");
            })?,
        };
        let response = self.interceptors.run_response(&request, response).await?;

        info!(
            method = %request.method(),
            url = %request.url(),
            status = response.status().as_u16(),
            elapsed = ?start.elapsed(),
            cached = response.is_from_cache(),
            "fetch completed"
        );
        Ok(response)
    }

    /// Like [`fetch`](Self::fetch), then decodes the body as JSON.
    ///
    /// Sends `Accept: application/json` unless the caller set an `Accept`
    /// header, and strips the configured JSON prefix before parsing.
    ///
    /// # Errors
    ///
    /// Everything [`fetch`](Self::fetch) returns, plus [`FetchError::Body`]
    /// and [`FetchError::Json`].
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        mut options: RequestOptions,
    ) -> Result<JsonResponse<T>, FetchError> {
        if !options.headers.contains("accept") {
            options = options.header("Accept", "application/json");
        }

        let response = self.fetch(url, options).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;

        let raw = match self.json_prefix.as_deref() {
            Some(prefix) => bytes.strip_prefix(prefix.as_bytes()).unwrap_or(&bytes[..]),
            None => &bytes[..],
        };
        Ok(JsonResponse {
            status,
            headers,
            body: serde_json::from_slice(raw)?,
        })
    }
}

/// Assembles an [`HttpClient`].
///
/// Request interceptors are installed in this order: accept-language (when
/// enabled), XSRF (when a cookie source is set), cache. The cache response
/// interceptor is the only response interceptor.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    cookies: Option<CookieSource>,
    cache: Option<(SessionFn, CacheOptions)>,
    cache_store: Option<Arc<CacheStore>>,
}

impl ClientBuilder {
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`TcpTransport`].
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Enables the XSRF interceptor, reading cookies from `cookies`.
    #[must_use]
    pub fn cookie_source(mut self, cookies: CookieSource) -> Self {
        self.cookies = Some(cookies);
        self
    }

    /// Enables the response cache.
    #[must_use]
    pub fn cache(mut self, session: SessionFn, options: CacheOptions) -> Self {
        self.cache = Some((session, options));
        self
    }

    /// Shares an existing store instead of creating a fresh one.
    #[must_use]
    pub fn cache_store(mut self, store: Arc<CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] — the configured base URL does not parse.
    /// - [`FetchError::Config`] — the cache options fail validation.
    pub fn build(self) -> Result<HttpClient, FetchError> {
        let base_url = Url::parse(&self.config.base_url).map_err(|source| FetchError::InvalidUrl {
            url: self.config.base_url.clone(),
            source,
        })?;

        let mut interceptors = Interceptors::new();
        if self.config.add_accept_language {
            interceptors
                .request
                .push(Arc::new(AcceptLanguageInterceptor::new(self.config.locale)));
        }
        if let Some(cookies) = self.cookies {
            interceptors.request.push(Arc::new(XsrfInterceptor::new(
                self.config.xsrf_cookie_name,
                self.config.xsrf_header_name,
                cookies,
            )));
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(TcpTransport::new()),
        };

        let mut cache_store = None;
        if let Some((session, options)) = self.cache {
            let store = self.cache_store.unwrap_or_default();
            create_cache_interceptors(session, options, Arc::clone(&store))?.install(&mut interceptors);
            cache_store = Some(store);
        }

        Ok(HttpClient {
            interceptors,
            transport,
            base_url: Some(base_url),
            json_prefix: self.config.json_prefix,
            cache_store,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Serialize;

    use super::*;
    use crate::http::Method;
    use crate::interceptor::{RequestFlow, request_fn, response_fn};
    use crate::transport::from_fn;

    /// Echoes the method, target URL, and every header back as the body.
    fn echo_transport(calls: Arc<AtomicUsize>) -> Arc<dyn Transport> {
        from_fn(move |request: Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let mut lines = vec![format!("{} {}", request.method(), request.target_url())];
                for (name, value) in request.headers().iter() {
                    lines.push(format!("{}: {}", name.to_ascii_lowercase(), value));
                }
                Ok(Response::new(StatusCode::OK).body(lines.join("\n")))
            }
        })
    }

    fn client(calls: &Arc<AtomicUsize>) -> HttpClient {
        HttpClient::builder()
            .transport(echo_transport(Arc::clone(calls)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn resolves_relative_urls_and_params() {
        let calls = Arc::new(AtomicUsize::new(0));
        let body = client(&calls)
            .fetch("/posts?a=1", RequestOptions::new().param("b", 2))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.starts_with("GET http://localhost/posts?a=1&b=2"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bare_client_requires_absolute_urls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bare = HttpClient::new(echo_transport(Arc::clone(&calls)));
        let err = bare.fetch("/relative", RequestOptions::new()).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn builder_installs_header_interceptors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = ClientConfig {
            locale: "nl-NL".to_owned(),
            ..ClientConfig::default()
        };
        let client = HttpClient::builder()
            .config(config)
            .transport(echo_transport(calls))
            .cookie_source(Arc::new(|| Some("XSRF-TOKEN=abc%20def".to_owned())))
            .build()
            .unwrap();

        let body = client.fetch("/", RequestOptions::new()).await.unwrap().text().await.unwrap();
        assert!(body.contains("accept-language: nl-NL"));
        assert!(body.contains("x-xsrf-token: abc def"));
    }

    #[tokio::test]
    async fn accept_language_can_be_disabled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config: ClientConfig = serde_json::from_str(r#"{ "addAcceptLanguage": false }"#).unwrap();
        let client = HttpClient::builder()
            .config(config)
            .transport(echo_transport(calls))
            .build()
            .unwrap();

        let body = client.fetch("/", RequestOptions::new()).await.unwrap().text().await.unwrap();
        assert!(!body.contains("accept-language"));
    }

    #[tokio::test]
    async fn short_circuit_skips_transport_but_not_response_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut client = client(&calls);
        client.add_request_interceptor(request_fn(|_| {
            Ok(RequestFlow::Respond(Response::new(StatusCode::ACCEPTED)))
        }));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        client.add_response_interceptor(response_fn(move |_, res| {
            log.lock().unwrap().push(res.status());
            Ok(res)
        }));

        let res = client.fetch("/", RequestOptions::new()).await.unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*seen.lock().unwrap(), vec![StatusCode::ACCEPTED]);
    }

    #[tokio::test]
    async fn transport_error_skips_response_chain() {
        let mut client = HttpClient::builder()
            .transport(from_fn(|_| async {
                Err(TransportError::Incomplete)
            }))
            .build()
            .unwrap();
        client.add_response_interceptor(response_fn(|_, _| {
            panic!("response chain must not run on transport failure");
        }));

        let err = client.fetch("/", RequestOptions::new()).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(TransportError::Incomplete)));
    }

    #[tokio::test]
    async fn interceptor_errors_surface() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut client = client(&calls);
        client.add_request_interceptor(request_fn(|_| Err(FetchError::interceptor("denied"))));

        let err = client.fetch("/", RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "denied");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetch_json_strips_prefix_and_sets_accept() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Post {
            id: u32,
            title: String,
        }

        let seen_accept = Arc::new(Mutex::new(None));
        let accept = Arc::clone(&seen_accept);
        let transport = from_fn(move |request: Request| {
            *accept.lock().unwrap() = request.headers().get("accept").map(str::to_owned);
            async { Ok(Response::new(StatusCode::OK).body(")]}',\n{\"id\":1,\"title\":\"hi\"}")) }
        });
        let config = ClientConfig {
            json_prefix: Some(")]}',\n".to_owned()),
            ..ClientConfig::default()
        };
        let client = HttpClient::builder()
            .config(config)
            .transport(transport)
            .build()
            .unwrap();

        let post: JsonResponse<Post> = client.fetch_json("/posts/1", RequestOptions::new()).await.unwrap();
        assert_eq!(post.status, StatusCode::OK);
        assert_eq!(post.body, Post { id: 1, title: "hi".to_owned() });
        assert_eq!(seen_accept.lock().unwrap().as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn json_request_body() {
        let transport = from_fn(|request: Request| async move {
            let kind = request.headers().get("content-type").unwrap_or_default().to_owned();
            let body = request.body().cloned().unwrap_or_default();
            Ok(Response::new(StatusCode::CREATED).header("X-Kind", kind).body(body))
        });
        let client = HttpClient::builder().transport(transport).build().unwrap();

        let options = RequestOptions::new()
            .method(Method::Post)
            .json(&serde_json::json!({ "title": "hi" }))
            .unwrap();
        let res = client.fetch("/posts", options).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers().get("x-kind"), Some("application/json"));
        assert_eq!(res.text().await.unwrap(), r#"{"title":"hi"}"#);
    }

    #[test]
    fn invalid_cache_options_fail_the_build() {
        let err = HttpClient::builder()
            .cache(
                Arc::new(|| Some("1".to_owned())),
                CacheOptions::new().methods([Method::Get, Method::Put]),
            )
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, FetchError::Config(CacheConfigError::UnsupportedMethod { .. })));
    }

    #[test]
    fn invalid_base_url_fails_the_build() {
        let config = ClientConfig {
            base_url: "not a url".to_owned(),
            ..ClientConfig::default()
        };
        let err = HttpClient::builder().config(config).build().err().unwrap();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
