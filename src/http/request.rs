//! Outgoing request descriptor and per-call options.
//!
//! A [`Request`] is built by the client from a resolved URL plus
//! [`RequestOptions`], then handed to every request interceptor by `&mut`
//! so interceptors can decorate it in place before the transport sees it.

use bytes::Bytes;
use serde::Serialize;
use url::Url;

use super::{Headers, Method};
use crate::cache::CacheOptionsOverride;

/// Ordered query parameters.
///
/// Insertion order is preserved, so two parameter sets built in the same order
/// always serialize to the same query string.
///
/// # Examples
///
/// ```
/// use rttp_client::http::Params;
///
/// let params: Params = [("q", "test"), ("page", "1")].into_iter().collect();
/// assert_eq!(params.len(), 2);
/// assert_eq!(params.get("page"), Some("1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter. Values are stringified with [`ToString`].
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.pairs.push((key.into(), value.to_string()));
    }

    /// Returns the first value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Per-call options accepted by `HttpClient::fetch`.
///
/// Every field is optional; the method defaults to `GET`.
///
/// # Examples
///
/// ```
/// use rttp_client::http::{Method, RequestOptions};
///
/// let options = RequestOptions::new()
///     .method(Method::Post)
///     .header("X-Request-Id", "abc-123")
///     .param("page", 2)
///     .body("payload");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) method: Option<Method>,
    pub(crate) headers: Headers,
    pub(crate) params: Params,
    pub(crate) body: Option<Bytes>,
    pub(crate) cache_options: Option<CacheOptionsOverride>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Appends a request header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Appends a query parameter, serialized into the URL at dispatch time.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Replaces all query parameters.
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body and sets `Content-Type: application/json`.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        self.headers.set("Content-Type", "application/json");
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    /// Overrides the client's cache options for this call only.
    #[must_use]
    pub fn cache_options(mut self, overrides: CacheOptionsOverride) -> Self {
        self.cache_options = Some(overrides);
        self
    }
}

/// A request on its way through the interceptor pipeline.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    params: Params,
    body: Option<Bytes>,
    cache_options: Option<CacheOptionsOverride>,
}

impl Request {
    /// Creates a bodiless request with no headers or parameters.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            params: Params::new(),
            body: None,
            cache_options: None,
        }
    }

    /// Builds a request from an already-resolved URL and the caller's options.
    pub fn from_options(url: Url, options: RequestOptions) -> Self {
        Self {
            method: options.method.unwrap_or_default(),
            url,
            headers: options.headers,
            params: options.params,
            body: options.body,
            cache_options: options.cache_options,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The URL as given by the caller, without `params` applied.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn cache_options(&self) -> Option<&CacheOptionsOverride> {
        self.cache_options.as_ref()
    }

    /// The URL the transport should hit: [`url`](Self::url) with `params`
    /// appended to any query it already carries.
    pub fn target_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(self.params.iter());
        }
        url
    }
}
