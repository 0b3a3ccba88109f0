//! Request identity — the canonical string a cache entry is stored under.
//!
//! The identity is method-independent: a `GET /posts` and a `POST /posts`
//! share one identity, which is what lets a mutating call purge the entry its
//! read counterpart created.

use std::sync::Arc;

use url::form_urlencoded;

use crate::http::{Params, Request};

/// Serializes query parameters into a query string without the leading `?`.
pub type ParamSerializer = fn(&Params) -> String;

/// A pluggable request identity function.
///
/// Receives the request and the serializer the default identity uses, so a
/// custom function can stay consistent with the built-in query encoding.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use rttp_client::http::Request;
/// use rttp_client::identity::{ParamSerializer, RequestIdFn};
///
/// let by_tenant: RequestIdFn = Arc::new(|request: &Request, serialize: ParamSerializer| {
///     let tenant = request.headers().get("x-tenant").unwrap_or("none");
///     format!("{}-{}?{}", request.url().path(), tenant, serialize(request.params()))
/// });
/// ```
pub type RequestIdFn = Arc<dyn Fn(&Request, ParamSerializer) -> String + Send + Sync>;

/// URL-encodes `params` in insertion order (`a=1&b=two+words`).
pub fn serialize_params(params: &Params) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

/// The default identity: the URL pathname followed by the serialized query.
///
/// Query pairs already present in the URL come first, then `params`. The `?`
/// suffix is omitted entirely when there is nothing to serialize, so
/// `/test` and `/test?` never diverge.
pub fn default_request_id(request: &Request, serializer: ParamSerializer) -> String {
    let url = request.url();
    let mut query: Params = url.query_pairs().collect();
    for (key, value) in request.params().iter() {
        query.insert(key, value);
    }

    let serialized = serializer(&query);
    if serialized.is_empty() {
        url.path().to_owned()
    } else {
        format!("{}?{}", url.path(), serialized)
    }
}

/// The default identity function, boxed for use in cache options.
pub fn default_request_id_fn() -> RequestIdFn {
    Arc::new(default_request_id)
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::http::{Method, RequestOptions};

    fn request(url: &str, options: RequestOptions) -> Request {
        Request::from_options(Url::parse(url).unwrap(), options)
    }

    #[test]
    fn pathname_only_without_params() {
        let req = request("http://localhost/test", RequestOptions::new());
        assert_eq!(default_request_id(&req, serialize_params), "/test");
    }

    #[test]
    fn params_are_serialized_in_order() {
        let req = request(
            "http://localhost/test",
            RequestOptions::new().param("q", "test").param("page", 1),
        );
        assert_eq!(default_request_id(&req, serialize_params), "/test?q=test&page=1");
    }

    #[test]
    fn different_params_differ() {
        let page1 = request(
            "http://localhost/test",
            RequestOptions::new().param("q", "test").param("page", 1),
        );
        let page2 = request(
            "http://localhost/test",
            RequestOptions::new().param("q", "test").param("page", 2),
        );
        assert_ne!(
            default_request_id(&page1, serialize_params),
            default_request_id(&page2, serialize_params)
        );
    }

    #[test]
    fn url_query_matches_equivalent_params() {
        let inline = request("http://localhost/items?foo=1&bar=2", RequestOptions::new());
        let explicit = request(
            "http://localhost/items",
            RequestOptions::new().param("foo", 1).param("bar", 2),
        );
        assert_eq!(
            default_request_id(&inline, serialize_params),
            default_request_id(&explicit, serialize_params)
        );
    }

    #[test]
    fn identity_ignores_method_and_host() {
        let get = request("http://a.example/posts", RequestOptions::new());
        let post = request(
            "https://b.example/posts",
            RequestOptions::new().method(Method::Post),
        );
        assert_eq!(
            default_request_id(&get, serialize_params),
            default_request_id(&post, serialize_params)
        );
    }

    #[test]
    fn empty_query_string_is_dropped() {
        let req = request("http://localhost/test?", RequestOptions::new());
        assert_eq!(default_request_id(&req, serialize_params), "/test");
    }
}
