//! Built-in request interceptors that decorate outgoing headers.
//!
//! - [`AcceptLanguageInterceptor`] — adds an `Accept-Language` header.
//! - [`XsrfInterceptor`] — copies an anti-forgery token from a cookie into a
//!   request header.

use std::sync::Arc;

use percent_encoding::percent_decode_str;

use super::{BoxFuture, RequestFlow, RequestInterceptor};
use crate::client::FetchError;
use crate::http::Request;

/// Supplies the current cookie string (`name=value; other=value`), if any.
pub type CookieSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Adds `Accept-Language: <locale>` to every request that does not already
/// carry one.
///
/// # Examples
///
/// ```rust
/// use rttp_client::interceptor::AcceptLanguageInterceptor;
///
/// let interceptor = AcceptLanguageInterceptor::new("nl-NL");
/// ```
#[derive(Debug, Clone)]
pub struct AcceptLanguageInterceptor {
    locale: String,
}

impl AcceptLanguageInterceptor {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
        }
    }
}

impl Default for AcceptLanguageInterceptor {
    fn default() -> Self {
        Self::new("en")
    }
}

impl RequestInterceptor for AcceptLanguageInterceptor {
    fn intercept<'a>(
        &'a self,
        request: &'a mut Request,
    ) -> BoxFuture<'a, Result<RequestFlow, FetchError>> {
        if !request.headers().contains("accept-language") {
            request.headers_mut().set("Accept-Language", self.locale.as_str());
        }
        Box::pin(async { Ok(RequestFlow::Continue) })
    }
}

/// Copies the value of an XSRF cookie into a request header.
///
/// The cookie string is read from a [`CookieSource`] on every call, so token
/// rotation is picked up without rebuilding the client. When the cookie is
/// absent the request passes through untouched.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use rttp_client::interceptor::XsrfInterceptor;
///
/// let interceptor = XsrfInterceptor::new(
///     "XSRF-TOKEN",
///     "X-XSRF-TOKEN",
///     Arc::new(|| Some("XSRF-TOKEN=abc123".to_owned())),
/// );
/// ```
pub struct XsrfInterceptor {
    cookie_name: String,
    header_name: String,
    cookies: CookieSource,
}

impl XsrfInterceptor {
    pub fn new(
        cookie_name: impl Into<String>,
        header_name: impl Into<String>,
        cookies: CookieSource,
    ) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            header_name: header_name.into(),
            cookies,
        }
    }
}

impl RequestInterceptor for XsrfInterceptor {
    fn intercept<'a>(
        &'a self,
        request: &'a mut Request,
    ) -> BoxFuture<'a, Result<RequestFlow, FetchError>> {
        let token = (self.cookies)().and_then(|cookies| get_cookie(&self.cookie_name, &cookies));
        if let Some(token) = token {
            request.headers_mut().set(self.header_name.as_str(), token);
        }
        Box::pin(async { Ok(RequestFlow::Continue) })
    }
}

/// Looks up `name` in a `Cookie`-style string and returns its decoded value.
///
/// Pairs are separated by `;` with optional whitespace. Values are
/// percent-decoded; malformed escapes are kept verbatim.
///
/// ```
/// use rttp_client::interceptor::get_cookie;
///
/// assert_eq!(get_cookie("foo", "foo=bar; bar=foo;lorem=ipsum"), Some("bar".to_owned()));
/// assert_eq!(get_cookie("foo", "bar=foo;lorem=ipsum"), None);
/// ```
pub fn get_cookie(name: &str, cookies: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim_start().split_once('=')?;
        (key == name).then(|| percent_decode_str(value).decode_utf8_lossy().into_owned())
    })
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::http::Method;

    fn request() -> Request {
        Request::new(Method::Get, Url::parse("http://localhost/foo/").unwrap())
    }

    // ── get_cookie ────────────────────────────────────────────────────────────

    #[test]
    fn cookie_single() {
        assert_eq!(get_cookie("foo", "foo=bar"), Some("bar".to_owned()));
    }

    #[test]
    fn cookie_among_many() {
        assert_eq!(
            get_cookie("foo", "foo=bar; bar=foo;lorem=ipsum"),
            Some("bar".to_owned())
        );
        assert_eq!(get_cookie("lorem", "foo=bar; bar=foo;lorem=ipsum"), Some("ipsum".to_owned()));
    }

    #[test]
    fn cookie_missing() {
        assert_eq!(get_cookie("foo", "bar=foo;lorem=ipsum"), None);
        assert_eq!(get_cookie("foo", "XXSRF-foo=1"), None);
    }

    #[test]
    fn cookie_value_is_decoded() {
        assert_eq!(
            get_cookie("foo", "foo=%2Ffoo%2F%20bar%20%22"),
            Some("/foo/ bar \"".to_owned())
        );
        assert_eq!(get_cookie("foo", "foo=100%"), Some("100%".to_owned()));
        assert_eq!(get_cookie("foo", "foo=%zz%4"), Some("%zz%4".to_owned()));
        assert_eq!(get_cookie("foo", "foo=caf%C3%A9"), Some("café".to_owned()));
    }

    // ── Interceptors ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn accept_language_added() {
        let mut req = request();
        AcceptLanguageInterceptor::default()
            .intercept(&mut req)
            .await
            .unwrap();
        assert_eq!(req.headers().get("accept-language"), Some("en"));
    }

    #[tokio::test]
    async fn accept_language_kept_when_present() {
        let mut req = request();
        req.headers_mut().append("accept-language", "my-accept");
        AcceptLanguageInterceptor::new("en")
            .intercept(&mut req)
            .await
            .unwrap();
        assert_eq!(req.headers().get("accept-language"), Some("my-accept"));
    }

    #[tokio::test]
    async fn xsrf_header_from_cookie() {
        let interceptor = XsrfInterceptor::new(
            "XSRF-TOKEN",
            "X-XSRF-TOKEN",
            Arc::new(|| Some("XSRF-TOKEN=foo".to_owned())),
        );
        let mut req = request();
        interceptor.intercept(&mut req).await.unwrap();
        assert_eq!(req.headers().get("X-XSRF-TOKEN"), Some("foo"));
    }

    #[tokio::test]
    async fn xsrf_without_cookie_sets_nothing() {
        let interceptor = XsrfInterceptor::new(
            "XSRF-TOKEN",
            "X-XSRF-TOKEN",
            Arc::new(|| Some("XXSRF-TOKEN=foo".to_owned())),
        );
        let mut req = request();
        interceptor.intercept(&mut req).await.unwrap();
        assert_eq!(req.headers().get("X-XSRF-TOKEN"), None);
    }
}
