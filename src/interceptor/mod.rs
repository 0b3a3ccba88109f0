//! Interceptor pipeline — ordered request and response transformations.
//!
//! Every call made through [`HttpClient`](crate::client::HttpClient) passes
//! through two chains:
//!
//! 1. **Request interceptors** run in registration order, each receiving the
//!    outgoing [`Request`] by `&mut`. An interceptor may decorate the request
//!    and return [`RequestFlow::Continue`], or short-circuit the call with
//!    [`RequestFlow::Respond`]. The first short-circuit ends the chain and the
//!    transport is skipped.
//! 2. **Response interceptors** run in registration order over the response,
//!    whether it came from the transport or from a short-circuit. Each one
//!    receives the response by value and returns the response to pass on.
//!
//! ## Core types
//!
//! - [`RequestInterceptor`] / [`ResponseInterceptor`] — traits for pipeline members.
//! - [`Interceptors`] — the two ordered chains owned by a client.
//! - [`request_fn`] / [`response_fn`] — adapt synchronous closures.
//! - [`AcceptLanguageInterceptor`] / [`XsrfInterceptor`] — built-in header decorators.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::client::FetchError;
use crate::http::{Request, Response};

mod headers;

pub use headers::{AcceptLanguageInterceptor, CookieSource, XsrfInterceptor, get_cookie};

/// A boxed, `Send` future borrowing from its interceptor and request.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a request interceptor wants the pipeline to do next.
#[derive(Debug)]
pub enum RequestFlow {
    /// Hand the (possibly modified) request to the next interceptor.
    Continue,
    /// Stop here and use this response instead of calling the transport.
    Respond(Response),
}

/// A member of the request chain.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync`; one client may serve calls
///   from many tasks at once.
/// - Reads and writes against shared state must not straddle an `.await`
///   without re-checking that state afterwards.
///
/// # Examples
///
/// ```rust
/// use rttp_client::client::FetchError;
/// use rttp_client::http::Request;
/// use rttp_client::interceptor::{BoxFuture, RequestFlow, RequestInterceptor};
///
/// struct Tag;
///
/// impl RequestInterceptor for Tag {
///     fn intercept<'a>(
///         &'a self,
///         request: &'a mut Request,
///     ) -> BoxFuture<'a, Result<RequestFlow, FetchError>> {
///         Box::pin(async move {
///             request.headers_mut().set("X-Client", "rttp");
///             Ok(RequestFlow::Continue)
///         })
///     }
/// }
/// ```
pub trait RequestInterceptor: Send + Sync {
    fn intercept<'a>(
        &'a self,
        request: &'a mut Request,
    ) -> BoxFuture<'a, Result<RequestFlow, FetchError>>;
}

/// A member of the response chain.
///
/// The request is passed alongside so interceptors can key off the method or
/// URL the response belongs to.
pub trait ResponseInterceptor: Send + Sync {
    fn intercept<'a>(
        &'a self,
        request: &'a Request,
        response: Response,
    ) -> BoxFuture<'a, Result<Response, FetchError>>;
}

/// Wraps a synchronous closure as a [`RequestInterceptor`].
///
/// ```rust
/// use rttp_client::interceptor::{RequestFlow, request_fn};
///
/// let interceptor = request_fn(|request| {
///     request.headers_mut().set("X-Trace", "1");
///     Ok(RequestFlow::Continue)
/// });
/// ```
pub fn request_fn<F>(f: F) -> Arc<dyn RequestInterceptor>
where
    F: Fn(&mut Request) -> Result<RequestFlow, FetchError> + Send + Sync + 'static,
{
    Arc::new(FnRequestInterceptor(f))
}

/// Wraps a synchronous closure as a [`ResponseInterceptor`].
pub fn response_fn<F>(f: F) -> Arc<dyn ResponseInterceptor>
where
    F: Fn(&Request, Response) -> Result<Response, FetchError> + Send + Sync + 'static,
{
    Arc::new(FnResponseInterceptor(f))
}

struct FnRequestInterceptor<F>(F);

impl<F> RequestInterceptor for FnRequestInterceptor<F>
where
    F: Fn(&mut Request) -> Result<RequestFlow, FetchError> + Send + Sync,
{
    fn intercept<'a>(
        &'a self,
        request: &'a mut Request,
    ) -> BoxFuture<'a, Result<RequestFlow, FetchError>> {
        let outcome = (self.0)(request);
        Box::pin(async move { outcome })
    }
}

struct FnResponseInterceptor<F>(F);

impl<F> ResponseInterceptor for FnResponseInterceptor<F>
where
    F: Fn(&Request, Response) -> Result<Response, FetchError> + Send + Sync,
{
    fn intercept<'a>(
        &'a self,
        request: &'a Request,
        response: Response,
    ) -> BoxFuture<'a, Result<Response, FetchError>> {
        let outcome = (self.0)(request, response);
        Box::pin(async move { outcome })
    }
}

/// The two ordered chains of a client.
///
/// Both lists are plain vectors; callers may push, insert, or remove members
/// at any time between calls.
#[derive(Clone, Default)]
pub struct Interceptors {
    pub request: Vec<Arc<dyn RequestInterceptor>>,
    pub response: Vec<Arc<dyn ResponseInterceptor>>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the request chain.
    ///
    /// Returns `Some(response)` if an interceptor short-circuited the call.
    ///
    /// # Errors
    ///
    /// The first interceptor error aborts the chain and is returned as is.
    pub async fn run_request(&self, request: &mut Request) -> Result<Option<Response>, FetchError> {
        for interceptor in &self.request {
            if let RequestFlow::Respond(response) = interceptor.intercept(request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Runs the response chain, threading the response through every member.
    ///
    /// # Errors
    ///
    /// The first interceptor error aborts the chain and is returned as is.
    pub async fn run_response(&self, request: &Request, mut response: Response) -> Result<Response, FetchError> {
        for interceptor in &self.response {
            response = interceptor.intercept(request, response).await?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use url::Url;

    use super::*;
    use crate::http::{Method, StatusCode};

    fn request() -> Request {
        Request::new(Method::Get, Url::parse("http://localhost/test").unwrap())
    }

    #[tokio::test]
    async fn request_chain_runs_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Interceptors::new();
        for name in ["first", "second"] {
            let order = Arc::clone(&order);
            chain.request.push(request_fn(move |req| {
                order.lock().unwrap().push(name);
                req.headers_mut().append("X-Seen", name);
                Ok(RequestFlow::Continue)
            }));
        }

        let mut req = request();
        let short = chain.run_request(&mut req).await.unwrap();
        assert!(short.is_none());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(
            req.headers().get_all("x-seen").collect::<Vec<_>>(),
            vec!["first", "second"]
        );
    }

    #[tokio::test]
    async fn short_circuit_stops_request_chain() {
        let mut chain = Interceptors::new();
        chain.request.push(request_fn(|_| {
            Ok(RequestFlow::Respond(Response::new(StatusCode::ACCEPTED)))
        }));
        chain.request.push(request_fn(|_| {
            panic!("must not run after a short-circuit");
        }));

        let short = chain.run_request(&mut request()).await.unwrap();
        assert_eq!(short.unwrap().status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn response_chain_threads_replacements() {
        let mut chain = Interceptors::new();
        chain.response.push(response_fn(|_, _| Ok(Response::new(StatusCode::CREATED))));
        chain.response.push(response_fn(|req, mut res| {
            res.add_header("X-Method", req.method().as_str());
            Ok(res)
        }));

        let res = chain
            .run_response(&request(), Response::new(StatusCode::OK))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers().get("x-method"), Some("GET"));
    }

    #[tokio::test]
    async fn request_error_aborts_chain() {
        let mut chain = Interceptors::new();
        chain
            .request
            .push(request_fn(|_| Err(FetchError::InvalidCacheIdentifier)));

        let err = chain.run_request(&mut request()).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidCacheIdentifier));
    }
}
