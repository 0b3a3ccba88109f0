//! The request/response interceptor pair that puts a [`CacheStore`] in front
//! of the transport.
//!
//! - The **request** side serves fresh hits (when `use_cache` is on) and, for
//!   methods that are not cacheable, purges the request's own identity plus
//!   the configured invalidation targets.
//! - The **response** side writes every response to a cacheable request,
//!   whether or not `use_cache` is on. Responses that were themselves served
//!   from the cache are passed through untouched.
//!
//! Both sides evaluate the session function on every call. When a pair sees
//! its session change, it retires the entries of the session it saw before;
//! sessions used by other clients on a shared store are never touched.

use std::borrow::Cow;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use super::{CacheConfigError, CacheOptions, CacheStore};
use crate::client::FetchError;
use crate::http::{Request, Response};
use crate::identity::serialize_params;
use crate::interceptor::{BoxFuture, Interceptors, RequestFlow, RequestInterceptor, ResponseInterceptor};

/// Produces the current cache session. `None` or an empty string fails the
/// call with [`FetchError::InvalidCacheIdentifier`].
pub type SessionFn = Arc<dyn Fn() -> Option<String> + Send + Sync>;

struct CacheState {
    session: SessionFn,
    options: CacheOptions,
    store: Arc<CacheStore>,
    /// The session this pair saw on its previous request.
    last_session: Mutex<Option<String>>,
}

/// Everything one call needs to talk to the store.
struct CallScope<'a> {
    session: String,
    key: String,
    options: Cow<'a, CacheOptions>,
}

impl CacheState {
    fn session(&self) -> Result<String, FetchError> {
        (self.session)()
            .filter(|session| !session.is_empty())
            .ok_or(FetchError::InvalidCacheIdentifier)
    }

    fn observe_session(&self, session: &str) {
        let mut last = self.last_session.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(session) {
            return;
        }
        if let Some(previous) = last.replace(session.to_owned()) {
            self.store.retire_session(&previous);
        }
    }

    fn options_for(&self, request: &Request) -> Result<Cow<'_, CacheOptions>, CacheConfigError> {
        match request.cache_options() {
            Some(overrides) => {
                let merged = self.options.merged(overrides);
                merged.validate()?;
                Ok(Cow::Owned(merged))
            }
            None => Ok(Cow::Borrowed(&self.options)),
        }
    }

    fn scope(&self, request: &Request) -> Result<CallScope<'_>, FetchError> {
        let options = self.options_for(request)?;
        let session = self.session()?;
        let key = (options.request_id_fn)(request, serialize_params);
        Ok(CallScope {
            session,
            key,
            options,
        })
    }
}

/// Serves fresh hits and purges on mutating calls.
pub struct CacheRequestInterceptor {
    state: Arc<CacheState>,
}

impl CacheRequestInterceptor {
    fn handle(&self, request: &Request) -> Result<RequestFlow, FetchError> {
        let CallScope {
            session,
            key,
            options,
        } = self.state.scope(request)?;
        self.state.observe_session(&session);
        let store = &self.state.store;

        if !options.is_cacheable(request.method()) {
            let mut removed = usize::from(store.invalidate(&session, &key));
            if let Some(pattern) = &options.invalidate_urls_regex {
                removed += store.invalidate_matching(&session, pattern);
            }
            removed += store.invalidate_list(&session, &options.invalidate_urls);
            debug!(
                session = %session,
                key = %key,
                method = %request.method(),
                removed,
                "cache invalidated"
            );
            return Ok(RequestFlow::Continue);
        }

        if !options.reads_from_cache() {
            return Ok(RequestFlow::Continue);
        }

        match store.get(&session, &key) {
            Some(snapshot) => {
                debug!(session = %session, key = %key, "cache hit");
                Ok(RequestFlow::Respond(snapshot.to_response()))
            }
            None => {
                trace!(session = %session, key = %key, "cache miss");
                Ok(RequestFlow::Continue)
            }
        }
    }
}

impl RequestInterceptor for CacheRequestInterceptor {
    fn intercept<'a>(
        &'a self,
        request: &'a mut Request,
    ) -> BoxFuture<'a, Result<RequestFlow, FetchError>> {
        let outcome = self.handle(request);
        Box::pin(async move { outcome })
    }
}

/// Writes responses to cacheable requests into the store.
pub struct CacheResponseInterceptor {
    state: Arc<CacheState>,
}

impl CacheResponseInterceptor {
    async fn handle(&self, request: &Request, mut response: Response) -> Result<Response, FetchError> {
        if response.is_from_cache() {
            return Ok(response);
        }

        let scope = self.state.scope(request)?;
        if !scope.options.is_cacheable(request.method()) {
            return Ok(response);
        }

        let snapshot = response.snapshot().await?;
        // the session may have moved on while the body was draining
        let session = self.state.session()?;
        self.state
            .store
            .put(&session, scope.key, snapshot, scope.options.ttl());
        Ok(response)
    }
}

impl ResponseInterceptor for CacheResponseInterceptor {
    fn intercept<'a>(
        &'a self,
        request: &'a Request,
        response: Response,
    ) -> BoxFuture<'a, Result<Response, FetchError>> {
        Box::pin(self.handle(request, response))
    }
}

/// A matched request/response interceptor pair sharing one store.
pub struct CacheInterceptors {
    pub request: Arc<CacheRequestInterceptor>,
    pub response: Arc<CacheResponseInterceptor>,
}

impl CacheInterceptors {
    /// Appends the pair to the end of both chains.
    pub fn install(&self, interceptors: &mut Interceptors) {
        interceptors.request.push(self.request.clone());
        interceptors.response.push(self.response.clone());
    }

    /// The store both interceptors read and write.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.request.state.store
    }
}

/// Validates `options` and builds the interceptor pair over `store`.
///
/// # Errors
///
/// Returns [`CacheConfigError`] if the options fail
/// [`validate`](CacheOptions::validate). Nothing is deferred to the first call
/// except the session check, which depends on per-call state.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use rttp_client::cache::{CacheOptions, CacheStore, create_cache_interceptors};
/// use rttp_client::interceptor::Interceptors;
///
/// let cache = create_cache_interceptors(
///     Arc::new(|| Some("v1".to_owned())),
///     CacheOptions::new().use_cache(true).max_age(Duration::from_secs(30)),
///     Arc::new(CacheStore::new()),
/// )
/// .unwrap();
///
/// let mut chains = Interceptors::new();
/// cache.install(&mut chains);
/// ```
pub fn create_cache_interceptors(
    session: SessionFn,
    options: CacheOptions,
    store: Arc<CacheStore>,
) -> Result<CacheInterceptors, CacheConfigError> {
    options.validate()?;
    let state = Arc::new(CacheState {
        session,
        options,
        store,
        last_session: Mutex::new(None),
    });
    Ok(CacheInterceptors {
        request: Arc::new(CacheRequestInterceptor {
            state: Arc::clone(&state),
        }),
        response: Arc::new(CacheResponseInterceptor { state }),
    })
}
