//! Cache configuration and its validation.
//!
//! [`CacheOptions`] holds the client-wide defaults; [`CacheOptionsOverride`]
//! is the partial, per-call version merged on top of them. Both are checked
//! with [`CacheOptions::validate`] before they can reach the interceptors.
//!
//! Options normally come from the typed builders. When they arrive as loose
//! data instead (a JSON settings file, for example), use
//! [`CacheOptions::from_json`], which performs the per-field type checks.

use std::fmt;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::http::Method;
use crate::identity::{self, RequestIdFn};

/// Errors raised while building or validating cache options.
#[derive(Debug, Error)]
pub enum CacheConfigError {
    #[error("Cache options must be an object (got `{found}`)")]
    NotAnObject { found: &'static str },

    #[error("Property `useCache` must be a `boolean`")]
    InvalidUseCache,

    #[error("Property `maxAge` must be a non-negative `number` of milliseconds")]
    InvalidMaxAge,

    #[error("Cache can only be utilized with `GET` method (got `{method}`)")]
    UnsupportedMethod { method: String },

    #[error("Property `methods` must be an array of method names")]
    InvalidMethods,

    #[error("Property `requestIdFunction` must be a `function`")]
    InvalidRequestIdFunction,

    #[error("Property `invalidateUrlsRegex` must be a `string`")]
    InvalidRegexType,

    #[error("Property `invalidateUrlsRegex` is not a valid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Property `invalidateUrls` must be an array of strings")]
    InvalidInvalidateUrls,
}

/// Client-wide cache configuration.
///
/// | Option                  | Default          |
/// |-------------------------|------------------|
/// | `use_cache`             | `false`          |
/// | `max_age`               | `0`              |
/// | `methods`               | `[GET]`          |
/// | `request_id_fn`         | pathname + query |
/// | `invalidate_urls_regex` | none             |
/// | `invalidate_urls`       | empty            |
///
/// `use_cache` gates reads only. Responses to cache-eligible requests are
/// always written, so turning `use_cache` on for a later call can serve an
/// entry stored while it was off.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use regex::Regex;
/// use rttp_client::cache::CacheOptions;
///
/// let options = CacheOptions::new()
///     .use_cache(true)
///     .max_age(Duration::from_secs(5))
///     .invalidate_urls_regex(Regex::new("posts").unwrap());
/// assert!(options.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct CacheOptions {
    pub(crate) use_cache: bool,
    pub(crate) max_age: Duration,
    pub(crate) methods: Vec<Method>,
    pub(crate) request_id_fn: RequestIdFn,
    pub(crate) invalidate_urls_regex: Option<Regex>,
    pub(crate) invalidate_urls: Vec<String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            use_cache: false,
            max_age: Duration::ZERO,
            methods: vec![Method::Get],
            request_id_fn: identity::default_request_id_fn(),
            invalidate_urls_regex: None,
            invalidate_urls: Vec::new(),
        }
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("use_cache", &self.use_cache)
            .field("max_age", &self.max_age)
            .field("methods", &self.methods)
            .field("invalidate_urls_regex", &self.invalidate_urls_regex)
            .field("invalidate_urls", &self.invalidate_urls)
            .finish_non_exhaustive()
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve fresh entries without network I/O.
    #[must_use]
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Time-to-live for newly stored entries.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Methods whose responses are cached. Only `GET` passes validation.
    #[must_use]
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    #[must_use]
    pub fn request_id_fn(mut self, request_id_fn: RequestIdFn) -> Self {
        self.request_id_fn = request_id_fn;
        self
    }

    /// Identities matching this pattern are purged on every mutating call.
    #[must_use]
    pub fn invalidate_urls_regex(mut self, pattern: Regex) -> Self {
        self.invalidate_urls_regex = Some(pattern);
        self
    }

    /// Exact identities purged on every mutating call.
    #[must_use]
    pub fn invalidate_urls<I, S>(mut self, identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidate_urls = identities.into_iter().map(Into::into).collect();
        self
    }

    pub fn reads_from_cache(&self) -> bool {
        self.use_cache
    }

    pub fn ttl(&self) -> Duration {
        self.max_age
    }

    /// `true` if responses to `method` are written to (and read from) the cache.
    pub fn is_cacheable(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Checks the invariants the type system cannot express.
    ///
    /// # Errors
    ///
    /// [`CacheConfigError::UnsupportedMethod`] if `methods` holds anything but `GET`.
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        match self.methods.iter().find(|m| **m != Method::Get) {
            Some(method) => Err(CacheConfigError::UnsupportedMethod {
                method: method.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Returns these options with every field set in `overrides` replaced.
    ///
    /// The result is not validated; callers run [`validate`](Self::validate).
    pub fn merged(&self, overrides: &CacheOptionsOverride) -> CacheOptions {
        let mut merged = self.clone();
        if let Some(use_cache) = overrides.use_cache {
            merged.use_cache = use_cache;
        }
        if let Some(max_age) = overrides.max_age {
            merged.max_age = max_age;
        }
        if let Some(methods) = &overrides.methods {
            merged.methods = methods.clone();
        }
        if let Some(request_id_fn) = &overrides.request_id_fn {
            merged.request_id_fn = request_id_fn.clone();
        }
        if let Some(pattern) = &overrides.invalidate_urls_regex {
            merged.invalidate_urls_regex = Some(pattern.clone());
        }
        if let Some(identities) = &overrides.invalidate_urls {
            merged.invalidate_urls = identities.clone();
        }
        merged
    }

    /// Builds validated options from loosely-typed data with camelCase keys
    /// (`useCache`, `maxAge`, `methods`, `requestIdFunction`,
    /// `invalidateUrlsRegex`, `invalidateUrls`). Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns the [`CacheConfigError`] for the first field of the wrong type
    /// or value. `requestIdFunction` is always rejected: data cannot carry a
    /// function, use [`request_id_fn`](Self::request_id_fn) instead.
    ///
    /// # Examples
    ///
    /// ```
    /// use rttp_client::cache::{CacheConfigError, CacheOptions};
    /// use serde_json::json;
    ///
    /// let options = CacheOptions::from_json(&json!({ "useCache": true, "maxAge": 100 })).unwrap();
    /// assert!(options.reads_from_cache());
    ///
    /// let err = CacheOptions::from_json(&json!({ "methods": ["get", "post"] })).unwrap_err();
    /// assert!(matches!(err, CacheConfigError::UnsupportedMethod { .. }));
    /// ```
    pub fn from_json(value: &Value) -> Result<Self, CacheConfigError> {
        let overrides = CacheOptionsOverride::from_json(value)?;
        let options = CacheOptions::default().merged(&overrides);
        options.validate()?;
        Ok(options)
    }
}

/// A partial [`CacheOptions`] applied to a single call.
///
/// # Examples
///
/// ```
/// use rttp_client::cache::CacheOptionsOverride;
/// use rttp_client::http::RequestOptions;
///
/// let options = RequestOptions::new()
///     .cache_options(CacheOptionsOverride::new().use_cache(true));
/// ```
#[derive(Clone, Default)]
pub struct CacheOptionsOverride {
    pub(crate) use_cache: Option<bool>,
    pub(crate) max_age: Option<Duration>,
    pub(crate) methods: Option<Vec<Method>>,
    pub(crate) request_id_fn: Option<RequestIdFn>,
    pub(crate) invalidate_urls_regex: Option<Regex>,
    pub(crate) invalidate_urls: Option<Vec<String>>,
}

impl fmt::Debug for CacheOptionsOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptionsOverride")
            .field("use_cache", &self.use_cache)
            .field("max_age", &self.max_age)
            .field("methods", &self.methods)
            .field("request_id_fn", &self.request_id_fn.as_ref().map(|_| ".."))
            .field("invalidate_urls_regex", &self.invalidate_urls_regex)
            .field("invalidate_urls", &self.invalidate_urls)
            .finish()
    }
}

impl CacheOptionsOverride {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = Some(use_cache);
        self
    }

    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    #[must_use]
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    #[must_use]
    pub fn request_id_fn(mut self, request_id_fn: RequestIdFn) -> Self {
        self.request_id_fn = Some(request_id_fn);
        self
    }

    #[must_use]
    pub fn invalidate_urls_regex(mut self, pattern: Regex) -> Self {
        self.invalidate_urls_regex = Some(pattern);
        self
    }

    #[must_use]
    pub fn invalidate_urls<I, S>(mut self, identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidate_urls = Some(identities.into_iter().map(Into::into).collect());
        self
    }

    /// Parses a per-call override from loosely-typed data.
    ///
    /// Same keys and type checks as [`CacheOptions::from_json`]; the
    /// `GET`-only rule is left to validation of the merged options.
    ///
    /// # Errors
    ///
    /// Returns the [`CacheConfigError`] for the first ill-typed field, or
    /// [`CacheConfigError::NotAnObject`] unless `value` is an object or `null`.
    pub fn from_json(value: &Value) -> Result<Self, CacheConfigError> {
        let mut overrides = CacheOptionsOverride::new();
        let object = match value {
            Value::Object(object) => object,
            Value::Null => return Ok(overrides),
            other => {
                return Err(CacheConfigError::NotAnObject {
                    found: json_type(other),
                });
            }
        };

        for (key, field) in object {
            match key.as_str() {
                "useCache" => {
                    let use_cache = field.as_bool().ok_or(CacheConfigError::InvalidUseCache)?;
                    overrides.use_cache = Some(use_cache);
                }
                "maxAge" => overrides.max_age = Some(parse_max_age(field)?),
                "methods" => overrides.methods = Some(parse_methods(field)?),
                "requestIdFunction" => return Err(CacheConfigError::InvalidRequestIdFunction),
                "invalidateUrlsRegex" => {
                    let pattern = field.as_str().ok_or(CacheConfigError::InvalidRegexType)?;
                    overrides.invalidate_urls_regex = Some(Regex::new(pattern)?);
                }
                "invalidateUrls" => overrides.invalidate_urls = Some(parse_strings(field)?),
                other => debug!(key = other, "ignoring unknown cache option"),
            }
        }

        Ok(overrides)
    }
}

fn parse_max_age(value: &Value) -> Result<Duration, CacheConfigError> {
    if let Some(millis) = value.as_u64() {
        return Ok(Duration::from_millis(millis));
    }
    match value.as_f64() {
        Some(millis) if millis.is_finite() && millis >= 0.0 => {
            Ok(Duration::from_nanos((millis * 1_000_000.0).round() as u64))
        }
        _ => Err(CacheConfigError::InvalidMaxAge),
    }
}

fn parse_methods(value: &Value) -> Result<Vec<Method>, CacheConfigError> {
    let items = value.as_array().ok_or(CacheConfigError::InvalidMethods)?;
    items
        .iter()
        .map(|item| -> Result<Method, CacheConfigError> {
            let name = item.as_str().ok_or(CacheConfigError::InvalidMethods)?;
            let Ok(method) = name.parse::<Method>();
            Ok(method)
        })
        .collect()
}

fn parse_strings(value: &Value) -> Result<Vec<String>, CacheConfigError> {
    let items = value
        .as_array()
        .ok_or(CacheConfigError::InvalidInvalidateUrls)?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or(CacheConfigError::InvalidInvalidateUrls)
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults() {
        let options = CacheOptions::default();
        assert!(!options.reads_from_cache());
        assert_eq!(options.ttl(), Duration::ZERO);
        assert!(options.is_cacheable(&Method::Get));
        assert!(!options.is_cacheable(&Method::Post));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn rejects_non_get_methods() {
        let err = CacheOptions::new()
            .methods([Method::Get, Method::Post])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("Cache can only be utilized with `GET` method"));
    }

    #[test]
    fn empty_methods_is_a_valid_subset() {
        let options = CacheOptions::new().methods([]);
        assert!(options.validate().is_ok());
        assert!(!options.is_cacheable(&Method::Get));
    }

    #[test]
    fn merge_replaces_only_set_fields() {
        let base = CacheOptions::new()
            .use_cache(false)
            .max_age(Duration::from_millis(100))
            .invalidate_urls(["/a"]);
        let merged = base.merged(&CacheOptionsOverride::new().use_cache(true));
        assert!(merged.reads_from_cache());
        assert_eq!(merged.ttl(), Duration::from_millis(100));
        assert_eq!(merged.invalidate_urls, vec!["/a".to_owned()]);
    }

    #[test]
    fn json_use_cache_must_be_bool() {
        let err = CacheOptions::from_json(&json!({ "useCache": "fakeUseCacheType" })).unwrap_err();
        assert!(matches!(err, CacheConfigError::InvalidUseCache));
    }

    #[test]
    fn json_max_age_must_be_number() {
        let err = CacheOptions::from_json(&json!({ "useCache": true, "maxAge": "" })).unwrap_err();
        assert!(matches!(err, CacheConfigError::InvalidMaxAge));
        let err = CacheOptions::from_json(&json!({ "maxAge": -1 })).unwrap_err();
        assert!(matches!(err, CacheConfigError::InvalidMaxAge));
    }

    #[test]
    fn json_fractional_max_age() {
        let options = CacheOptions::from_json(&json!({ "maxAge": 1.5 })).unwrap();
        assert_eq!(options.ttl(), Duration::from_micros(1500));
    }

    #[test]
    fn json_methods_case_insensitive_get() {
        let options = CacheOptions::from_json(&json!({ "methods": ["get"] })).unwrap();
        assert!(options.is_cacheable(&Method::Get));

        let err = CacheOptions::from_json(&json!({ "methods": ["get", "post"] })).unwrap_err();
        assert!(matches!(err, CacheConfigError::UnsupportedMethod { method } if method == "POST"));

        let err = CacheOptions::from_json(&json!({ "methods": "get" })).unwrap_err();
        assert!(matches!(err, CacheConfigError::InvalidMethods));
    }

    #[test]
    fn json_request_id_function_is_rejected() {
        let err = CacheOptions::from_json(&json!({ "requestIdFunction": "not a function" }))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Property `requestIdFunction` must be a `function`"
        );
    }

    #[test]
    fn json_invalidation_rules() {
        let options = CacheOptions::from_json(&json!({
            "invalidateUrlsRegex": "(?i)foo",
            "invalidateUrls": ["/a?x=1", "/b"],
        }))
        .unwrap();
        assert!(options.invalidate_urls_regex.unwrap().is_match("/FOO-1"));
        assert_eq!(options.invalidate_urls.len(), 2);

        let err = CacheOptions::from_json(&json!({ "invalidateUrlsRegex": "(" })).unwrap_err();
        assert!(matches!(err, CacheConfigError::InvalidRegex(_)));

        let err = CacheOptions::from_json(&json!({ "invalidateUrlsRegex": 1 })).unwrap_err();
        assert!(matches!(err, CacheConfigError::InvalidRegexType));

        let err = CacheOptions::from_json(&json!({ "invalidateUrls": [1] })).unwrap_err();
        assert!(matches!(err, CacheConfigError::InvalidInvalidateUrls));
    }

    #[test]
    fn json_must_be_an_object() {
        let err = CacheOptionsOverride::from_json(&json!(5)).err().unwrap();
        assert!(matches!(err, CacheConfigError::NotAnObject { found: "number" }));
        let err = CacheOptions::from_json(&json!(["useCache"])).unwrap_err();
        assert_eq!(err.to_string(), "Cache options must be an object (got `array`)");

        let options = CacheOptions::from_json(&Value::Null).unwrap();
        assert!(!options.reads_from_cache());
    }

    #[test]
    fn json_override_leaves_method_rule_to_merge() {
        let overrides = CacheOptionsOverride::from_json(&json!({ "methods": ["post"] })).unwrap();
        let merged = CacheOptions::default().merged(&overrides);
        assert!(merged.validate().is_err());
    }
}
