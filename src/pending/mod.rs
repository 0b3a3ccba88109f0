//! Pending request store — single-flight coordination by key.
//!
//! A caller that is about to start a long-running operation registers its key
//! with [`PendingRequestStore::set`]. Other callers interested in the same key
//! grab a [`PendingRequest`] with [`get`](PendingRequestStore::get) and wait on
//! it instead of starting a duplicate operation. When the first caller is done
//! it calls [`resolve`](PendingRequestStore::resolve).
//!
//! Resolution carries no value. The result lives wherever the operation put it
//! (typically the [`CacheStore`](crate::cache::CacheStore)), so a waiter must
//! look it up again after [`PendingRequest::wait`] returns.
//!
//! ```
//! use rttp_client::pending::PendingRequestStore;
//!
//! # async fn example() {
//! let store = PendingRequestStore::new();
//! store.set("/posts");
//!
//! let waiter = store.get("/posts").expect("registered above");
//! store.resolve("/posts");
//! waiter.wait().await.expect("resolved, not reset");
//! assert!(store.get("/posts").is_none());
//! # }
//! ```

use dashmap::DashMap;
use regex::Regex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::trace;

/// Returned by [`PendingRequest::wait`] when the store was reset while the key
/// was still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pending request was abandoned before it resolved")]
pub struct Abandoned;

/// Selects pending keys: exactly, or by regular expression search.
#[derive(Debug, Clone, Copy)]
pub enum KeyMatcher<'a> {
    Exact(&'a str),
    Pattern(&'a Regex),
}

impl KeyMatcher<'_> {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyMatcher::Exact(exact) => *exact == key,
            KeyMatcher::Pattern(pattern) => pattern.is_match(key),
        }
    }
}

impl<'a> From<&'a str> for KeyMatcher<'a> {
    fn from(key: &'a str) -> Self {
        KeyMatcher::Exact(key)
    }
}

impl<'a> From<&'a String> for KeyMatcher<'a> {
    fn from(key: &'a String) -> Self {
        KeyMatcher::Exact(key.as_str())
    }
}

impl<'a> From<&'a Regex> for KeyMatcher<'a> {
    fn from(pattern: &'a Regex) -> Self {
        KeyMatcher::Pattern(pattern)
    }
}

/// A handle on one pending key. Cheap to obtain; every handle for the same
/// registration completes together.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    resolved: watch::Receiver<bool>,
}

impl PendingRequest {
    /// Waits until the key is resolved.
    ///
    /// # Errors
    ///
    /// Returns [`Abandoned`] if the store was [`reset`](PendingRequestStore::reset)
    /// before the key resolved.
    pub async fn wait(mut self) -> Result<(), Abandoned> {
        self.resolved
            .wait_for(|resolved| *resolved)
            .await
            .map(|_| ())
            .map_err(|_| Abandoned)
    }
}

/// Keyed registry of in-flight operations.
#[derive(Debug, Default)]
pub struct PendingRequestStore {
    pending: DashMap<String, watch::Sender<bool>>,
}

impl PendingRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` as pending. A no-op if it is already pending.
    pub fn set(&self, key: impl Into<String>) {
        self.pending.entry(key.into()).or_insert_with(|| {
            let (tx, _rx) = watch::channel(false);
            tx
        });
    }

    /// Returns a handle on `key` if it is currently pending.
    pub fn get(&self, key: &str) -> Option<PendingRequest> {
        self.pending.get(key).map(|tx| PendingRequest {
            resolved: tx.subscribe(),
        })
    }

    /// Resolves and removes every pending key selected by `matcher`.
    ///
    /// A `&str` selects one exact key; a `&Regex` selects every key currently
    /// registered that the pattern finds a match in. Returns how many keys were
    /// resolved.
    pub fn resolve<'a>(&self, matcher: impl Into<KeyMatcher<'a>>) -> usize {
        match matcher.into() {
            KeyMatcher::Exact(key) => match self.pending.remove(key) {
                Some((_, tx)) => {
                    tx.send_replace(true);
                    trace!(key, "pending request resolved");
                    1
                }
                None => 0,
            },
            matcher @ KeyMatcher::Pattern(_) => {
                let mut resolved = 0;
                self.pending.retain(|key, tx| {
                    if matcher.matches(key) {
                        tx.send_replace(true);
                        resolved += 1;
                        false
                    } else {
                        true
                    }
                });
                trace!(resolved, "pending requests resolved by pattern");
                resolved
            }
        }
    }

    /// Drops every pending key without resolving it. Outstanding waiters
    /// receive [`Abandoned`].
    pub fn reset(&self) {
        self.pending.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
