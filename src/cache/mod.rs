//! In-memory response cache.
//!
//! Entries live in a [`CacheStore`], keyed first by a cache *session* and then
//! by request identity (see [`identity`](crate::identity)). Changing the
//! session value makes every earlier entry unreachable.
//!
//! Freshness is checked lazily: an entry is served only while
//! `now - created_at < ttl`. Expired entries stay in the store until they are
//! overwritten or explicitly invalidated. There is no background eviction.
//!
//! The store is wired into an [`HttpClient`](crate::client::HttpClient)
//! through the request/response interceptor pair built by
//! [`create_cache_interceptors`].

use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::http::ResponseSnapshot;

pub mod config;
pub mod interceptors;

pub use config::{CacheConfigError, CacheOptions, CacheOptionsOverride};
pub use interceptors::{
    CacheInterceptors, CacheRequestInterceptor, CacheResponseInterceptor, SessionFn,
    create_cache_interceptors,
};

/// One stored response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    snapshot: ResponseSnapshot,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    pub fn snapshot(&self) -> &ResponseSnapshot {
        &self.snapshot
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `true` while the entry's age is strictly below its TTL. A zero TTL is
    /// never fresh.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < self.ttl
    }
}

/// Session-scoped, TTL-aware storage for response snapshots.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rttp_client::cache::CacheStore;
/// use rttp_client::http::{Headers, ResponseSnapshot, StatusCode};
///
/// let store = CacheStore::new();
/// let snapshot = ResponseSnapshot::new(StatusCode::OK, Headers::new(), "cached");
///
/// store.put("session-1", "/posts", snapshot, Duration::from_secs(60));
/// assert!(store.get("session-1", "/posts").is_some());
/// assert!(store.get("session-2", "/posts").is_none());
/// ```
#[derive(Debug, Default)]
pub struct CacheStore {
    sessions: DashMap<String, HashMap<String, CacheEntry>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the snapshot stored under `key` if it is still fresh.
    ///
    /// Stale entries read as absent but are left in place.
    pub fn get(&self, session: &str, key: &str) -> Option<ResponseSnapshot> {
        let entries = self.sessions.get(session)?;
        let entry = entries.get(key)?;
        if entry.is_fresh(Instant::now()) {
            Some(entry.snapshot.clone())
        } else {
            trace!(session, key, "cache entry is stale");
            None
        }
    }

    /// Returns the entry under `key` regardless of freshness.
    pub fn peek(&self, session: &str, key: &str) -> Option<CacheEntry> {
        self.sessions.get(session)?.get(key).cloned()
    }

    /// Stores `snapshot` under `key`, replacing any previous entry.
    pub fn put(&self, session: &str, key: impl Into<String>, snapshot: ResponseSnapshot, ttl: Duration) {
        let key = key.into();
        trace!(session, key = %key, ?ttl, "cache entry stored");
        let entry = CacheEntry {
            snapshot,
            created_at: Instant::now(),
            ttl,
        };
        self.sessions
            .entry(session.to_owned())
            .or_default()
            .insert(key, entry);
    }

    /// Removes the entry under `key`. Returns `true` if one existed.
    pub fn invalidate(&self, session: &str, key: &str) -> bool {
        self.sessions
            .get_mut(session)
            .is_some_and(|mut entries| entries.remove(key).is_some())
    }

    /// Removes every entry whose key the pattern finds a match in.
    ///
    /// This is a search, not a full match: `posts` purges `/posts`,
    /// `/posts/1`, and `/posts?page=2`. Returns the number of removed entries.
    pub fn invalidate_matching(&self, session: &str, pattern: &Regex) -> usize {
        let Some(mut entries) = self.sessions.get_mut(session) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|key, _| !pattern.is_match(key));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(session, pattern = %pattern, removed, "cache entries invalidated by pattern");
        }
        removed
    }

    /// Removes each listed key if present. Returns the number removed.
    pub fn invalidate_list<I, S>(&self, session: &str, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(mut entries) = self.sessions.get_mut(session) else {
            return 0;
        };
        keys.into_iter()
            .filter(|key| entries.remove(key.as_ref()).is_some())
            .count()
    }

    /// Drops every entry under `session`, returning how many there were.
    ///
    /// Other sessions sharing the store are left alone.
    pub fn retire_session(&self, session: &str) -> usize {
        let removed = self
            .sessions
            .remove(session)
            .map_or(0, |(_, entries)| entries.len());
        if removed > 0 {
            debug!(session, entries = removed, "retiring cache session");
        }
        removed
    }

    /// Number of entries in `session`, fresh or stale.
    pub fn len(&self, session: &str) -> usize {
        self.sessions.get(session).map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.iter().all(|entries| entries.is_empty())
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.sessions.clear();
    }
}
