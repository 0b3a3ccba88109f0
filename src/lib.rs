//! # rttp-client
//!
//! An async HTTP client built around an ordered interceptor pipeline, with a
//! session-scoped, TTL-aware response cache and a single-flight registry.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rttp_client::cache::CacheOptions;
//! use rttp_client::client::HttpClient;
//! use rttp_client::http::RequestOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::builder()
//!         .cache(
//!             Arc::new(|| Some("app-v1".to_owned())),
//!             CacheOptions::new().use_cache(true).max_age(Duration::from_secs(60)),
//!         )
//!         .build()?;
//!
//!     let first = client.fetch("/posts", RequestOptions::new()).await?;
//!     let second = client.fetch("/posts", RequestOptions::new()).await?;
//!     assert!(!first.is_from_cache());
//!     assert!(second.is_from_cache());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod http;
pub mod identity;
pub mod interceptor;
pub mod pending;
pub mod transport;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheOptions, CacheStore};
pub use client::{ClientBuilder, FetchError, HttpClient};
pub use http::{Headers, Method, Request, RequestOptions, Response, StatusCode};
pub use pending::PendingRequestStore;
pub use transport::{TcpTransport, Transport, TransportError};
