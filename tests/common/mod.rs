#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rttp_client::cache::{CacheOptions, SessionFn};
use rttp_client::client::HttpClient;
use rttp_client::http::{Request, Response, StatusCode};
use rttp_client::interceptor::BoxFuture;
use rttp_client::transport::{Transport, TransportError};
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Answers every request with `200 call <n>` and records what it saw.
#[derive(Default)]
pub struct CountingTransport {
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl CountingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `METHOD target-url` for every request, in order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Transport for CountingTransport {
    fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, TransportError>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen
            .lock()
            .unwrap()
            .push(format!("{} {}", request.method(), request.target_url()));
        Box::pin(async move {
            Ok(Response::new(StatusCode::OK)
                .header("X-Call", call.to_string())
                .body(format!("call {call}")))
        })
    }
}

pub fn session(value: &str) -> SessionFn {
    let value = value.to_owned();
    Arc::new(move || Some(value.clone()))
}

/// A client with the cache installed under session `"1"`.
pub fn cached_client(transport: Arc<CountingTransport>, options: CacheOptions) -> HttpClient {
    init_tracing();
    HttpClient::builder()
        .transport(transport)
        .cache(session("1"), options)
        .build()
        .unwrap()
}
