//! Fetches the same resource repeatedly through the response cache.
//!
//! Starts a tiny loopback server, then issues three GETs and one POST:
//!
//! ```text
//! cargo run --example cached_fetch
//! RUST_LOG=rttp_client=debug cargo run --example cached_fetch
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use regex::Regex;
use rttp_client::cache::CacheOptions;
use rttp_client::client::{ClientConfig, HttpClient};
use rttp_client::http::{Method, RequestOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}/", listener.local_addr()?);
    let hits = Arc::new(AtomicUsize::new(0));
    tokio::spawn(serve(listener, Arc::clone(&hits)));

    let client = HttpClient::builder()
        .config(ClientConfig {
            base_url,
            ..ClientConfig::default()
        })
        .cache(
            Arc::new(|| Some("demo-session".to_owned())),
            CacheOptions::new()
                .use_cache(true)
                .max_age(Duration::from_secs(30))
                .invalidate_urls_regex(Regex::new("^/posts")?),
        )
        .build()?;

    for round in 1..=3 {
        let response = client.fetch("/posts", RequestOptions::new()).await?;
        let cached = response.is_from_cache();
        let body = response.text().await?;
        info!(round, cached, body = %body, "GET /posts");
    }

    client
        .fetch("/posts", RequestOptions::new().method(Method::Post).body("{}"))
        .await?;
    let after = client.fetch("/posts", RequestOptions::new()).await?;
    info!(cached = after.is_from_cache(), "GET /posts after POST");

    info!(server_hits = hits.load(Ordering::SeqCst), "done");
    Ok(())
}

async fn serve(listener: TcpListener, hits: Arc<AtomicUsize>) {
    while let Ok((mut stream, _)) = listener.accept().await {
        let hit = hits.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            if stream.read(&mut buf).await.is_err() {
                return;
            }
            let body = format!("response #{hit}");
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
    }
}
