//! crawlcheck: polite, evasion-capable crawling and bot-defense auditing
//!
//! This library fetches pages while mimicking browser TLS/HTTP fingerprints,
//! rotating identities and proxies, pacing requests, and honoring robots.txt.
//! Every fetch produces an annotated [`storage::FetchResult`] recording status,
//! headers, body, timing, and whether a bot-defense product challenged the
//! request.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use crawlcheck::{CrawlConfig, Crawler, FetchConfig, Fetcher};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> crawlcheck::Result<()> {
//! let fetcher = Arc::new(Fetcher::new(FetchConfig::default())?);
//! let crawler = Crawler::new(
//!     CrawlConfig {
//!         max_depth: 2,
//!         domains: vec!["example.com".to_string()],
//!         ..Default::default()
//!     },
//!     fetcher,
//! );
//! let cancel = CancellationToken::new();
//! crawler.run(&cancel, &["https://example.com/".to_string()]).await?;
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod client;
pub mod config;
pub mod crawler;
pub mod detect;
pub mod fetcher;
pub mod fingerprint;
pub mod initialization;
pub mod metrics;
pub mod proxy;
pub mod ratelimit;
pub mod robots;
pub mod storage;
pub mod useragent;

use thiserror::Error;

/// Main error type for crawlcheck operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("proxy not found in pool: {0}")]
    ProxyNotFound(String),

    #[error("robots.txt parse error: {0}")]
    RobotsParse(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for crawlcheck operations.
pub type Result<T> = std::result::Result<T, Error>;

// Re-export commonly used types
pub use crawler::{CrawlConfig, Crawler};
pub use fetcher::{FetchConfig, Fetcher};
pub use fingerprint::Profile;
pub use metrics::{Observer, ScrapeMetrics};
pub use proxy::ProxyPool;
pub use ratelimit::Limiter;
pub use storage::{Backend, FetchResult, Filter};
pub use useragent::UaPool;
