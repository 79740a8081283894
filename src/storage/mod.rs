//! Fetch result model and the pluggable result sink contract.
//!
//! A [`FetchResult`] is produced for every attempted fetch, including failed
//! ones. Sinks implement [`Backend`]; the crate ships an in-memory sink and a
//! SQLite sink, and callers are free to bring their own.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// The outcome of a single fetch attempt.
///
/// Invariants: a non-empty `error` implies `status_code == 0`; `detected_bot`
/// implies a non-empty `detection_source` drawn from the known vendor set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    /// Globally unique identifier minted at attempt start.
    pub id: String,
    /// Target URL as submitted.
    pub url: String,
    /// HTTP verb used (always GET for crawl fetches).
    pub method: String,
    /// HTTP status; 0 if no response was received.
    pub status_code: u16,
    /// Response headers, name to ordered list of values.
    pub headers: HashMap<String, Vec<String>>,
    /// Raw response body (may be empty on error).
    pub body: Vec<u8>,
    /// Wall-clock time from attempt start to completion.
    pub duration: Duration,
    /// True iff a bot-defense detector matched.
    pub detected_bot: bool,
    /// Vendor tag when `detected_bot`, else empty.
    pub detection_source: String,
    /// UTC timestamp of attempt start.
    pub created_at: DateTime<Utc>,
    /// Non-empty iff the attempt failed before producing a usable response.
    pub error: String,
}

impl FetchResult {
    /// Creates a result for an attempt starting now, with a fresh id.
    pub fn started(url: &str) -> Self {
        FetchResult {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            method: "GET".to_string(),
            status_code: 0,
            headers: HashMap::new(),
            body: Vec::new(),
            duration: Duration::ZERO,
            detected_bot: false,
            detection_source: String::new(),
            created_at: Utc::now(),
            error: String::new(),
        }
    }

    /// Returns the first value of the named header, matching the name
    /// case-insensitively. Stored names keep their original casing.
    pub fn header(&self, name: &str) -> Option<&str> {
        if let Some(values) = self.headers.get(name) {
            return values.first().map(String::as_str);
        }
        let lower = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| key.to_ascii_lowercase() == lower)
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }
}

/// Criteria for querying stored results. Zero `limit` means no limit.
/// Results are returned newest-first by `created_at`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub url: Option<String>,
    pub detected_bot: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

/// A sink for fetch results. Save failures are logged by the crawler and do
/// not abort a crawl.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Persists one result. Invoked once per completed fetch.
    async fn save(&self, result: &FetchResult) -> Result<()>;

    /// Returns stored results matching the filter, newest first.
    async fn query(&self, filter: &Filter) -> Result<Vec<FetchResult>>;

    /// Releases sink resources.
    async fn close(&self) -> Result<()>;
}
