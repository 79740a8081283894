//! Per-fetch counters and their HTTP exposition.
//!
//! The crawler reports each fetch through the [`Observer`] interface.
//! [`ScrapeMetrics`] is the built-in implementation: labelled counters, a
//! per-domain duration histogram, and byte totals, served as Prometheus text
//! on `/metrics` and as JSON on `/status`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::storage::FetchResult;
use crate::Result;

/// Receives per-fetch counters. Implementations must be cheap and
/// non-blocking; they are invoked inline from crawl workers.
pub trait Observer: Send + Sync {
    /// Records one completed fetch. `domain` is the parsed hostname of the
    /// request URL.
    fn record_scrape(&self, domain: &str, result: &FetchResult);

    /// Records a proxy failure observed during a fetch.
    fn record_proxy_failure(&self, proxy_url: &str);
}

const DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0];

#[derive(Default)]
struct Histogram {
    buckets: [u64; DURATION_BUCKETS.len()],
    sum: f64,
    count: u64,
}

impl Histogram {
    fn observe(&mut self, value: f64) {
        for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
            if value <= *bound {
                self.buckets[i] += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RequestKey {
    domain: String,
    status: String,
    detected: bool,
    source: String,
}

#[derive(Default)]
struct MetricsInner {
    requests: BTreeMap<RequestKey, u64>,
    durations: BTreeMap<String, Histogram>,
    bytes: BTreeMap<String, u64>,
    proxy_failures: BTreeMap<String, u64>,
}

/// Counter registry for fetch activity.
pub struct ScrapeMetrics {
    inner: Mutex<MetricsInner>,
    start: Instant,
}

/// JSON document served on `/status`.
#[derive(Serialize)]
pub struct StatusSnapshot {
    pub total_requests: u64,
    pub detected_requests: u64,
    pub error_requests: u64,
    pub bytes_total: u64,
    pub proxy_failures_total: u64,
    pub elapsed_seconds: f64,
    pub requests_per_second: f64,
}

impl ScrapeMetrics {
    pub fn new() -> Self {
        ScrapeMetrics {
            inner: Mutex::new(MetricsInner::default()),
            start: Instant::now(),
        }
    }

    /// Renders all counters in the Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let inner = self.inner.lock().expect("metrics lock poisoned");
        let mut out = String::new();

        out.push_str("# HELP crawlcheck_fetch_requests_total Total fetch requests executed\n");
        out.push_str("# TYPE crawlcheck_fetch_requests_total counter\n");
        for (key, count) in &inner.requests {
            out.push_str(&format!(
                "crawlcheck_fetch_requests_total{{domain=\"{}\",status=\"{}\",detected=\"{}\",detection_source=\"{}\"}} {}\n",
                key.domain, key.status, key.detected, key.source, count
            ));
        }

        out.push_str("\n# HELP crawlcheck_fetch_duration_seconds Duration of fetch requests\n");
        out.push_str("# TYPE crawlcheck_fetch_duration_seconds histogram\n");
        for (domain, histogram) in &inner.durations {
            for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
                out.push_str(&format!(
                    "crawlcheck_fetch_duration_seconds_bucket{{domain=\"{domain}\",le=\"{bound}\"}} {}\n",
                    histogram.buckets[i]
                ));
            }
            out.push_str(&format!(
                "crawlcheck_fetch_duration_seconds_bucket{{domain=\"{domain}\",le=\"+Inf\"}} {}\n",
                histogram.count
            ));
            out.push_str(&format!(
                "crawlcheck_fetch_duration_seconds_sum{{domain=\"{domain}\"}} {}\n",
                histogram.sum
            ));
            out.push_str(&format!(
                "crawlcheck_fetch_duration_seconds_count{{domain=\"{domain}\"}} {}\n",
                histogram.count
            ));
        }

        out.push_str("\n# HELP crawlcheck_fetch_bytes_total Total bytes downloaded\n");
        out.push_str("# TYPE crawlcheck_fetch_bytes_total counter\n");
        for (domain, bytes) in &inner.bytes {
            out.push_str(&format!(
                "crawlcheck_fetch_bytes_total{{domain=\"{domain}\"}} {bytes}\n"
            ));
        }

        out.push_str("\n# HELP crawlcheck_proxy_failures_total Proxy failures during fetches\n");
        out.push_str("# TYPE crawlcheck_proxy_failures_total counter\n");
        for (proxy, count) in &inner.proxy_failures {
            out.push_str(&format!(
                "crawlcheck_proxy_failures_total{{proxy_url=\"{proxy}\"}} {count}\n"
            ));
        }

        out
    }

    /// Returns aggregate totals for the JSON status endpoint.
    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.lock().expect("metrics lock poisoned");

        let total_requests: u64 = inner.requests.values().sum();
        let detected_requests: u64 = inner
            .requests
            .iter()
            .filter(|(key, _)| key.detected)
            .map(|(_, count)| count)
            .sum();
        let error_requests: u64 = inner
            .requests
            .iter()
            .filter(|(key, _)| key.status == "error")
            .map(|(_, count)| count)
            .sum();
        let bytes_total: u64 = inner.bytes.values().sum();
        let proxy_failures_total: u64 = inner.proxy_failures.values().sum();

        let elapsed_seconds = self.start.elapsed().as_secs_f64();
        let requests_per_second = if elapsed_seconds > 0.0 {
            total_requests as f64 / elapsed_seconds
        } else {
            0.0
        };

        StatusSnapshot {
            total_requests,
            detected_requests,
            error_requests,
            bytes_total,
            proxy_failures_total,
            elapsed_seconds,
            requests_per_second,
        }
    }
}

impl Default for ScrapeMetrics {
    fn default() -> Self {
        ScrapeMetrics::new()
    }
}

impl Observer for ScrapeMetrics {
    fn record_scrape(&self, domain: &str, result: &FetchResult) {
        let status = if result.error.is_empty() {
            result.status_code.to_string()
        } else {
            "error".to_string()
        };

        let key = RequestKey {
            domain: domain.to_string(),
            status,
            detected: result.detected_bot,
            source: result.detection_source.clone(),
        };

        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        *inner.requests.entry(key).or_insert(0) += 1;
        inner
            .durations
            .entry(domain.to_string())
            .or_default()
            .observe(result.duration.as_secs_f64());
        *inner.bytes.entry(domain.to_string()).or_insert(0) += result.body.len() as u64;
    }

    fn record_proxy_failure(&self, proxy_url: &str) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        *inner.proxy_failures.entry(proxy_url.to_string()).or_insert(0) += 1;
    }
}

/// Serves `/metrics` and `/status` on the loopback interface. Runs until the
/// process exits; callers usually spawn it.
pub async fn start_metrics_server(port: u16, metrics: Arc<ScrapeMetrics>) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}")).await?;

    log::info!("metrics server listening on http://127.0.0.1:{port}/metrics");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler(State(metrics): State<Arc<ScrapeMetrics>>) -> Response {
    (StatusCode::OK, metrics.render_prometheus()).into_response()
}

async fn status_handler(State(metrics): State<Arc<ScrapeMetrics>>) -> Response {
    match serde_json::to_string_pretty(&metrics.snapshot()) {
        Ok(json) => (
            StatusCode::OK,
            [("content-type", "application/json")],
            json,
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to serialize status: {err}"),
        )
            .into_response(),
    }
}
