//! Bounded-concurrency BFS crawling.
//!
//! The crawler admits seed URLs into a visited set, fans jobs out to a fixed
//! pool of workers over one bounded queue, and enqueues the links each page
//! yields until the depth limit is reached. Admission and insertion into the
//! visited set are atomic, so a URL is fetched at most once no matter how
//! many workers discover it simultaneously.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::{FuturesUnordered, StreamExt};
use scraper::{Html, Selector};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::fetcher::Fetcher;
use crate::metrics::Observer;
use crate::ratelimit::Limiter;
use crate::robots::RobotsAuditor;
use crate::storage::Backend;
use crate::{Error, Result};

const DEFAULT_CONCURRENCY: usize = 3;
const DEFAULT_QUEUE_SIZE: usize = 10_000;

/// Parameters for a BFS crawl.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Depth 0 fetches only the seeds, with no link extraction.
    pub max_depth: usize,
    /// Worker count; zero falls back to 3.
    pub concurrency: usize,
    /// In-scope hosts; empty means unrestricted. A URL is in scope when its
    /// lowercased host equals a listed domain or is a subdomain of one.
    pub domains: Vec<String>,
    /// Gate fetches on each host's robots.txt.
    pub respect_robots: bool,
    /// Identity used for robots.txt group matching. Empty falls back to "*".
    pub user_agent: String,
    /// Requests per second across all workers; zero disables pacing.
    pub rps: f64,
    /// Rate limiter jitter factor in `[0, 1]`.
    pub jitter: f64,
    /// Bounded job queue capacity; zero falls back to 10 000.
    pub queue_size: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        CrawlConfig {
            max_depth: 0,
            concurrency: DEFAULT_CONCURRENCY,
            domains: Vec::new(),
            respect_robots: false,
            user_agent: "*".to_string(),
            rps: 0.0,
            jitter: 0.0,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
struct Job {
    url: String,
    depth: usize,
}

/// Coordinates crawling from seed URLs.
pub struct Crawler {
    config: CrawlConfig,
    fetcher: Arc<Fetcher>,
    auditor: Option<RobotsAuditor>,
    limiter: Limiter,
    backend: Option<Arc<dyn Backend>>,
    observer: Option<Arc<dyn Observer>>,
    visited: Mutex<HashSet<String>>,
}

impl Crawler {
    /// Creates a new crawler. Zero-valued config fields fall back to their
    /// defaults.
    pub fn new(mut config: CrawlConfig, fetcher: Arc<Fetcher>) -> Self {
        if config.concurrency == 0 {
            config.concurrency = DEFAULT_CONCURRENCY;
        }
        if config.queue_size == 0 {
            config.queue_size = DEFAULT_QUEUE_SIZE;
        }
        if config.user_agent.is_empty() {
            config.user_agent = "*".to_string();
        }

        let auditor = config
            .respect_robots
            .then(|| RobotsAuditor::new(Arc::clone(&fetcher)));
        let limiter = Limiter::new(config.rps, config.jitter);

        Crawler {
            config,
            fetcher,
            auditor,
            limiter,
            backend: None,
            observer: None,
            visited: Mutex::new(HashSet::new()),
        }
    }

    /// Persists every fetch result to the given sink. Save failures are
    /// logged and do not abort the crawl.
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Records per-fetch counters through the given observer.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Runs the BFS crawl from the seed URLs. Returns once every admitted
    /// job has completed, or `Error::Cancelled` if `cancel` fires first.
    pub async fn run(&self, cancel: &CancellationToken, seeds: &[String]) -> Result<()> {
        let (tx, rx) = mpsc::channel::<Job>(self.config.queue_size);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let outstanding = AtomicUsize::new(0);
        let done = Notify::new();

        for seed in seeds {
            let Some(canonical) = self.admit(seed) else {
                continue;
            };
            outstanding.fetch_add(1, Ordering::SeqCst);
            if let Err(err) = tx.try_send(Job {
                url: canonical,
                depth: 0,
            }) {
                log::warn!("seed dropped, queue full: {err}");
                outstanding.fetch_sub(1, Ordering::SeqCst);
            }
        }

        if outstanding.load(Ordering::SeqCst) == 0 {
            return Ok(());
        }

        let mut workers = FuturesUnordered::new();
        for _ in 0..self.config.concurrency {
            workers.push(self.worker(cancel, Arc::clone(&rx), tx.clone(), &outstanding, &done));
        }
        drop(tx);

        let drive_workers = async {
            while workers.next().await.is_some() {}
        };

        let wait_done = async {
            loop {
                let notified = done.notified();
                if outstanding.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        };

        // Biased so cancellation wins over workers that exited because of it.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = wait_done => Ok(()),
            _ = drive_workers => Ok(()),
        }
    }

    /// Returns how many unique URLs were admitted so far.
    pub fn visited_count(&self) -> usize {
        self.visited.lock().expect("visited lock poisoned").len()
    }

    /// Returns a snapshot of the visited set.
    pub fn visited_urls(&self) -> Vec<String> {
        self.visited
            .lock()
            .expect("visited lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    async fn worker(
        &self,
        cancel: &CancellationToken,
        rx: Arc<tokio::sync::Mutex<Receiver<Job>>>,
        tx: Sender<Job>,
        outstanding: &AtomicUsize,
        done: &Notify,
    ) {
        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => return,
                job = async { rx.lock().await.recv().await } => match job {
                    Some(job) => job,
                    None => return,
                },
            };

            self.process(cancel, job, &tx, outstanding).await;

            // notify_one stores a permit, so the run loop cannot miss a
            // notification sent before it re-registers.
            if outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
                done.notify_one();
            }
        }
    }

    async fn process(
        &self,
        cancel: &CancellationToken,
        job: Job,
        tx: &Sender<Job>,
        outstanding: &AtomicUsize,
    ) {
        if let Some(auditor) = &self.auditor {
            match auditor
                .is_allowed(cancel, &job.url, &self.config.user_agent)
                .await
            {
                Ok(false) => {
                    log::debug!("robots.txt disallows {}", job.url);
                    return;
                }
                Ok(true) => {}
                // Fail open: an errored check never blocks a fetch.
                Err(err) => log::warn!("robots.txt check failed for {}: {err}", job.url),
            }
        }

        if self.limiter.wait(cancel).await.is_err() {
            return;
        }

        log::debug!("fetching {} at depth {}", job.url, job.depth);
        let result = self.fetcher.fetch(cancel, &job.url).await;

        if let Some(backend) = &self.backend {
            if let Err(err) = backend.save(&result).await {
                log::error!("failed to save result for {}: {err}", job.url);
            }
        }

        if let Some(observer) = &self.observer {
            let domain = Url::parse(&job.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_default();
            observer.record_scrape(&domain, &result);
        }

        if job.depth >= self.config.max_depth || !result.error.is_empty() || result.body.is_empty()
        {
            return;
        }

        let is_html = result
            .header("Content-Type")
            .map(|ct| {
                ct.split(';')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .eq_ignore_ascii_case("text/html")
            })
            .unwrap_or(false);
        if !is_html {
            return;
        }

        for link in extract_links(&job.url, &result.body) {
            let Some(canonical) = self.admit(&link) else {
                continue;
            };
            outstanding.fetch_add(1, Ordering::SeqCst);
            let child = Job {
                url: canonical,
                depth: job.depth + 1,
            };
            tokio::select! {
                _ = cancel.cancelled() => {
                    outstanding.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
                sent = tx.send(child) => {
                    if sent.is_err() {
                        outstanding.fetch_sub(1, Ordering::SeqCst);
                        return;
                    }
                }
            }
        }
    }

    /// Admission gate: canonicalizes the URL (fragment stripped), applies the
    /// scheme and scope filters, and atomically inserts into the visited set.
    /// Returns the canonical URL when this caller won admission.
    fn admit(&self, raw_url: &str) -> Option<String> {
        let mut url = Url::parse(raw_url).ok()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }
        url.set_fragment(None);

        if !self.config.domains.is_empty() {
            let host = url.host_str()?.to_ascii_lowercase();
            let in_scope = self.config.domains.iter().any(|domain| {
                let domain = domain.to_ascii_lowercase();
                host == domain || host.ends_with(&format!(".{domain}"))
            });
            if !in_scope {
                return None;
            }
        }

        let canonical = url.to_string();
        let mut visited = self.visited.lock().expect("visited lock poisoned");
        visited.insert(canonical.clone()).then_some(canonical)
    }
}

/// Parses the body as HTML and resolves every anchor's `href` against the
/// request URL. Malformed anchors are ignored.
fn extract_links(base_url: &str, body: &[u8]) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let html = String::from_utf8_lossy(body);
    let document = Html::parse_document(&html);
    let selector = Selector::parse("a[href]").expect("static selector");

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .map(|resolved| resolved.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchConfig;
    use crate::fingerprint::Profile;
    use httptest::{matchers::*, responders::*, Expectation, Server};

    fn test_fetcher() -> Arc<Fetcher> {
        crate::initialization::init_crypto_provider();
        Arc::new(
            Fetcher::new(FetchConfig {
                profile: Profile::Standard,
                ..Default::default()
            })
            .expect("fetcher construction"),
        )
    }

    fn html_page(links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|href| format!("<a href=\"{href}\">link</a>"))
            .collect();
        format!("<html><body>{anchors}</body></html>")
    }

    #[test]
    fn test_admit_rejects_bad_input() {
        let crawler = Crawler::new(CrawlConfig::default(), test_fetcher());

        assert!(crawler.admit("not a url").is_none());
        assert!(crawler.admit("ftp://example.com/file").is_none());
        assert!(crawler.admit("mailto:someone@example.com").is_none());
    }

    #[test]
    fn test_admit_strips_fragment_and_dedupes() {
        let crawler = Crawler::new(CrawlConfig::default(), test_fetcher());

        let first = crawler.admit("http://example.com/page#section").unwrap();
        assert_eq!(first, "http://example.com/page");
        // Same page under a different fragment is a duplicate.
        assert!(crawler.admit("http://example.com/page#other").is_none());
        assert!(crawler.admit("http://example.com/page").is_none());
    }

    #[test]
    fn test_canonicalization_is_idempotent() {
        let crawler = Crawler::new(CrawlConfig::default(), test_fetcher());
        let canonical = crawler.admit("http://example.com/a?q=1#frag").unwrap();

        let other = Crawler::new(CrawlConfig::default(), test_fetcher());
        assert_eq!(other.admit(&canonical).unwrap(), canonical);
    }

    #[test]
    fn test_admit_scope_matching() {
        let crawler = Crawler::new(
            CrawlConfig {
                domains: vec!["Example.com".to_string()],
                ..Default::default()
            },
            test_fetcher(),
        );

        assert!(crawler.admit("http://example.com/").is_some());
        assert!(crawler.admit("http://sub.example.com/").is_some());
        assert!(crawler.admit("http://deep.sub.example.com/x").is_some());
        // Suffix without the dot boundary is out of scope.
        assert!(crawler.admit("http://notexample.com/").is_none());
        assert!(crawler.admit("http://other.test/").is_none());
    }

    #[test]
    fn test_extract_links_resolves_and_skips_malformed() {
        let body = html_page(&["/relative", "absolute", "https://other.test/x", "ht tp://bad"]);
        let links = extract_links("http://example.com/dir/page", body.as_bytes());

        assert!(links.contains(&"http://example.com/relative".to_string()));
        assert!(links.contains(&"http://example.com/dir/absolute".to_string()));
        assert!(links.contains(&"https://other.test/x".to_string()));
        assert_eq!(links.len(), 3);
    }

    #[tokio::test]
    async fn test_crawl_follows_links_to_depth() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/")).respond_with(
                status_code(200)
                    .append_header("Content-Type", "text/html")
                    .body(html_page(&["/page2", "/out-of-scope"])),
            ),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/page2")).respond_with(
                status_code(200)
                    .append_header("Content-Type", "text/html")
                    .body(html_page(&["/page3"])),
            ),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/page3")).respond_with(
                status_code(200)
                    .append_header("Content-Type", "text/html")
                    .body(html_page(&[])),
            ),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/out-of-scope"))
                .respond_with(status_code(200)),
        );

        let crawler = Crawler::new(
            CrawlConfig {
                max_depth: 2,
                concurrency: 2,
                domains: vec!["127.0.0.1".to_string()],
                ..Default::default()
            },
            test_fetcher(),
        );

        let cancel = CancellationToken::new();
        let root = server.url("/").to_string();
        crawler.run(&cancel, &[root.clone()]).await.unwrap();

        let visited = crawler.visited_urls();
        assert_eq!(visited.len(), 4, "visited: {visited:?}");
        assert!(visited.contains(&root));
        assert!(visited.iter().any(|u| u.ends_with("/page2")));
        assert!(visited.iter().any(|u| u.ends_with("/page3")));
    }

    #[tokio::test]
    async fn test_depth_zero_fetches_only_seed() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/")).respond_with(
                status_code(200)
                    .append_header("Content-Type", "text/html")
                    .body(html_page(&["/child"])),
            ),
        );

        let crawler = Crawler::new(
            CrawlConfig {
                max_depth: 0,
                concurrency: 1,
                ..Default::default()
            },
            test_fetcher(),
        );

        let cancel = CancellationToken::new();
        crawler
            .run(&cancel, &[server.url("/").to_string()])
            .await
            .unwrap();

        assert_eq!(crawler.visited_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_seeds_admitted_once() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/"))
                .times(1)
                .respond_with(status_code(200)),
        );

        let crawler = Crawler::new(
            CrawlConfig {
                max_depth: 0,
                ..Default::default()
            },
            test_fetcher(),
        );

        let cancel = CancellationToken::new();
        let root = server.url("/").to_string();
        crawler
            .run(&cancel, &[root.clone(), root.clone(), format!("{root}#frag")])
            .await
            .unwrap();

        assert_eq!(crawler.visited_count(), 1);
    }

    #[tokio::test]
    async fn test_run_with_no_admissible_seeds_returns() {
        let crawler = Crawler::new(CrawlConfig::default(), test_fetcher());
        let cancel = CancellationToken::new();
        crawler
            .run(&cancel, &["ftp://example.com/".to_string()])
            .await
            .unwrap();
        assert_eq!(crawler.visited_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_run() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/"))
                .times(..)
                .respond_with(delay_and_then(
                    std::time::Duration::from_millis(100),
                    status_code(200)
                        .append_header("Content-Type", "text/html")
                        .body("<a href=\"/next\">next</a>"),
                )),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/next"))
                .times(..)
                .respond_with(status_code(200)),
        );

        let crawler = Crawler::new(
            CrawlConfig {
                max_depth: 10,
                concurrency: 1,
                ..Default::default()
            },
            test_fetcher(),
        );

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });

        let err = crawler
            .run(&cancel, &[server.url("/").to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
