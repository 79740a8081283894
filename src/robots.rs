//! robots.txt auditing with a per-host cache.
//!
//! The auditor fetches each host's robots.txt at most once via the shared
//! fetcher, parses it with the `robotstxt` matcher, and answers allow/deny
//! for a given user-agent. A failed or 4xx fetch caches an allow-all
//! sentinel so the host is not re-fetched.

use std::collections::HashMap;
use std::sync::Arc;

use robotstxt::DefaultMatcher;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::fetcher::Fetcher;
use crate::{Error, Result};

/// A host's parsed robots.txt along with its sitemap directives.
#[derive(Debug, Clone)]
pub struct RobotsRecord {
    content: String,
    sitemaps: Vec<String>,
}

/// Fetches, caches, and enforces robots.txt per host.
pub struct RobotsAuditor {
    fetcher: Arc<Fetcher>,
    // None caches "fetch failed or 4xx": treat as allow-all. The single
    // mutex serializes concurrent cache misses; re-checking the map after
    // acquisition prevents duplicate fetches.
    cache: Mutex<HashMap<String, Option<RobotsRecord>>>,
}

impl RobotsAuditor {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        RobotsAuditor {
            fetcher,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Determines whether the URL is allowed by the host's robots.txt for
    /// the provided user-agent. Fails open: hosts whose robots.txt cannot be
    /// fetched permit everything.
    pub async fn is_allowed(
        &self,
        cancel: &CancellationToken,
        target_url: &str,
        user_agent: &str,
    ) -> Result<bool> {
        let parsed = Url::parse(target_url)?;
        let key = parsed.origin().ascii_serialization();

        let record = self.get_or_fetch(cancel, &key).await?;
        match record {
            None => Ok(true),
            Some(record) => {
                let mut matcher = DefaultMatcher::default();
                Ok(matcher.one_agent_allowed_by_robots(&record.content, user_agent, target_url))
            }
        }
    }

    /// Returns the sitemap URLs declared in the host's robots.txt. The host
    /// may be given with or without a scheme; bare hosts default to http.
    pub async fn sitemap_extracts(
        &self,
        cancel: &CancellationToken,
        host: &str,
    ) -> Result<Vec<String>> {
        let key = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{host}")
        };

        match self.get_or_fetch(cancel, &key).await {
            Ok(Some(record)) => Ok(record.sitemaps.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn get_or_fetch(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<Option<RobotsRecord>> {
        let mut cache = self.cache.lock().await;
        if let Some(record) = cache.get(key) {
            return Ok(record.clone());
        }

        let robots_url = format!("{key}/robots.txt");
        let result = self.fetcher.fetch_robots(cancel, &robots_url).await;

        if !result.error.is_empty() || result.status_code >= 400 {
            log::debug!(
                "robots.txt unavailable for {key} (status {}, error {:?}); defaulting to allow",
                result.status_code,
                result.error
            );
            cache.insert(key.to_string(), None);
            return Ok(None);
        }

        let content = match String::from_utf8(result.body) {
            Ok(content) => content,
            Err(err) => {
                cache.insert(key.to_string(), None);
                return Err(Error::RobotsParse(format!(
                    "robots.txt for {key} is not valid UTF-8: {err}"
                )));
            }
        };

        let record = RobotsRecord {
            sitemaps: extract_sitemaps(&content),
            content,
        };
        cache.insert(key.to_string(), Some(record.clone()));
        Ok(Some(record))
    }
}

fn extract_sitemaps(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (directive, value) = line.split_once(':')?;
            if directive.trim().eq_ignore_ascii_case("sitemap") {
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_string())
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchConfig;
    use crate::fingerprint::Profile;
    use httptest::{matchers::*, responders::*, Expectation, Server};

    fn test_auditor() -> (RobotsAuditor, CancellationToken) {
        crate::initialization::init_crypto_provider();
        let fetcher = Arc::new(
            Fetcher::new(FetchConfig {
                profile: Profile::Standard,
                ..Default::default()
            })
            .expect("fetcher construction"),
        );
        (RobotsAuditor::new(fetcher), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_allow_and_deny() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/robots.txt"))
                .respond_with(status_code(200).body("User-agent: *\nDisallow: /blocked\n")),
        );

        let (auditor, cancel) = test_auditor();
        let allowed_url = server.url("/allowed").to_string();
        let blocked_url = server.url("/blocked").to_string();

        assert!(auditor.is_allowed(&cancel, &allowed_url, "*").await.unwrap());
        assert!(!auditor.is_allowed(&cancel, &blocked_url, "*").await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_404_caches_allow_all() {
        let server = Server::run();
        // The cache must keep a single fetch from repeating.
        server.expect(
            Expectation::matching(request::method_path("GET", "/robots.txt"))
                .times(1)
                .respond_with(status_code(404)),
        );

        let (auditor, cancel) = test_auditor();
        let url = server.url("/anything").to_string();

        assert!(auditor.is_allowed(&cancel, &url, "*").await.unwrap());
        assert!(auditor.is_allowed(&cancel, &url, "*").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_open() {
        let (auditor, cancel) = test_auditor();
        let allowed = auditor
            .is_allowed(&cancel, "http://127.0.0.1:1/page", "*")
            .await
            .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let (auditor, cancel) = test_auditor();
        let err = auditor
            .is_allowed(&cancel, "not a url", "*")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UrlParse(_)));
    }

    #[tokio::test]
    async fn test_user_agent_specific_rules() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/robots.txt")).respond_with(
                status_code(200)
                    .body("User-agent: badbot\nDisallow: /\n\nUser-agent: *\nAllow: /\n"),
            ),
        );

        let (auditor, cancel) = test_auditor();
        let url = server.url("/page").to_string();

        assert!(!auditor.is_allowed(&cancel, &url, "badbot").await.unwrap());
        assert!(auditor.is_allowed(&cancel, &url, "goodbot").await.unwrap());
    }

    #[tokio::test]
    async fn test_sitemap_extracts() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/robots.txt")).respond_with(
                status_code(200).body(
                    "User-agent: *\nDisallow:\nSitemap: https://example.com/sitemap.xml\nsitemap: https://example.com/news.xml\n",
                ),
            ),
        );

        let (auditor, cancel) = test_auditor();
        let host = format!("http://{}", server.addr());
        let sitemaps = auditor.sitemap_extracts(&cancel, &host).await.unwrap();

        assert_eq!(
            sitemaps,
            vec![
                "https://example.com/sitemap.xml".to_string(),
                "https://example.com/news.xml".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_sitemaps_ignores_other_directives() {
        let content = "User-agent: *\nDisallow: /private\nSitemap: https://a.test/s.xml\n";
        assert_eq!(extract_sitemaps(content), vec!["https://a.test/s.xml"]);
        assert!(extract_sitemaps("User-agent: *\n").is_empty());
    }
}
