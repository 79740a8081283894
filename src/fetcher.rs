//! Single-URL fetching with identity rotation and challenge annotation.
//!
//! A [`Fetcher`] owns its HTTP clients for its whole lifetime, so connection
//! pools and the optional cookie jar persist across fetches. Transport-level
//! failures are embedded in the returned [`FetchResult`] rather than
//! propagated: `fetch` always returns a result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::cookie::Jar;
use reqwest::header;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::{self, ClientConfig};
use crate::detect;
use crate::fingerprint::Profile;
use crate::metrics::Observer;
use crate::proxy::ProxyPool;
use crate::ratelimit::Limiter;
use crate::storage::FetchResult;
use crate::useragent::UaPool;
use crate::Result;

/// Redirect budget applied to robots.txt fetches regardless of the
/// crawl-wide redirect setting.
const ROBOTS_MAX_REDIRECTS: i32 = 5;

/// Configures a fetcher.
#[derive(Clone)]
pub struct FetchConfig {
    /// Per-request deadline. Defaults to 30 seconds.
    pub timeout: Duration,
    /// Redirect cap; `-1` disables following. Defaults to 10.
    pub max_redirects: i32,
    /// Persist cookies across this fetcher's requests.
    pub use_cookie_jar: bool,
    /// Optional proxy rotation.
    pub proxy_pool: Option<Arc<ProxyPool>>,
    /// Identity pool; defaults to the built-in browser list.
    pub ua_pool: Option<Arc<UaPool>>,
    /// TLS/header fingerprint profile. Defaults to Chrome.
    pub profile: Profile,
    /// Optional fetcher-level rate limiter, independent of any crawler-level
    /// limiter.
    pub limiter: Option<Arc<Limiter>>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout: Duration::from_secs(30),
            max_redirects: 10,
            use_cookie_jar: false,
            proxy_pool: None,
            ua_pool: None,
            profile: Profile::default(),
            limiter: None,
        }
    }
}

/// Performs single URL fetches using the configured evasion strategies.
pub struct Fetcher {
    config: FetchConfig,
    client_config: ClientConfig,
    ua_pool: Arc<UaPool>,
    jar: Option<Arc<Jar>>,
    base: reqwest::Client,
    robots_client: reqwest::Client,
    // One client per proxy URL so each proxy keeps its own connection pool.
    // All share the cookie jar above.
    proxied: Mutex<HashMap<String, reqwest::Client>>,
    observer: Option<Arc<dyn Observer>>,
}

impl Fetcher {
    /// Builds a fetcher. Configuration problems (unknown profile, TLS setup)
    /// surface here, never during a crawl.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client_config = ClientConfig {
            timeout: config.timeout,
            max_redirects: config.max_redirects,
            use_cookie_jar: config.use_cookie_jar,
            profile: config.profile,
        };

        let jar = config.use_cookie_jar.then(|| Arc::new(Jar::default()));
        let base = client::build_client(&client_config, jar.as_ref(), None)?;
        let robots_client = client::build_client_with_redirects(
            &client_config,
            jar.as_ref(),
            None,
            ROBOTS_MAX_REDIRECTS,
        )?;

        let ua_pool = config
            .ua_pool
            .clone()
            .unwrap_or_else(|| Arc::new(UaPool::default()));

        Ok(Fetcher {
            config,
            client_config,
            ua_pool,
            jar,
            base,
            robots_client,
            proxied: Mutex::new(HashMap::new()),
            observer: None,
        })
    }

    /// Attaches an observer that receives proxy-failure counters.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Executes a GET request against the target URL, capturing the response
    /// into a [`FetchResult`]. Errors are embedded in the result's `error`
    /// field with `status_code == 0`.
    pub async fn fetch(&self, cancel: &CancellationToken, target_url: &str) -> FetchResult {
        self.fetch_inner(cancel, target_url, false).await
    }

    /// Fetches with the robots.txt redirect budget instead of the configured
    /// one.
    pub(crate) async fn fetch_robots(
        &self,
        cancel: &CancellationToken,
        target_url: &str,
    ) -> FetchResult {
        self.fetch_inner(cancel, target_url, true).await
    }

    async fn fetch_inner(
        &self,
        cancel: &CancellationToken,
        target_url: &str,
        robots: bool,
    ) -> FetchResult {
        if let Some(limiter) = &self.config.limiter {
            if let Err(err) = limiter.wait(cancel).await {
                let mut result = FetchResult::started(target_url);
                result.error = format!("rate limiter wait failed: {err}");
                return result;
            }
        }

        let start = Instant::now();
        let mut result = FetchResult::started(target_url);

        let active_proxy = self.config.proxy_pool.as_ref().and_then(|pool| pool.next());

        let client = match &active_proxy {
            Some(proxy) => match self.client_for(proxy, robots) {
                Ok(client) => client,
                Err(err) => {
                    result.error = format!("failed to build proxied client: {err}");
                    result.duration = start.elapsed();
                    return result;
                }
            },
            None if robots => self.robots_client.clone(),
            None => self.base.clone(),
        };

        let request = client
            .get(target_url)
            .header(header::USER_AGENT, self.ua_pool.sequential())
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            )
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.5");

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                result.error = "request cancelled".to_string();
                result.duration = start.elapsed();
                return result;
            }
            response = request.send() => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                self.record_proxy_failure(active_proxy.as_ref());
                result.error = format!("request failed: {err}");
                result.duration = start.elapsed();
                return result;
            }
        };

        if let Some(proxy) = &active_proxy {
            if let Some(pool) = &self.config.proxy_pool {
                let _ = pool.mark_success(proxy);
            }
        }

        let status = response.status().as_u16();
        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in response.headers() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).to_string());
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => {
                result.error = "request cancelled".to_string();
                result.duration = start.elapsed();
                return result;
            }
            body = response.bytes() => body,
        };

        match body {
            Ok(bytes) => {
                result.status_code = status;
                result.headers = headers;
                result.body = bytes.to_vec();
                detect::analyze(&mut result, detect::default_detectors());
            }
            Err(err) => {
                // A truncated body means no usable response was produced.
                result.error = format!("failed to read body: {err}");
            }
        }

        result.duration = start.elapsed();
        result
    }

    fn client_for(&self, proxy: &Url, robots: bool) -> Result<reqwest::Client> {
        let key = if robots {
            format!("robots|{proxy}")
        } else {
            proxy.as_str().to_string()
        };

        let mut cache = self.proxied.lock().expect("proxied client lock poisoned");
        if let Some(client) = cache.get(&key) {
            return Ok(client.clone());
        }

        let max_redirects = if robots {
            ROBOTS_MAX_REDIRECTS
        } else {
            self.client_config.max_redirects
        };
        let client = client::build_client_with_redirects(
            &self.client_config,
            self.jar.as_ref(),
            Some(proxy),
            max_redirects,
        )?;
        cache.insert(key, client.clone());
        Ok(client)
    }

    fn record_proxy_failure(&self, proxy: Option<&Url>) {
        let Some(proxy) = proxy else { return };
        if let Some(pool) = &self.config.proxy_pool {
            let _ = pool.mark_failure(proxy);
        }
        if let Some(observer) = &self.observer {
            observer.record_proxy_failure(proxy.as_str());
        }
    }
}
