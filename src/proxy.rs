//! Proxy endpoint rotation with health tracking.
//!
//! The pool hands out proxies round-robin and tracks failure bursts per
//! endpoint. A proxy that accumulates `max_failures` failures is excluded
//! from rotation for the cooldown interval, after which it is revived with
//! a clean failure counter.

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use url::Url;

use crate::{Error, Result};

const DEFAULT_MAX_FAILURES: u32 = 3;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// A single proxy endpoint with health tracking.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub url: Url,
    pub failures: u32,
    pub successes: u64,
    pub disabled: bool,
    pub disabled_until: Option<Instant>,
    pub last_used: Option<Instant>,
}

struct PoolState {
    proxies: Vec<Proxy>,
    cursor: usize,
}

/// A rotating collection of proxies. All state sits behind one mutex;
/// operations are O(n) over the pool and expected to be cheap.
pub struct ProxyPool {
    state: Mutex<PoolState>,
    max_failures: u32,
    cooldown: Duration,
}

impl ProxyPool {
    /// Creates a new pool. Zero values fall back to 3 failures / 5 minutes.
    pub fn new(max_failures: u32, cooldown: Duration) -> Self {
        let max_failures = if max_failures == 0 {
            DEFAULT_MAX_FAILURES
        } else {
            max_failures
        };
        let cooldown = if cooldown.is_zero() {
            DEFAULT_COOLDOWN
        } else {
            cooldown
        };
        ProxyPool {
            state: Mutex::new(PoolState {
                proxies: Vec::new(),
                cursor: 0,
            }),
            max_failures,
            cooldown,
        }
    }

    /// Parses raw URL strings and adds them to the pool. Inputs without a
    /// scheme default to `http://`. Only `http`, `https`, and `socks5`
    /// proxies are accepted.
    pub fn add<I, S>(&self, raw_urls: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock().expect("proxy pool lock poisoned");
        for raw in raw_urls {
            let raw = raw.as_ref();
            let with_scheme = if raw.contains("://") {
                raw.to_string()
            } else {
                format!("http://{raw}")
            };
            let url = Url::parse(&with_scheme)?;
            match url.scheme() {
                "http" | "https" | "socks5" => {}
                other => {
                    return Err(Error::Config(format!(
                        "unsupported proxy scheme {other:?} in {raw:?}"
                    )))
                }
            }
            state.proxies.push(Proxy {
                url,
                failures: 0,
                successes: 0,
                disabled: false,
                disabled_until: None,
                last_used: None,
            });
        }
        Ok(())
    }

    /// Reads proxies from a file, one URL per line. Empty lines and lines
    /// starting with `#` are ignored.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        let urls: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        self.add(urls)
    }

    /// Returns the next healthy proxy URL, advancing the internal cursor.
    /// Proxies whose cooldown has elapsed are re-enabled with their failure
    /// counter reset. Returns `None` if a full revolution finds no healthy
    /// entry.
    pub fn next(&self) -> Option<Url> {
        let mut state = self.state.lock().expect("proxy pool lock poisoned");
        if state.proxies.is_empty() {
            return None;
        }

        let now = Instant::now();
        let len = state.proxies.len();
        let start = state.cursor;

        loop {
            let idx = state.cursor;
            state.cursor = (state.cursor + 1) % len;

            let proxy = &mut state.proxies[idx];
            if proxy.disabled && proxy.disabled_until.is_some_and(|until| now >= until) {
                proxy.disabled = false;
                proxy.failures = 0;
            }

            if !proxy.disabled {
                proxy.last_used = Some(now);
                return Some(proxy.url.clone());
            }

            if state.cursor == start {
                return None;
            }
        }
    }

    /// Records a successful request through the given proxy, decrementing its
    /// failure counter toward zero.
    pub fn mark_success(&self, proxy_url: &Url) -> Result<()> {
        let mut state = self.state.lock().expect("proxy pool lock poisoned");
        let proxy = find_proxy(&mut state.proxies, proxy_url)
            .ok_or_else(|| Error::ProxyNotFound(proxy_url.to_string()))?;
        proxy.successes += 1;
        proxy.failures = proxy.failures.saturating_sub(1);
        Ok(())
    }

    /// Records a failed request through the given proxy. At the failure
    /// threshold the proxy is disabled for the cooldown interval.
    pub fn mark_failure(&self, proxy_url: &Url) -> Result<()> {
        let mut state = self.state.lock().expect("proxy pool lock poisoned");
        let proxy = find_proxy(&mut state.proxies, proxy_url)
            .ok_or_else(|| Error::ProxyNotFound(proxy_url.to_string()))?;
        proxy.failures += 1;
        if proxy.failures >= self.max_failures {
            proxy.disabled = true;
            proxy.disabled_until = Some(Instant::now() + self.cooldown);
        }
        Ok(())
    }

    /// Returns the number of proxies in the pool.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .expect("proxy pool lock poisoned")
            .proxies
            .len()
    }

    /// Returns true if the pool holds no proxies.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn find_proxy<'a>(proxies: &'a mut [Proxy], url: &Url) -> Option<&'a mut Proxy> {
    let target = url.as_str();
    proxies.iter_mut().find(|p| p.url.as_str() == target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_add_defaults_scheme() {
        let pool = ProxyPool::new(3, Duration::from_secs(60));
        pool.add(["198.51.100.7:8080"]).unwrap();
        let url = pool.next().unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_str(), Some("198.51.100.7"));
    }

    #[test]
    fn test_add_rejects_unsupported_scheme() {
        let pool = ProxyPool::new(3, Duration::from_secs(60));
        let err = pool.add(["ftp://198.51.100.7:21"]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_round_robin_rotation() {
        let pool = ProxyPool::new(3, Duration::from_secs(60));
        pool.add(["http://a.test:1", "http://b.test:2"]).unwrap();

        let first = pool.next().unwrap();
        let second = pool.next().unwrap();
        let third = pool.next().unwrap();
        assert_ne!(first.as_str(), second.as_str());
        assert_eq!(first.as_str(), third.as_str());
    }

    #[test]
    fn test_empty_pool_returns_none() {
        let pool = ProxyPool::new(3, Duration::from_secs(60));
        assert!(pool.next().is_none());
    }

    #[test]
    fn test_failures_disable_then_cooldown_revives() {
        let pool = ProxyPool::new(2, Duration::from_millis(50));
        pool.add(["http://a.test:1"]).unwrap();
        let url = pool.next().unwrap();

        pool.mark_failure(&url).unwrap();
        pool.mark_failure(&url).unwrap();
        assert!(pool.next().is_none(), "disabled proxy must not rotate");

        std::thread::sleep(Duration::from_millis(60));
        let revived = pool.next().unwrap();
        assert_eq!(revived.as_str(), url.as_str());

        // Failure counter reset on revival: one more failure must not disable.
        pool.mark_failure(&url).unwrap();
        assert!(pool.next().is_some());
    }

    #[test]
    fn test_success_decrements_failures() {
        let pool = ProxyPool::new(2, Duration::from_secs(60));
        pool.add(["http://a.test:1"]).unwrap();
        let url = pool.next().unwrap();

        pool.mark_failure(&url).unwrap();
        pool.mark_success(&url).unwrap();
        // One failure was absorbed by the success, so one more does not
        // reach the threshold of two.
        pool.mark_failure(&url).unwrap();
        assert!(pool.next().is_some());
    }

    #[test]
    fn test_mark_unknown_proxy_fails() {
        let pool = ProxyPool::new(3, Duration::from_secs(60));
        let unknown = Url::parse("http://unknown.test:1").unwrap();
        assert!(matches!(
            pool.mark_success(&unknown),
            Err(Error::ProxyNotFound(_))
        ));
        assert!(matches!(
            pool.mark_failure(&unknown),
            Err(Error::ProxyNotFound(_))
        ));
    }

    #[test]
    fn test_load_file_skips_comments_and_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# proxy list").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "http://a.test:1").unwrap();
        writeln!(file, "b.test:2").unwrap();
        file.flush().unwrap();

        let pool = ProxyPool::new(3, Duration::from_secs(60));
        pool.load_file(file.path()).unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_skips_disabled_entries() {
        let pool = ProxyPool::new(1, Duration::from_secs(600));
        pool.add(["http://a.test:1", "http://b.test:2"]).unwrap();

        let first = pool.next().unwrap();
        pool.mark_failure(&first).unwrap();

        // Only the healthy proxy should come back, every time.
        for _ in 0..4 {
            let url = pool.next().unwrap();
            assert_ne!(url.as_str(), first.as_str());
        }
    }
}
