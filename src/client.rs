//! HTTP client construction: timeout, redirect cap, cookie jar.
//!
//! Clients are built from a [`fingerprint::client_builder`] so the TLS shape
//! and standing headers follow the configured profile. A shared cookie jar
//! can be installed so every client built for one configuration (the direct
//! client and any per-proxy clients) accumulates the same session state.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use url::Url;

use crate::fingerprint::{self, Profile};
use crate::Result;

/// Configuration shared by every client a fetcher builds.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request deadline.
    pub timeout: Duration,
    /// Redirect cap: `n >= 0` follows at most `n` redirects and treats the
    /// `n+1`-th as a transport error; `-1` disables following entirely and
    /// returns the redirect response as-is.
    pub max_redirects: i32,
    /// Whether clients share a cookie jar for session persistence.
    pub use_cookie_jar: bool,
    /// Fingerprint profile for the TLS transport and standing headers.
    pub profile: Profile,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            timeout: Duration::from_secs(30),
            max_redirects: 10,
            use_cookie_jar: false,
            profile: Profile::default(),
        }
    }
}

/// Builds a client for the configuration, optionally routed through a proxy.
pub(crate) fn build_client(
    config: &ClientConfig,
    jar: Option<&Arc<Jar>>,
    proxy: Option<&Url>,
) -> Result<reqwest::Client> {
    build_client_with_redirects(config, jar, proxy, config.max_redirects)
}

/// Same as [`build_client`] but with an explicit redirect cap, used for the
/// robots.txt client which follows up to five redirects regardless of the
/// crawl-wide setting.
pub(crate) fn build_client_with_redirects(
    config: &ClientConfig,
    jar: Option<&Arc<Jar>>,
    proxy: Option<&Url>,
    max_redirects: i32,
) -> Result<reqwest::Client> {
    let mut builder = fingerprint::client_builder(config.profile)?.timeout(config.timeout);

    builder = if max_redirects < 0 {
        builder.redirect(Policy::none())
    } else {
        builder.redirect(Policy::limited(max_redirects as usize))
    };

    if let Some(jar) = jar {
        builder = builder.cookie_provider(Arc::clone(jar));
    }

    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_variants() {
        crate::initialization::init_crypto_provider();
        let config = ClientConfig::default();

        build_client(&config, None, None).unwrap();

        let jar = Arc::new(Jar::default());
        build_client(&config, Some(&jar), None).unwrap();

        let proxy = Url::parse("http://127.0.0.1:3128").unwrap();
        build_client(&config, Some(&jar), Some(&proxy)).unwrap();

        let no_follow = ClientConfig {
            max_redirects: -1,
            ..ClientConfig::default()
        };
        build_client(&no_follow, None, None).unwrap();
    }

    #[tokio::test]
    async fn test_redirect_cap_enforced() {
        crate::initialization::init_crypto_provider();
        use httptest::{matchers::*, responders::*, Expectation, Server};

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/hop"))
                .times(..)
                .respond_with(status_code(302).append_header("Location", "/hop")),
        );

        let config = ClientConfig {
            max_redirects: 2,
            ..ClientConfig::default()
        };
        let client = build_client(&config, None, None).unwrap();
        let err = client
            .get(server.url("/hop").to_string())
            .send()
            .await
            .unwrap_err();
        assert!(err.is_redirect());
    }

    #[tokio::test]
    async fn test_disabled_redirects_return_response() {
        crate::initialization::init_crypto_provider();
        use httptest::{matchers::*, responders::*, Expectation, Server};

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/hop"))
                .respond_with(status_code(302).append_header("Location", "/elsewhere")),
        );

        let config = ClientConfig {
            max_redirects: -1,
            ..ClientConfig::default()
        };
        let client = build_client(&config, None, None).unwrap();
        let response = client
            .get(server.url("/hop").to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 302);
    }
}
