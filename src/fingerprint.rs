//! Browser fingerprint profiles for the HTTP transport.
//!
//! A profile selects the TLS ClientHello shape and the standing header set
//! presented to origin servers. Browser profiles install a custom rustls
//! configuration whose cipher-suite ordering and ALPN list follow the target
//! browser, together with that browser's characteristic request headers.
//! rustls does not expose GREASE slots or extension ordering, so the profile
//! controls everything rustls can express; header-layer imitation carries the
//! rest.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rustls::crypto::CryptoProvider;
use rustls::{CipherSuite, RootCertStore};

use crate::{Error, Result};

/// A recognized TLS fingerprint profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Chrome,
    Firefox,
    Safari,
    /// The stock rustls client with no imitation applied.
    Standard,
    /// A browser profile picked at random per client.
    Randomized,
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" => Ok(Profile::Chrome),
            "firefox" => Ok(Profile::Firefox),
            "safari" => Ok(Profile::Safari),
            "standard" => Ok(Profile::Standard),
            "randomized" => Ok(Profile::Randomized),
            other => Err(Error::Config(format!(
                "unknown fingerprint profile {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Profile::Chrome => "chrome",
            Profile::Firefox => "firefox",
            Profile::Safari => "safari",
            Profile::Standard => "standard",
            Profile::Randomized => "randomized",
        };
        write!(f, "{tag}")
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Chrome
    }
}

// TLS 1.3 suites lead; 1.2 ECDHE suites follow in each browser's published
// preference order.
const CHROME_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
];

const FIREFOX_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
];

const SAFARI_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
];

/// Returns a `reqwest::ClientBuilder` preconfigured for the profile.
///
/// The caller applies its own timeout, redirect policy, cookie jar, and proxy
/// on top; this function only decides the transport's TLS shape and the
/// standing headers.
pub fn client_builder(profile: Profile) -> Result<reqwest::ClientBuilder> {
    let profile = match profile {
        Profile::Randomized => random_browser_profile(),
        other => other,
    };

    match profile {
        Profile::Standard => Ok(reqwest::Client::builder()),
        Profile::Chrome => browser_builder(CHROME_SUITES, chrome_headers()),
        Profile::Firefox => browser_builder(FIREFOX_SUITES, firefox_headers()),
        Profile::Safari => browser_builder(SAFARI_SUITES, safari_headers()),
        Profile::Randomized => unreachable!("resolved above"),
    }
}

fn random_browser_profile() -> Profile {
    match rand::thread_rng().gen_range(0..3) {
        0 => Profile::Chrome,
        1 => Profile::Firefox,
        _ => Profile::Safari,
    }
}

fn browser_builder(
    suites: &[CipherSuite],
    headers: HeaderMap,
) -> Result<reqwest::ClientBuilder> {
    let tls = browser_tls_config(suites)?;
    Ok(reqwest::Client::builder()
        .use_preconfigured_tls(tls)
        .default_headers(headers))
}

fn browser_tls_config(suites: &[CipherSuite]) -> Result<rustls::ClientConfig> {
    let provider = ordered_provider(suites);

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut config = rustls::ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
        .map_err(|e| Error::Config(format!("TLS configuration rejected: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// Restricts and reorders the ring provider's cipher suites to the given
/// preference list. Suites the provider does not implement are skipped.
fn ordered_provider(order: &[CipherSuite]) -> CryptoProvider {
    let mut provider = rustls::crypto::ring::default_provider();
    let mut ordered = Vec::with_capacity(order.len());
    for wanted in order {
        if let Some(suite) = provider
            .cipher_suites
            .iter()
            .find(|suite| suite.suite() == *wanted)
        {
            ordered.push(*suite);
        }
    }
    if !ordered.is_empty() {
        provider.cipher_suites = ordered;
    }
    provider
}

fn chrome_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        ),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua"),
        HeaderValue::from_static(
            "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
        ),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-mobile"),
        HeaderValue::from_static("?0"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-platform"),
        HeaderValue::from_static("\"Windows\""),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("none"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-user"),
        HeaderValue::from_static("?1"),
    );
    headers.insert(
        reqwest::header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

fn firefox_headers() -> HeaderMap {
    // Firefox sends no client-hint headers.
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("none"),
    );
    headers.insert(
        reqwest::header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

fn safari_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(
        reqwest::header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_str() {
        assert_eq!(Profile::from_str("chrome").unwrap(), Profile::Chrome);
        assert_eq!(Profile::from_str("FIREFOX").unwrap(), Profile::Firefox);
        assert_eq!(Profile::from_str("Safari").unwrap(), Profile::Safari);
        assert_eq!(Profile::from_str("standard").unwrap(), Profile::Standard);
        assert_eq!(
            Profile::from_str("randomized").unwrap(),
            Profile::Randomized
        );
    }

    #[test]
    fn test_unknown_profile_is_config_error() {
        let err = Profile::from_str("netscape").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_suite_ordering_respected() {
        crate::initialization::init_crypto_provider();
        let provider = ordered_provider(FIREFOX_SUITES);
        let suites: Vec<CipherSuite> = provider.cipher_suites.iter().map(|s| s.suite()).collect();
        assert_eq!(suites.first(), Some(&CipherSuite::TLS13_AES_128_GCM_SHA256));
        assert_eq!(
            suites.get(1),
            Some(&CipherSuite::TLS13_CHACHA20_POLY1305_SHA256)
        );
    }

    #[tokio::test]
    async fn test_builders_construct_clients() {
        crate::initialization::init_crypto_provider();
        for profile in [
            Profile::Chrome,
            Profile::Firefox,
            Profile::Safari,
            Profile::Standard,
            Profile::Randomized,
        ] {
            let builder = client_builder(profile).unwrap();
            builder.build().unwrap();
        }
    }
}
