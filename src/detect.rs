//! Bot-defense challenge classification.
//!
//! Each detector is a pure function over a fetch result. The chain runs in a
//! fixed order and stops at the first match, so every result is attributed to
//! at most one vendor.

use crate::storage::FetchResult;

/// A detector examines a fetch result and returns the vendor tag if that
/// vendor's challenge or block page is recognized.
pub type Detector = fn(&FetchResult) -> Option<&'static str>;

/// The standard detector chain, in evaluation order.
pub fn default_detectors() -> &'static [Detector] {
    &[
        detect_cloudflare,
        detect_akamai,
        detect_datadome,
        detect_perimeterx,
    ]
}

/// Runs the result through the detectors, stopping at the first match and
/// updating the result's detection fields in place. When nothing matches the
/// fields are cleared, so re-running the chain is idempotent.
pub fn analyze(result: &mut FetchResult, detectors: &[Detector]) -> bool {
    for detector in detectors {
        if let Some(source) = detector(result) {
            result.detected_bot = true;
            result.detection_source = source.to_string();
            return true;
        }
    }
    result.detected_bot = false;
    result.detection_source.clear();
    false
}

fn header_lower(result: &FetchResult, name: &str) -> String {
    result.header(name).unwrap_or_default().to_ascii_lowercase()
}

fn has_header(result: &FetchResult, name: &str) -> bool {
    result.header(name).is_some_and(|value| !value.is_empty())
}

fn body_contains(result: &FetchResult, needle: &str) -> bool {
    let needle = needle.as_bytes();
    !needle.is_empty()
        && result
            .body
            .windows(needle.len())
            .any(|window| window == needle)
}

/// Cloudflare challenges commonly answer 403 or 503.
fn detect_cloudflare(result: &FetchResult) -> Option<&'static str> {
    if result.status_code != 403 && result.status_code != 503 {
        return None;
    }

    if header_lower(result, "Server").contains("cloudflare")
        || body_contains(result, "cf-browser-verification")
        || body_contains(result, "cloudflare-nginx")
        || body_contains(result, "cf-turnstile")
        || body_contains(result, "Attention Required! | Cloudflare")
    {
        return Some("Cloudflare");
    }
    None
}

/// Akamai Bot Manager serves a generic "Reference #" block page.
fn detect_akamai(result: &FetchResult) -> Option<&'static str> {
    if result.status_code != 403 {
        return None;
    }

    if header_lower(result, "Server").contains("akamai")
        || (body_contains(result, "Reference #") && body_contains(result, "Access Denied"))
    {
        return Some("Akamai");
    }
    None
}

fn detect_datadome(result: &FetchResult) -> Option<&'static str> {
    if result.status_code != 403 {
        return None;
    }

    if header_lower(result, "Server").contains("datadome")
        || has_header(result, "X-DataDome")
        || has_header(result, "X-DataDome-Response")
        || body_contains(result, "geo.captcha-delivery.com")
        || body_contains(result, "datadome")
    {
        return Some("DataDome");
    }
    None
}

fn detect_perimeterx(result: &FetchResult) -> Option<&'static str> {
    if result.status_code != 403 {
        return None;
    }

    if has_header(result, "X-Px-Captcha")
        || body_contains(result, "client.perimeterx.net")
        || body_contains(result, "px-captcha")
        || body_contains(result, "_pxBlock")
    {
        return Some("PerimeterX");
    }
    None
}
