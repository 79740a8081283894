//! Command-line options and shared defaults.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

// constants (used as defaults)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_REDIRECTS: i32 = 10;
pub const DEFAULT_PROXY_MAX_FAILURES: u32 = 3;
pub const DEFAULT_PROXY_COOLDOWN_SECS: u64 = 300;

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "crawlcheck",
    about = "Crawls seed URLs while auditing bot defenses along the way."
)]
pub struct Opt {
    /// Seed URLs to crawl from
    #[arg(value_parser, required = true)]
    pub seeds: Vec<String>,

    /// Maximum link depth; 0 fetches only the seeds
    #[arg(long, default_value_t = 2)]
    pub max_depth: usize,

    /// Number of concurrent crawl workers
    #[arg(long, default_value_t = 3)]
    pub concurrency: usize,

    /// Bounded job queue capacity
    #[arg(long, default_value_t = 10_000)]
    pub queue_size: usize,

    /// In-scope domain (repeatable); empty means unrestricted
    #[arg(long = "domain")]
    pub domains: Vec<String>,

    /// Check robots.txt before fetching
    #[arg(long)]
    pub respect_robots: bool,

    /// User-Agent identity used for robots.txt group matching
    #[arg(long, default_value = "*")]
    pub user_agent: String,

    /// Requests per second across all workers (0 disables pacing)
    #[arg(long, default_value_t = 0.0)]
    pub rps: f64,

    /// Rate limiter jitter factor, 0.0 to 1.0
    #[arg(long, default_value_t = 0.0)]
    pub jitter: f64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_seconds: u64,

    /// Redirect cap per request; -1 disables following
    #[arg(long, default_value_t = DEFAULT_MAX_REDIRECTS, allow_hyphen_values = true)]
    pub max_redirects: i32,

    /// Persist cookies across requests for the whole crawl
    #[arg(long)]
    pub cookie_jar: bool,

    /// Proxy endpoint (repeatable); http, https, or socks5
    #[arg(long = "proxy")]
    pub proxies: Vec<String>,

    /// File with one proxy URL per line (# comments allowed)
    #[arg(long)]
    pub proxy_file: Option<PathBuf>,

    /// Failures before a proxy is cooled down
    #[arg(long, default_value_t = DEFAULT_PROXY_MAX_FAILURES)]
    pub proxy_max_failures: u32,

    /// Proxy cooldown in seconds
    #[arg(long, default_value_t = DEFAULT_PROXY_COOLDOWN_SECS)]
    pub proxy_cooldown_seconds: u64,

    /// TLS fingerprint profile: chrome|firefox|safari|standard|randomized
    #[arg(long, default_value = "chrome")]
    pub fingerprint: String,

    /// SQLite database to persist results into (in-memory sink if omitted)
    #[arg(long, value_parser)]
    pub db_path: Option<PathBuf>,

    /// Port for the /metrics and /status endpoints (disabled if omitted)
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_minimal_invocation() {
        let opt = Opt::try_parse_from(["crawlcheck", "https://example.com/"]).unwrap();
        assert_eq!(opt.seeds, vec!["https://example.com/"]);
        assert_eq!(opt.max_depth, 2);
        assert_eq!(opt.concurrency, 3);
        assert_eq!(opt.fingerprint, "chrome");
        assert!(!opt.respect_robots);
    }

    #[test]
    fn test_requires_at_least_one_seed() {
        assert!(Opt::try_parse_from(["crawlcheck"]).is_err());
    }

    #[test]
    fn test_repeatable_flags() {
        let opt = Opt::try_parse_from([
            "crawlcheck",
            "https://example.com/",
            "--domain",
            "example.com",
            "--domain",
            "example.org",
            "--proxy",
            "http://p1.test:8080",
            "--max-redirects",
            "-1",
        ])
        .unwrap();
        assert_eq!(opt.domains.len(), 2);
        assert_eq!(opt.proxies.len(), 1);
        assert_eq!(opt.max_redirects, -1);
    }
}
