//! Process-level setup: logging and the TLS crypto provider.

use std::io::Write;

use colored::Colorize;
use log::LevelFilter;
use rustls::crypto::{ring::default_provider, CryptoProvider};

use crate::config::LogFormat;
use crate::{Error, Result};

/// Initializes the logger with the specified level and format.
///
/// Plain format colors the level and prefixes an emoji; JSON format emits one
/// object per line for log shippers. Noisy third-party modules are clamped.
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<()> {
    let mut builder = env_logger::Builder::new();

    builder.filter_level(level);
    builder.filter_module("html5ever", LevelFilter::Error);
    builder.filter_module("selectors", LevelFilter::Warn);
    builder.filter_module("sqlx", LevelFilter::Info);
    builder.filter_module("reqwest", LevelFilter::Info);
    builder.filter_module("hyper", LevelFilter::Info);
    builder.filter_module("crawlcheck", level);

    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{{\"ts\":{},\"level\":\"{}\",\"target\":\"{}\",\"msg\":{}}}",
                    chrono::Utc::now().timestamp_millis(),
                    record.level(),
                    record.target(),
                    serde_json::to_string(&record.args().to_string())
                        .unwrap_or_else(|_| "\"\"".into())
                )
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                let level = record.level();
                let colored_level = match level {
                    log::Level::Error => level.to_string().red(),
                    log::Level::Warn => level.to_string().yellow(),
                    log::Level::Info => level.to_string().green(),
                    log::Level::Debug => level.to_string().blue(),
                    log::Level::Trace => level.to_string().purple(),
                };

                writeln!(
                    buf,
                    "{} [{}] {}",
                    record.target().cyan(),
                    colored_level,
                    record.args()
                )
            });
        }
    }

    builder
        .try_init()
        .map_err(|e| Error::Config(format!("logger initialization failed: {e}")))?;

    Ok(())
}

/// Installs the process-wide crypto provider for rustls. Must run before any
/// TLS connection is established; reinstalling is harmless.
pub fn init_crypto_provider() {
    let _ = CryptoProvider::install_default(default_provider());
}
