use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crawlcheck::config::Opt;
use crawlcheck::initialization::{init_crypto_provider, init_logger_with};
use crawlcheck::metrics::{start_metrics_server, Observer, ScrapeMetrics};
use crawlcheck::storage::{Backend, MemoryBackend, SqliteBackend};
use crawlcheck::{CrawlConfig, Crawler, Error, FetchConfig, Fetcher, Profile, ProxyPool, UaPool};

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    init_logger_with(opt.log_level.clone().into(), opt.log_format.clone())
        .context("Failed to initialize logger")?;
    init_crypto_provider();

    let profile = Profile::from_str(&opt.fingerprint)
        .with_context(|| format!("Invalid fingerprint profile {:?}", opt.fingerprint))?;

    let proxy_pool = if !opt.proxies.is_empty() || opt.proxy_file.is_some() {
        let pool = ProxyPool::new(
            opt.proxy_max_failures,
            Duration::from_secs(opt.proxy_cooldown_seconds),
        );
        pool.add(opt.proxies.iter().map(String::as_str))
            .context("Failed to add proxies")?;
        if let Some(path) = &opt.proxy_file {
            pool.load_file(path)
                .with_context(|| format!("Failed to load proxy file {}", path.display()))?;
        }
        info!("proxy pool loaded with {} endpoint(s)", pool.len());
        Some(Arc::new(pool))
    } else {
        None
    };

    let metrics = Arc::new(ScrapeMetrics::new());
    if let Some(port) = opt.metrics_port {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(err) = start_metrics_server(port, metrics).await {
                warn!("metrics server error: {err}");
            }
        });
    }

    let fetcher = Fetcher::new(FetchConfig {
        timeout: Duration::from_secs(opt.timeout_seconds),
        max_redirects: opt.max_redirects,
        use_cookie_jar: opt.cookie_jar,
        proxy_pool,
        ua_pool: Some(Arc::new(UaPool::default())),
        profile,
        limiter: None,
    })
    .context("Failed to build fetcher")?
    .with_observer(Arc::clone(&metrics) as Arc<dyn Observer>);

    let backend: Arc<dyn Backend> = match &opt.db_path {
        Some(path) => Arc::new(
            SqliteBackend::new(path)
                .await
                .with_context(|| format!("Failed to open database {}", path.display()))?,
        ),
        None => Arc::new(MemoryBackend::new()),
    };

    let crawler = Crawler::new(
        CrawlConfig {
            max_depth: opt.max_depth,
            concurrency: opt.concurrency,
            domains: opt.domains.clone(),
            respect_robots: opt.respect_robots,
            user_agent: opt.user_agent.clone(),
            rps: opt.rps,
            jitter: opt.jitter,
            queue_size: opt.queue_size,
        },
        Arc::new(fetcher),
    )
    .with_backend(Arc::clone(&backend))
    .with_observer(Arc::clone(&metrics) as Arc<dyn Observer>);

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping crawl");
            ctrl_c_cancel.cancel();
        }
    });

    info!(
        "starting crawl of {} seed(s), max_depth={}, concurrency={}",
        opt.seeds.len(),
        opt.max_depth,
        opt.concurrency
    );

    match crawler.run(&cancel, &opt.seeds).await {
        Ok(()) => {
            let snapshot = metrics.snapshot();
            info!(
                "crawl complete: {} URL(s) visited, {} request(s), {} challenge(s) detected, {} error(s) in {:.1}s",
                crawler.visited_count(),
                snapshot.total_requests,
                snapshot.detected_requests,
                snapshot.error_requests,
                snapshot.elapsed_seconds
            );
        }
        Err(Error::Cancelled) => {
            warn!(
                "crawl cancelled after {} URL(s) visited",
                crawler.visited_count()
            );
        }
        Err(err) => return Err(err).context("Crawl failed"),
    }

    backend.close().await.context("Failed to close sink")?;

    Ok(())
}
