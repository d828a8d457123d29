//! Initialization helpers for the application:
//! - cache backend selection
//! - upstream clients per catalog
//! - background listing primer
//!
//! This module keeps start-up wiring out of `main.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::cache::{CacheStore, MemoryCache, RedisCache};
use crate::config::Config;
use crate::models::CategoryType;
use crate::services::cns::CnsClient;
use crate::services::resolver::CategoryResolver;
use crate::services::upstream::{CatalogRouter, ScientiaClient, UpstreamClient};

/// Redact credentials from a connection URL before logging.
///
/// Attempts to parse the URL and drop userinfo (username:password).
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_url(raw: &str) -> String {
    if let Ok(url) = url::Url::parse(raw) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = raw.find('@') {
            let without_creds = &raw[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Open the configured cache backend.
///
/// Redis is used when `REDIS_URL` is set and must be reachable at start-up;
/// otherwise listings and timetables are kept in process memory.
pub async fn open_cache(config: &Config) -> Result<Arc<dyn CacheStore>> {
    match &config.redis.url {
        Some(url) => {
            tracing::info!("Connecting to Redis: {}", redact_url(url));
            let cache = RedisCache::open(url).await?;
            tracing::info!("Connected to Redis");
            Ok(Arc::new(cache))
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory cache");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}

/// Build the upstream for every catalog. Clubs and societies are only
/// available when `CNS_HOST` is set.
pub fn open_upstream(config: &Config) -> Result<Arc<dyn UpstreamClient>> {
    tracing::info!(
        "Using timetable API at {} (institution {})",
        config.upstream.base_url,
        config.upstream.institution_identity
    );
    let scientia = Arc::new(ScientiaClient::new(&config.upstream)?);

    let groups: Option<Arc<dyn UpstreamClient>> = match config.cns.base_url() {
        Some(url) => {
            tracing::info!("Using clubs and societies API at {}", redact_url(&url));
            Some(Arc::new(CnsClient::new(&url, &config.upstream)?))
        }
        None => {
            tracing::warn!("CNS_HOST not set, clubs and societies are unavailable");
            None
        }
    };

    Ok(Arc::new(CatalogRouter::new(scientia, groups)))
}

/// Load every Scientia listing that is not already cached.
///
/// Failures are logged and skipped; a cold cache only costs latency.
pub async fn prime_categories(resolver: &CategoryResolver) {
    for category_type in CategoryType::SCIENTIA {
        if resolver.cached_category(category_type).await.is_some() {
            tracing::debug!("{} listing already cached", category_type);
            continue;
        }

        let started = Instant::now();
        match resolver.fetch_category(category_type).await {
            Ok(category) => tracing::info!(
                "Primed {} listing with {} items in {:.2}s",
                category_type,
                category.items.len(),
                started.elapsed().as_secs_f64()
            ),
            Err(e) => tracing::warn!("Failed to prime {} listing: {}", category_type, e),
        }
    }
}

/// Spawn background workers:
/// - listing primer, re-run once per category TTL so listings are refreshed
///   shortly after they expire
///
/// Returns the `JoinHandle`s so callers can await task shutdown. Each worker
/// listens for a shutdown notification on the broadcast channel.
pub fn spawn_background_workers(
    state: Arc<crate::AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    if !state.config.cache.prime_on_startup {
        tracing::info!("Listing primer disabled");
        return handles;
    }

    let mut shutdown_rx = shutdown.subscribe();
    let interval = Duration::from_secs(state.config.cache.category_ttl_seconds.max(60));
    handles.push(tokio::spawn(async move {
        loop {
            tracing::info!("Priming category listings");
            prime_categories(&state.resolver).await;

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Listing primer shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }));

    handles
}
