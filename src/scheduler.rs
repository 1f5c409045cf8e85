use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::TtlCache;
use crate::config::{Config, SourceConfig};
use crate::db::{ArticlePage, Database};
use crate::fetcher::FeedClient;
use crate::orchestrator::{fetch_all, FetchStats};

/// Summary of one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub stats: FetchStats,
    pub new_articles: usize,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Drives fetch-all followed by store, one run at a time.
pub struct Ingestor {
    client: Arc<dyn FeedClient>,
    db: Arc<Database>,
    cache: Arc<TtlCache<ArticlePage>>,
    sources: Vec<SourceConfig>,
    max_concurrent: usize,
    per_source_limit: usize,
    refreshing: AtomicBool,
    last_run: RwLock<Option<RunReport>>,
}

impl Ingestor {
    pub fn new(
        client: Arc<dyn FeedClient>,
        db: Arc<Database>,
        cache: Arc<TtlCache<ArticlePage>>,
        config: &Config,
    ) -> Self {
        Self {
            client,
            db,
            cache,
            sources: config.sources.clone(),
            max_concurrent: config.max_concurrent,
            per_source_limit: config.max_articles_per_source,
            refreshing: AtomicBool::new(false),
            last_run: RwLock::new(None),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    /// Counts from the most recent completed run; zeroes before the first.
    pub async fn get_fetch_stats(&self) -> FetchStats {
        self.last_run
            .read()
            .await
            .as_ref()
            .map(|r| r.stats)
            .unwrap_or_default()
    }

    pub async fn last_run(&self) -> Option<RunReport> {
        self.last_run.read().await.clone()
    }

    /// Run one ingestion cycle. Returns `None` if another run is in progress.
    pub async fn refresh(&self) -> anyhow::Result<Option<RunReport>> {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing) else {
            info!("Refresh already in progress, skipping");
            return Ok(None);
        };

        self.run_once().await.map(Some)
    }

    async fn run_once(&self) -> anyhow::Result<RunReport> {
        let started = Instant::now();
        info!("Refreshing {} sources", self.sources.len());

        let (articles, stats) = fetch_all(
            self.client.as_ref(),
            &self.sources,
            self.max_concurrent,
            self.per_source_limit,
        )
        .await;

        let new_articles = self.db.store_articles(&articles).await?;
        self.cache.clear().await;

        let report = RunReport {
            stats,
            new_articles,
            finished_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            "Feed refresh complete: {} fetched, {} new in {}ms",
            stats.article_count,
            new_articles,
            report.duration_ms
        );

        *self.last_run.write().await = Some(report.clone());
        Ok(report)
    }
}

/// Holds the in-progress flag; clears it on drop, including when the run
/// panics or its task is aborted.
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Initial run after `initial_delay`, then one run every `interval`.
pub fn spawn_ingestion(
    ingestor: Arc<Ingestor>,
    interval: Duration,
    initial_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(initial_delay).await;
        info!("Starting initial feed fetch");
        if let Err(e) = ingestor.refresh().await {
            error!("Initial feed fetch failed: {}", e);
        }

        loop {
            tokio::time::sleep(interval).await;
            info!("Starting scheduled feed refresh");
            if let Err(e) = ingestor.refresh().await {
                error!("Scheduled feed refresh failed: {}", e);
            }
        }
    })
}

/// Periodically sweep expired cache entries.
pub fn spawn_housekeeping<V>(cache: Arc<TtlCache<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = cache.cleanup_expired().await;
            if removed > 0 {
                debug!("Cache cleanup: removed {} expired entries", removed);
            }
        }
    })
}
