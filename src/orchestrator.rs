//! Fans source fetches out under a concurrency cap and aggregates results.

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SourceConfig;
use crate::fetcher::{parse_entries, FeedClient, NormalizedArticle};

pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Outcome counts for one orchestration run.
///
/// A fresh value is built per run and handed back to the caller; nothing is
/// shared between concurrent runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub succeeded: usize,
    pub failed: usize,
    pub article_count: usize,
}

/// Fetch and normalize every source, at most `max_concurrent` at a time.
///
/// A failing source is logged and counted; it never cancels the others. The
/// call resolves once every source has finished. Article order across
/// sources is unspecified.
pub async fn fetch_all(
    client: &dyn FeedClient,
    sources: &[SourceConfig],
    max_concurrent: usize,
    per_source_limit: usize,
) -> (Vec<NormalizedArticle>, FetchStats) {
    let mut stats = FetchStats::default();
    let mut articles = Vec::new();

    // Boxed up front so the resulting future stays `Send` for tokio::spawn.
    let fetches: Vec<_> = sources
        .iter()
        .map(|source| async move { (source, client.fetch(source).await) }.boxed())
        .collect();
    let mut results = stream::iter(fetches).buffer_unordered(max_concurrent.max(1));

    while let Some((source, result)) = results.next().await {
        match result {
            Ok(fetched) => {
                let parsed = parse_entries(&fetched, &source.name, per_source_limit);
                info!("Fetched {} articles from {}", parsed.len(), source.name);
                stats.succeeded += 1;
                articles.extend(parsed);
            }
            Err(e) => {
                warn!(
                    source = %source.name,
                    error_kind = e.kind(),
                    "Failed to fetch feed: {}",
                    e
                );
                stats.failed += 1;
            }
        }
    }

    stats.article_count = articles.len();
    (articles, stats)
}
