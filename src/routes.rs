use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::cache::TtlCache;
use crate::db::{ArticleFilter, ArticlePage, Category, Database, Region};
use crate::orchestrator::FetchStats;
use crate::scheduler::{Ingestor, RunReport};

const ARTICLES_PER_PAGE: i64 = 20;
const MAX_PAGE: i64 = 10_000;

pub struct AppState {
    pub db: Arc<Database>,
    pub ingestor: Arc<Ingestor>,
    pub cache: Arc<TtlCache<ArticlePage>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
        .route("/api/stats", get(stats))
        .route("/api/articles", get(list_articles))
        .route("/api/refresh", post(refresh))
        .with_state(state)
}

// Custom error type
pub struct AppError(anyhow::Error);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct DetailedHealthStatus {
    pub status: &'static str,
    pub database: &'static str,
    pub article_count: i64,
    pub source_count: i64,
    pub last_update: Option<DateTime<Utc>>,
    pub last_stats: FetchStats,
    pub refreshing: bool,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub total_articles: i64,
    pub total_sources: i64,
    pub categories: Vec<Category>,
    pub regions: Vec<Region>,
    pub last_run: Option<RunReport>,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub message: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ArticlesQuery {
    pub category: Option<String>,
    pub region: Option<String>,
    pub page: Option<i64>,
}

impl ArticlesQuery {
    fn filter(&self) -> ArticleFilter {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        ArticleFilter {
            category: non_empty(&self.category),
            region: non_empty(&self.region),
        }
    }
}

fn cache_key(filter: &ArticleFilter, page: i64) -> String {
    format!(
        "articles:{}:{}:{}",
        filter.category.as_deref().unwrap_or("*"),
        filter.region.as_deref().unwrap_or("*"),
        page
    )
}

pub async fn health() -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

pub async fn health_detailed(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let counts = async {
        let articles = state.db.count_articles(&ArticleFilter::default()).await?;
        let sources = state.db.count_sources().await?;
        anyhow::Ok((articles, sources))
    }
    .await;

    let (database, article_count, source_count) = match counts {
        Ok((articles, sources)) => ("healthy", articles, sources),
        Err(e) => {
            error!("Database health check failed: {}", e);
            ("unhealthy", 0, 0)
        }
    };

    let last_run = state.ingestor.last_run().await;
    Json(DetailedHealthStatus {
        status: if database == "healthy" { "healthy" } else { "degraded" },
        database,
        article_count,
        source_count,
        last_update: last_run.as_ref().map(|r| r.finished_at),
        last_stats: state.ingestor.get_fetch_stats().await,
        refreshing: state.ingestor.is_refreshing(),
    })
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(StatsResponse {
        total_articles: state.db.count_articles(&ArticleFilter::default()).await?,
        total_sources: state.db.count_sources().await?,
        categories: state.db.list_categories().await?,
        regions: state.db.list_regions().await?,
        last_run: state.ingestor.last_run().await,
    }))
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticlesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = query.filter();
    let page = query.page.unwrap_or(1).clamp(1, MAX_PAGE);
    let key = cache_key(&filter, page);

    if let Some(cached) = state.cache.get(&key).await {
        return Ok(Json(cached));
    }

    let result = state
        .db
        .article_page(&filter, page, ARTICLES_PER_PAGE)
        .await?;
    state.cache.set(key, result.clone()).await;

    Ok(Json(result))
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ingestor = state.ingestor.clone();
    tokio::spawn(async move {
        if let Err(e) = ingestor.refresh().await {
            error!("Manual refresh failed: {}", e);
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            message: "Feed refresh triggered",
            status: "pending",
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, Config, SourceConfig};
    use crate::fetcher::{FeedClient, FetchError, FetchedFeed, NormalizedArticle};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    struct OfflineClient;

    #[async_trait]
    impl FeedClient for OfflineClient {
        async fn fetch(&self, _source: &SourceConfig) -> Result<FetchedFeed, FetchError> {
            Err(FetchError::Other("offline".to_string()))
        }
    }

    async fn create_test_app() -> (Router, Arc<Database>) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        db.seed_reference_data().await.unwrap();
        let db = Arc::new(db);

        let config = Config {
            refresh_interval: 30,
            initial_delay_secs: 5,
            max_concurrent: 10,
            fetch_timeout_secs: 30,
            max_articles_per_source: 50,
            cache: CacheConfig::default(),
            sources: vec![SourceConfig {
                name: "Wire".to_string(),
                feed_url: "https://wire.example.com/rss".to_string(),
                url: "https://wire.example.com".to_string(),
                logo_url: None,
                group: "global".to_string(),
            }],
        };
        db.sync_sources(&config.sources).await.unwrap();

        let cache = Arc::new(TtlCache::new(Duration::from_secs(300), true));
        let ingestor = Arc::new(Ingestor::new(
            Arc::new(OfflineClient),
            db.clone(),
            cache.clone(),
            &config,
        ));
        let state = Arc::new(AppState {
            db: db.clone(),
            ingestor,
            cache,
        });

        (router(state), db)
    }

    fn article(n: u32, category: &str, region: &str) -> NormalizedArticle {
        NormalizedArticle {
            title: format!("Article {}", n),
            url: format!("https://wire.example.com/{}", n),
            summary: String::new(),
            author: None,
            published_at: None,
            image_url: None,
            source_name: Some("Wire".to_string()),
            category_slug: Some(category.to_string()),
            region_slug: Some(region.to_string()),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn test_health_endpoint() {
            let (app, _db) = create_test_app().await;
            let (status, body) = get_json(app, "/health").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "healthy");
        }

        #[tokio::test]
        async fn test_detailed_health_before_first_run() {
            let (app, db) = create_test_app().await;
            db.store_articles(&[article(1, "trade", "europe")])
                .await
                .unwrap();

            let (status, body) = get_json(app, "/health/detailed").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "healthy");
            assert_eq!(body["database"], "healthy");
            assert_eq!(body["article_count"], 1);
            assert_eq!(body["source_count"], 1);
            assert!(body["last_update"].is_null());
            assert_eq!(body["last_stats"]["succeeded"], 0);
            assert_eq!(body["refreshing"], false);
        }
    }

    mod stats_tests {
        use super::*;

        #[tokio::test]
        async fn test_stats_lists_reference_data() {
            let (app, _db) = create_test_app().await;
            let (status, body) = get_json(app, "/api/stats").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["total_articles"], 0);
            assert_eq!(body["categories"].as_array().unwrap().len(), 6);
            assert_eq!(body["regions"].as_array().unwrap().len(), 6);
            assert!(body["last_run"].is_null());
        }
    }

    mod articles_tests {
        use super::*;

        #[tokio::test]
        async fn test_articles_empty() {
            let (app, _db) = create_test_app().await;
            let (status, body) = get_json(app, "/api/articles").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["total"], 0);
            assert_eq!(body["page"], 1);
            assert!(body["articles"].as_array().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_articles_filtered() {
            let (app, db) = create_test_app().await;
            db.store_articles(&[
                article(1, "trade", "europe"),
                article(2, "conflicts", "europe"),
                article(3, "trade", "mena"),
            ])
            .await
            .unwrap();

            let (_, body) = get_json(app.clone(), "/api/articles?category=trade").await;
            assert_eq!(body["total"], 2);

            let (_, body) = get_json(app.clone(), "/api/articles?category=trade&region=mena").await;
            assert_eq!(body["total"], 1);
            assert_eq!(body["articles"][0]["url"], "https://wire.example.com/3");

            let (_, body) = get_json(app, "/api/articles?category=&region=").await;
            assert_eq!(body["total"], 3);
        }

        #[tokio::test]
        async fn test_articles_are_cached() {
            let (app, db) = create_test_app().await;
            db.store_articles(&[article(1, "trade", "europe")])
                .await
                .unwrap();

            let (_, first) = get_json(app.clone(), "/api/articles").await;
            assert_eq!(first["total"], 1);

            db.store_articles(&[article(2, "trade", "europe")])
                .await
                .unwrap();
            let (_, second) = get_json(app, "/api/articles").await;
            assert_eq!(second["total"], 1);
        }

        #[tokio::test]
        async fn test_articles_huge_page() {
            let (app, db) = create_test_app().await;
            db.store_articles(&[article(1, "trade", "europe")])
                .await
                .unwrap();

            let (status, body) = get_json(app, "/api/articles?page=9223372036854775807").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["total"], 1);
            assert_eq!(body["page"], MAX_PAGE);
            assert!(body["articles"].as_array().unwrap().is_empty());
        }
    }

    mod refresh_tests {
        use super::*;

        #[tokio::test]
        async fn test_refresh_endpoint_accepts() {
            let (app, _db) = create_test_app().await;

            let response = app
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/refresh")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::ACCEPTED);

            let body = response.into_body().collect().await.unwrap().to_bytes();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["status"], "pending");
        }
    }
}
