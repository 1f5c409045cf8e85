use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};
use tracing::{debug, warn};

use crate::classify::{CATEGORIES, REGIONS};
use crate::config::SourceConfig;
use crate::fetcher::NormalizedArticle;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub feed_url: String,
    pub logo_url: Option<String>,
    pub grp: String,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Region {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
}

/// A persisted article. Written once by [`Database::store_articles`] and
/// never updated by ingestion afterwards.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<String>,
    pub image_url: Option<String>,
    pub fetched_at: String,
    pub source_id: Option<i64>,
    pub category_id: Option<i64>,
    pub region_id: Option<i64>,
}

/// Article joined with its source name and tag slugs, for listings.
#[derive(Debug, Clone, FromRow, Serialize, PartialEq)]
pub struct ArticleView {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<String>,
    pub image_url: Option<String>,
    pub source_name: Option<String>,
    pub category_slug: Option<String>,
    pub region_slug: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct ArticleFilter {
    pub category: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticlePage {
    pub articles: Vec<ArticleView>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

/// Result of a single insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The storage engine rejected the row because the URL already exists.
    Duplicate,
}

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to `:memory:` opens a separate database, so keep
        // exactly one and never recycle it.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                feed_url TEXT NOT NULL,
                logo_url TEXT,
                grp TEXT NOT NULL DEFAULT 'global',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                icon TEXT,
                description TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS regions (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                icon TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                summary TEXT,
                author TEXT,
                published_at TEXT,
                image_url TEXT,
                fetched_at TEXT NOT NULL,
                source_id INTEGER REFERENCES sources(id),
                category_id INTEGER REFERENCES categories(id),
                region_id INTEGER REFERENCES regions(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_articles_published
            ON articles(published_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert the fixed category and region tables; existing rows are kept.
    pub async fn seed_reference_data(&self) -> anyhow::Result<()> {
        for category in CATEGORIES {
            sqlx::query(
                r#"
                INSERT INTO categories (name, slug, icon, description)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(slug) DO NOTHING
                "#,
            )
            .bind(category.name)
            .bind(category.slug)
            .bind(category.icon)
            .bind(category.description)
            .execute(&self.pool)
            .await?;
        }

        for region in REGIONS {
            sqlx::query(
                r#"
                INSERT INTO regions (name, slug, icon)
                VALUES (?, ?, ?)
                ON CONFLICT(slug) DO NOTHING
                "#,
            )
            .bind(region.name)
            .bind(region.slug)
            .bind(region.icon)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    pub async fn sync_sources(&self, configs: &[SourceConfig]) -> anyhow::Result<()> {
        let now = timestamp(Utc::now());
        for config in configs {
            sqlx::query(
                r#"
                INSERT INTO sources (name, url, feed_url, logo_url, grp, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(name) DO UPDATE SET
                    url = excluded.url,
                    feed_url = excluded.feed_url,
                    logo_url = excluded.logo_url,
                    grp = excluded.grp
                "#,
            )
            .bind(&config.name)
            .bind(&config.url)
            .bind(&config.feed_url)
            .bind(&config.logo_url)
            .bind(&config.group)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get_all_sources(&self) -> anyhow::Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>("SELECT * FROM sources ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(sources)
    }

    pub async fn list_categories(&self) -> anyhow::Result<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    pub async fn list_regions(&self) -> anyhow::Result<Vec<Region>> {
        let regions = sqlx::query_as::<_, Region>("SELECT * FROM regions ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(regions)
    }

    pub async fn find_article_by_url(&self, url: &str) -> anyhow::Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    async fn lookup_id(&self, sql: &str, key: Option<&str>) -> anyhow::Result<Option<i64>> {
        let Some(key) = key else {
            return Ok(None);
        };
        let row: Option<(i64,)> = sqlx::query_as(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    /// Insert one article with already-resolved references.
    ///
    /// A uniqueness violation on `url` is reported as
    /// [`InsertOutcome::Duplicate`] rather than an error.
    pub async fn insert_article(
        &self,
        article: &NormalizedArticle,
        source_id: Option<i64>,
        category_id: Option<i64>,
        region_id: Option<i64>,
    ) -> anyhow::Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (
                title, url, summary, author, published_at, image_url,
                fetched_at, source_id, category_id, region_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.title)
        .bind(&article.url)
        .bind(&article.summary)
        .bind(&article.author)
        .bind(article.published_at.map(timestamp))
        .bind(&article.image_url)
        .bind(timestamp(Utc::now()))
        .bind(source_id)
        .bind(category_id)
        .bind(region_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist new articles, skipping any whose URL is already stored.
    ///
    /// Articles are handled in input order. Tags without a matching
    /// reference row are stored as NULL. A failed insert skips that article
    /// only. Returns the number of rows actually inserted.
    pub async fn store_articles(&self, articles: &[NormalizedArticle]) -> anyhow::Result<usize> {
        let mut new_count = 0;

        for article in articles {
            if self.find_article_by_url(&article.url).await?.is_some() {
                continue;
            }

            let source_id = self
                .lookup_id(
                    "SELECT id FROM sources WHERE name = ?",
                    article.source_name.as_deref(),
                )
                .await?;
            let category_id = self
                .lookup_id(
                    "SELECT id FROM categories WHERE slug = ?",
                    article.category_slug.as_deref(),
                )
                .await?;
            let region_id = self
                .lookup_id(
                    "SELECT id FROM regions WHERE slug = ?",
                    article.region_slug.as_deref(),
                )
                .await?;

            match self
                .insert_article(article, source_id, category_id, region_id)
                .await
            {
                Ok(InsertOutcome::Inserted) => new_count += 1,
                Ok(InsertOutcome::Duplicate) => {
                    debug!("Article already stored by a concurrent run: {}", article.url);
                }
                Err(e) => {
                    warn!("Failed to store article '{}': {}", article.url, e);
                }
            }
        }

        Ok(new_count)
    }

    pub async fn count_articles(&self, filter: &ArticleFilter) -> anyhow::Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM articles a
            LEFT JOIN categories c ON c.id = a.category_id
            LEFT JOIN regions r ON r.id = a.region_id
            WHERE (?1 IS NULL OR c.slug = ?1)
              AND (?2 IS NULL OR r.slug = ?2)
            "#,
        )
        .bind(&filter.category)
        .bind(&filter.region)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    pub async fn count_sources(&self) -> anyhow::Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sources")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Newest first; undated articles sort last.
    pub async fn list_articles(
        &self,
        filter: &ArticleFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ArticleView>> {
        let articles = sqlx::query_as::<_, ArticleView>(
            r#"
            SELECT a.id, a.title, a.url, a.summary, a.author, a.published_at, a.image_url,
                   s.name AS source_name, c.slug AS category_slug, r.slug AS region_slug
            FROM articles a
            LEFT JOIN sources s ON s.id = a.source_id
            LEFT JOIN categories c ON c.id = a.category_id
            LEFT JOIN regions r ON r.id = a.region_id
            WHERE (?1 IS NULL OR c.slug = ?1)
              AND (?2 IS NULL OR r.slug = ?2)
            ORDER BY a.published_at DESC NULLS LAST, a.id DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(&filter.category)
        .bind(&filter.region)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    pub async fn article_page(
        &self,
        filter: &ArticleFilter,
        page: i64,
        per_page: i64,
    ) -> anyhow::Result<ArticlePage> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total = self.count_articles(filter).await?;
        // Saturates for absurd page numbers; the offset is then past every row.
        let offset = (page - 1).saturating_mul(per_page);
        let articles = self.list_articles(filter, per_page, offset).await?;

        Ok(ArticlePage {
            articles,
            page,
            per_page,
            total,
            total_pages: total / per_page + i64::from(total % per_page != 0),
        })
    }
}
