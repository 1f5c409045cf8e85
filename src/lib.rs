//! Geopolitics Watch - feed ingestion for a geopolitics news aggregator
//!
//! Fetches RSS/Atom feeds from configured outlets under a concurrency cap,
//! normalizes and classifies each entry, and stores new articles in SQLite
//! with URL-level deduplication. A thin JSON API exposes health and listings.

pub mod cache;
pub mod classify;
pub mod config;
pub mod dates;
pub mod db;
pub mod fetcher;
pub mod orchestrator;
pub mod routes;
pub mod sanitize;
pub mod scheduler;
