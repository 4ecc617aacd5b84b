use std::collections::HashMap;
use std::path::Path;

use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tokio::sync::RwLock;

use crate::report::LookupKind;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Stores successful lookup results as JSON, keyed by lookup kind and query.
#[async_trait::async_trait]
pub trait LookupCache: Send + Sync {
    async fn get(&self, kind: LookupKind, key: &str) -> CacheResult<Option<String>>;

    async fn put(&self, kind: LookupKind, key: &str, value: &str) -> CacheResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<(LookupKind, String), String>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait::async_trait]
impl LookupCache for MemoryCache {
    async fn get(&self, kind: LookupKind, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.read().await.get(&(kind, key.to_string())).cloned())
    }

    async fn put(&self, kind: LookupKind, key: &str, value: &str) -> CacheResult<()> {
        self.entries
            .write()
            .await
            .insert((kind, key.to_string()), value.to_string());
        Ok(())
    }
}

const INIT_SQL: &str = r"
CREATE TABLE IF NOT EXISTS lookups (
    kind TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (kind, key)
);
";

/// Lookup cache persisted in a sqlite file so re-runs skip external services.
pub struct SqliteCache {
    pool: Pool<Sqlite>,
}

impl SqliteCache {
    pub async fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{}?mode=rwc", path.as_ref().display()))
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_memory() -> CacheResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn count(&self) -> CacheResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lookups")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait::async_trait]
impl LookupCache for SqliteCache {
    async fn get(&self, kind: LookupKind, key: &str) -> CacheResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM lookups WHERE kind = ? AND key = ?")
                .bind(kind.as_str())
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn put(&self, kind: LookupKind, key: &str, value: &str) -> CacheResult<()> {
        sqlx::query(
            r"
            INSERT INTO lookups (kind, key, value, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (kind, key) DO UPDATE SET value = excluded.value
            ",
        )
        .bind(kind.as_str())
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_separates_kinds() {
        let cache = MemoryCache::new();
        cache.put(LookupKind::Geocode, "Vienna", "{}").await.unwrap();

        assert_eq!(
            cache.get(LookupKind::Geocode, "Vienna").await.unwrap().as_deref(),
            Some("{}")
        );
        assert_eq!(cache.get(LookupKind::Date, "Vienna").await.unwrap(), None);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_sqlite_cache_roundtrip_and_overwrite() {
        let cache = SqliteCache::open_memory().await.unwrap();
        assert_eq!(cache.get(LookupKind::Date, "1915").await.unwrap(), None);

        cache.put(LookupKind::Date, "1915", "first").await.unwrap();
        cache.put(LookupKind::Date, "1915", "second").await.unwrap();
        cache.put(LookupKind::Geocode, "1915", "place").await.unwrap();

        assert_eq!(
            cache.get(LookupKind::Date, "1915").await.unwrap().as_deref(),
            Some("second")
        );
        assert_eq!(cache.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_cache_persists_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lookups.db");

        {
            let cache = SqliteCache::open(&path).await.unwrap();
            cache.put(LookupKind::Geocode, "Sarajevo", "{\"latitude\":43.85}").await.unwrap();
        }

        let reopened = SqliteCache::open(&path).await.unwrap();
        assert!(reopened.get(LookupKind::Geocode, "Sarajevo").await.unwrap().is_some());
    }
}
