//! SQLite-backed result sink on sqlx.
//!
//! Headers are stored as a JSON column; durations as integer milliseconds.
//! WAL mode is enabled so concurrent workers can write while tooling reads.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{Backend, FetchResult, Filter};
use crate::Result;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS fetch_results (
        id TEXT PRIMARY KEY,
        url TEXT NOT NULL,
        method TEXT NOT NULL,
        status_code INTEGER NOT NULL,
        headers TEXT NOT NULL,
        body BLOB,
        duration_ms INTEGER NOT NULL,
        detected_bot INTEGER NOT NULL,
        detection_source TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        error TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_fetch_results_created_at
        ON fetch_results (created_at DESC)
    "#,
];

/// Result sink writing to a SQLite database file.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Opens (or creates) the database at `path` and ensures the schema.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(SqliteBackend { pool })
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn save(&self, result: &FetchResult) -> Result<()> {
        let headers_json =
            serde_json::to_string(&result.headers).unwrap_or_else(|_| "{}".to_string());

        sqlx::query(
            r#"
            INSERT INTO fetch_results (
                id, url, method, status_code, headers, body, duration_ms,
                detected_bot, detection_source, created_at, error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result.id)
        .bind(&result.url)
        .bind(&result.method)
        .bind(result.status_code as i64)
        .bind(headers_json)
        .bind(&result.body)
        .bind(result.duration.as_millis() as i64)
        .bind(result.detected_bot)
        .bind(&result.detection_source)
        // Fixed-precision timestamps keep lexicographic order chronological.
        .bind(
            result
                .created_at
                .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        )
        .bind(&result.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<FetchResult>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, url, method, status_code, headers, body, duration_ms, \
             detected_bot, detection_source, created_at, error \
             FROM fetch_results WHERE 1=1",
        );

        if let Some(url) = &filter.url {
            builder.push(" AND url = ").push_bind(url);
        }
        if let Some(detected) = filter.detected_bot {
            builder.push(" AND detected_bot = ").push_bind(detected);
        }
        if let Some(since) = filter.since {
            builder
                .push(" AND created_at >= ")
                .push_bind(since.to_rfc3339_opts(chrono::SecondsFormat::Micros, true));
        }

        builder.push(" ORDER BY created_at DESC");

        if filter.limit > 0 {
            builder.push(" LIMIT ").push_bind(filter.limit as i64);
        } else if filter.offset > 0 {
            // SQLite requires a LIMIT clause before OFFSET.
            builder.push(" LIMIT -1");
        }
        if filter.offset > 0 {
            builder.push(" OFFSET ").push_bind(filter.offset as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let headers_json: String = row.get("headers");
            let headers = serde_json::from_str(&headers_json).unwrap_or_default();
            let created_at_raw: String = row.get("created_at");
            let created_at = DateTime::parse_from_rfc3339(&created_at_raw)
                .map(|ts| ts.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            results.push(FetchResult {
                id: row.get("id"),
                url: row.get("url"),
                method: row.get("method"),
                status_code: row.get::<i64, _>("status_code") as u16,
                headers,
                body: row.get("body"),
                duration: std::time::Duration::from_millis(
                    row.get::<i64, _>("duration_ms").max(0) as u64,
                ),
                detected_bot: row.get("detected_bot"),
                detection_source: row.get("detection_source"),
                created_at,
                error: row.get("error"),
            });
        }

        Ok(results)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
