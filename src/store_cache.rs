use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db_pool::DbPool;
use crate::error::CatalogError;
use crate::models::EnrichmentResult;

/// Content-addressed cache of enrichment results, keyed by image hash.
pub struct ResultCache;

impl ResultCache {
    pub fn get(pool: &DbPool, hash: &str) -> Result<Option<EnrichmentResult>, CatalogError> {
        let conn = pool.get()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT result_json FROM ai_results WHERE image_hash = ?1",
                [hash],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Idempotent upsert keyed by hash.
    pub fn put(pool: &DbPool, hash: &str, result: &EnrichmentResult) -> Result<(), CatalogError> {
        let conn = pool.get()?;
        let json = serde_json::to_string(result)?;
        conn.execute(
            "INSERT INTO ai_results (image_hash, result_json, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(image_hash) DO UPDATE SET result_json = excluded.result_json",
            rusqlite::params![hash, json, Utc::now()],
        )?;
        Ok(())
    }
}
