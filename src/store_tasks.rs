use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db_pool::DbPool;
use crate::error::CatalogError;
use crate::models::{AiTask, TaskStats};

/// The durable work queue backing the enrichment pipeline.
///
/// Claiming is a single conditional `UPDATE` so concurrent workers racing
/// over the same eligible row never both win it.
pub struct TaskQueue;

impl TaskQueue {
    /// Enqueues a task unless a non-terminal one already exists for this
    /// image. Returns `false` (no-op) in that case.
    pub fn enqueue(
        pool: &DbPool,
        emoji_id: &str,
        image_path: &str,
        image_hash: &str,
    ) -> Result<bool, CatalogError> {
        let conn = pool.get()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM ai_tasks WHERE emoji_id = ?1 AND status IN ('PENDING', 'PROCESSING')",
                [emoji_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(false);
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO ai_tasks (emoji_id, image_path, image_hash, status, attempts,
             last_error, next_retry_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'PENDING', 0, NULL, 0, ?4, ?4)",
            rusqlite::params![emoji_id, image_path, image_hash, now],
        )?;
        Ok(true)
    }

    /// Read-only lookup of PENDING rows whose backoff has elapsed, ordered
    /// oldest-first. Does not claim anything by itself.
    pub fn list_eligible(pool: &DbPool, limit: i64) -> Result<Vec<AiTask>, CatalogError> {
        let conn = pool.get()?;
        let now_millis = Utc::now().timestamp_millis();
        let mut stmt = conn.prepare(
            "SELECT * FROM ai_tasks WHERE status = 'PENDING' AND next_retry_at <= ?1
             ORDER BY created_at ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![now_millis, limit], AiTask::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Atomically claims one row: succeeds only if it was still PENDING.
    pub fn try_claim_one(pool: &DbPool, id: i64) -> Result<bool, CatalogError> {
        let conn = pool.get()?;
        let affected = conn.execute(
            "UPDATE ai_tasks SET status = 'PROCESSING', updated_at = ?2
             WHERE id = ?1 AND status = 'PENDING'",
            rusqlite::params![id, Utc::now()],
        )?;
        Ok(affected > 0)
    }

    pub fn complete_success(pool: &DbPool, id: i64) -> Result<(), CatalogError> {
        let conn = pool.get()?;
        conn.execute(
            "UPDATE ai_tasks SET status = 'SUCCEEDED', updated_at = ?2 WHERE id = ?1",
            rusqlite::params![id, Utc::now()],
        )?;
        Ok(())
    }

    /// Records a failed attempt. Requeues with exponential backoff
    /// (`base * 2^(attempts-1)`) until `max_attempts` is reached, at which
    /// point the task moves to FAILED for good.
    pub fn complete_fail(
        pool: &DbPool,
        id: i64,
        error: &str,
        max_attempts: i64,
        backoff_base_ms: i64,
    ) -> Result<(), CatalogError> {
        let conn = pool.get()?;
        let attempts: i64 = conn.query_row(
            "SELECT attempts FROM ai_tasks WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        let attempts = attempts + 1;
        let now = Utc::now();

        if attempts >= max_attempts {
            conn.execute(
                "UPDATE ai_tasks SET status = 'FAILED', attempts = ?2, last_error = ?3,
                 updated_at = ?4 WHERE id = ?1",
                rusqlite::params![id, attempts, error, now],
            )?;
        } else {
            let delay_ms = backoff_base_ms * (1i64 << (attempts - 1).min(32));
            let next_retry_at = now.timestamp_millis() + delay_ms;
            conn.execute(
                "UPDATE ai_tasks SET status = 'PENDING', attempts = ?2, last_error = ?3,
                 next_retry_at = ?4, updated_at = ?5 WHERE id = ?1",
                rusqlite::params![id, attempts, error, next_retry_at, now],
            )?;
        }
        Ok(())
    }

    /// Crash recovery: any row still PROCESSING was orphaned by a worker
    /// that died mid-task. Called once at worker startup, before the poll
    /// loop begins.
    pub fn reset_stuck(pool: &DbPool) -> Result<usize, CatalogError> {
        let conn = pool.get()?;
        let affected = conn.execute(
            "UPDATE ai_tasks SET status = 'PENDING', next_retry_at = 0, updated_at = ?1
             WHERE status = 'PROCESSING'",
            rusqlite::params![Utc::now()],
        )?;
        Ok(affected)
    }

    /// Requeues every FAILED task with a clean attempt counter.
    pub fn retry_failed(pool: &DbPool) -> Result<usize, CatalogError> {
        let conn = pool.get()?;
        let affected = conn.execute(
            "UPDATE ai_tasks SET status = 'PENDING', attempts = 0, next_retry_at = 0,
             last_error = NULL, updated_at = ?1 WHERE status = 'FAILED'",
            rusqlite::params![Utc::now()],
        )?;
        Ok(affected)
    }

    pub fn stats(pool: &DbPool) -> Result<TaskStats, CatalogError> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare("SELECT status, count(*) FROM ai_tasks GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut stats = TaskStats::default();
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "PENDING" => stats.pending = count,
                "PROCESSING" => stats.processing = count,
                "SUCCEEDED" => stats.succeeded = count,
                "FAILED" => stats.failed = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    pub fn list_failed_emoji_ids(pool: &DbPool) -> Result<Vec<String>, CatalogError> {
        let conn = pool.get()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT emoji_id FROM ai_tasks WHERE status = 'FAILED'")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get(pool: &DbPool, id: i64) -> Result<Option<AiTask>, CatalogError> {
        let conn = pool.get()?;
        conn.query_row("SELECT * FROM ai_tasks WHERE id = ?1", [id], AiTask::from_row)
            .optional()
            .map_err(CatalogError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_pool::create_in_memory_pool;
    use crate::models::TaskStatus;

    #[test]
    fn enqueue_is_a_no_op_while_non_terminal_task_exists() {
        let pool = create_in_memory_pool().unwrap();
        assert!(TaskQueue::enqueue(&pool, "img1", "/p", "h").unwrap());
        assert!(!TaskQueue::enqueue(&pool, "img1", "/p", "h").unwrap());
    }

    #[test]
    fn claim_is_exclusive() {
        let pool = create_in_memory_pool().unwrap();
        TaskQueue::enqueue(&pool, "img1", "/p", "h").unwrap();
        let task = &TaskQueue::list_eligible(&pool, 10).unwrap()[0];
        assert!(TaskQueue::try_claim_one(&pool, task.id).unwrap());
        assert!(!TaskQueue::try_claim_one(&pool, task.id).unwrap());
    }

    #[test]
    fn complete_fail_requeues_with_backoff_until_exhausted() {
        let pool = create_in_memory_pool().unwrap();
        TaskQueue::enqueue(&pool, "img1", "/p", "h").unwrap();
        let id = TaskQueue::list_eligible(&pool, 10).unwrap()[0].id;

        TaskQueue::try_claim_one(&pool, id).unwrap();
        TaskQueue::complete_fail(&pool, id, "boom", 3, 1000).unwrap();
        let task = TaskQueue::get(&pool, id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 1);
        assert!(task.next_retry_at > 0);

        TaskQueue::try_claim_one(&pool, id).unwrap();
        TaskQueue::complete_fail(&pool, id, "boom", 3, 1000).unwrap();
        TaskQueue::try_claim_one(&pool, id).unwrap();
        TaskQueue::complete_fail(&pool, id, "boom", 3, 1000).unwrap();
        let task = TaskQueue::get(&pool, id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts, 3);
    }

    #[test]
    fn reset_stuck_returns_processing_rows_to_pending() {
        let pool = create_in_memory_pool().unwrap();
        TaskQueue::enqueue(&pool, "img1", "/p", "h").unwrap();
        let id = TaskQueue::list_eligible(&pool, 10).unwrap()[0].id;
        TaskQueue::try_claim_one(&pool, id).unwrap();

        let reset = TaskQueue::reset_stuck(&pool).unwrap();
        assert_eq!(reset, 1);
        assert_eq!(TaskQueue::get(&pool, id).unwrap().unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn retry_failed_clears_attempts_and_requeues() {
        let pool = create_in_memory_pool().unwrap();
        TaskQueue::enqueue(&pool, "img1", "/p", "h").unwrap();
        let id = TaskQueue::list_eligible(&pool, 10).unwrap()[0].id;
        TaskQueue::try_claim_one(&pool, id).unwrap();
        TaskQueue::complete_fail(&pool, id, "boom", 1, 1000).unwrap();
        assert_eq!(TaskQueue::get(&pool, id).unwrap().unwrap().status, TaskStatus::Failed);

        let retried = TaskQueue::retry_failed(&pool).unwrap();
        assert_eq!(retried, 1);
        let task = TaskQueue::get(&pool, id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
    }
}
