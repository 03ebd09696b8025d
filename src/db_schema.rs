use rusqlite::{Connection, Result as SqlResult};

pub const CATEGORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    description TEXT,
    emoji_count INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);
"#;

pub const IMAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    id         TEXT PRIMARY KEY NOT NULL,
    name       TEXT NOT NULL,
    category   TEXT NOT NULL,
    tags       TEXT NOT NULL DEFAULT '[]',
    path       TEXT NOT NULL,
    size       INTEGER NOT NULL,
    mime_type  TEXT NOT NULL,
    image_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

// A cached enrichment result, content-addressed by image hash. At most one
// row per hash; never joined against images directly since several images
// may share a hash and an image row may be deleted while its cache entry
// lives on.
pub const AI_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ai_results (
    image_hash  TEXT PRIMARY KEY NOT NULL,
    result_json TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
"#;

pub const AI_TASKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ai_tasks (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    emoji_id      TEXT NOT NULL,
    image_path    TEXT NOT NULL,
    image_hash    TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'PENDING',
    attempts      INTEGER NOT NULL DEFAULT 0,
    last_error    TEXT,
    next_retry_at INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
"#;

pub const SCHEMA_SQL: &[&str] = &[
    CATEGORIES_TABLE,
    IMAGES_TABLE,
    "CREATE INDEX IF NOT EXISTS idx_images_hash ON images(image_hash);",
    "CREATE INDEX IF NOT EXISTS idx_images_category ON images(category);",
    AI_RESULTS_TABLE,
    AI_TASKS_TABLE,
    "CREATE INDEX IF NOT EXISTS idx_ai_tasks_claim ON ai_tasks(status, next_retry_at, created_at);",
    "CREATE INDEX IF NOT EXISTS idx_ai_tasks_emoji_id ON ai_tasks(emoji_id);",
];

pub fn initialize_schema(conn: &Connection) -> SqlResult<()> {
    for sql in SCHEMA_SQL {
        conn.execute(sql, [])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_applies_cleanly_and_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(count >= 4);
    }
}
