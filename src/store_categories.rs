use chrono::Utc;

use crate::db_pool::DbPool;
use crate::error::CatalogError;
use crate::models::Category;

/// CRUD and bookkeeping for the `categories` table.
pub struct CategoryStore;

impl CategoryStore {
    pub fn get_by_name(pool: &DbPool, name: &str) -> Result<Option<Category>, CatalogError> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare("SELECT * FROM categories WHERE name = ?1")?;
        let mut rows = stmt.query_map([name], Category::from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn create(
        pool: &DbPool,
        name: &str,
        description: Option<&str>,
    ) -> Result<Category, CatalogError> {
        let conn = pool.get()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO categories (name, description, emoji_count, created_at)
             VALUES (?1, ?2, 0, ?3)",
            rusqlite::params![name, description, now],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Category {
            id,
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            emoji_count: 0,
            created_at: now,
        })
    }

    /// Fetches the category by name, creating it (with the given marker
    /// description) when it doesn't exist yet.
    pub fn get_or_create(
        pool: &DbPool,
        name: &str,
        default_description: Option<&str>,
    ) -> Result<Category, CatalogError> {
        if let Some(existing) = Self::get_by_name(pool, name)? {
            return Ok(existing);
        }
        Self::create(pool, name, default_description)
    }

    pub fn list(pool: &DbPool) -> Result<Vec<Category>, CatalogError> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare("SELECT * FROM categories ORDER BY name")?;
        let rows = stmt.query_map([], Category::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn delete(pool: &DbPool, id: i64) -> Result<bool, CatalogError> {
        let conn = pool.get()?;
        let affected = conn.execute("DELETE FROM categories WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Adjusts `emoji_count` by `delta`. Not wrapped in the same transaction
    /// as the image write it accompanies — a crash between the two can leave
    /// the count off by one, which the operator can correct with `recompute`.
    pub fn adjust_count(pool: &DbPool, name: &str, delta: i64) -> Result<(), CatalogError> {
        let conn = pool.get()?;
        conn.execute(
            "UPDATE categories SET emoji_count = emoji_count + ?1 WHERE name = ?2",
            rusqlite::params![delta, name],
        )?;
        Ok(())
    }

    pub fn recompute_count(pool: &DbPool, name: &str) -> Result<(), CatalogError> {
        let conn = pool.get()?;
        conn.execute(
            "UPDATE categories SET emoji_count = (SELECT count(*) FROM images WHERE category = ?1)
             WHERE name = ?1",
            [name],
        )?;
        Ok(())
    }
}
