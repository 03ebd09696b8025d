use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db_pool::DbPool;
use crate::error::CatalogError;
use crate::models::Image;

/// CRUD and listing for the `images` table.
pub struct ImageStore;

impl ImageStore {
    pub fn insert(pool: &DbPool, image: &Image) -> Result<(), CatalogError> {
        let conn = pool.get()?;
        let tags_json = serde_json::to_string(&image.tags)?;
        conn.execute(
            "INSERT INTO images (id, name, category, tags, path, size, mime_type, image_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                image.id,
                image.name,
                image.category,
                tags_json,
                image.path,
                image.size,
                image.mime_type,
                image.image_hash,
                image.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn update(pool: &DbPool, image: &Image) -> Result<(), CatalogError> {
        let conn = pool.get()?;
        let tags_json = serde_json::to_string(&image.tags)?;
        conn.execute(
            "UPDATE images SET name = ?2, category = ?3, tags = ?4, path = ?5, size = ?6,
             mime_type = ?7, image_hash = ?8 WHERE id = ?1",
            rusqlite::params![
                image.id,
                image.name,
                image.category,
                tags_json,
                image.path,
                image.size,
                image.mime_type,
                image.image_hash,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(pool: &DbPool, id: &str) -> Result<Option<Image>, CatalogError> {
        let conn = pool.get()?;
        conn.query_row("SELECT * FROM images WHERE id = ?1", [id], Image::from_row)
            .optional()
            .map_err(CatalogError::from)
    }

    pub fn find_by_name(pool: &DbPool, name: &str) -> Result<Option<Image>, CatalogError> {
        let conn = pool.get()?;
        conn.query_row(
            "SELECT * FROM images WHERE name = ?1 ORDER BY created_at LIMIT 1",
            [name],
            Image::from_row,
        )
        .optional()
        .map_err(CatalogError::from)
    }

    pub fn find_by_hash(pool: &DbPool, hash: &str) -> Result<Option<Image>, CatalogError> {
        let conn = pool.get()?;
        conn.query_row(
            "SELECT * FROM images WHERE image_hash = ?1 ORDER BY created_at LIMIT 1",
            [hash],
            Image::from_row,
        )
        .optional()
        .map_err(CatalogError::from)
    }

    pub fn delete(pool: &DbPool, id: &str) -> Result<bool, CatalogError> {
        let conn = pool.get()?;
        let affected = conn.execute("DELETE FROM images WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Lists images, optionally narrowed by category and/or any-tag-match.
    /// Both filters may be combined; a tag filter matches any image whose
    /// JSON-encoded tag list contains the given tag.
    pub fn list(
        pool: &DbPool,
        category: Option<&str>,
        tag: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Image>, CatalogError> {
        let conn = pool.get()?;
        let mut sql = String::from("SELECT * FROM images WHERE 1 = 1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(category) = category {
            sql.push_str(" AND category = ?");
            params.push(Box::new(category.to_string()));
        }
        if let Some(tag) = tag {
            sql.push_str(" AND tags LIKE ?");
            params.push(Box::new(format!("%\"{tag}\"%")));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");
        params.push(Box::new(limit));
        params.push(Box::new(offset));

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), Image::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn search(pool: &DbPool, keyword: &str) -> Result<Vec<Image>, CatalogError> {
        let conn = pool.get()?;
        let pattern = format!("%{keyword}%");
        let mut stmt = conn.prepare(
            "SELECT * FROM images WHERE name LIKE ?1 OR tags LIKE ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([&pattern], Image::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_tags(pool: &DbPool) -> Result<Vec<String>, CatalogError> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare("SELECT tags FROM images")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut tags = std::collections::BTreeSet::new();
        for row in rows {
            let json = row?;
            if let Ok(parsed) = serde_json::from_str::<Vec<String>>(&json) {
                tags.extend(parsed);
            }
        }
        Ok(tags.into_iter().collect())
    }

    pub fn random_by_category(pool: &DbPool, category: &str) -> Result<Option<Image>, CatalogError> {
        let conn = pool.get()?;
        conn.query_row(
            "SELECT * FROM images WHERE category = ?1 ORDER BY RANDOM() LIMIT 1",
            [category],
            Image::from_row,
        )
        .optional()
        .map_err(CatalogError::from)
    }

    pub fn random_by_tag(pool: &DbPool, tag: &str) -> Result<Option<Image>, CatalogError> {
        let conn = pool.get()?;
        let pattern = format!("%\"{tag}\"%");
        conn.query_row(
            "SELECT * FROM images WHERE tags LIKE ?1 ORDER BY RANDOM() LIMIT 1",
            [&pattern],
            Image::from_row,
        )
        .optional()
        .map_err(CatalogError::from)
    }

    pub fn random(pool: &DbPool) -> Result<Option<Image>, CatalogError> {
        let conn = pool.get()?;
        conn.query_row("SELECT * FROM images ORDER BY RANDOM() LIMIT 1", [], Image::from_row)
            .optional()
            .map_err(CatalogError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_pool::create_in_memory_pool;
    use crate::models::generate_id;

    fn sample_image(name: &str, category: &str) -> Image {
        Image {
            id: generate_id(),
            name: name.to_string(),
            category: category.to_string(),
            tags: vec!["a".into(), "b".into()],
            path: "/tmp/x.png".into(),
            size: 10,
            mime_type: "image/png".into(),
            image_hash: "hash".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_then_find_round_trips() {
        let pool = create_in_memory_pool().unwrap();
        let img = sample_image("cat", "animals");
        ImageStore::insert(&pool, &img).unwrap();
        let found = ImageStore::find_by_id(&pool, &img.id).unwrap().unwrap();
        assert_eq!(found.name, "cat");
        assert_eq!(found.tags, vec!["a", "b"]);
    }

    #[test]
    fn list_filters_by_category() {
        let pool = create_in_memory_pool().unwrap();
        ImageStore::insert(&pool, &sample_image("a", "x")).unwrap();
        ImageStore::insert(&pool, &sample_image("b", "y")).unwrap();
        let images = ImageStore::list(&pool, Some("x"), None, 10, 0).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].category, "x");
    }

    #[test]
    fn list_filters_by_tag_and_combines_with_category() {
        let pool = create_in_memory_pool().unwrap();
        let mut tagged = sample_image("a", "x");
        tagged.tags = vec!["cute".into()];
        ImageStore::insert(&pool, &tagged).unwrap();
        ImageStore::insert(&pool, &sample_image("b", "x")).unwrap();

        let by_tag = ImageStore::list(&pool, None, Some("cute"), 10, 0).unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].name, "a");

        let combined = ImageStore::list(&pool, Some("x"), Some("cute"), 10, 0).unwrap();
        assert_eq!(combined.len(), 1);
        let none_match = ImageStore::list(&pool, Some("y"), Some("cute"), 10, 0).unwrap();
        assert_eq!(none_match.len(), 0);
    }

    #[test]
    fn search_matches_name_and_tags() {
        let pool = create_in_memory_pool().unwrap();
        ImageStore::insert(&pool, &sample_image("funny-cat", "x")).unwrap();
        assert_eq!(ImageStore::search(&pool, "funny").unwrap().len(), 1);
        assert_eq!(ImageStore::search(&pool, "nomatch").unwrap().len(), 0);
    }
}
