use std::path::Path;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::blob_store::BlobStore;
use crate::db_pool::DbPool;
use crate::error::CatalogError;
use crate::image_inspector;
use crate::merge::{self, UserFields};
use crate::models::{generate_id, BatchReport, EnrichmentResult, Image};
use crate::store_cache::ResultCache;
use crate::store_categories::CategoryStore;
use crate::store_images::ImageStore;
use crate::store_tasks::TaskQueue;

const AI_CATEGORY_MARKER: &str = "AI 自动创建的分类";

#[derive(Debug, Clone)]
pub enum CatalogEvent {
    ImageAdded(Image),
    ImageUpdated(Image),
    ImageDeleted(String),
}

/// The image-asset catalog: ingest, metadata mutation, listing/search, and
/// the merge-rule application shared by the cache-hit and worker-success
/// paths.
pub struct Catalog {
    pool: DbPool,
    blobs: BlobStore,
    events: broadcast::Sender<CatalogEvent>,
}

impl Catalog {
    pub fn new(pool: DbPool, blobs: BlobStore) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Catalog {
            pool,
            blobs,
            events: tx,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CatalogEvent) {
        // No receivers is the common case outside of tests; ignore it.
        let _ = self.events.send(event);
    }

    /// Ingests raw bytes already in memory (the HTTP upload path).
    pub fn ingest_from_bytes(
        &self,
        name: &str,
        category: &str,
        tags: Vec<String>,
        bytes: Vec<u8>,
        enrich: bool,
    ) -> Result<Image, CatalogError> {
        let format = image_inspector::detect_format(&bytes)
            .ok_or_else(|| CatalogError::Validation("unsupported image format".to_string()))?;
        let hash = image_inspector::hash(&bytes);

        if let Some(existing) = ImageStore::find_by_hash(&self.pool, &hash)? {
            return Err(CatalogError::Duplicate {
                existing_name: existing.name,
            });
        }

        let id = generate_id();
        let path = self.blobs.write(&id, format.extension(), &bytes)?;
        self.finish_ingest(id, name, category, tags, path.display().to_string(), bytes.len() as i64, format.mime_type().to_string(), hash, enrich)
    }

    /// Ingests a file already on disk, moving it into the blob store.
    pub fn ingest_from_path(
        &self,
        name: &str,
        category: &str,
        tags: Vec<String>,
        src: &Path,
        enrich: bool,
    ) -> Result<Image, CatalogError> {
        let bytes = std::fs::read(src)?;
        let format = image_inspector::detect_format(&bytes)
            .ok_or_else(|| CatalogError::Validation("unsupported image format".to_string()))?;
        let hash = image_inspector::hash(&bytes);

        if let Some(existing) = ImageStore::find_by_hash(&self.pool, &hash)? {
            return Err(CatalogError::Duplicate {
                existing_name: existing.name,
            });
        }

        let id = generate_id();
        let path = self.blobs.move_in(&id, format.extension(), src)?;
        self.finish_ingest(id, name, category, tags, path.display().to_string(), bytes.len() as i64, format.mime_type().to_string(), hash, enrich)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_ingest(
        &self,
        id: String,
        name: &str,
        category: &str,
        tags: Vec<String>,
        path: String,
        size: i64,
        mime_type: String,
        hash: String,
        enrich: bool,
    ) -> Result<Image, CatalogError> {
        CategoryStore::get_or_create(&self.pool, category, None)?;

        let image = Image {
            id,
            name: name.to_string(),
            category: category.to_string(),
            tags,
            path,
            size,
            mime_type,
            image_hash: hash.clone(),
            created_at: Utc::now(),
        };
        ImageStore::insert(&self.pool, &image)?;
        CategoryStore::adjust_count(&self.pool, category, 1)?;
        self.emit(CatalogEvent::ImageAdded(image.clone()));

        if enrich {
            if let Some(cached) = ResultCache::get(&self.pool, &hash)? {
                self.apply_enrichment(&image.id, &cached)?;
            } else {
                TaskQueue::enqueue(&self.pool, &image.id, &image.path, &hash)?;
            }
        }

        Ok(image)
    }

    /// Scans `dir` non-recursively and ingests every file directly inside
    /// it. Unsupported or duplicate files are recorded in the report rather
    /// than aborting the batch.
    pub fn ingest_folder(&self, dir: &Path, enrich: bool) -> Result<BatchReport, CatalogError> {
        use rayon::prelude::*;

        let mut report = BatchReport::default();
        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report.failed.push(("<unreadable entry>".to_string(), e.to_string()));
                    continue;
                }
            };
            let path = entry.path();
            if path.is_file() {
                candidates.push(path);
            }
        }

        // Reading and hashing each file is independent of every other one;
        // do it in parallel and keep only the sequential DB/blob-store work
        // single-threaded.
        let prepared: Vec<(std::path::PathBuf, Result<Vec<u8>, std::io::Error>)> = candidates
            .into_par_iter()
            .map(|path| {
                let bytes = std::fs::read(&path);
                (path, bytes)
            })
            .collect();

        for (path, bytes) in prepared {
            let path_str = path.display().to_string();
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string();

            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(e) => {
                    report.failed.push((path_str, e.to_string()));
                    continue;
                }
            };

            let result = self
                .ingest_from_bytes(&name, merge::FALLBACK_CATEGORY, Vec::new(), bytes, enrich)
                .and_then(|image| {
                    std::fs::remove_file(&path)?;
                    Ok(image)
                });

            match result {
                Ok(image) => report.ok.push(image),
                Err(e) => report.failed.push((path_str, e.to_string())),
            }
        }

        Ok(report)
    }

    pub fn delete(&self, id: &str) -> Result<(), CatalogError> {
        let image = ImageStore::find_by_id(&self.pool, id)?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        self.blobs.delete(Path::new(&image.path))?;
        ImageStore::delete(&self.pool, id)?;
        CategoryStore::adjust_count(&self.pool, &image.category, -1)?;
        self.emit(CatalogEvent::ImageDeleted(id.to_string()));
        Ok(())
    }

    pub fn update_name(&self, id: &str, name: &str) -> Result<Image, CatalogError> {
        let mut image = ImageStore::find_by_id(&self.pool, id)?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        image.name = name.to_string();
        ImageStore::update(&self.pool, &image)?;
        self.emit(CatalogEvent::ImageUpdated(image.clone()));
        Ok(image)
    }

    pub fn update_category(&self, id: &str, category: &str) -> Result<Image, CatalogError> {
        let mut image = ImageStore::find_by_id(&self.pool, id)?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        let old_category = image.category.clone();
        if old_category != category {
            CategoryStore::get_or_create(&self.pool, category, None)?;
            CategoryStore::adjust_count(&self.pool, &old_category, -1)?;
            CategoryStore::adjust_count(&self.pool, category, 1)?;
        }
        image.category = category.to_string();
        ImageStore::update(&self.pool, &image)?;
        self.emit(CatalogEvent::ImageUpdated(image.clone()));
        Ok(image)
    }

    pub fn update_tags(&self, id: &str, tags: Vec<String>) -> Result<Image, CatalogError> {
        let mut image = ImageStore::find_by_id(&self.pool, id)?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        image.tags = tags;
        ImageStore::update(&self.pool, &image)?;
        self.emit(CatalogEvent::ImageUpdated(image.clone()));
        Ok(image)
    }

    /// Applies an enrichment result to an image via the shared merge rule.
    /// A no-op when the image has since been deleted — a task outliving its
    /// image is expected, not an error.
    pub fn apply_enrichment(&self, image_id: &str, result: &EnrichmentResult) -> Result<(), CatalogError> {
        let Some(mut image) = ImageStore::find_by_id(&self.pool, image_id)? else {
            return Ok(());
        };

        if let Some(new_category) = &result.new_category {
            if CategoryStore::get_by_name(&self.pool, new_category)?.is_none() {
                CategoryStore::create(&self.pool, new_category, Some(AI_CATEGORY_MARKER))?;
            }
        }

        let user = UserFields {
            name: image.name.clone(),
            category: image.category.clone(),
            tags: image.tags.clone(),
        };
        let merged = merge::merge(&user, result);

        if merged.category != image.category {
            CategoryStore::get_or_create(&self.pool, &merged.category, None)?;
            CategoryStore::adjust_count(&self.pool, &image.category, -1)?;
            CategoryStore::adjust_count(&self.pool, &merged.category, 1)?;
        }

        image.name = merged.name;
        image.category = merged.category;
        image.tags = merged.tags;
        ImageStore::update(&self.pool, &image)?;
        self.emit(CatalogEvent::ImageUpdated(image));
        Ok(())
    }

    pub fn read_image_bytes(&self, image: &Image) -> Result<Vec<u8>, CatalogError> {
        self.blobs.read(Path::new(&image.path))
    }

    pub fn get_by_id_or_name(&self, key: &str) -> Result<Option<Image>, CatalogError> {
        if let Some(image) = ImageStore::find_by_id(&self.pool, key)? {
            return Ok(Some(image));
        }
        ImageStore::find_by_name(&self.pool, key)
    }

    pub fn list(
        &self,
        category: Option<&str>,
        tag: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Image>, CatalogError> {
        ImageStore::list(&self.pool, category, tag, limit, offset)
    }

    pub fn search(&self, keyword: &str) -> Result<Vec<Image>, CatalogError> {
        ImageStore::search(&self.pool, keyword)
    }
}
