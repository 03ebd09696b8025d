use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info, warn};
use tokio::time::sleep;

use crate::catalog::Catalog;
use crate::db_pool::DbPool;
use crate::image_inspector;
use crate::models::AiTask;
use crate::store_cache::ResultCache;
use crate::store_tasks::TaskQueue;
use crate::vision_client::{PromptKind, VisionClient};

const RUNNING: u8 = 0;
const PAUSED: u8 = 1;
const STOPPED: u8 = 2;

const FRAME_SAMPLE_COUNT: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub batch_delay_ms: u64,
    pub max_attempts: i64,
    pub backoff_base_ms: i64,
    pub poll_short_sleep_ms: u64,
    pub poll_medium_sleep_ms: u64,
    pub poll_settle_sleep_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            concurrency: 2,
            batch_delay_ms: 250,
            max_attempts: 5,
            backoff_base_ms: 2000,
            poll_short_sleep_ms: 500,
            poll_medium_sleep_ms: 2000,
            poll_settle_sleep_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RuntimeOverride {
    concurrency: Option<usize>,
    batch_delay_ms: Option<u64>,
}

/// A cloneable front to the worker's mutable runtime state, handed to the
/// HTTP layer so pause/resume/config endpoints don't need the worker's
/// vision client or catalog in scope.
#[derive(Clone)]
pub struct WorkerHandle {
    state: Arc<AtomicU8>,
    overrides: Arc<Mutex<RuntimeOverride>>,
}

impl WorkerHandle {
    pub fn pause(&self) {
        self.state.store(PAUSED, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.state.store(RUNNING, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.state.store(STOPPED, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.state.load(Ordering::SeqCst) == PAUSED
    }

    pub fn set_concurrency(&self, concurrency: Option<usize>) {
        self.overrides.lock().unwrap().concurrency = concurrency;
    }

    pub fn set_batch_delay_ms(&self, delay: Option<u64>) {
        self.overrides.lock().unwrap().batch_delay_ms = delay;
    }
}

/// The poll-based enrichment worker: claims eligible tasks, bounds how many
/// run at once, and never dispatches the same task id twice within one
/// process.
pub struct Worker {
    pool: DbPool,
    catalog: Arc<Catalog>,
    vision: Arc<dyn VisionClient>,
    config: WorkerConfig,
    state: Arc<AtomicU8>,
    overrides: Arc<Mutex<RuntimeOverride>>,
    in_flight: Arc<Mutex<HashSet<i64>>>,
    active: Arc<AtomicUsize>,
}

impl Worker {
    pub fn new(
        pool: DbPool,
        catalog: Arc<Catalog>,
        vision: Arc<dyn VisionClient>,
        config: WorkerConfig,
    ) -> Self {
        Worker {
            pool,
            catalog,
            vision,
            config,
            state: Arc::new(AtomicU8::new(RUNNING)),
            overrides: Arc::new(Mutex::new(RuntimeOverride::default())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            state: self.state.clone(),
            overrides: self.overrides.clone(),
        }
    }

    fn effective_settings(&self) -> (usize, u64) {
        let overrides = *self.overrides.lock().unwrap();
        (
            overrides.concurrency.unwrap_or(self.config.concurrency),
            overrides.batch_delay_ms.unwrap_or(self.config.batch_delay_ms),
        )
    }

    /// The poll loop. Runs until `stop()` is called on a handle; meant to be
    /// driven by `tokio::spawn(worker.run())`.
    pub async fn run(self: Arc<Self>) {
        match TaskQueue::reset_stuck(&self.pool) {
            Ok(n) if n > 0 => info!("recovered {n} stuck task(s) from a prior crash"),
            Ok(_) => {}
            Err(e) => error!("failed to reset stuck tasks at startup: {e}"),
        }

        loop {
            match self.state.load(Ordering::SeqCst) {
                STOPPED => break,
                PAUSED => {
                    sleep(Duration::from_millis(self.config.poll_short_sleep_ms)).await;
                    continue;
                }
                _ => {}
            }

            let (concurrency, batch_delay_ms) = self.effective_settings();
            let active = self.active.load(Ordering::SeqCst);
            if active >= concurrency {
                sleep(Duration::from_millis(self.config.poll_short_sleep_ms)).await;
                continue;
            }

            let want = (2 * (concurrency - active)).max(1) as i64;
            let eligible = match TaskQueue::list_eligible(&self.pool, want) {
                Ok(rows) => rows,
                Err(e) => {
                    error!("failed to list eligible tasks: {e}");
                    sleep(Duration::from_millis(self.config.poll_medium_sleep_ms)).await;
                    continue;
                }
            };

            if eligible.is_empty() {
                sleep(Duration::from_millis(self.config.poll_medium_sleep_ms)).await;
                continue;
            }

            for task in eligible {
                if self.active.load(Ordering::SeqCst) >= concurrency {
                    break;
                }
                match TaskQueue::try_claim_one(&self.pool, task.id) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        error!("failed to claim task {}: {e}", task.id);
                        continue;
                    }
                }

                let already_dispatched = {
                    let mut set = self.in_flight.lock().unwrap();
                    !set.insert(task.id)
                };
                if already_dispatched {
                    continue;
                }

                self.active.fetch_add(1, Ordering::SeqCst);
                let worker = self.clone();
                tokio::spawn(async move { worker.process_task(task).await });
                sleep(Duration::from_millis(batch_delay_ms)).await;
            }

            sleep(Duration::from_millis(self.config.poll_settle_sleep_ms)).await;
        }
    }

    /// Stops the loop and waits for in-flight tasks dispatched before the
    /// stop to settle.
    pub async fn stop_and_wait(&self) {
        self.state.store(STOPPED, Ordering::SeqCst);
        while self.active.load(Ordering::SeqCst) > 0 {
            sleep(Duration::from_millis(50)).await;
        }
    }

    async fn process_task(self: Arc<Self>, task: AiTask) {
        let result = self.run_task(&task).await;
        let outcome = match result {
            Ok(()) => TaskQueue::complete_success(&self.pool, task.id),
            Err(e) => {
                warn!("task {} failed: {e}", task.id);
                TaskQueue::complete_fail(
                    &self.pool,
                    task.id,
                    &e.to_string(),
                    self.config.max_attempts,
                    self.config.backoff_base_ms,
                )
            }
        };
        if let Err(e) = outcome {
            error!("failed to record outcome for task {}: {e}", task.id);
        }

        self.in_flight.lock().unwrap().remove(&task.id);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    async fn run_task(&self, task: &AiTask) -> Result<(), crate::error::CatalogError> {
        let path = task.image_path.clone();
        let bytes = tokio::fs::read(&path).await?;

        let format = image_inspector::detect_format(&bytes).ok_or_else(|| {
            crate::error::CatalogError::Validation("unsupported image format".to_string())
        })?;
        let mut frames = image_inspector::sample_frames(&bytes, FRAME_SAMPLE_COUNT, format);
        if frames.is_empty() {
            frames.push(bytes);
        }

        let result = self.vision.analyze(&frames, PromptKind::Enrich).await?;

        self.catalog.apply_enrichment(&task.emoji_id, &result)?;
        ResultCache::put(&self.pool, &task.image_hash, &result)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::BlobStore;
    use crate::db_pool::create_in_memory_pool;
    use crate::models::EnrichmentResult;
    use crate::vision_client::mock::ScriptedVisionClient;
    use tempfile::TempDir;

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(2, 2));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn run_task_applies_result_and_caches_it() {
        let dir = TempDir::new().unwrap();
        let pool = create_in_memory_pool().unwrap();
        let blobs = BlobStore::new(dir.path()).unwrap();
        let catalog = Arc::new(Catalog::new(pool.clone(), blobs));
        let image = catalog
            .ingest_from_bytes("a", "misc", vec![], png_bytes(), false)
            .unwrap();
        TaskQueue::enqueue(&pool, &image.id, &image.path, &image.image_hash).unwrap();
        let task = TaskQueue::list_eligible(&pool, 10).unwrap().remove(0);

        let vision = Arc::new(ScriptedVisionClient::new(
            0,
            EnrichmentResult {
                name: Some("analyzed".into()),
                ..Default::default()
            },
        ));
        let worker = Worker::new(pool.clone(), catalog.clone(), vision, WorkerConfig::default());
        worker.run_task(&task).await.unwrap();

        let refreshed = catalog.get_by_id_or_name(&image.id).unwrap().unwrap();
        assert_eq!(refreshed.name, "analyzed");
        assert!(ResultCache::get(&pool, &image.image_hash).unwrap().is_some());
    }

    #[tokio::test]
    async fn run_task_tolerates_deleted_image() {
        let dir = TempDir::new().unwrap();
        let pool = create_in_memory_pool().unwrap();
        let blobs = BlobStore::new(dir.path()).unwrap();
        let catalog = Arc::new(Catalog::new(pool.clone(), blobs));
        let image = catalog
            .ingest_from_bytes("a", "misc", vec![], png_bytes(), false)
            .unwrap();
        TaskQueue::enqueue(&pool, &image.id, &image.path, &image.image_hash).unwrap();
        let task = TaskQueue::list_eligible(&pool, 10).unwrap().remove(0);
        catalog.delete(&image.id).unwrap();

        let vision = Arc::new(ScriptedVisionClient::new(
            0,
            EnrichmentResult::default(),
        ));
        let worker = Worker::new(pool, catalog, vision, WorkerConfig::default());
        worker.run_task(&task).await.unwrap();
    }

    #[tokio::test]
    async fn full_loop_retries_until_success() {
        let dir = TempDir::new().unwrap();
        let pool = create_in_memory_pool().unwrap();
        let blobs = BlobStore::new(dir.path()).unwrap();
        let catalog = Arc::new(Catalog::new(pool.clone(), blobs));
        let image = catalog
            .ingest_from_bytes("a", "misc", vec![], png_bytes(), false)
            .unwrap();
        TaskQueue::enqueue(&pool, &image.id, &image.path, &image.image_hash).unwrap();

        let vision = Arc::new(ScriptedVisionClient::new(
            2,
            EnrichmentResult {
                name: Some("eventually".into()),
                ..Default::default()
            },
        ));
        let mut config = WorkerConfig::default();
        config.backoff_base_ms = 1;
        config.poll_short_sleep_ms = 1;
        config.poll_medium_sleep_ms = 1;
        config.poll_settle_sleep_ms = 1;
        let worker = Arc::new(Worker::new(pool.clone(), catalog.clone(), vision, config));
        let handle = worker.handle();
        let join = tokio::spawn(worker.clone().run());

        let mut refreshed = None;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if let Ok(Some(img)) = catalog.get_by_id_or_name(&image.id) {
                if img.name == "eventually" {
                    refreshed = Some(img);
                    break;
                }
            }
        }
        handle.stop();
        let _ = tokio::time::timeout(Duration::from_secs(1), join).await;
        assert_eq!(refreshed.unwrap().name, "eventually");
    }
}
