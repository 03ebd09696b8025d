use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use emoji_vault::blob_store::BlobStore;
use emoji_vault::catalog::Catalog;
use emoji_vault::db_pool::create_db_pool;
use emoji_vault::error::CatalogError;
use emoji_vault::models::EnrichmentResult;
use emoji_vault::store_tasks::TaskQueue;
use emoji_vault::vision_client::{PromptKind, VisionClient};
use emoji_vault::worker::{Worker, WorkerConfig};
use tempfile::TempDir;

fn png_bytes() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(2, 2));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Always returns the same result, counting calls for assertions.
struct FixedVisionClient {
    calls: AtomicUsize,
    result: EnrichmentResult,
}

#[async_trait]
impl VisionClient for FixedVisionClient {
    async fn analyze(
        &self,
        _frames: &[Vec<u8>],
        _prompt: PromptKind,
    ) -> Result<EnrichmentResult, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// Upload an image, let the worker claim and enrich it, and confirm the
/// merged metadata and cache entry land.
#[tokio::test]
async fn upload_then_worker_enriches_image() {
    let data_dir = TempDir::new().unwrap();
    let blob_dir = TempDir::new().unwrap();
    let db_path = data_dir.path().join("catalog.db");
    let pool = create_db_pool(db_path.to_str().unwrap()).unwrap();
    let blobs = BlobStore::new(blob_dir.path()).unwrap();
    let catalog = Arc::new(Catalog::new(pool.clone(), blobs));

    let image = catalog
        .ingest_from_bytes("user-name", "misc", vec!["cute".into()], png_bytes(), true)
        .unwrap();
    assert_eq!(TaskQueue::stats(&pool).unwrap().pending, 1);

    let vision = Arc::new(FixedVisionClient {
        calls: AtomicUsize::new(0),
        result: EnrichmentResult {
            name: Some("analyzed-name".into()),
            category: Some("animals".into()),
            tags: vec!["funny".into()],
            description: Some("a test emoji".into()),
            new_category: None,
        },
    });

    let config = WorkerConfig {
        poll_short_sleep_ms: 1,
        poll_medium_sleep_ms: 1,
        poll_settle_sleep_ms: 1,
        ..WorkerConfig::default()
    };
    let worker = Arc::new(Worker::new(pool.clone(), catalog.clone(), vision, config));
    let handle = worker.handle();
    let join = tokio::spawn(worker.clone().run());

    let mut enriched = None;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if let Ok(Some(img)) = catalog.get_by_id_or_name(&image.id) {
            if img.name == "analyzed-name" {
                enriched = Some(img);
                break;
            }
        }
    }
    handle.stop();
    let _ = tokio::time::timeout(Duration::from_secs(1), join).await;

    let image = enriched.expect("worker should have enriched the image");
    assert_eq!(image.category, "animals");
    assert!(image.tags.contains(&"cute".to_string()));
    assert!(image.tags.contains(&"funny".to_string()));
    assert_eq!(TaskQueue::stats(&pool).unwrap().succeeded, 1);
}

/// A second ingest of identical bytes is rejected as a duplicate rather than
/// creating a second image row.
#[tokio::test]
async fn duplicate_upload_is_rejected() {
    let data_dir = TempDir::new().unwrap();
    let blob_dir = TempDir::new().unwrap();
    let db_path = data_dir.path().join("catalog.db");
    let pool = create_db_pool(db_path.to_str().unwrap()).unwrap();
    let blobs = BlobStore::new(blob_dir.path()).unwrap();
    let catalog = Catalog::new(pool, blobs);

    let bytes = png_bytes();
    catalog
        .ingest_from_bytes("first", "misc", vec![], bytes.clone(), false)
        .unwrap();
    let err = catalog
        .ingest_from_bytes("second", "misc", vec![], bytes, false)
        .unwrap_err();
    assert!(matches!(err, CatalogError::Duplicate { .. }));
}

/// A crashed worker leaves a PROCESSING row behind; the next startup's
/// `reset_stuck` call must recover it so it can be claimed again.
#[tokio::test]
async fn stuck_task_recovers_on_worker_restart() {
    let data_dir = TempDir::new().unwrap();
    let blob_dir = TempDir::new().unwrap();
    let db_path = data_dir.path().join("catalog.db");
    let pool = create_db_pool(db_path.to_str().unwrap()).unwrap();
    let blobs = BlobStore::new(blob_dir.path()).unwrap();
    let catalog = Arc::new(Catalog::new(pool.clone(), blobs));

    let image = catalog
        .ingest_from_bytes("a", "misc", vec![], png_bytes(), false)
        .unwrap();
    TaskQueue::enqueue(&pool, &image.id, &image.path, &image.image_hash).unwrap();
    let task_id = TaskQueue::list_eligible(&pool, 10).unwrap()[0].id;
    TaskQueue::try_claim_one(&pool, task_id).unwrap();

    let stats_before = TaskQueue::stats(&pool).unwrap();
    assert_eq!(stats_before.processing, 1);

    let recovered = TaskQueue::reset_stuck(&pool).unwrap();
    assert_eq!(recovered, 1);
    let stats_after = TaskQueue::stats(&pool).unwrap();
    assert_eq!(stats_after.pending, 1);
    assert_eq!(stats_after.processing, 0);
}
