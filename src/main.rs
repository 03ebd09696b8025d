use log::{error, info};
use std::net::TcpListener;
use std::sync::Arc;
use warp::Filter;

use emoji_vault::blob_store::BlobStore;
use emoji_vault::catalog::Catalog;
use emoji_vault::db_pool::{self, DbPool};
use emoji_vault::vision_client::NullVisionClient;
use emoji_vault::warp_helpers::cors;
use emoji_vault::worker::{Worker, WorkerHandle};
use emoji_vault::{config, handlers_categories, handlers_health, handlers_images, handlers_tags, handlers_tasks, handlers_worker, warp_helpers};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = config::Config::from_env()?;
    let port = config.port;

    info!("starting emoji-vault server on port {}", port);
    info!("data path: {}", config.data_path);
    info!("database: {}", config.db_path);
    info!("blob store: {}", config.blob_path);

    if !is_port_available(port) {
        error!(
            "port {} is already in use. Stop any existing emoji-vault instance or choose a different port.",
            port
        );
        return Err(format!("port {} is already in use", port).into());
    }

    let (catalog, worker_handle) = initialize_services(&config)?;

    let health_routes = handlers_health::build_health_routes(catalog.pool().clone());
    let image_routes = handlers_images::build_image_routes(catalog.clone(), config.upload_token.clone());
    let category_routes =
        handlers_categories::build_category_routes(catalog.pool().clone(), catalog.clone());
    let tag_routes = handlers_tags::build_tag_routes(catalog.pool().clone(), catalog.clone());
    let task_routes = handlers_tasks::build_task_routes(catalog.pool().clone(), catalog.clone());
    let worker_routes = handlers_worker::build_worker_routes(worker_handle);

    let routes = health_routes
        .or(image_routes)
        .or(category_routes)
        .or(tag_routes)
        .or(task_routes)
        .or(worker_routes)
        .with(cors())
        .with(warp::log("emoji_vault"))
        .recover(warp_helpers::handle_rejection);

    info!(
        "server started successfully, listening on http://0.0.0.0:{}",
        port
    );

    warp::serve(routes).run(([0, 0, 0, 0], port)).await;

    Ok(())
}

fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

fn initialize_services(
    config: &config::Config,
) -> Result<(Arc<Catalog>, WorkerHandle), Box<dyn std::error::Error>> {
    let db_pool: DbPool = db_pool::create_db_pool(&config.db_path)?;
    info!("database initialized successfully");

    let blobs = BlobStore::new(&config.blob_path)?;
    let catalog = Arc::new(Catalog::new(db_pool.clone(), blobs));

    // No real vision backend is configured out of the box; operators wire
    // one in by swapping this for their own `VisionClient` impl.
    let vision = Arc::new(NullVisionClient);

    let worker = Arc::new(Worker::new(
        db_pool,
        catalog.clone(),
        vision,
        config.worker_config(),
    ));
    let worker_handle = worker.handle();
    tokio::spawn(worker.run());
    info!("enrichment worker started");

    Ok((catalog, worker_handle))
}
