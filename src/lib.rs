pub mod blob_store;
pub mod catalog;
pub mod config;
pub mod db_pool;
pub mod db_schema;
pub mod error;
pub mod image_inspector;
pub mod merge;
pub mod models;
pub mod store_cache;
pub mod store_categories;
pub mod store_images;
pub mod store_tasks;
pub mod vision_client;
pub mod warp_helpers;
pub mod worker;

pub mod handlers_categories;
pub mod handlers_health;
pub mod handlers_images;
pub mod handlers_tags;
pub mod handlers_tasks;
pub mod handlers_worker;
