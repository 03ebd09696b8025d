use thiserror::Error;

/// Unified error type for the catalog, task queue and worker.
///
/// Mirrors the HTTP-facing status-code taxonomy: each variant maps to exactly
/// one kind in `warp_helpers::handle_rejection`.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("表情包已存在: 与现有表情包 {existing_name} 重复")]
    Duplicate { existing_name: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("storage io error: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("vision model failure: {0}")]
    ModelFailure(String),

    #[error("unparsable model response: {0}")]
    ParseFailure(String),
}
