use std::convert::Infallible;
use std::sync::Arc;

use serde::Serialize;
use warp::{reject, Filter, Rejection, Reply};

use crate::catalog::Catalog;
use crate::db_pool::DbPool;
use crate::error::CatalogError;
use crate::worker::WorkerHandle;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

/// Wraps `CatalogError` so it can travel through warp's rejection channel.
#[derive(Debug)]
pub struct AppError(pub CatalogError);

impl reject::Reject for AppError {}

pub fn reject_catalog_error(e: CatalogError) -> Rejection {
    reject::custom(AppError(e))
}

#[derive(Debug)]
pub struct DatabaseError {
    pub message: String,
}

impl reject::Reject for DatabaseError {}

pub fn with_db(db_pool: DbPool) -> impl Filter<Extract = (DbPool,), Error = Infallible> + Clone {
    warp::any().map(move || db_pool.clone())
}

pub fn with_catalog(
    catalog: Arc<Catalog>,
) -> impl Filter<Extract = (Arc<Catalog>,), Error = Infallible> + Clone {
    warp::any().map(move || catalog.clone())
}

pub fn with_worker(
    worker: WorkerHandle,
) -> impl Filter<Extract = (WorkerHandle,), Error = Infallible> + Clone {
    warp::any().map(move || worker.clone())
}

pub fn with_upload_token(
    token: String,
) -> impl Filter<Extract = (String,), Error = Infallible> + Clone {
    warp::any().map(move || token.clone())
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = warp::http::StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(database_error) = err.find::<DatabaseError>() {
        code = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
        message = database_error.message.clone();
    } else if let Some(AppError(e)) = err.find::<AppError>() {
        code = match e {
            CatalogError::Validation(_) | CatalogError::ParseFailure(_) => {
                warp::http::StatusCode::BAD_REQUEST
            }
            CatalogError::Duplicate { .. } => warp::http::StatusCode::CONFLICT,
            CatalogError::NotFound(_) => warp::http::StatusCode::NOT_FOUND,
            CatalogError::Unauthorized(_) => warp::http::StatusCode::UNAUTHORIZED,
            CatalogError::ModelFailure(_) => warp::http::StatusCode::BAD_GATEWAY,
            CatalogError::StorageIo(_)
            | CatalogError::Database(_)
            | CatalogError::Pool(_)
            | CatalogError::Serde(_) => warp::http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        message = e.to_string();
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        code = warp::http::StatusCode::PAYLOAD_TOO_LARGE;
        message = "Payload too large".to_string();
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        code = warp::http::StatusCode::UNSUPPORTED_MEDIA_TYPE;
        message = "Unsupported media type".to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = warp::http::StatusCode::METHOD_NOT_ALLOWED;
        message = "Method not allowed".to_string();
    } else {
        log::error!("unhandled rejection: {:?}", err);
        code = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal server error".to_string();
    }

    let error_response = ErrorResponse {
        success: false,
        message,
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&error_response),
        code,
    ))
}

pub fn cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
}
