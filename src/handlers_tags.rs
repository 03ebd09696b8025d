use std::sync::Arc;

use serde_json::json;
use warp::{Filter, Rejection, Reply};

use crate::catalog::Catalog;
use crate::db_pool::DbPool;
use crate::error::CatalogError;
use crate::store_images::ImageStore;
use crate::warp_helpers::{reject_catalog_error, with_catalog, with_db};

pub async fn list_tags(pool: DbPool) -> Result<impl Reply, Rejection> {
    let tags = ImageStore::list_tags(&pool).map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&json!({"success": true, "tags": tags})))
}

/// Serves a random image tagged with `tag`'s raw bytes — the `/tags/:tag` contract.
pub async fn random_by_tag(tag: String, catalog: Arc<Catalog>) -> Result<impl Reply, Rejection> {
    let image = ImageStore::random_by_tag(catalog.pool(), &tag)
        .map_err(reject_catalog_error)?
        .ok_or_else(|| reject_catalog_error(CatalogError::NotFound(tag)))?;
    let bytes = catalog.read_image_bytes(&image).map_err(reject_catalog_error)?;
    Ok(warp::http::Response::builder()
        .header("content-type", image.mime_type)
        .body(bytes)
        .unwrap())
}

pub fn build_tag_routes(
    pool: DbPool,
    catalog: Arc<Catalog>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let base = warp::path("tags");

    let list = base
        .and(warp::path::end())
        .and(warp::get())
        .and(with_db(pool))
        .and_then(list_tags);

    let random = base
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_catalog(catalog))
        .and_then(random_by_tag);

    list.or(random)
}
