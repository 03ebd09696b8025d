use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use warp::{Filter, Rejection, Reply};

use crate::catalog::Catalog;
use crate::db_pool::DbPool;
use crate::error::CatalogError;
use crate::store_categories::CategoryStore;
use crate::warp_helpers::{reject_catalog_error, with_catalog, with_db};

#[derive(Debug, Deserialize)]
pub struct CreateCategoryBody {
    pub name: String,
    pub description: Option<String>,
}

pub async fn list_categories(pool: DbPool) -> Result<impl Reply, Rejection> {
    let categories = CategoryStore::list(&pool).map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&json!({"success": true, "categories": categories})))
}

pub async fn create_category(body: CreateCategoryBody, pool: DbPool) -> Result<impl Reply, Rejection> {
    let category = CategoryStore::create(&pool, &body.name, body.description.as_deref())
        .map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&json!({"success": true, "category": category})))
}

pub async fn delete_category(id: i64, pool: DbPool) -> Result<impl Reply, Rejection> {
    let deleted = CategoryStore::delete(&pool, id).map_err(reject_catalog_error)?;
    if !deleted {
        return Err(reject_catalog_error(CatalogError::NotFound(id.to_string())));
    }
    Ok(warp::reply::json(&json!({"success": true})))
}

/// Serves a random image from `category`'s raw bytes — the `/categories/:category` contract.
pub async fn random_by_category(category: String, catalog: Arc<Catalog>) -> Result<impl Reply, Rejection> {
    let image = crate::store_images::ImageStore::random_by_category(catalog.pool(), &category)
        .map_err(reject_catalog_error)?
        .ok_or_else(|| reject_catalog_error(CatalogError::NotFound(category)))?;
    let bytes = catalog.read_image_bytes(&image).map_err(reject_catalog_error)?;
    Ok(warp::http::Response::builder()
        .header("content-type", image.mime_type)
        .body(bytes)
        .unwrap())
}

pub fn build_category_routes(
    pool: DbPool,
    catalog: Arc<Catalog>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let base = warp::path("categories");

    let list = base
        .and(warp::path::end())
        .and(warp::get())
        .and(with_db(pool.clone()))
        .and_then(list_categories);

    let create = base
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_db(pool.clone()))
        .and_then(create_category);

    let delete = base
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::delete())
        .and(with_db(pool))
        .and_then(delete_category);

    let random = base
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_catalog(catalog))
        .and_then(random_by_category);

    list.or(create).or(random).or(delete)
}
