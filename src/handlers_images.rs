use std::sync::Arc;

use bytes::Buf;
use futures_util::TryStreamExt;
use serde::Deserialize;
use serde_json::json;
use warp::{Filter, Rejection, Reply};

use crate::catalog::Catalog;
use crate::error::CatalogError;
use crate::warp_helpers::{reject_catalog_error, with_catalog, with_upload_token};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
}

#[derive(Debug, Deserialize)]
pub struct NameBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryBody {
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct TagsBody {
    pub tags: Vec<String>,
}

pub async fn list_images(query: ListQuery, catalog: Arc<Catalog>) -> Result<impl Reply, Rejection> {
    let images = catalog
        .list(query.category.as_deref(), query.tag.as_deref(), query.limit, query.offset)
        .map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&json!({"success": true, "images": images})))
}

pub async fn search_images(query: SearchQuery, catalog: Arc<Catalog>) -> Result<impl Reply, Rejection> {
    let images = catalog.search(&query.keyword).map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&json!({"success": true, "images": images})))
}

pub async fn get_image_meta(id: String, catalog: Arc<Catalog>) -> Result<impl Reply, Rejection> {
    let image = catalog
        .get_by_id_or_name(&id)
        .map_err(reject_catalog_error)?
        .ok_or_else(|| reject_catalog_error(CatalogError::NotFound(id)))?;
    Ok(warp::reply::json(&json!({"success": true, "image": image})))
}

/// Serves the image's raw bytes with its stored mime-type — the `/get/:id`
/// contract, which looks up by id or by name.
pub async fn get_image_bytes(id: String, catalog: Arc<Catalog>) -> Result<impl Reply, Rejection> {
    let image = catalog
        .get_by_id_or_name(&id)
        .map_err(reject_catalog_error)?
        .ok_or_else(|| reject_catalog_error(CatalogError::NotFound(id)))?;
    let bytes = catalog.read_image_bytes(&image).map_err(reject_catalog_error)?;
    Ok(warp::http::Response::builder()
        .header("content-type", image.mime_type)
        .body(bytes)
        .unwrap())
}

pub async fn random_image(catalog: Arc<Catalog>) -> Result<impl Reply, Rejection> {
    let image = crate::store_images::ImageStore::random(catalog.pool())
        .map_err(reject_catalog_error)?
        .ok_or_else(|| reject_catalog_error(CatalogError::NotFound("no images".to_string())))?;
    let bytes = catalog.read_image_bytes(&image).map_err(reject_catalog_error)?;
    Ok(warp::http::Response::builder()
        .header("content-type", image.mime_type)
        .body(bytes)
        .unwrap())
}

pub async fn delete_image(id: String, catalog: Arc<Catalog>) -> Result<impl Reply, Rejection> {
    catalog.delete(&id).map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&json!({"success": true})))
}

pub async fn update_name(id: String, body: NameBody, catalog: Arc<Catalog>) -> Result<impl Reply, Rejection> {
    let image = catalog
        .update_name(&id, &body.name)
        .map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&json!({"success": true, "image": image})))
}

pub async fn update_category(
    id: String,
    body: CategoryBody,
    catalog: Arc<Catalog>,
) -> Result<impl Reply, Rejection> {
    let image = catalog
        .update_category(&id, &body.category)
        .map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&json!({"success": true, "image": image})))
}

pub async fn update_tags(id: String, body: TagsBody, catalog: Arc<Catalog>) -> Result<impl Reply, Rejection> {
    let image = catalog
        .update_tags(&id, body.tags)
        .map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&json!({"success": true, "image": image})))
}

/// Checks the `x-upload-token` header, falling back to a `Bearer` token in
/// `authorization`. A server with an empty configured token accepts any
/// request — auth is opt-in.
fn check_upload_token(
    configured: &str,
    x_upload_token: Option<String>,
    authorization: Option<String>,
) -> Result<(), CatalogError> {
    if configured.is_empty() {
        return Ok(());
    }
    let provided = x_upload_token.or_else(|| {
        authorization.and_then(|header| header.strip_prefix("Bearer ").map(|s| s.to_string()))
    });
    match provided {
        Some(token) if token == configured => Ok(()),
        _ => Err(CatalogError::Unauthorized("missing or invalid upload token".to_string())),
    }
}

/// Drains a multipart form into its `file` bytes plus the `name`, `category`,
/// `tags` (JSON-encoded array), and `aiAnalysis` fields.
async fn parse_upload_form(
    form: warp::multipart::FormData,
) -> Result<(Vec<u8>, Option<String>, Option<String>, Option<String>, bool), CatalogError> {
    let parts: Vec<warp::multipart::Part> = form
        .try_collect()
        .await
        .map_err(|e| CatalogError::Validation(format!("invalid multipart body: {e}")))?;

    let mut file_bytes = None;
    let mut name = None;
    let mut category = None;
    let mut tags_json = None;
    let mut ai_analysis = false;

    for mut part in parts {
        let field_name = part.name().to_string();
        let mut buf = Vec::new();
        while let Some(chunk) = part.data().await {
            let chunk = chunk.map_err(|e| CatalogError::Validation(format!("invalid multipart chunk: {e}")))?;
            buf.extend_from_slice(chunk.chunk());
        }
        match field_name.as_str() {
            "file" => file_bytes = Some(buf),
            "name" => name = Some(String::from_utf8_lossy(&buf).to_string()),
            "category" => category = Some(String::from_utf8_lossy(&buf).to_string()),
            "tags" => tags_json = Some(String::from_utf8_lossy(&buf).to_string()),
            "aiAnalysis" => ai_analysis = String::from_utf8_lossy(&buf) == "true",
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| CatalogError::Validation("missing file field".to_string()))?;
    Ok((file_bytes, name, category, tags_json, ai_analysis))
}

pub async fn upload_image(
    form: warp::multipart::FormData,
    x_upload_token: Option<String>,
    authorization: Option<String>,
    upload_token: String,
    catalog: Arc<Catalog>,
) -> Result<impl Reply, Rejection> {
    check_upload_token(&upload_token, x_upload_token, authorization).map_err(reject_catalog_error)?;

    let (bytes, name, category, tags_json, ai_analysis) =
        parse_upload_form(form).await.map_err(reject_catalog_error)?;

    let name = name.unwrap_or_else(|| "untitled".to_string());
    let category = category
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| crate::merge::FALLBACK_CATEGORY.to_string());
    let tags: Vec<String> = tags_json
        .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
        .unwrap_or_default();

    let image = catalog
        .ingest_from_bytes(&name, &category, tags, bytes, ai_analysis)
        .map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&json!({"success": true, "image": image})))
}

/// Wires the `/list`, `/search`, `/random`, `/get/:id`, and `/upload`
/// top-level routes plus `/images/:id` admin mutation endpoints.
pub fn build_image_routes(
    catalog: Arc<Catalog>,
    upload_token: String,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let list = warp::path("list")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<ListQuery>())
        .and(with_catalog(catalog.clone()))
        .and_then(list_images);

    let search = warp::path("search")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<SearchQuery>())
        .and(with_catalog(catalog.clone()))
        .and_then(search_images);

    let random = warp::path("random")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_catalog(catalog.clone()))
        .and_then(random_image);

    let get_by_id = warp::path("get")
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_catalog(catalog.clone()))
        .and_then(get_image_bytes);

    let upload = warp::path("upload")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::multipart::form().max_length(20 * 1024 * 1024))
        .and(warp::header::optional::<String>("x-upload-token"))
        .and(warp::header::optional::<String>("authorization"))
        .and(with_upload_token(upload_token))
        .and(with_catalog(catalog.clone()))
        .and_then(upload_image);

    let admin_base = warp::path("images");

    let get_meta = admin_base
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_catalog(catalog.clone()))
        .and_then(get_image_meta);

    let delete = admin_base
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::delete())
        .and(with_catalog(catalog.clone()))
        .and_then(delete_image);

    let update_name_route = admin_base
        .and(warp::path::param())
        .and(warp::path("name"))
        .and(warp::path::end())
        .and(warp::put())
        .and(warp::body::json())
        .and(with_catalog(catalog.clone()))
        .and_then(update_name);

    let update_category_route = admin_base
        .and(warp::path::param())
        .and(warp::path("category"))
        .and(warp::path::end())
        .and(warp::put())
        .and(warp::body::json())
        .and(with_catalog(catalog.clone()))
        .and_then(update_category);

    let update_tags_route = admin_base
        .and(warp::path::param())
        .and(warp::path("tags"))
        .and(warp::path::end())
        .and(warp::put())
        .and(warp::body::json())
        .and(with_catalog(catalog))
        .and_then(update_tags);

    list.or(search)
        .or(random)
        .or(get_by_id)
        .or(upload)
        .or(update_name_route)
        .or(update_category_route)
        .or(update_tags_route)
        .or(delete)
        .or(get_meta)
}
