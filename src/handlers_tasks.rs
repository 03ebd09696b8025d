use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use warp::{Filter, Rejection, Reply};

use crate::catalog::Catalog;
use crate::db_pool::DbPool;
use crate::store_tasks::TaskQueue;
use crate::warp_helpers::{reject_catalog_error, with_catalog, with_db};

#[derive(Debug, Deserialize)]
pub struct ReanalyzeBody {
    pub ids: Vec<String>,
}

pub async fn task_stats(pool: DbPool) -> Result<impl Reply, Rejection> {
    let stats = TaskQueue::stats(&pool).map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&stats))
}

pub async fn list_failed(pool: DbPool) -> Result<impl Reply, Rejection> {
    let ids = TaskQueue::list_failed_emoji_ids(&pool).map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&ids))
}

pub async fn retry_failed(pool: DbPool) -> Result<impl Reply, Rejection> {
    let n = TaskQueue::retry_failed(&pool).map_err(reject_catalog_error)?;
    Ok(warp::reply::json(&json!({"requeued": n})))
}

/// Re-enqueues enrichment for a set of images, bypassing the result cache.
pub async fn reanalyze(body: ReanalyzeBody, catalog: Arc<Catalog>) -> Result<impl Reply, Rejection> {
    let mut enqueued = Vec::new();
    for id in body.ids {
        if let Some(image) = catalog.get_by_id_or_name(&id).map_err(reject_catalog_error)? {
            let queued = TaskQueue::enqueue(catalog.pool(), &image.id, &image.path, &image.image_hash)
                .map_err(reject_catalog_error)?;
            if queued {
                enqueued.push(image.id);
            }
        }
    }
    Ok(warp::reply::json(&json!({"enqueued": enqueued})))
}

pub fn build_task_routes(
    pool: DbPool,
    catalog: Arc<Catalog>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let base = warp::path("api").and(warp::path("tasks"));

    let stats = base
        .and(warp::path("stats"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_db(pool.clone()))
        .and_then(task_stats);

    let failed = base
        .and(warp::path("failed"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_db(pool.clone()))
        .and_then(list_failed);

    let retry = base
        .and(warp::path("retry-failed"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_db(pool))
        .and_then(retry_failed);

    let reanalyze_route = base
        .and(warp::path("reanalyze"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_catalog(catalog))
        .and_then(reanalyze);

    stats.or(failed).or(retry).or(reanalyze_route)
}
