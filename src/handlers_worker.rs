use serde::Deserialize;
use serde_json::json;
use warp::{Filter, Rejection, Reply};

use crate::warp_helpers::with_worker;
use crate::worker::WorkerHandle;

#[derive(Debug, Deserialize)]
pub struct WorkerConfigBody {
    pub concurrency: Option<usize>,
    #[serde(rename = "batchDelayMs")]
    pub batch_delay_ms: Option<u64>,
}

pub async fn pause(worker: WorkerHandle) -> Result<impl Reply, Rejection> {
    worker.pause();
    Ok(warp::reply::json(&json!({"paused": true})))
}

pub async fn resume(worker: WorkerHandle) -> Result<impl Reply, Rejection> {
    worker.resume();
    Ok(warp::reply::json(&json!({"paused": false})))
}

pub async fn set_config(body: WorkerConfigBody, worker: WorkerHandle) -> Result<impl Reply, Rejection> {
    worker.set_concurrency(body.concurrency);
    worker.set_batch_delay_ms(body.batch_delay_ms);
    Ok(warp::reply::json(&json!({"updated": true})))
}

pub fn build_worker_routes(
    worker: WorkerHandle,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let base = warp::path("api").and(warp::path("worker"));

    let pause_route = base
        .and(warp::path("pause"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_worker(worker.clone()))
        .and_then(pause);

    let resume_route = base
        .and(warp::path("resume"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_worker(worker.clone()))
        .and_then(resume);

    let config_route = base
        .and(warp::path("config"))
        .and(warp::path::end())
        .and(warp::put())
        .and(warp::body::json())
        .and(with_worker(worker))
        .and_then(set_config);

    pause_route.or(resume_route).or(config_route)
}
