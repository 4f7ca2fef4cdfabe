use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use docket_core::JobId;
use docket_infra::jobs::SubmitJob;

use crate::app::dto::{JobStatsResponse, ListJobsQuery, ListJobsResponse, SubmitJobResponse};
use crate::app::errors::{domain_error_to_response, service_error_to_response};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(submit).get(list))
        .route("/jobs/stats", get(stats))
        .route("/jobs/:id", get(query))
}

async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<SubmitJob>,
) -> Response {
    match services.jobs().submit(body).await {
        Ok(id) => (StatusCode::ACCEPTED, Json(SubmitJobResponse { id })).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

async fn query(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match id.parse::<JobId>() {
        Ok(id) => id,
        Err(e) => return domain_error_to_response(e),
    };

    match services.jobs().query(id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<ListJobsQuery>,
) -> Response {
    let filter = match params.into_filter() {
        Ok(filter) => filter,
        Err(e) => return domain_error_to_response(e),
    };

    match services.jobs().list(filter).await {
        Ok(jobs) => (StatusCode::OK, Json(ListJobsResponse::from(jobs))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

async fn stats(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.jobs().stats().await {
        Ok(stats) => (StatusCode::OK, Json(JobStatsResponse::from(stats))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}
