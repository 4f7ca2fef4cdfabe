use axum::Router;

pub mod jobs;
pub mod system;

/// Router for all job endpoints.
pub fn router() -> Router {
    Router::new().merge(jobs::router())
}
