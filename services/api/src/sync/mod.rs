pub mod handlers;
pub mod responses;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync", post(handlers::submit_run))
        .route("/sync/runs/{id}", get(handlers::get_run))
}
