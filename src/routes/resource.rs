//! Resource routes: the dispatcher owns the whole path space, for every method.
//! Verbs a resource does not route are answered by the dispatcher, not by axum.

use crate::handlers::resource::dispatch;
use crate::state::AppState;
use axum::{routing::any, Router};

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/", any(dispatch))
        .route("/*path", any(dispatch))
        .with_state(state)
}
