//! Catch-all resource handler: `/{service}/{resource}/{id}/{rest...}`.

use crate::state::AppState;
use axum::extract::{Request, State};
use axum::response::Response;

/// ANY /*path: hand the request to the dispatcher.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    state.dispatcher.handle_request(request).await
}
