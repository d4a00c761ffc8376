//! Unified API router: every module contributes its routes here.

use axum::Router;
use std::sync::Arc;

use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::events::configure())
        .merge(crate::skills::configure())
        .merge(crate::goals::configure())
        .merge(crate::rewards::configure())
        .merge(crate::consequences::configure())
}
