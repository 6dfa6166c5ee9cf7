pub(crate) mod dto;
pub mod handlers;
pub mod lifecycle;
pub mod model;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::member_routes())
        .merge(handlers::circulation_routes())
}
