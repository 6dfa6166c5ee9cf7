use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{ProfileResponse, StatsResponse},
    model::{ProfileUpdate, User},
    services::UserService,
};
use crate::{auth::extractors::AuthUser, error::AppResult, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(get_profile).patch(update_profile))
        .route("/users/stats", get(get_stats))
}

#[instrument(skip(users, principal), fields(user_id = %principal.id))]
pub async fn get_profile(
    State(users): State<UserService>,
    AuthUser(principal): AuthUser,
) -> AppResult<Json<ProfileResponse>> {
    Ok(Json(users.profile(&principal).await?))
}

#[instrument(skip(users, principal, payload), fields(user_id = %principal.id))]
pub async fn update_profile(
    State(users): State<UserService>,
    AuthUser(principal): AuthUser,
    Json(payload): Json<ProfileUpdate>,
) -> AppResult<Json<User>> {
    Ok(Json(users.update_profile(&principal, payload).await?))
}

#[instrument(skip(users, _user))]
pub async fn get_stats(
    State(users): State<UserService>,
    _user: AuthUser,
) -> AppResult<Json<StatsResponse>> {
    Ok(Json(users.stats().await?))
}
