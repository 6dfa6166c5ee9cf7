use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use super::{model::DigitalResource, services::ResourceService};
use crate::{auth::extractors::AuthUser, error::AppResult, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBorrowRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct ResourceResponse {
    pub message: String,
    pub resource: DigitalResource,
}

pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/digital-resources", get(list_resources))
        .route("/digital-resources/:id", get(get_resource))
        .route("/digital-resources/:id/borrow", post(borrow_resource))
}

#[instrument(skip(resources, _user))]
pub async fn list_resources(
    State(resources): State<ResourceService>,
    _user: AuthUser,
) -> AppResult<Json<Vec<DigitalResource>>> {
    Ok(Json(resources.list().await?))
}

#[instrument(skip(resources, _user))]
pub async fn get_resource(
    State(resources): State<ResourceService>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DigitalResource>> {
    Ok(Json(resources.get(id).await?))
}

#[instrument(skip(resources, principal, payload), fields(user_id = %principal.id))]
pub async fn borrow_resource(
    State(resources): State<ResourceService>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResourceBorrowRequest>,
) -> AppResult<Json<ResourceResponse>> {
    let resource = resources
        .borrow(id, &principal, payload.start_time, payload.end_time)
        .await?;
    Ok(Json(ResourceResponse {
        message: "Resource borrowed successfully".into(),
        resource,
    }))
}
