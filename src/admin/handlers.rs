use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::{dto::MessageResponse, extractors::AdminUser},
    books::{
        dto::{AddCopyRequest, BookResponse},
        model::{BookRecord, BookUpdate, NewBook},
        services::CatalogService,
    },
    error::AppResult,
    resources::{
        model::{DigitalResource, NewResource, ResourceUpdate},
        services::ResourceService,
    },
    state::AppState,
    users::{dto::UserActivity, services::UserService},
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/books", get(list_books).post(create_book))
        .route("/admin/books/:id", put(update_book).delete(delete_book))
        .route("/admin/books/:id/add-copy", patch(add_copy))
        .route("/admin/resources", get(list_resources))
        .route("/admin/digital-resources", post(create_resource))
        .route(
            "/admin/digital-resources/:id",
            put(update_resource).delete(delete_resource),
        )
        .route("/admin/user-activity", get(user_activity))
}

#[instrument(skip(catalog, admin))]
pub async fn list_books(
    State(catalog): State<CatalogService>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<Vec<BookRecord>>> {
    Ok(Json(catalog.list_all_books(&admin).await?))
}

#[instrument(skip(catalog, admin, payload))]
pub async fn create_book(
    State(catalog): State<CatalogService>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<NewBook>,
) -> AppResult<(StatusCode, Json<BookResponse>)> {
    let copy = catalog.create_book(&admin, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(BookResponse::new(
            "Book created successfully",
            BookRecord::from(&copy),
        )),
    ))
}

#[instrument(skip(catalog, admin, payload))]
pub async fn update_book(
    State(catalog): State<CatalogService>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<BookUpdate>,
) -> AppResult<Json<BookResponse>> {
    let copy = catalog.update_book(id, &admin, payload).await?;
    Ok(Json(BookResponse::new(
        "Book updated successfully",
        BookRecord::from(&copy),
    )))
}

#[instrument(skip(catalog, admin))]
pub async fn delete_book(
    State(catalog): State<CatalogService>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    catalog.delete_book(id, &admin).await?;
    Ok(Json(MessageResponse::new("Book deleted successfully")))
}

#[instrument(skip(catalog, admin, payload))]
pub async fn add_copy(
    State(catalog): State<CatalogService>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<AddCopyRequest>>,
) -> AppResult<(StatusCode, Json<BookResponse>)> {
    let location = payload.and_then(|Json(p)| p.location);
    let copy = catalog.add_copy(id, &admin, location.as_deref()).await?;
    Ok((
        StatusCode::CREATED,
        Json(BookResponse::new(
            "Copy added successfully",
            BookRecord::from(&copy),
        )),
    ))
}

#[instrument(skip(resources, _admin))]
pub async fn list_resources(
    State(resources): State<ResourceService>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<DigitalResource>>> {
    Ok(Json(resources.list().await?))
}

#[instrument(skip(resources, admin, payload))]
pub async fn create_resource(
    State(resources): State<ResourceService>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<NewResource>,
) -> AppResult<(StatusCode, Json<DigitalResource>)> {
    let resource = resources.create(&admin, payload).await?;
    Ok((StatusCode::CREATED, Json(resource)))
}

#[instrument(skip(resources, admin, payload))]
pub async fn update_resource(
    State(resources): State<ResourceService>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResourceUpdate>,
) -> AppResult<Json<DigitalResource>> {
    Ok(Json(resources.update(id, &admin, payload).await?))
}

#[instrument(skip(resources, admin))]
pub async fn delete_resource(
    State(resources): State<ResourceService>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    resources.delete(id, &admin).await?;
    Ok(Json(MessageResponse::new(
        "Digital resource deleted successfully",
    )))
}

#[instrument(skip(users, admin))]
pub async fn user_activity(
    State(users): State<UserService>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<Vec<UserActivity>>> {
    Ok(Json(users.user_activity(&admin).await?))
}
