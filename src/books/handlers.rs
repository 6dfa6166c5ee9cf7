use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{BookResponse, BorrowRequest, ReserveRequest, ReturnResponse},
    lifecycle::ReturnOutcome,
    model::BookRecord,
    services::CatalogService,
};
use crate::{auth::extractors::AuthUser, error::AppResult, state::AppState};

pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/books", get(list_books))
        .route("/books/:id", get(get_book))
        .route("/books/:id/borrow", post(borrow_book))
        .route("/books/:id/reserve", post(reserve_book))
        .route("/books/:id/renew", post(renew_book))
        .route("/books/:id/return", patch(request_return))
}

/// Admin-only transitions; the service rejects non-admin callers.
pub fn circulation_routes() -> Router<AppState> {
    Router::new()
        .route("/books/:id/approve-return", patch(approve_return))
        .route("/books/:id/lost", patch(mark_lost))
        .route("/books/:id/restore", patch(restore_book))
}

#[instrument(skip(catalog, _user))]
pub async fn list_books(
    State(catalog): State<CatalogService>,
    _user: AuthUser,
) -> AppResult<Json<Vec<BookRecord>>> {
    Ok(Json(catalog.list_books().await?))
}

#[instrument(skip(catalog, _user))]
pub async fn get_book(
    State(catalog): State<CatalogService>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookRecord>> {
    let copy = catalog.get_book(id).await?;
    Ok(Json(BookRecord::from(&copy)))
}

#[instrument(skip(catalog, principal, payload), fields(user_id = %principal.id))]
pub async fn borrow_book(
    State(catalog): State<CatalogService>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<BorrowRequest>,
) -> AppResult<Json<BookResponse>> {
    let copy = catalog
        .borrow(id, &principal, payload.start_time, payload.end_time)
        .await?;
    Ok(Json(BookResponse::new(
        "Book borrowed successfully",
        BookRecord::from(&copy),
    )))
}

#[instrument(skip(catalog, principal, payload), fields(user_id = %principal.id))]
pub async fn reserve_book(
    State(catalog): State<CatalogService>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReserveRequest>,
) -> AppResult<Json<BookResponse>> {
    let copy = catalog
        .reserve(
            id,
            &principal,
            payload.reserve_start_time,
            payload.reserve_end_time,
        )
        .await?;
    Ok(Json(BookResponse::new(
        "Book reserved successfully",
        BookRecord::from(&copy),
    )))
}

#[instrument(skip(catalog, principal, payload), fields(user_id = %principal.id))]
pub async fn renew_book(
    State(catalog): State<CatalogService>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<BorrowRequest>,
) -> AppResult<Json<BookResponse>> {
    let copy = catalog
        .renew(id, &principal, payload.start_time, payload.end_time)
        .await?;
    Ok(Json(BookResponse::new(
        "Book renewed successfully",
        BookRecord::from(&copy),
    )))
}

#[instrument(skip(catalog, principal), fields(user_id = %principal.id))]
pub async fn request_return(
    State(catalog): State<CatalogService>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ReturnResponse>> {
    let (copy, receipt) = catalog.request_return(id, &principal).await?;
    Ok(Json(ReturnResponse {
        message: "Return request submitted. Awaiting admin approval.".into(),
        book: BookRecord::from(&copy),
        fine_amount: receipt.fine_amount,
        overdue_days: receipt.overdue_days,
    }))
}

#[instrument(skip(catalog, principal), fields(user_id = %principal.id))]
pub async fn approve_return(
    State(catalog): State<CatalogService>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookResponse>> {
    let (copy, outcome) = catalog.approve_return(id, &principal).await?;
    let message = match outcome {
        ReturnOutcome::Promoted(_) => "Book returned and auto-borrowed by next reserved user.",
        ReturnOutcome::Available => "Book return approved and marked available.",
    };
    Ok(Json(BookResponse::new(message, BookRecord::from(&copy))))
}

#[instrument(skip(catalog, principal), fields(user_id = %principal.id))]
pub async fn mark_lost(
    State(catalog): State<CatalogService>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookResponse>> {
    let copy = catalog.mark_lost(id, &principal).await?;
    Ok(Json(BookResponse::new(
        "Book marked as lost",
        BookRecord::from(&copy),
    )))
}

#[instrument(skip(catalog, principal), fields(user_id = %principal.id))]
pub async fn restore_book(
    State(catalog): State<CatalogService>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookResponse>> {
    let copy = catalog.restore(id, &principal).await?;
    Ok(Json(BookResponse::new(
        "Book restored to circulation",
        BookRecord::from(&copy),
    )))
}
