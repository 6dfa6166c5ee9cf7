use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    lifecycle::{self, Effect, LifecycleError, LossOutcome, ReturnOutcome, ReturnReceipt},
    model::{BookCopy, BookRecord, BookUpdate, NewBook},
};
use crate::{
    auth::extractors::Principal,
    config::LoanPolicy,
    error::{AppError, AppResult},
    mail::Notifier,
    state::AppState,
    store::{Inserted, LibraryStore},
};

/// Orchestrates copy operations: load, decide, persist, then carry out
/// whatever the decision asked for.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn LibraryStore>,
    notifier: Notifier,
    policy: LoanPolicy,
}

impl FromRef<AppState> for CatalogService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.store.clone(), state.notifier.clone(), state.config.policy)
    }
}

/// Clears reservations that lapsed on copies nobody borrowed.
pub(crate) async fn expire_reservations(
    store: &dyn LibraryStore,
    now: OffsetDateTime,
) -> AppResult<()> {
    let mut cleared = 0;
    for copy in store.list_copies(false).await? {
        if let Some(t) = lifecycle::expire(&copy, now) {
            store.update_copy(&t.copy).await?;
            cleared += 1;
        }
    }
    if cleared > 0 {
        info!(cleared, "expired lapsed reservations");
    }
    Ok(())
}

fn rejected(op: &'static str, copy: &BookCopy, user: Option<Uuid>, e: LifecycleError) -> AppError {
    warn!(op, copy_id = %copy.copy_id, user_id = ?user, reason = %e, "transition rejected");
    e.into()
}

impl CatalogService {
    pub fn new(store: Arc<dyn LibraryStore>, notifier: Notifier, policy: LoanPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    async fn load(&self, id: Uuid) -> AppResult<BookCopy> {
        let copy = self
            .store
            .get_copy(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found".into()))?;
        match lifecycle::expire(&copy, OffsetDateTime::now_utc()) {
            Some(t) => {
                self.store.update_copy(&t.copy).await?;
                info!(copy_id = %t.copy.copy_id, user_id = %t.outcome.holder, "reservation lapsed");
                Ok(t.copy)
            }
            None => Ok(copy),
        }
    }

    /// Persists `copy`, then applies every activity entry before sending any
    /// notice. Notices never fail the operation.
    async fn commit(&self, copy: &BookCopy, effects: Vec<Effect>) -> AppResult<()> {
        if !self.store.update_copy(copy).await? {
            return Err(AppError::NotFound("Book not found".into()));
        }
        let (activities, notices): (Vec<_>, Vec<_>) = effects
            .into_iter()
            .partition(|e| matches!(e, Effect::Activity { .. }));
        for effect in activities.into_iter().chain(notices) {
            match effect {
                Effect::Activity { user, entry } => {
                    self.store
                        .append_activity(user, &entry)
                        .await
                        .with_context(|| format!("append {} activity", entry.action.as_str()))?;
                }
                Effect::RefundNotice {
                    user,
                    title,
                    amount,
                } => match self.store.find_user(user).await {
                    Ok(Some(u)) => self.notifier.send_refund_notice(&u.email, &title, amount).await,
                    Ok(None) => warn!(user_id = %user, "refund recipient no longer exists"),
                    Err(e) => warn!(user_id = %user, error = %e, "refund recipient lookup failed"),
                },
            }
        }
        Ok(())
    }

    pub async fn list_books(&self) -> AppResult<Vec<BookRecord>> {
        expire_reservations(self.store.as_ref(), OffsetDateTime::now_utc()).await?;
        let copies = self.store.list_copies(false).await?;
        Ok(copies.iter().map(BookRecord::from).collect())
    }

    pub async fn list_all_books(&self, principal: &Principal) -> AppResult<Vec<BookRecord>> {
        principal.require_admin()?;
        expire_reservations(self.store.as_ref(), OffsetDateTime::now_utc()).await?;
        let copies = self.store.list_copies(true).await?;
        Ok(copies.iter().map(BookRecord::from).collect())
    }

    pub async fn get_book(&self, id: Uuid) -> AppResult<BookCopy> {
        self.load(id).await
    }

    pub async fn borrow(
        &self,
        id: Uuid,
        principal: &Principal,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> AppResult<BookCopy> {
        let now = OffsetDateTime::now_utc();
        let copy = self.load(id).await?;
        let t = lifecycle::borrow(&copy, principal.id, start, end, now)
            .map_err(|e| rejected("borrow", &copy, Some(principal.id), e))?;
        self.commit(&t.copy, t.effects).await?;
        info!(copy_id = %t.copy.copy_id, user_id = %principal.id, "book borrowed");
        Ok(t.copy)
    }

    pub async fn reserve(
        &self,
        id: Uuid,
        principal: &Principal,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> AppResult<BookCopy> {
        let now = OffsetDateTime::now_utc();
        let copy = self.load(id).await?;
        let t = lifecycle::reserve(&copy, principal.id, start, end, now)
            .map_err(|e| rejected("reserve", &copy, Some(principal.id), e))?;
        self.commit(&t.copy, t.effects).await?;
        info!(copy_id = %t.copy.copy_id, user_id = %principal.id, "book reserved");
        Ok(t.copy)
    }

    pub async fn request_return(
        &self,
        id: Uuid,
        principal: &Principal,
    ) -> AppResult<(BookCopy, ReturnReceipt)> {
        let now = OffsetDateTime::now_utc();
        let copy = self.load(id).await?;
        let t = lifecycle::request_return(&copy, principal.id, now, &self.policy)
            .map_err(|e| rejected("request_return", &copy, Some(principal.id), e))?;
        self.commit(&t.copy, t.effects).await?;
        info!(
            copy_id = %t.copy.copy_id,
            user_id = %principal.id,
            overdue_days = t.outcome.overdue_days,
            fine = t.outcome.fine_amount,
            "return requested"
        );
        Ok((t.copy, t.outcome))
    }

    pub async fn approve_return(
        &self,
        id: Uuid,
        principal: &Principal,
    ) -> AppResult<(BookCopy, ReturnOutcome)> {
        principal.require_admin()?;
        let now = OffsetDateTime::now_utc();
        let copy = self.load(id).await?;
        let t = lifecycle::approve_return(&copy, now)
            .map_err(|e| rejected("approve_return", &copy, None, e))?;
        self.commit(&t.copy, t.effects).await?;
        match t.outcome {
            ReturnOutcome::Promoted(user) => {
                info!(
                    copy_id = %t.copy.copy_id,
                    user_id = %user,
                    "return approved, reservation promoted"
                )
            }
            ReturnOutcome::Available => info!(copy_id = %t.copy.copy_id, "return approved"),
        }
        Ok((t.copy, t.outcome))
    }

    pub async fn renew(
        &self,
        id: Uuid,
        principal: &Principal,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> AppResult<BookCopy> {
        let now = OffsetDateTime::now_utc();
        let copy = self.load(id).await?;
        let t = lifecycle::renew(&copy, principal.id, start, end, now)
            .map_err(|e| rejected("renew", &copy, Some(principal.id), e))?;
        self.commit(&t.copy, t.effects).await?;
        info!(copy_id = %t.copy.copy_id, user_id = %principal.id, "book renewed");
        Ok(t.copy)
    }

    pub async fn mark_lost(&self, id: Uuid, principal: &Principal) -> AppResult<BookCopy> {
        principal.require_admin()?;
        let now = OffsetDateTime::now_utc();
        let copy = self.load(id).await?;
        let t = lifecycle::mark_lost(&copy, now, &self.policy);
        if t.outcome == LossOutcome::AlreadyLost {
            info!(copy_id = %copy.copy_id, "copy already lost");
            return Ok(t.copy);
        }
        self.commit(&t.copy, t.effects).await?;
        info!(copy_id = %t.copy.copy_id, "book marked lost");
        Ok(t.copy)
    }

    pub async fn restore(&self, id: Uuid, principal: &Principal) -> AppResult<BookCopy> {
        principal.require_admin()?;
        let copy = self.load(id).await?;
        let t = lifecycle::restore(&copy).map_err(|e| rejected("restore", &copy, None, e))?;
        self.commit(&t.copy, t.effects).await?;
        info!(copy_id = %t.copy.copy_id, "lost copy restored");
        Ok(t.copy)
    }

    pub async fn create_book(&self, principal: &Principal, book: NewBook) -> AppResult<BookCopy> {
        principal.require_admin()?;
        book.validate().map_err(AppError::Validation)?;
        let (book_id, details) = book.into_details();

        if self.store.copy_id_exists(&book_id).await? {
            return Err(AppError::Conflict(
                "A book with this Book ID already exists.".into(),
            ));
        }
        let existing = self.store.count_copies_of(&book_id).await?;
        let copy = BookCopy::new(lifecycle::copy_id_for(&book_id, existing), book_id, details);
        self.insert(&copy).await?;
        info!(copy_id = %copy.copy_id, "book created");
        Ok(copy)
    }

    pub async fn add_copy(
        &self,
        id: Uuid,
        principal: &Principal,
        location: Option<&str>,
    ) -> AppResult<BookCopy> {
        principal.require_admin()?;
        let original = self
            .store
            .get_copy(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Original book not found".into()))?;
        let existing = self.store.count_copies_of(&original.book_id).await?;
        let copy = lifecycle::add_copy(&original, existing, location);
        self.insert(&copy).await?;
        info!(copy_id = %copy.copy_id, from = %original.copy_id, "copy added");
        Ok(copy)
    }

    async fn insert(&self, copy: &BookCopy) -> AppResult<()> {
        match self.store.insert_copy(copy).await? {
            Inserted::Created => Ok(()),
            Inserted::Duplicate => {
                warn!(copy_id = %copy.copy_id, "copy id already taken");
                Err(AppError::Conflict(format!(
                    "Copy id {} already exists",
                    copy.copy_id
                )))
            }
        }
    }

    pub async fn update_book(
        &self,
        id: Uuid,
        principal: &Principal,
        update: BookUpdate,
    ) -> AppResult<BookCopy> {
        principal.require_admin()?;
        update.validate().map_err(AppError::Validation)?;
        let mut copy = self.load(id).await?;
        update.apply(&mut copy.details);
        self.commit(&copy, Vec::new()).await?;
        info!(copy_id = %copy.copy_id, "book updated");
        Ok(copy)
    }

    pub async fn delete_book(&self, id: Uuid, principal: &Principal) -> AppResult<()> {
        principal.require_admin()?;
        if !self.store.delete_copy(id).await? {
            return Err(AppError::NotFound("Book not found".into()));
        }
        info!(%id, "book deleted");
        Ok(())
    }
}
