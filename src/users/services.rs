use std::sync::Arc;

use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::info;

use super::{
    dto::{BookStats, EbookStats, ProfileResponse, StatsResponse, UserActivity},
    model::{ProfileUpdate, User},
};
use crate::{
    auth::{extractors::Principal, services::is_valid_mobile},
    books::{
        model::{BookCopy, BookRecord, CopyStatus, LoanState},
        services::expire_reservations,
    },
    error::{AppError, AppResult},
    resources::services::release_expired,
    state::AppState,
    store::LibraryStore,
};

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn LibraryStore>,
}

impl FromRef<AppState> for UserService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.store.clone())
    }
}

/// Splits a user's copies into what they borrow, reserve and lost.
fn partition_copies(
    user: &User,
    copies: &[BookCopy],
) -> (Vec<BookRecord>, Vec<BookRecord>, Vec<BookRecord>) {
    let mut borrowed = Vec::new();
    let mut reserved = Vec::new();
    let mut lost = Vec::new();
    for copy in copies {
        let record = BookRecord::from(copy);
        match &copy.state {
            LoanState::Lost { last_loan: Some(l) } if l.borrower == user.id => lost.push(record),
            LoanState::Lost { .. } => {}
            state => {
                if state.loan().is_some_and(|l| l.borrower == user.id) {
                    borrowed.push(record.clone());
                }
                if copy.reservation.is_some_and(|r| r.holder == user.id) {
                    reserved.push(record);
                }
            }
        }
    }
    (borrowed, reserved, lost)
}

impl UserService {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    async fn load(&self, principal: &Principal) -> AppResult<User> {
        self.store
            .find_user(principal.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    pub async fn profile(&self, principal: &Principal) -> AppResult<ProfileResponse> {
        let user = self.load(principal).await?;
        let now = OffsetDateTime::now_utc();
        release_expired(self.store.as_ref(), now).await?;
        expire_reservations(self.store.as_ref(), now).await?;

        let copies = self.store.copies_for_user(user.id).await?;
        let (borrowed_books, reserved_books, lost_books) = partition_copies(&user, &copies);
        let borrowed_ebooks = self.store.resources_borrowed_by(user.id).await?;
        let activity_history = self.store.activity_for(user.id).await?;

        Ok(ProfileResponse {
            name: user.name,
            email: user.email,
            mobile: user.mobile,
            city: user.city,
            state: user.state,
            zipcode: user.zipcode,
            borrowed_books,
            reserved_books,
            lost_books,
            borrowed_ebooks,
            activity_history,
        })
    }

    pub async fn update_profile(
        &self,
        principal: &Principal,
        update: ProfileUpdate,
    ) -> AppResult<User> {
        update.validate().map_err(AppError::Validation)?;
        if matches!(&update.mobile, Some(m) if !is_valid_mobile(m.trim())) {
            return Err(AppError::Validation("Invalid mobile number".into()));
        }
        let mut user = self.load(principal).await?;
        update.apply(&mut user);
        if !self.store.update_profile(&user).await? {
            return Err(AppError::NotFound("User not found".into()));
        }
        info!(user_id = %user.id, "profile updated");
        Ok(user)
    }

    pub async fn user_activity(&self, principal: &Principal) -> AppResult<Vec<UserActivity>> {
        principal.require_admin()?;
        let users = self.store.list_non_admin_users().await?;
        let mut out = Vec::with_capacity(users.len());
        for user in users {
            let activity_history = self.store.activity_for(user.id).await?;
            out.push(UserActivity {
                id: user.id,
                name: user.name,
                email: user.email,
                role: user.role,
                activity_history,
            });
        }
        Ok(out)
    }

    pub async fn stats(&self) -> AppResult<StatsResponse> {
        let now = OffsetDateTime::now_utc();
        release_expired(self.store.as_ref(), now).await?;
        expire_reservations(self.store.as_ref(), now).await?;

        let mut books = BookStats::default();
        for (status, n) in self.store.count_copies_by_status().await? {
            books.total += n;
            match status {
                CopyStatus::Available => books.available += n,
                CopyStatus::Reserved => books.reserved += n,
                CopyStatus::Borrowed => books.borrowed += n,
                CopyStatus::ReturnRequested => books.return_requested += n,
                CopyStatus::Lost => books.lost += n,
            }
        }
        let (total, borrowed) = self.store.count_resources().await?;
        Ok(StatsResponse {
            books,
            ebooks: EbookStats { total, borrowed },
        })
    }
}
