//! Persistence boundary. Services only talk to storage through
//! [`LibraryStore`]; every call reads or writes the current record, nothing
//! is cached in between.
//!
//! Writes are single-record and conditioned on the record still existing.
//! Two requests racing on the same copy are not serialised beyond what one
//! `UPDATE` gives; the last write wins.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    books::model::{BookCopy, CopyStatus},
    resources::model::{DigitalResource, ResourceBorrow},
    users::model::{ActivityEntry, NewUser, User},
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

/// Result of an insert that may collide with a unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    Created,
    Duplicate,
}

#[async_trait]
pub trait LibraryStore: Send + Sync {
    // copies
    async fn get_copy(&self, id: Uuid) -> anyhow::Result<Option<BookCopy>>;
    async fn list_copies(&self, include_lost: bool) -> anyhow::Result<Vec<BookCopy>>;
    async fn count_copies_of(&self, book_id: &str) -> anyhow::Result<usize>;
    async fn copy_id_exists(&self, copy_id: &str) -> anyhow::Result<bool>;
    async fn insert_copy(&self, copy: &BookCopy) -> anyhow::Result<Inserted>;
    /// Returns `false` when the copy no longer exists.
    async fn update_copy(&self, copy: &BookCopy) -> anyhow::Result<bool>;
    async fn delete_copy(&self, id: Uuid) -> anyhow::Result<bool>;
    /// Copies the user currently borrows, reserves, or lost.
    async fn copies_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<BookCopy>>;
    async fn count_copies_by_status(&self) -> anyhow::Result<Vec<(CopyStatus, i64)>>;

    // users
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// `None` when the email is already registered.
    async fn create_user(&self, user: NewUser) -> anyhow::Result<Option<User>>;
    /// Persists the profile fields of `user`.
    async fn update_profile(&self, user: &User) -> anyhow::Result<bool>;
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool>;
    async fn list_non_admin_users(&self) -> anyhow::Result<Vec<User>>;

    // activity history, append-only
    async fn append_activity(&self, user_id: Uuid, entry: &ActivityEntry) -> anyhow::Result<()>;
    async fn activity_for(&self, user_id: Uuid) -> anyhow::Result<Vec<ActivityEntry>>;

    // digital resources
    async fn get_resource(&self, id: Uuid) -> anyhow::Result<Option<DigitalResource>>;
    async fn list_resources(&self) -> anyhow::Result<Vec<DigitalResource>>;
    async fn insert_resource(&self, resource: &DigitalResource) -> anyhow::Result<Inserted>;
    async fn update_resource(&self, resource: &DigitalResource) -> anyhow::Result<bool>;
    async fn delete_resource(&self, id: Uuid) -> anyhow::Result<bool>;
    async fn has_active_borrow(&self, resource_id: Uuid, user_id: Uuid) -> anyhow::Result<bool>;
    /// Takes one copy and records the borrow. `false` when none is left.
    async fn take_resource_copy(&self, borrow: &ResourceBorrow) -> anyhow::Result<bool>;
    /// Ends borrows that finished before `now` and gives their copies back.
    async fn release_expired_borrows(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
    async fn resources_borrowed_by(&self, user_id: Uuid) -> anyhow::Result<Vec<DigitalResource>>;
    async fn count_resources(&self) -> anyhow::Result<(i64, i64)>;
}
