//! In-process store backing the service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::bail;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Inserted, LibraryStore};
use crate::{
    books::model::{BookCopy, BookRecord, CopyStatus},
    resources::model::{DigitalResource, ResourceBorrow},
    users::model::{ActivityEntry, NewUser, Role, User},
};

#[derive(Default)]
struct Tables {
    // Kept in flat form so every read goes through the same
    // record -> domain conversion as the database.
    copies: Vec<BookRecord>,
    users: Vec<User>,
    activity: HashMap<Uuid, Vec<ActivityEntry>>,
    resources: Vec<DigitalResource>,
    borrows: Vec<ResourceBorrow>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    user_lookups_down: AtomicBool,
}

impl MemoryStore {
    /// Makes every later `find_user` call fail.
    pub fn fail_user_lookups(&self) {
        self.user_lookups_down.store(true, Ordering::SeqCst);
    }

    fn with<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut guard = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn get_copy(&self, id: Uuid) -> anyhow::Result<Option<BookCopy>> {
        self.with(|t| {
            t.copies
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .map(BookCopy::try_from)
                .transpose()
        })
    }

    async fn list_copies(&self, include_lost: bool) -> anyhow::Result<Vec<BookCopy>> {
        self.with(|t| {
            t.copies
                .iter()
                .filter(|r| include_lost || r.status != CopyStatus::Lost.as_str())
                .cloned()
                .map(BookCopy::try_from)
                .collect()
        })
    }

    async fn count_copies_of(&self, book_id: &str) -> anyhow::Result<usize> {
        Ok(self.with(|t| t.copies.iter().filter(|r| r.book_id == book_id).count()))
    }

    async fn copy_id_exists(&self, copy_id: &str) -> anyhow::Result<bool> {
        Ok(self.with(|t| t.copies.iter().any(|r| r.copy_id == copy_id)))
    }

    async fn insert_copy(&self, copy: &BookCopy) -> anyhow::Result<Inserted> {
        Ok(self.with(|t| {
            if t.copies.iter().any(|r| r.copy_id == copy.copy_id) {
                return Inserted::Duplicate;
            }
            t.copies.push(BookRecord::from(copy));
            Inserted::Created
        }))
    }

    async fn update_copy(&self, copy: &BookCopy) -> anyhow::Result<bool> {
        Ok(self.with(|t| match t.copies.iter_mut().find(|r| r.id == copy.id) {
            Some(slot) => {
                *slot = BookRecord::from(copy);
                true
            }
            None => false,
        }))
    }

    async fn delete_copy(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.with(|t| {
            let before = t.copies.len();
            t.copies.retain(|r| r.id != id);
            t.copies.len() != before
        }))
    }

    async fn copies_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<BookCopy>> {
        self.with(|t| {
            t.copies
                .iter()
                .filter(|r| r.borrowed_by == Some(user_id) || r.reserved_by == Some(user_id))
                .cloned()
                .map(BookCopy::try_from)
                .collect()
        })
    }

    async fn count_copies_by_status(&self) -> anyhow::Result<Vec<(CopyStatus, i64)>> {
        self.with(|t| {
            let mut counts: HashMap<String, i64> = HashMap::new();
            for r in &t.copies {
                *counts.entry(r.status.clone()).or_default() += 1;
            }
            counts
                .into_iter()
                .map(|(status, n)| Ok((status.parse()?, n)))
                .collect()
        })
    }

    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        if self.user_lookups_down.load(Ordering::SeqCst) {
            bail!("user lookup unavailable");
        }
        Ok(self.with(|t| t.users.iter().find(|u| u.id == id).cloned()))
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.with(|t| t.users.iter().find(|u| u.email == email).cloned()))
    }

    async fn create_user(&self, user: NewUser) -> anyhow::Result<Option<User>> {
        Ok(self.with(|t| {
            if t.users.iter().any(|u| u.email == user.email) {
                return None;
            }
            let created = User {
                id: Uuid::new_v4(),
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                role: user.role,
                mobile: user.mobile,
                city: user.city,
                state: user.state,
                zipcode: user.zipcode,
                created_at: OffsetDateTime::now_utc(),
            };
            t.users.push(created.clone());
            Some(created)
        }))
    }

    async fn update_profile(&self, user: &User) -> anyhow::Result<bool> {
        Ok(self.with(|t| match t.users.iter_mut().find(|u| u.id == user.id) {
            Some(slot) => {
                slot.name = user.name.clone();
                slot.mobile = user.mobile.clone();
                slot.city = user.city.clone();
                slot.state = user.state.clone();
                slot.zipcode = user.zipcode.clone();
                true
            }
            None => false,
        }))
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        Ok(self.with(|t| match t.users.iter_mut().find(|u| u.id == id) {
            Some(slot) => {
                slot.password_hash = password_hash.to_string();
                true
            }
            None => false,
        }))
    }

    async fn list_non_admin_users(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.with(|t| {
            t.users
                .iter()
                .filter(|u| u.role != Role::Admin)
                .cloned()
                .collect()
        }))
    }

    async fn append_activity(&self, user_id: Uuid, entry: &ActivityEntry) -> anyhow::Result<()> {
        self.with(|t| t.activity.entry(user_id).or_default().push(entry.clone()));
        Ok(())
    }

    async fn activity_for(&self, user_id: Uuid) -> anyhow::Result<Vec<ActivityEntry>> {
        Ok(self.with(|t| t.activity.get(&user_id).cloned().unwrap_or_default()))
    }

    async fn get_resource(&self, id: Uuid) -> anyhow::Result<Option<DigitalResource>> {
        Ok(self.with(|t| t.resources.iter().find(|r| r.id == id).cloned()))
    }

    async fn list_resources(&self) -> anyhow::Result<Vec<DigitalResource>> {
        Ok(self.with(|t| t.resources.clone()))
    }

    async fn insert_resource(&self, resource: &DigitalResource) -> anyhow::Result<Inserted> {
        Ok(self.with(|t| {
            if t.resources.iter().any(|r| r.resource_id == resource.resource_id) {
                return Inserted::Duplicate;
            }
            t.resources.push(resource.clone());
            Inserted::Created
        }))
    }

    async fn update_resource(&self, resource: &DigitalResource) -> anyhow::Result<bool> {
        Ok(self.with(|t| match t.resources.iter_mut().find(|r| r.id == resource.id) {
            Some(slot) => {
                let available = slot.available_copies;
                *slot = resource.clone();
                slot.available_copies = available;
                true
            }
            None => false,
        }))
    }

    async fn delete_resource(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.with(|t| {
            let before = t.resources.len();
            t.resources.retain(|r| r.id != id);
            t.borrows.retain(|b| b.resource_id != id);
            t.resources.len() != before
        }))
    }

    async fn has_active_borrow(&self, resource_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.with(|t| {
            t.borrows
                .iter()
                .any(|b| b.resource_id == resource_id && b.user_id == user_id)
        }))
    }

    async fn take_resource_copy(&self, borrow: &ResourceBorrow) -> anyhow::Result<bool> {
        Ok(self.with(|t| {
            let Some(r) = t
                .resources
                .iter_mut()
                .find(|r| r.id == borrow.resource_id && r.available_copies > 0)
            else {
                return false;
            };
            r.available_copies -= 1;
            t.borrows.push(borrow.clone());
            true
        }))
    }

    async fn release_expired_borrows(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        Ok(self.with(|t| {
            let (expired, active): (Vec<_>, Vec<_>) =
                t.borrows.drain(..).partition(|b| b.end_time < now);
            t.borrows = active;
            for b in &expired {
                if let Some(r) = t.resources.iter_mut().find(|r| r.id == b.resource_id) {
                    r.available_copies += 1;
                }
            }
            expired.len() as u64
        }))
    }

    async fn resources_borrowed_by(&self, user_id: Uuid) -> anyhow::Result<Vec<DigitalResource>> {
        Ok(self.with(|t| {
            t.resources
                .iter()
                .filter(|r| {
                    t.borrows
                        .iter()
                        .any(|b| b.resource_id == r.id && b.user_id == user_id)
                })
                .cloned()
                .collect()
        }))
    }

    async fn count_resources(&self) -> anyhow::Result<(i64, i64)> {
        Ok(self.with(|t| {
            let borrowed = t
                .resources
                .iter()
                .filter(|r| t.borrows.iter().any(|b| b.resource_id == r.id))
                .count();
            (t.resources.len() as i64, borrowed as i64)
        }))
    }
}
