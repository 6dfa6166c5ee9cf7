use std::sync::Arc;

use axum::extract::FromRef;
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{DigitalResource, NewResource, ResourceBorrow, ResourceUpdate};
use crate::{
    auth::extractors::Principal,
    error::{AppError, AppResult},
    state::AppState,
    store::{Inserted, LibraryStore},
    users::model::{ActivityAction, ActivityEntry, ItemType},
};

#[derive(Clone)]
pub struct ResourceService {
    store: Arc<dyn LibraryStore>,
}

impl FromRef<AppState> for ResourceService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.store.clone())
    }
}

/// Gives back copies of e-book borrows that ended before `now`.
pub(crate) async fn release_expired(
    store: &dyn LibraryStore,
    now: OffsetDateTime,
) -> AppResult<()> {
    let released = store.release_expired_borrows(now).await?;
    if released > 0 {
        debug!(released, "expired e-book borrows released");
    }
    Ok(())
}

impl ResourceService {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    async fn load(&self, id: Uuid) -> AppResult<DigitalResource> {
        self.store
            .get_resource(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Resource not found".into()))
    }

    pub async fn list(&self) -> AppResult<Vec<DigitalResource>> {
        release_expired(self.store.as_ref(), OffsetDateTime::now_utc()).await?;
        Ok(self.store.list_resources().await?)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<DigitalResource> {
        self.load(id).await
    }

    pub async fn borrow(
        &self,
        id: Uuid,
        principal: &Principal,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> AppResult<DigitalResource> {
        let now = OffsetDateTime::now_utc();
        if start >= end {
            return Err(AppError::Validation("End time must be after start time".into()));
        }
        if end <= now {
            return Err(AppError::Validation("End time must be in the future".into()));
        }

        release_expired(self.store.as_ref(), now).await?;
        let resource = self.load(id).await?;
        if self.store.has_active_borrow(id, principal.id).await? {
            warn!(
                resource_id = %resource.resource_id,
                user_id = %principal.id,
                "duplicate e-book borrow"
            );
            return Err(AppError::Validation(
                "You have already borrowed this resource".into(),
            ));
        }

        let borrow = ResourceBorrow {
            resource_id: id,
            user_id: principal.id,
            start_time: start,
            end_time: end,
        };
        if !self.store.take_resource_copy(&borrow).await? {
            warn!(resource_id = %resource.resource_id, user_id = %principal.id, "no copies left");
            return Err(AppError::Validation("No copies available".into()));
        }

        self.store
            .append_activity(
                principal.id,
                &ActivityEntry {
                    action: ActivityAction::Borrow,
                    item_type: ItemType::Ebook,
                    item_id: id,
                    timestamp: now,
                    metadata: json!({ "title": resource.title }),
                },
            )
            .await?;

        info!(resource_id = %resource.resource_id, user_id = %principal.id, "e-book borrowed");
        self.load(id).await
    }

    pub async fn create(
        &self,
        principal: &Principal,
        new: NewResource,
    ) -> AppResult<DigitalResource> {
        principal.require_admin()?;
        new.validate().map_err(AppError::Validation)?;
        let resource = new.into_resource();
        match self.store.insert_resource(&resource).await? {
            Inserted::Created => {
                info!(resource_id = %resource.resource_id, "resource created");
                Ok(resource)
            }
            Inserted::Duplicate => Err(AppError::Conflict(
                "A resource with this ID already exists.".into(),
            )),
        }
    }

    pub async fn update(
        &self,
        id: Uuid,
        principal: &Principal,
        update: ResourceUpdate,
    ) -> AppResult<DigitalResource> {
        principal.require_admin()?;
        update.validate().map_err(AppError::Validation)?;
        let mut resource = self.load(id).await?;
        update.apply(&mut resource);
        if !self.store.update_resource(&resource).await? {
            return Err(AppError::NotFound("Resource not found".into()));
        }
        info!(resource_id = %resource.resource_id, "resource updated");
        self.load(id).await
    }

    pub async fn delete(&self, id: Uuid, principal: &Principal) -> AppResult<()> {
        principal.require_admin()?;
        if !self.store.delete_resource(id).await? {
            return Err(AppError::NotFound("Resource not found".into()));
        }
        info!(%id, "resource deleted");
        Ok(())
    }
}
