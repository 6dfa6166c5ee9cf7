use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DigitalResource {
    pub id: Uuid,
    pub resource_id: String,
    pub title: String,
    pub author: String,
    pub category: String,
    pub file_url: String,
    pub cost: f64,
    pub published_year: Option<i32>,
    pub available_copies: i32,
}

/// One concurrent loan of a digital resource.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBorrow {
    pub resource_id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResource {
    pub resource_id: String,
    pub title: String,
    pub author: String,
    pub category: String,
    pub file_url: String,
    pub cost: f64,
    pub num_of_copies: Option<i32>,
    pub published_year: Option<i32>,
}

impl NewResource {
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("resourceId", &self.resource_id),
            ("title", &self.title),
            ("author", &self.author),
            ("category", &self.category),
            ("fileUrl", &self.file_url),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
        }
        if !(self.cost >= 0.0) {
            return Err("cost must not be negative".into());
        }
        if matches!(self.num_of_copies, Some(n) if n < 1) {
            return Err("numOfCopies must be at least 1".into());
        }
        Ok(())
    }

    pub fn into_resource(self) -> DigitalResource {
        DigitalResource {
            id: Uuid::new_v4(),
            resource_id: self.resource_id.trim().to_string(),
            title: self.title,
            author: self.author,
            category: self.category,
            file_url: self.file_url,
            cost: self.cost,
            published_year: self.published_year,
            available_copies: self.num_of_copies.unwrap_or(1),
        }
    }
}

/// Descriptive fields an admin may edit on a resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub file_url: Option<String>,
    pub cost: Option<f64>,
    pub published_year: Option<i32>,
}

impl ResourceUpdate {
    pub fn validate(&self) -> Result<(), String> {
        let strings = [
            ("title", &self.title),
            ("author", &self.author),
            ("category", &self.category),
            ("fileUrl", &self.file_url),
        ];
        for (field, value) in strings {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(format!("{field} must not be empty"));
            }
        }
        if matches!(self.cost, Some(c) if !(c >= 0.0)) {
            return Err("cost must not be negative".into());
        }
        Ok(())
    }

    pub fn apply(self, r: &mut DigitalResource) {
        if let Some(v) = self.title {
            r.title = v;
        }
        if let Some(v) = self.author {
            r.author = v;
        }
        if let Some(v) = self.category {
            r.category = v;
        }
        if let Some(v) = self.file_url {
            r.file_url = v;
        }
        if let Some(v) = self.cost {
            r.cost = v;
        }
        if let Some(v) = self.published_year {
            r.published_year = Some(v);
        }
    }
}
