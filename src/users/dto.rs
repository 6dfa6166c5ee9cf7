use serde::Serialize;
use uuid::Uuid;

use super::model::{ActivityEntry, Role};
use crate::{books::model::BookRecord, resources::model::DigitalResource};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub borrowed_books: Vec<BookRecord>,
    pub reserved_books: Vec<BookRecord>,
    pub lost_books: Vec<BookRecord>,
    #[serde(rename = "borrowedEBooks")]
    pub borrowed_ebooks: Vec<DigitalResource>,
    pub activity_history: Vec<ActivityEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub activity_history: Vec<ActivityEntry>,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookStats {
    pub total: i64,
    pub available: i64,
    pub reserved: i64,
    pub borrowed: i64,
    pub return_requested: i64,
    pub lost: i64,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct EbookStats {
    pub total: i64,
    pub borrowed: i64,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct StatsResponse {
    pub books: BookStats,
    pub ebooks: EbookStats,
}
