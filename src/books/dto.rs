use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::model::BookRecord;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub reserve_start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub reserve_end_time: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct AddCopyRequest {
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub message: String,
    pub book: BookRecord,
}

impl BookResponse {
    pub fn new(message: impl Into<String>, book: BookRecord) -> Self {
        Self {
            message: message.into(),
            book,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnResponse {
    pub message: String,
    pub book: BookRecord,
    pub fine_amount: f64,
    pub overdue_days: i64,
}
