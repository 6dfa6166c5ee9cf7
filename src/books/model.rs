use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CopyStatus {
    Available,
    Borrowed,
    Reserved,
    Lost,
    ReturnRequested,
}

impl CopyStatus {
    pub const ALL: [CopyStatus; 5] = [
        CopyStatus::Available,
        CopyStatus::Borrowed,
        CopyStatus::Reserved,
        CopyStatus::Lost,
        CopyStatus::ReturnRequested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Available => "available",
            CopyStatus::Borrowed => "borrowed",
            CopyStatus::Reserved => "reserved",
            CopyStatus::Lost => "lost",
            CopyStatus::ReturnRequested => "return_requested",
        }
    }
}

impl std::str::FromStr for CopyStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CopyStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| anyhow!("unknown copy status {s:?}"))
    }
}

/// A half-open time span with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl Window {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loan {
    pub borrower: Uuid,
    pub window: Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub holder: Uuid,
    pub window: Window,
}

/// Where a copy is in its borrow cycle. A reservation is tracked beside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoanState {
    #[default]
    Available,
    Borrowed(Loan),
    ReturnRequested(Loan),
    /// The loan active at the time of loss is kept so the borrower's history
    /// still shows the copy.
    Lost { last_loan: Option<Loan> },
}

impl LoanState {
    pub fn loan(&self) -> Option<&Loan> {
        match self {
            LoanState::Borrowed(l) | LoanState::ReturnRequested(l) => Some(l),
            LoanState::Lost { last_loan } => last_loan.as_ref(),
            LoanState::Available => None,
        }
    }
}

/// Descriptive catalogue data of a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct BookDetails {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub location: String,
    pub published_year: String,
    pub page_count: i32,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookCopy {
    pub id: Uuid,
    pub copy_id: String,
    pub book_id: String,
    pub details: BookDetails,
    pub state: LoanState,
    pub reservation: Option<Reservation>,
    pub renewed: bool,
}

impl BookCopy {
    pub fn new(copy_id: String, book_id: String, details: BookDetails) -> Self {
        Self {
            id: Uuid::new_v4(),
            copy_id,
            book_id,
            details,
            state: LoanState::Available,
            reservation: None,
            renewed: false,
        }
    }

    pub fn status(&self) -> CopyStatus {
        match (&self.state, &self.reservation) {
            (LoanState::Borrowed(_), _) => CopyStatus::Borrowed,
            (LoanState::ReturnRequested(_), _) => CopyStatus::ReturnRequested,
            (LoanState::Lost { .. }, _) => CopyStatus::Lost,
            (LoanState::Available, Some(_)) => CopyStatus::Reserved,
            (LoanState::Available, None) => CopyStatus::Available,
        }
    }
}

/// Flat form of a copy, as persisted and as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub id: Uuid,
    pub copy_id: String,
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub location: String,
    pub published_year: String,
    pub page_count: i32,
    pub cost: f64,
    pub status: String,
    pub borrowed_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    pub reserved_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reserve_start_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reserve_end_time: Option<OffsetDateTime>,
    pub is_renewed: bool,
}

fn paired(
    what: &str,
    user: Option<Uuid>,
    start: Option<OffsetDateTime>,
    end: Option<OffsetDateTime>,
) -> anyhow::Result<Option<(Uuid, Window)>> {
    match (user, start, end) {
        (None, None, None) => Ok(None),
        (Some(user), Some(start), Some(end)) => {
            let window = Window::new(start, end)
                .ok_or_else(|| anyhow!("{what} window ends before it starts"))?;
            Ok(Some((user, window)))
        }
        _ => bail!("{what} fields are only partially set"),
    }
}

impl TryFrom<BookRecord> for BookCopy {
    type Error = anyhow::Error;

    fn try_from(r: BookRecord) -> Result<Self, Self::Error> {
        let status: CopyStatus = r.status.parse()?;
        let loan = paired("borrow", r.borrowed_by, r.start_time, r.end_time)?
            .map(|(borrower, window)| Loan { borrower, window });
        let reservation = paired(
            "reservation",
            r.reserved_by,
            r.reserve_start_time,
            r.reserve_end_time,
        )?
        .map(|(holder, window)| Reservation { holder, window });

        let state = match (status, loan) {
            (CopyStatus::Borrowed, Some(l)) => LoanState::Borrowed(l),
            (CopyStatus::ReturnRequested, Some(l)) => LoanState::ReturnRequested(l),
            (CopyStatus::Lost, last_loan) => LoanState::Lost { last_loan },
            (CopyStatus::Available, None) if reservation.is_none() => LoanState::Available,
            (CopyStatus::Reserved, None) if reservation.is_some() => LoanState::Available,
            (status, _) => bail!(
                "copy {} has status {} inconsistent with its borrow/reservation fields",
                r.copy_id,
                status.as_str()
            ),
        };

        Ok(Self {
            id: r.id,
            copy_id: r.copy_id,
            book_id: r.book_id,
            details: BookDetails {
                title: r.title,
                author: r.author,
                isbn: r.isbn,
                category: r.category,
                location: r.location,
                published_year: r.published_year,
                page_count: r.page_count,
                cost: r.cost,
            },
            state,
            reservation,
            renewed: r.is_renewed,
        })
    }
}

impl From<&BookCopy> for BookRecord {
    fn from(c: &BookCopy) -> Self {
        let loan = c.state.loan();
        let d = &c.details;
        Self {
            id: c.id,
            copy_id: c.copy_id.clone(),
            book_id: c.book_id.clone(),
            title: d.title.clone(),
            author: d.author.clone(),
            isbn: d.isbn.clone(),
            category: d.category.clone(),
            location: d.location.clone(),
            published_year: d.published_year.clone(),
            page_count: d.page_count,
            cost: d.cost,
            status: c.status().as_str().to_string(),
            borrowed_by: loan.map(|l| l.borrower),
            start_time: loan.map(|l| l.window.start()),
            end_time: loan.map(|l| l.window.end()),
            reserved_by: c.reservation.map(|r| r.holder),
            reserve_start_time: c.reservation.map(|r| r.window.start()),
            reserve_end_time: c.reservation.map(|r| r.window.end()),
            is_renewed: c.renewed,
        }
    }
}

/// Admin input for a new title.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub location: String,
    #[serde(default)]
    pub published_year: String,
    #[serde(default)]
    pub page_count: i32,
    pub cost: f64,
}

impl NewBook {
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("bookId", &self.book_id),
            ("title", &self.title),
            ("author", &self.author),
            ("isbn", &self.isbn),
            ("category", &self.category),
            ("location", &self.location),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
        }
        if self.page_count < 0 {
            return Err("pageCount must not be negative".into());
        }
        if !(self.cost >= 0.0) {
            return Err("cost must not be negative".into());
        }
        Ok(())
    }

    pub fn into_details(self) -> (String, BookDetails) {
        (
            self.book_id.trim().to_string(),
            BookDetails {
                title: self.title,
                author: self.author,
                isbn: self.isbn,
                category: self.category,
                location: self.location,
                published_year: self.published_year,
                page_count: self.page_count,
                cost: self.cost,
            },
        )
    }
}

/// Descriptive fields an admin may edit. Lifecycle fields are not reachable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub published_year: Option<String>,
    pub page_count: Option<i32>,
    pub cost: Option<f64>,
}

impl BookUpdate {
    pub fn validate(&self) -> Result<(), String> {
        let strings = [
            ("title", &self.title),
            ("author", &self.author),
            ("isbn", &self.isbn),
            ("category", &self.category),
            ("location", &self.location),
            ("publishedYear", &self.published_year),
        ];
        for (field, value) in strings {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(format!("{field} must not be empty"));
            }
        }
        if matches!(self.page_count, Some(p) if p < 0) {
            return Err("pageCount must not be negative".into());
        }
        if matches!(self.cost, Some(c) if !(c >= 0.0)) {
            return Err("cost must not be negative".into());
        }
        Ok(())
    }

    pub fn apply(self, d: &mut BookDetails) {
        if let Some(v) = self.title {
            d.title = v;
        }
        if let Some(v) = self.author {
            d.author = v;
        }
        if let Some(v) = self.isbn {
            d.isbn = v;
        }
        if let Some(v) = self.category {
            d.category = v;
        }
        if let Some(v) = self.location {
            d.location = v;
        }
        if let Some(v) = self.published_year {
            d.published_year = v;
        }
        if let Some(v) = self.page_count {
            d.page_count = v;
        }
        if let Some(v) = self.cost {
            d.cost = v;
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn details(title: &str) -> BookDetails {
        BookDetails {
            title: title.into(),
            author: "Ursula K. Le Guin".into(),
            isbn: "978-0441478125".into(),
            category: "Fiction".into(),
            location: "Shelf A3".into(),
            published_year: "1969".into(),
            page_count: 304,
            cost: 12.5,
        }
    }

    pub fn copy() -> BookCopy {
        BookCopy::new("LHD".into(), "LHD".into(), details("The Left Hand of Darkness"))
    }
}
