use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
    Professor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
            Role::Professor => "professor",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            "professor" => Ok(Role::Professor),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// User record as stored.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub mobile: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub mobile: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            role: r.role.parse()?,
            mobile: r.mobile,
            city: r.city,
            state: r.state,
            zipcode: r.zipcode,
            created_at: r.created_at,
        })
    }
}

/// Fields required to register an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub mobile: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
}

/// The only user fields a user may change about themselves.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub mobile: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("name", &self.name),
            ("mobile", &self.mobile),
            ("city", &self.city),
            ("state", &self.state),
            ("zipcode", &self.zipcode),
        ];
        for (field, value) in fields {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(format!("{field} must not be empty"));
            }
        }
        Ok(())
    }

    pub fn apply(self, user: &mut User) {
        if let Some(v) = self.name {
            user.name = v.trim().to_string();
        }
        if let Some(v) = self.mobile {
            user.mobile = v.trim().to_string();
        }
        if let Some(v) = self.city {
            user.city = v.trim().to_string();
        }
        if let Some(v) = self.state {
            user.state = v.trim().to_string();
        }
        if let Some(v) = self.zipcode {
            user.zipcode = v.trim().to_string();
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityAction {
    Borrow,
    Reserve,
    Renew,
    Lost,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Borrow => "BORROW",
            ActivityAction::Reserve => "RESERVE",
            ActivityAction::Renew => "RENEW",
            ActivityAction::Lost => "LOST",
        }
    }
}

impl std::str::FromStr for ActivityAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BORROW" => Ok(ActivityAction::Borrow),
            "RESERVE" => Ok(ActivityAction::Reserve),
            "RENEW" => Ok(ActivityAction::Renew),
            "LOST" => Ok(ActivityAction::Lost),
            other => anyhow::bail!("unknown activity action {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemType {
    Book,
    Ebook,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Book => "BOOK",
            ItemType::Ebook => "EBOOK",
        }
    }
}

impl std::str::FromStr for ItemType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOK" => Ok(ItemType::Book),
            "EBOOK" => Ok(ItemType::Ebook),
            other => anyhow::bail!("unknown item type {other:?}"),
        }
    }
}

/// One entry of a user's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub action: ActivityAction,
    pub item_type: ItemType,
    pub item_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub metadata: Value,
}

#[derive(Debug, Clone, FromRow)]
pub struct ActivityRow {
    pub action: String,
    pub item_type: String,
    pub item_id: Uuid,
    pub timestamp: OffsetDateTime,
    pub metadata: sqlx::types::Json<Value>,
}

impl TryFrom<ActivityRow> for ActivityEntry {
    type Error = anyhow::Error;

    fn try_from(r: ActivityRow) -> Result<Self, Self::Error> {
        Ok(Self {
            action: r.action.parse()?,
            item_type: r.item_type.parse()?,
            item_id: r.item_id,
            timestamp: r.timestamp,
            metadata: r.metadata.0,
        })
    }
}
