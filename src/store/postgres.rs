use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Inserted, LibraryStore};
use crate::{
    books::model::{BookCopy, BookRecord, CopyStatus},
    resources::model::{DigitalResource, ResourceBorrow},
    users::model::{ActivityEntry, ActivityRow, NewUser, Role, User, UserRow},
};

const COPY_COLUMNS: &str = r#"
    id, copy_id, book_id, title, author, isbn, category, location,
    published_year, page_count, cost, status,
    borrowed_by, start_time, end_time,
    reserved_by, reserve_start_time, reserve_end_time, is_renewed
"#;

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, mobile, city, state, zipcode, created_at";

const RESOURCE_COLUMNS: &str =
    "id, resource_id, title, author, category, file_url, cost, published_year, available_copies";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn to_copies(rows: Vec<BookRecord>) -> anyhow::Result<Vec<BookCopy>> {
    rows.into_iter().map(BookCopy::try_from).collect()
}

fn to_users(rows: Vec<UserRow>) -> anyhow::Result<Vec<User>> {
    rows.into_iter().map(User::try_from).collect()
}

#[async_trait]
impl LibraryStore for PgStore {
    async fn get_copy(&self, id: Uuid) -> anyhow::Result<Option<BookCopy>> {
        let row = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {COPY_COLUMNS} FROM book_copies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("select copy")?;
        row.map(BookCopy::try_from).transpose()
    }

    async fn list_copies(&self, include_lost: bool) -> anyhow::Result<Vec<BookCopy>> {
        let rows = sqlx::query_as::<_, BookRecord>(&format!(
            r#"
            SELECT {COPY_COLUMNS}
              FROM book_copies
             WHERE $1 OR status <> 'lost'
             ORDER BY title ASC, copy_id ASC
            "#
        ))
        .bind(include_lost)
        .fetch_all(&self.db)
        .await
        .context("list copies")?;
        to_copies(rows)
    }

    async fn count_copies_of(&self, book_id: &str) -> anyhow::Result<usize> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM book_copies WHERE book_id = $1")
            .bind(book_id)
            .fetch_one(&self.db)
            .await
            .context("count copies of title")?;
        Ok(n as usize)
    }

    async fn copy_id_exists(&self, copy_id: &str) -> anyhow::Result<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM book_copies WHERE copy_id = $1)")
                .bind(copy_id)
                .fetch_one(&self.db)
                .await
                .context("check copy id")?;
        Ok(exists)
    }

    async fn insert_copy(&self, copy: &BookCopy) -> anyhow::Result<Inserted> {
        let r = BookRecord::from(copy);
        let res = sqlx::query(
            r#"
            INSERT INTO book_copies (
                id, copy_id, book_id, title, author, isbn, category, location,
                published_year, page_count, cost, status,
                borrowed_by, start_time, end_time,
                reserved_by, reserve_start_time, reserve_end_time, is_renewed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (copy_id) DO NOTHING
            "#,
        )
        .bind(r.id)
        .bind(&r.copy_id)
        .bind(&r.book_id)
        .bind(&r.title)
        .bind(&r.author)
        .bind(&r.isbn)
        .bind(&r.category)
        .bind(&r.location)
        .bind(&r.published_year)
        .bind(r.page_count)
        .bind(r.cost)
        .bind(&r.status)
        .bind(r.borrowed_by)
        .bind(r.start_time)
        .bind(r.end_time)
        .bind(r.reserved_by)
        .bind(r.reserve_start_time)
        .bind(r.reserve_end_time)
        .bind(r.is_renewed)
        .execute(&self.db)
        .await
        .context("insert copy")?;
        Ok(if res.rows_affected() == 1 {
            Inserted::Created
        } else {
            Inserted::Duplicate
        })
    }

    async fn update_copy(&self, copy: &BookCopy) -> anyhow::Result<bool> {
        let r = BookRecord::from(copy);
        let res = sqlx::query(
            r#"
            UPDATE book_copies
               SET title = $2, author = $3, isbn = $4, category = $5, location = $6,
                   published_year = $7, page_count = $8, cost = $9, status = $10,
                   borrowed_by = $11, start_time = $12, end_time = $13,
                   reserved_by = $14, reserve_start_time = $15, reserve_end_time = $16,
                   is_renewed = $17
             WHERE id = $1
            "#,
        )
        .bind(r.id)
        .bind(&r.title)
        .bind(&r.author)
        .bind(&r.isbn)
        .bind(&r.category)
        .bind(&r.location)
        .bind(&r.published_year)
        .bind(r.page_count)
        .bind(r.cost)
        .bind(&r.status)
        .bind(r.borrowed_by)
        .bind(r.start_time)
        .bind(r.end_time)
        .bind(r.reserved_by)
        .bind(r.reserve_start_time)
        .bind(r.reserve_end_time)
        .bind(r.is_renewed)
        .execute(&self.db)
        .await
        .context("update copy")?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete_copy(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM book_copies WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete copy")?;
        Ok(res.rows_affected() == 1)
    }

    async fn copies_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<BookCopy>> {
        let rows = sqlx::query_as::<_, BookRecord>(&format!(
            r#"
            SELECT {COPY_COLUMNS}
              FROM book_copies
             WHERE borrowed_by = $1 OR reserved_by = $1
             ORDER BY title ASC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list copies for user")?;
        to_copies(rows)
    }

    async fn count_copies_by_status(&self) -> anyhow::Result<Vec<(CopyStatus, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM book_copies GROUP BY status")
                .fetch_all(&self.db)
                .await
                .context("count copies by status")?;
        rows.into_iter()
            .map(|(status, n)| Ok((status.parse()?, n)))
            .collect()
    }

    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("select user")?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("select user by email")?;
        row.map(User::try_from).transpose()
    }

    async fn create_user(&self, user: NewUser) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, mobile, city, state, zipcode)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (email) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.mobile)
        .bind(&user.city)
        .bind(&user.state)
        .bind(&user.zipcode)
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;
        row.map(User::try_from).transpose()
    }

    async fn update_profile(&self, user: &User) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET name = $2, mobile = $3, city = $4, state = $5, zipcode = $6
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.mobile)
        .bind(&user.city)
        .bind(&user.state)
        .bind(&user.zipcode)
        .execute(&self.db)
        .await
        .context("update profile")?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await
            .context("update password hash")?;
        Ok(res.rows_affected() == 1)
    }

    async fn list_non_admin_users(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role <> $1 ORDER BY created_at ASC"
        ))
        .bind(Role::Admin.as_str())
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        to_users(rows)
    }

    async fn append_activity(&self, user_id: Uuid, entry: &ActivityEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_history (user_id, action, item_type, item_id, timestamp, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user_id)
        .bind(entry.action.as_str())
        .bind(entry.item_type.as_str())
        .bind(entry.item_id)
        .bind(entry.timestamp)
        .bind(Json(&entry.metadata))
        .execute(&self.db)
        .await
        .context("append activity")?;
        Ok(())
    }

    async fn activity_for(&self, user_id: Uuid) -> anyhow::Result<Vec<ActivityEntry>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT action, item_type, item_id, timestamp, metadata
              FROM activity_history
             WHERE user_id = $1
             ORDER BY seq ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list activity")?;
        rows.into_iter().map(ActivityEntry::try_from).collect()
    }

    async fn get_resource(&self, id: Uuid) -> anyhow::Result<Option<DigitalResource>> {
        let row = sqlx::query_as::<_, DigitalResource>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM digital_resources WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("select resource")?;
        Ok(row)
    }

    async fn list_resources(&self) -> anyhow::Result<Vec<DigitalResource>> {
        let rows = sqlx::query_as::<_, DigitalResource>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM digital_resources ORDER BY title ASC"
        ))
        .fetch_all(&self.db)
        .await
        .context("list resources")?;
        Ok(rows)
    }

    async fn insert_resource(&self, r: &DigitalResource) -> anyhow::Result<Inserted> {
        let res = sqlx::query(
            r#"
            INSERT INTO digital_resources (
                id, resource_id, title, author, category, file_url, cost,
                published_year, available_copies
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (resource_id) DO NOTHING
            "#,
        )
        .bind(r.id)
        .bind(&r.resource_id)
        .bind(&r.title)
        .bind(&r.author)
        .bind(&r.category)
        .bind(&r.file_url)
        .bind(r.cost)
        .bind(r.published_year)
        .bind(r.available_copies)
        .execute(&self.db)
        .await
        .context("insert resource")?;
        Ok(if res.rows_affected() == 1 {
            Inserted::Created
        } else {
            Inserted::Duplicate
        })
    }

    async fn update_resource(&self, r: &DigitalResource) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE digital_resources
               SET title = $2, author = $3, category = $4, file_url = $5,
                   cost = $6, published_year = $7
             WHERE id = $1
            "#,
        )
        .bind(r.id)
        .bind(&r.title)
        .bind(&r.author)
        .bind(&r.category)
        .bind(&r.file_url)
        .bind(r.cost)
        .bind(r.published_year)
        .execute(&self.db)
        .await
        .context("update resource")?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete_resource(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM digital_resources WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete resource")?;
        Ok(res.rows_affected() == 1)
    }

    async fn has_active_borrow(&self, resource_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM resource_borrows WHERE resource_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(resource_id)
        .bind(user_id)
        .fetch_one(&self.db)
        .await
        .context("check resource borrow")?;
        Ok(exists)
    }

    async fn take_resource_copy(&self, borrow: &ResourceBorrow) -> anyhow::Result<bool> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let taken = sqlx::query(
            r#"
            UPDATE digital_resources
               SET available_copies = available_copies - 1
             WHERE id = $1 AND available_copies > 0
            "#,
        )
        .bind(borrow.resource_id)
        .execute(&mut *tx)
        .await
        .context("decrement available copies")?
        .rows_affected()
            == 1;
        if !taken {
            return Ok(false);
        }
        sqlx::query(
            r#"
            INSERT INTO resource_borrows (resource_id, user_id, start_time, end_time)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(borrow.resource_id)
        .bind(borrow.user_id)
        .bind(borrow.start_time)
        .bind(borrow.end_time)
        .execute(&mut *tx)
        .await
        .context("insert resource borrow")?;
        tx.commit().await.context("commit tx")?;
        Ok(true)
    }

    async fn release_expired_borrows(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let expired: Vec<(Uuid,)> = sqlx::query_as(
            "DELETE FROM resource_borrows WHERE end_time < $1 RETURNING resource_id",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .context("delete expired borrows")?;
        for (resource_id,) in &expired {
            sqlx::query(
                "UPDATE digital_resources SET available_copies = available_copies + 1 WHERE id = $1",
            )
            .bind(resource_id)
            .execute(&mut *tx)
            .await
            .context("return resource copy")?;
        }
        tx.commit().await.context("commit tx")?;
        Ok(expired.len() as u64)
    }

    async fn resources_borrowed_by(&self, user_id: Uuid) -> anyhow::Result<Vec<DigitalResource>> {
        let rows = sqlx::query_as::<_, DigitalResource>(
            r#"
            SELECT r.id, r.resource_id, r.title, r.author, r.category, r.file_url, r.cost,
                   r.published_year, r.available_copies
              FROM digital_resources r
              JOIN resource_borrows b ON b.resource_id = r.id
             WHERE b.user_id = $1
             ORDER BY r.title ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list borrowed resources")?;
        Ok(rows)
    }

    async fn count_resources(&self) -> anyhow::Result<(i64, i64)> {
        let counts: (i64, i64) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM digital_resources),
                   (SELECT COUNT(DISTINCT resource_id) FROM resource_borrows)
            "#,
        )
        .fetch_one(&self.db)
        .await
        .context("count resources")?;
        Ok(counts)
    }
}
