use crate::{
    models::{Account, AccountChanges, NewAccount, NewPost, Post, PostChanges},
    password::PasswordHash,
};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The unique email index rejected the write.
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Repository Trait
///
/// The contract for all persistence operations. Handlers only see this trait, which
/// lets the integration tests swap Postgres for an in-memory store.
///
/// Every account lookup used by the management endpoints is scoped by `owner`, so an
/// account owned by another administrator is indistinguishable from a missing one.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Accounts / Auth ---
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, RepositoryError>;
    // The only read that returns password material.
    async fn find_credentials(
        &self,
        email: &str,
    ) -> Result<Option<(Account, PasswordHash)>, RepositoryError>;
    async fn email_exists(&self, email: &str) -> Result<bool, RepositoryError>;
    async fn create_account(&self, account: NewAccount) -> Result<Account, RepositoryError>;

    // --- Owner-scoped account management ---
    // Newest first, never including the owner itself.
    async fn list_owned_accounts(&self, owner: Uuid) -> Result<Vec<Account>, RepositoryError>;
    async fn get_owned_account(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<Account>, RepositoryError>;
    // `None` fields keep their stored value.
    async fn update_owned_account(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: AccountChanges,
    ) -> Result<Option<Account>, RepositoryError>;
    // Returns the removed row so its attachment can be released afterwards.
    async fn delete_owned_account(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<Account>, RepositoryError>;

    // --- Posts ---
    async fn list_posts(&self, include_unpublished: bool) -> Result<Vec<Post>, RepositoryError>;
    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, RepositoryError>;
    async fn create_post(&self, post: NewPost) -> Result<Post, RepositoryError>;
    async fn update_post(
        &self,
        id: Uuid,
        changes: PostChanges,
    ) -> Result<Option<Post>, RepositoryError>;
    async fn delete_post(&self, id: Uuid) -> Result<Option<Post>, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const ACCOUNT_COLUMNS: &str = "id, name, email, role, owner_id, phone, address, \
     file_url, file_public_id, file_name, file_uploaded_at, created_at, updated_at";

const POST_COLUMNS: &str = "id, title, content, author_id, author_name, \
     file_url, file_public_id, file_name, file_uploaded_at, is_published, created_at, updated_at";

fn map_write_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::DuplicateEmail,
        _ => RepositoryError::Database(err),
    }
}

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Queries are bound at
/// runtime and mapped through the `FromRow` impls in `models`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, RepositoryError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");

        Ok(sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// find_credentials
    ///
    /// Looks up an account by (already normalized) email together with its stored
    /// hash. Used by login only.
    async fn find_credentials(
        &self,
        email: &str,
    ) -> Result<Option<(Account, PasswordHash)>, RepositoryError> {
        let query =
            format!("SELECT {ACCOUNT_COLUMNS}, password_hash FROM accounts WHERE email = $1");

        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let account = <Account as sqlx::FromRow<_>>::from_row(&row)?;
                let hash: String = row.try_get("password_hash")?;
                Ok(Some((account, PasswordHash::from_stored(hash))))
            }
            None => Ok(None),
        }
    }

    async fn email_exists(&self, email: &str) -> Result<bool, RepositoryError> {
        Ok(
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// create_account
    ///
    /// Inserts a new account. A concurrent signup with the same email trips the unique
    /// index and surfaces as `DuplicateEmail`.
    async fn create_account(&self, account: NewAccount) -> Result<Account, RepositoryError> {
        let query = format!(
            r#"
            INSERT INTO accounts (
                id, name, email, password_hash, role, owner_id, phone, address,
                file_url, file_public_id, file_name, file_uploaded_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), NOW())
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let file = account.file.as_ref();

        sqlx::query_as::<_, Account>(&query)
            .bind(account.id)
            .bind(&account.name)
            .bind(&account.email)
            .bind(account.password.as_str())
            .bind(account.role.as_str())
            .bind(account.owner_id)
            .bind(&account.phone)
            .bind(&account.address)
            .bind(file.map(|f| f.url.as_str()))
            .bind(file.map(|f| f.public_id.as_str()))
            .bind(file.map(|f| f.filename.as_str()))
            .bind(file.map(|f| f.uploaded_at))
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)
    }

    // --- OWNER-SCOPED ACCOUNT MANAGEMENT ---

    async fn list_owned_accounts(&self, owner: Uuid) -> Result<Vec<Account>, RepositoryError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE owner_id = $1 AND id <> $1 \
             ORDER BY created_at DESC"
        );

        Ok(sqlx::query_as::<_, Account>(&query)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_owned_account(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<Account>, RepositoryError> {
        let query =
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND owner_id = $2");

        Ok(sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// update_owned_account
    ///
    /// Partial update through `COALESCE`: a column only changes when the matching field
    /// of `changes` is `Some`. The four `file_*` columns are replaced together.
    async fn update_owned_account(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: AccountChanges,
    ) -> Result<Option<Account>, RepositoryError> {
        let query = format!(
            r#"
            UPDATE accounts
            SET name = COALESCE($3, name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                address = COALESCE($6, address),
                password_hash = COALESCE($7, password_hash),
                file_url = COALESCE($8, file_url),
                file_public_id = COALESCE($9, file_public_id),
                file_name = COALESCE($10, file_name),
                file_uploaded_at = COALESCE($11, file_uploaded_at),
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let file = changes.file.as_ref();

        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .bind(owner)
            .bind(changes.name.as_deref())
            .bind(changes.email.as_deref())
            .bind(changes.phone.as_deref())
            .bind(changes.address.as_deref())
            .bind(changes.password.as_ref().map(PasswordHash::as_str))
            .bind(file.map(|f| f.url.as_str()))
            .bind(file.map(|f| f.public_id.as_str()))
            .bind(file.map(|f| f.filename.as_str()))
            .bind(file.map(|f| f.uploaded_at))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)
    }

    async fn delete_owned_account(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<Account>, RepositoryError> {
        let query = format!(
            "DELETE FROM accounts WHERE id = $1 AND owner_id = $2 RETURNING {ACCOUNT_COLUMNS}"
        );

        Ok(sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- POSTS ---

    /// list_posts
    ///
    /// Newest first. Drafts are only included when `include_unpublished` is set.
    async fn list_posts(&self, include_unpublished: bool) -> Result<Vec<Post>, RepositoryError> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE is_published = true OR $1 \
             ORDER BY created_at DESC"
        );

        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(include_unpublished)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, RepositoryError> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");

        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, RepositoryError> {
        let query = format!(
            r#"
            INSERT INTO posts (
                id, title, content, author_id, author_name, is_published,
                file_url, file_public_id, file_name, file_uploaded_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
            RETURNING {POST_COLUMNS}
            "#
        );
        let file = post.file.as_ref();

        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(post.id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(post.author_id)
            .bind(&post.author_name)
            .bind(post.is_published)
            .bind(file.map(|f| f.url.as_str()))
            .bind(file.map(|f| f.public_id.as_str()))
            .bind(file.map(|f| f.filename.as_str()))
            .bind(file.map(|f| f.uploaded_at))
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_post(
        &self,
        id: Uuid,
        changes: PostChanges,
    ) -> Result<Option<Post>, RepositoryError> {
        let query = format!(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                is_published = COALESCE($4, is_published),
                file_url = COALESCE($5, file_url),
                file_public_id = COALESCE($6, file_public_id),
                file_name = COALESCE($7, file_name),
                file_uploaded_at = COALESCE($8, file_uploaded_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        );
        let file = changes.file.as_ref();

        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .bind(changes.title.as_deref())
            .bind(changes.content.as_deref())
            .bind(changes.is_published)
            .bind(file.map(|f| f.url.as_str()))
            .bind(file.map(|f| f.public_id.as_str()))
            .bind(file.map(|f| f.filename.as_str()))
            .bind(file.map(|f| f.uploaded_at))
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_post(&self, id: Uuid) -> Result<Option<Post>, RepositoryError> {
        let query = format!("DELETE FROM posts WHERE id = $1 RETURNING {POST_COLUMNS}");

        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }
}
