use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    password::PasswordHash,
    upload::UploadForm,
};

/// Minimum accepted length of a plaintext password.
pub const MIN_PASSWORD_LEN: usize = 6;

// --- Core Domain Records (Mapped to Database) ---

/// Role
///
/// The explicit RBAC marker stored on every account. Administrators own themselves;
/// users are owned by exactly one administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Attachment
///
/// Reference to a binary held by the media host. Embedded in accounts and posts as
/// nullable `file_*` columns; never a standalone row. The URL and identifier stay
/// server-side.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub url: String,
    // Opaque identifier used to delete or fetch the object at the media host.
    pub public_id: String,
    // Original client-side filename, echoed in Content-Disposition.
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Account
///
/// A row of the `accounts` table without its password hash. This is the identity
/// attached to authenticated requests.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    // The controlling administrator. Equal to `id` for administrators.
    pub owner_id: Uuid,
    pub phone: String,
    pub address: String,
    pub file: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Post
///
/// A row of the `posts` table. `author_name` is denormalized at creation time.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub author_name: String,
    pub file: Option<Attachment>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn attachment_from_row(row: &PgRow) -> Result<Option<Attachment>, sqlx::Error> {
    let url: Option<String> = row.try_get("file_url")?;
    let public_id: Option<String> = row.try_get("file_public_id")?;
    let filename: Option<String> = row.try_get("file_name")?;
    let uploaded_at: Option<DateTime<Utc>> = row.try_get("file_uploaded_at")?;

    Ok(match (url, public_id) {
        (Some(url), Some(public_id)) => Some(Attachment {
            url,
            public_id,
            filename: filename.unwrap_or_default(),
            uploaded_at: uploaded_at.unwrap_or_else(Utc::now),
        }),
        _ => None,
    })
}

impl<'r> FromRow<'r, PgRow> for Account {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let role = role.parse::<Role>().map_err(|e| sqlx::Error::ColumnDecode {
            index: "role".to_string(),
            source: Box::new(e),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            role,
            owner_id: row.try_get("owner_id")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            file: attachment_from_row(row)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Post {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            author_id: row.try_get("author_id")?,
            author_name: row.try_get("author_name")?,
            file: attachment_from_row(row)?,
            is_published: row.try_get("is_published")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// --- Store Write Inputs ---

/// Everything needed to insert an account. The secret is already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: PasswordHash,
    pub role: Role,
    pub owner_id: Uuid,
    pub phone: String,
    pub address: String,
    pub file: Option<Attachment>,
}

/// Partial account update. `None` leaves the column untouched; in particular a
/// `None` password keeps the stored hash as it is.
#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password: Option<PasswordHash>,
    pub file: Option<Attachment>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub author_name: String,
    pub is_published: bool,
    pub file: Option<Attachment>,
}

#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_published: Option<bool>,
    pub file: Option<Attachment>,
}

// --- Request Payloads (Input Schemas) ---

/// CreateAccountRequest
///
/// Fields of `POST /auth/signup` and `POST /users`, sent as multipart form fields
/// (with an optional `file` part) or as a JSON object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateAccountRequest {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl CreateAccountRequest {
    pub fn from_form(form: &UploadForm) -> Self {
        Self {
            name: form.text("name").map(str::trim).unwrap_or_default().to_string(),
            email: form.text("email").map(normalize_email).unwrap_or_default(),
            password: form.text("password").unwrap_or_default().to_string(),
            phone: form.text("phone").map(|v| v.trim().to_string()),
            address: form.text("address").map(|v| v.trim().to_string()),
        }
    }

    pub fn validate(&self) -> ApiResult<()> {
        if self.name.is_empty() || self.email.is_empty() || self.password.trim().is_empty() {
            return Err(ApiError::Validation(
                "Name, email, and password are required".to_string(),
            ));
        }
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

/// UpdateAccountRequest
///
/// Partial update for `PUT /users/{id}`. Blank `name`, `email`, and `password` are
/// treated as absent; `phone` and `address` accept an empty string to clear them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateAccountRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UpdateAccountRequest {
    pub fn from_form(form: &UploadForm) -> Self {
        Self {
            name: form.non_blank("name"),
            email: form.non_blank("email").map(|e| normalize_email(&e)),
            phone: form.text("phone").map(|v| v.trim().to_string()),
            address: form.text("address").map(|v| v.trim().to_string()),
            password: form
                .text("password")
                .filter(|p| !p.trim().is_empty())
                .map(str::to_string),
        }
    }

    pub fn validate(&self) -> ApiResult<()> {
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(())
    }
}

/// LoginRequest
///
/// JSON body of `POST /auth/login`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// CreatePostRequest
///
/// Fields of `POST /posts`. `is_published` defaults to true.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub is_published: Option<bool>,
}

impl CreatePostRequest {
    pub fn from_form(form: &UploadForm) -> ApiResult<Self> {
        Ok(Self {
            title: form.text("title").map(str::trim).unwrap_or_default().to_string(),
            content: form.text("content").unwrap_or_default().to_string(),
            is_published: publication_flag(form)?,
        })
    }

    pub fn validate(&self) -> ApiResult<()> {
        if self.title.is_empty() || self.content.trim().is_empty() {
            return Err(ApiError::Validation(
                "Title and content are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// UpdatePostRequest
///
/// Partial update for `PUT /posts/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
}

impl UpdatePostRequest {
    pub fn from_form(form: &UploadForm) -> ApiResult<Self> {
        Ok(Self {
            title: form.non_blank("title"),
            content: form
                .text("content")
                .filter(|c| !c.trim().is_empty())
                .map(str::to_string),
            is_published: publication_flag(form)?,
        })
    }
}

// The browser client sends `isPublished`; API clients may send `is_published`.
fn publication_flag(form: &UploadForm) -> ApiResult<Option<bool>> {
    match form.flag("is_published")? {
        Some(flag) => Ok(Some(flag)),
        None => form.flag("isPublished"),
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn validate_email(email: &str) -> ApiResult<()> {
    let plausible = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if plausible {
        Ok(())
    } else {
        Err(ApiError::Validation("Invalid email address".to_string()))
    }
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

// --- Response Schemas (Output) ---

/// AttachmentInfo
///
/// Client-facing view of an attachment. The file itself is served by the matching
/// `/download` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AttachmentInfo {
    pub filename: String,
    #[ts(type = "string")]
    pub uploaded_at: DateTime<Utc>,
}

impl From<&Attachment> for AttachmentInfo {
    fn from(attachment: &Attachment) -> Self {
        Self {
            filename: attachment.filename.clone(),
            uploaded_at: attachment.uploaded_at,
        }
    }
}

/// AccountView
///
/// Redacted account representation returned by every endpoint. Carries no password
/// material and no media host identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccountView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub owner_id: Uuid,
    pub phone: String,
    pub address: String,
    pub has_file: bool,
    pub file: Option<AttachmentInfo>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            role: account.role,
            owner_id: account.owner_id,
            phone: account.phone.clone(),
            address: account.address.clone(),
            has_file: account.file.is_some(),
            file: account.file.as_ref().map(AttachmentInfo::from),
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// PostView
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub author_name: String,
    pub is_published: bool,
    pub has_file: bool,
    pub file: Option<AttachmentInfo>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<&Post> for PostView {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id,
            title: post.title.clone(),
            content: post.content.clone(),
            author_id: post.author_id,
            author_name: post.author_name.clone(),
            is_published: post.is_published,
            has_file: post.file.is_some(),
            file: post.file.as_ref().map(AttachmentInfo::from),
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

/// AuthResponse
///
/// Returned by signup and login: the bearer token plus the redacted account.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthResponse {
    pub token: String,
    pub user: AccountView,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccountResponse {
    pub message: String,
    pub user: AccountView,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostResponse {
    pub message: String,
    pub post: PostView,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
