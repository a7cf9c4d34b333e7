//! Shared test infrastructure for the router-level integration tests:
//! an in-memory `Repository`, the recording `MockMediaHost`, and request builders.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use chrono::Utc;
use roster_portal::{
    AppConfig, AppState, MockMediaHost, create_router,
    media::MediaState,
    models::{Account, AccountChanges, NewAccount, NewPost, Post, PostChanges},
    password::PasswordHash,
    repository::{Repository, RepositoryError, RepositoryState},
};
use serde_json::Value;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "secret123";

// --- In-Memory Repository ---

/// Vec-backed store. Insertion order stands in for `created_at`, so "newest first"
/// is reverse insertion order.
#[derive(Default)]
pub struct InMemoryRepository {
    accounts: Mutex<Vec<(Account, PasswordHash)>>,
    posts: Mutex<Vec<Post>>,
    fail_writes: AtomicBool,
}

impl InMemoryRepository {
    /// Makes every subsequent insert/update fail like a lost database connection.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn stored_hash(&self, id: Uuid) -> Option<PasswordHash> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|(account, _)| account.id == id)
            .map(|(_, hash)| hash.clone())
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, RepositoryError> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts
            .iter()
            .find(|(account, _)| account.id == id)
            .map(|(account, _)| account.clone()))
    }

    async fn find_credentials(
        &self,
        email: &str,
    ) -> Result<Option<(Account, PasswordHash)>, RepositoryError> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts
            .iter()
            .find(|(account, _)| account.email == email)
            .cloned())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, RepositoryError> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts.iter().any(|(account, _)| account.email == email))
    }

    async fn create_account(&self, new: NewAccount) -> Result<Account, RepositoryError> {
        self.check_writable()?;
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.iter().any(|(account, _)| account.email == new.email) {
            return Err(RepositoryError::DuplicateEmail);
        }

        let now = Utc::now();
        let account = Account {
            id: new.id,
            name: new.name,
            email: new.email,
            role: new.role,
            owner_id: new.owner_id,
            phone: new.phone,
            address: new.address,
            file: new.file,
            created_at: now,
            updated_at: now,
        };
        accounts.push((account.clone(), new.password));
        Ok(account)
    }

    async fn list_owned_accounts(&self, owner: Uuid) -> Result<Vec<Account>, RepositoryError> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts
            .iter()
            .rev()
            .filter(|(account, _)| account.owner_id == owner && account.id != owner)
            .map(|(account, _)| account.clone())
            .collect())
    }

    async fn get_owned_account(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<Account>, RepositoryError> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts
            .iter()
            .find(|(account, _)| account.id == id && account.owner_id == owner)
            .map(|(account, _)| account.clone()))
    }

    async fn update_owned_account(
        &self,
        id: Uuid,
        owner: Uuid,
        changes: AccountChanges,
    ) -> Result<Option<Account>, RepositoryError> {
        self.check_writable()?;
        let mut accounts = self.accounts.lock().unwrap();

        if let Some(email) = &changes.email {
            if accounts
                .iter()
                .any(|(account, _)| account.email == *email && account.id != id)
            {
                return Err(RepositoryError::DuplicateEmail);
            }
        }

        let Some((account, hash)) = accounts
            .iter_mut()
            .find(|(account, _)| account.id == id && account.owner_id == owner)
        else {
            return Ok(None);
        };

        if let Some(name) = changes.name {
            account.name = name;
        }
        if let Some(email) = changes.email {
            account.email = email;
        }
        if let Some(phone) = changes.phone {
            account.phone = phone;
        }
        if let Some(address) = changes.address {
            account.address = address;
        }
        if let Some(password) = changes.password {
            *hash = password;
        }
        if let Some(file) = changes.file {
            account.file = Some(file);
        }
        account.updated_at = Utc::now();

        Ok(Some(account.clone()))
    }

    async fn delete_owned_account(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<Account>, RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        let position = accounts
            .iter()
            .position(|(account, _)| account.id == id && account.owner_id == owner);
        Ok(position.map(|index| accounts.remove(index).0))
    }

    async fn list_posts(&self, include_unpublished: bool) -> Result<Vec<Post>, RepositoryError> {
        let posts = self.posts.lock().unwrap();
        Ok(posts
            .iter()
            .rev()
            .filter(|post| post.is_published || include_unpublished)
            .cloned()
            .collect())
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, RepositoryError> {
        let posts = self.posts.lock().unwrap();
        Ok(posts.iter().find(|post| post.id == id).cloned())
    }

    async fn create_post(&self, new: NewPost) -> Result<Post, RepositoryError> {
        self.check_writable()?;
        let now = Utc::now();
        let post = Post {
            id: new.id,
            title: new.title,
            content: new.content,
            author_id: new.author_id,
            author_name: new.author_name,
            file: new.file,
            is_published: new.is_published,
            created_at: now,
            updated_at: now,
        };
        self.posts.lock().unwrap().push(post.clone());
        Ok(post)
    }

    async fn update_post(
        &self,
        id: Uuid,
        changes: PostChanges,
    ) -> Result<Option<Post>, RepositoryError> {
        self.check_writable()?;
        let mut posts = self.posts.lock().unwrap();
        let Some(post) = posts.iter_mut().find(|post| post.id == id) else {
            return Ok(None);
        };

        if let Some(title) = changes.title {
            post.title = title;
        }
        if let Some(content) = changes.content {
            post.content = content;
        }
        if let Some(is_published) = changes.is_published {
            post.is_published = is_published;
        }
        if let Some(file) = changes.file {
            post.file = Some(file);
        }
        post.updated_at = Utc::now();

        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: Uuid) -> Result<Option<Post>, RepositoryError> {
        let mut posts = self.posts.lock().unwrap();
        let position = posts.iter().position(|post| post.id == id);
        Ok(position.map(|index| posts.remove(index)))
    }
}

// --- Application Harness ---

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub media: Arc<MockMediaHost>,
    pub config: AppConfig,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_media(MockMediaHost::new())
    }

    pub fn with_media(media: MockMediaHost) -> Self {
        let repo = Arc::new(InMemoryRepository::default());
        let media = Arc::new(media);
        let config = AppConfig::default();

        let state = AppState {
            repo: repo.clone() as RepositoryState,
            media: media.clone() as MediaState,
            config: config.clone(),
        };

        Self {
            router: create_router(state),
            repo,
            media,
            config,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Registers a tenant administrator and returns `(token, user)`.
    pub async fn signup(&self, name: &str, email: &str) -> (String, Value) {
        let response = self
            .send(json_request(
                "POST",
                "/api/auth/signup",
                None,
                serde_json::json!({ "name": name, "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), 201, "signup of {} failed", email);

        let body = body_json(response).await;
        (body["token"].as_str().unwrap().to_string(), body["user"].clone())
    }

    /// Creates a subordinate account owned by the holder of `admin_token`.
    pub async fn create_user(&self, admin_token: &str, name: &str, email: &str) -> Value {
        let response = self
            .send(json_request(
                "POST",
                "/api/users",
                Some(admin_token),
                serde_json::json!({ "name": name, "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), 201, "creating {} failed", email);

        body_json(response).await["user"].clone()
    }

    pub async fn login(&self, email: &str, password: &str) -> Response<Body> {
        self.send(json_request(
            "POST",
            "/api/auth/login",
            None,
            serde_json::json!({ "email": email, "password": password }),
        ))
        .await
    }

    /// Logs in and returns the token.
    pub async fn token_for(&self, email: &str) -> String {
        let response = self.login(email, PASSWORD).await;
        assert_eq!(response.status(), 200, "login of {} failed", email);
        body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

// --- Request / Response Helpers ---

fn builder(method: &str, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {}", token)),
        None => builder,
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    builder("GET", uri, token).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    builder("DELETE", uri, token).body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    builder(method, uri, token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// An attachment part: `(filename, content type, bytes)`.
pub type FilePart<'a> = (&'a str, &'a str, &'a [u8]);

const BOUNDARY: &str = "roster-test-boundary";

pub fn multipart_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    fields: &[(&str, &str)],
    file: Option<FilePart<'_>>,
) -> Request<Body> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    if let Some((filename, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    builder(method, uri, token)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
