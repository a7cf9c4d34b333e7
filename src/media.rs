use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use axum::body::{Body, Bytes};
use chrono::Utc;
use s3::{presigning::PresigningConfig, primitives::ByteStream};
use uuid::Uuid;

use crate::{models::Attachment, upload::UploadedFile};

/// Lifetime of the presigned GET used to proxy a download.
const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media host request failed: {0}")]
    Request(String),
    #[error("media host responded with status {0}")]
    Status(u16),
}

/// Top-level folder an attachment is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFolder {
    Users,
    Posts,
}

impl MediaFolder {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaFolder::Users => "users",
            MediaFolder::Posts => "posts",
        }
    }
}

/// A stored object opened for streaming back to a client.
pub struct MediaObject {
    pub content_type: Option<String>,
    pub body: Body,
}

// 1. MediaHost Contract
/// MediaHost
///
/// Every interaction with the external media host. Handlers only see this trait, so
/// the S3 client in production and the recording mock in tests are interchangeable.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Checks that the host is reachable with the configured credentials.
    async fn ping(&self) -> Result<(), MediaError>;

    /// Stores `file` under `folder` and returns its durable reference.
    async fn upload(&self, folder: MediaFolder, file: &UploadedFile)
    -> Result<Attachment, MediaError>;

    /// Releases the object identified by `public_id`.
    async fn delete(&self, public_id: &str) -> Result<(), MediaError>;

    /// Opens the stored object for streaming. The body is not buffered.
    async fn fetch(&self, attachment: &Attachment) -> Result<MediaObject, MediaError>;
}

/// MediaState
///
/// The concrete type used to share the media host across the application state.
pub type MediaState = Arc<dyn MediaHost>;

/// release
///
/// Best-effort deletion of an attachment that is being superseded or whose owner is
/// gone. Failures are logged and swallowed: the reference is dropped regardless.
pub async fn release(media: &dyn MediaHost, attachment: &Attachment) {
    match media.delete(&attachment.public_id).await {
        Ok(()) => tracing::info!(public_id = %attachment.public_id, "released attachment"),
        Err(e) => tracing::warn!(
            public_id = %attachment.public_id,
            error = %e,
            "failed to release attachment; continuing"
        ),
    }
}

/// stream_url
///
/// GETs `url` and hands back the response body as a stream together with the upstream
/// content type. Non-success statuses are errors; nothing is retried.
pub async fn stream_url(client: &reqwest::Client, url: &str) -> Result<MediaObject, MediaError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| MediaError::Request(e.to_string()))?;

    if !response.status().is_success() {
        return Err(MediaError::Status(response.status().as_u16()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    Ok(MediaObject {
        content_type,
        body: Body::from_stream(response.bytes_stream()),
    })
}

/// sanitize_key
///
/// Removes directory navigation components (`..`, `.`, empty segments) from a
/// client-supplied key segment.
fn sanitize_key(key: &str) -> String {
    key.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// object_key
///
/// `<folder>/<uuid>-<filename>`: unique per upload, with the client filename reduced to
/// its last path segment and a conservative character set.
pub fn object_key(folder: MediaFolder, filename: &str) -> String {
    let sanitized = sanitize_key(filename);
    let base = sanitized.rsplit('/').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = if cleaned.is_empty() { "file".to_string() } else { cleaned };

    format!("{}/{}-{}", folder.as_str(), Uuid::new_v4(), cleaned)
}

// 2. The Real Implementation (S3-compatible managed host / MinIO)
/// S3MediaHost
///
/// Media host backed by any S3-compatible service. Path-style addressing is forced
/// for MinIO and managed S3 gateways.
#[derive(Clone)]
pub struct S3MediaHost {
    client: s3::Client,
    http: reqwest::Client,
    endpoint: String,
    bucket_name: String,
}

impl S3MediaHost {
    pub fn new(endpoint: &str, region: &str, access_key: &str, secret_key: &str, bucket: &str) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket_name: bucket.to_string(),
        }
    }

    /// Creates the bucket if missing. Local (MinIO) convenience; errors are ignored
    /// because an existing bucket is reported as a failure by some hosts.
    pub async fn ensure_bucket_exists(&self) {
        let _ = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await;
    }

    /// Path-style URL of an object.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket_name, key)
    }
}

#[async_trait]
impl MediaHost for S3MediaHost {
    async fn ping(&self) -> Result<(), MediaError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| MediaError::Request(e.to_string()))
    }

    async fn upload(
        &self,
        folder: MediaFolder,
        file: &UploadedFile,
    ) -> Result<Attachment, MediaError> {
        let key = object_key(folder, &file.filename);

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(&file.content_type)
            .body(ByteStream::from(file.bytes.clone()))
            .send()
            .await
            .map_err(|e| MediaError::Request(e.to_string()))?;

        tracing::info!(key = %key, size = file.bytes.len(), "stored attachment");

        Ok(Attachment {
            url: self.object_url(&key),
            public_id: key,
            filename: file.filename.clone(),
            uploaded_at: Utc::now(),
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(public_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| MediaError::Request(e.to_string()))
    }

    /// Presigns a short-lived GET for the stored key and streams it through, so the
    /// bucket credentials and object keys never reach the client.
    async fn fetch(&self, attachment: &Attachment) -> Result<MediaObject, MediaError> {
        let presigning = PresigningConfig::expires_in(DOWNLOAD_URL_TTL)
            .map_err(|e| MediaError::Request(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(&attachment.public_id)
            .presigned(presigning)
            .await
            .map_err(|e| MediaError::Request(e.to_string()))?;

        stream_url(&self.http, request.uri()).await
    }
}

// 3. The Mock Implementation (For Tests)
/// MockMediaHost
///
/// In-memory media host that records every deletion, so tests can assert exactly which
/// identifiers were released. Each operation can be made to fail independently.
#[derive(Default)]
pub struct MockMediaHost {
    fail_uploads: bool,
    fail_deletes: bool,
    fail_fetches: bool,
    objects: Mutex<HashMap<String, (String, Bytes)>>,
    deleted: Mutex<Vec<String>>,
}

impl MockMediaHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails.
    pub fn new_failing() -> Self {
        Self {
            fail_uploads: true,
            fail_deletes: true,
            fail_fetches: true,
            ..Self::default()
        }
    }

    /// Uploads and fetches work; deletions fail.
    pub fn with_failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::default()
        }
    }

    /// Uploads work; fetches fail as if the host were unreachable.
    pub fn with_failing_fetches() -> Self {
        Self {
            fail_fetches: true,
            ..Self::default()
        }
    }

    /// Identifiers passed to `delete`, in call order (including failed calls).
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Identifiers of objects currently held.
    pub fn stored_ids(&self) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = objects.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl MediaHost for MockMediaHost {
    async fn ping(&self) -> Result<(), MediaError> {
        if self.fail_uploads {
            return Err(MediaError::Request("mock media host offline".to_string()));
        }
        Ok(())
    }

    async fn upload(
        &self,
        folder: MediaFolder,
        file: &UploadedFile,
    ) -> Result<Attachment, MediaError> {
        if self.fail_uploads {
            return Err(MediaError::Request("mock upload rejected".to_string()));
        }

        let key = object_key(folder, &file.filename);
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), (file.content_type.clone(), file.bytes.clone()));

        Ok(Attachment {
            url: format!("http://localhost:9000/mock-bucket/{}", key),
            public_id: key,
            filename: file.filename.clone(),
            uploaded_at: Utc::now(),
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(public_id.to_string());

        if self.fail_deletes {
            return Err(MediaError::Request("mock delete rejected".to_string()));
        }

        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(public_id);
        Ok(())
    }

    async fn fetch(&self, attachment: &Attachment) -> Result<MediaObject, MediaError> {
        if self.fail_fetches {
            return Err(MediaError::Request("mock media host unreachable".to_string()));
        }

        let objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        let (content_type, bytes) = objects
            .get(&attachment.public_id)
            .cloned()
            .ok_or(MediaError::Status(404))?;

        Ok(MediaObject {
            content_type: Some(content_type),
            body: Body::from(bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_strips_traversal() {
        let key = object_key(MediaFolder::Users, "../../etc/passwd");

        assert!(key.starts_with("users/"));
        assert!(key.ends_with("-passwd"));
        assert!(!key.contains(".."));
    }

    #[test]
    fn test_object_key_replaces_unsafe_characters() {
        let key = object_key(MediaFolder::Posts, "my report (final).pdf");

        assert!(key.starts_with("posts/"));
        assert!(key.ends_with("-my_report__final_.pdf"));
    }

    #[test]
    fn test_object_key_is_unique_per_call() {
        assert_ne!(
            object_key(MediaFolder::Users, "a.png"),
            object_key(MediaFolder::Users, "a.png")
        );
    }

    #[test]
    fn test_object_key_falls_back_for_empty_names() {
        let key = object_key(MediaFolder::Users, "../");
        assert!(key.ends_with("-file"));
    }
}
