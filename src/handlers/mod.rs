//! HTTP handlers, grouped by resource.
//!
//! Handlers validate, talk to the repository and the media host, and convert every
//! failure into an `ApiError`. Access control lives in the extractors (`AuthUser`,
//! `AdminUser`, `OptionalAuthUser`) and in the owner-scoped repository queries.

use axum::{
    extract::{FromRequestParts, Path},
    http::{StatusCode, header, request::Parts},
    response::Response,
};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    media::{self, MediaFolder, MediaHost, MediaObject},
    models::Attachment,
    upload::UploadedFile,
};

pub mod auth;
pub mod posts;
pub mod users;

/// IdPath
///
/// The `{id}` segment of a resource route. A segment that is not a UUID is rejected
/// with the usual JSON error body instead of axum's plain-text rejection.
#[derive(Debug, Clone, Copy)]
pub struct IdPath(pub Uuid);

impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state).await?;
        Ok(IdPath(id))
    }
}

/// Uploads the optional attachment of a write. Any media host failure aborts the write
/// before anything is persisted.
pub(crate) async fn store_upload(
    media: &dyn MediaHost,
    folder: MediaFolder,
    file: Option<UploadedFile>,
) -> ApiResult<Option<Attachment>> {
    match file {
        Some(file) => media
            .upload(folder, &file)
            .await
            .map(Some)
            .map_err(ApiError::Upload),
        None => Ok(None),
    }
}

/// Releases a freshly uploaded attachment when the write that should have referenced
/// it failed, so no orphan is left at the media host.
pub(crate) async fn discard_on_failure<T, E>(
    media: &dyn MediaHost,
    uploaded: Option<&Attachment>,
    result: Result<T, E>,
) -> Result<T, E> {
    if result.is_err() {
        if let Some(attachment) = uploaded {
            media::release(media, attachment).await;
        }
    }
    result
}

/// Releases `previous` once a replacement has been persisted.
pub(crate) async fn release_superseded(
    media: &dyn MediaHost,
    previous: Option<&Attachment>,
    replaced: bool,
) {
    if let (true, Some(previous)) = (replaced, previous) {
        media::release(media, previous).await;
    }
}

/// Streams a stored attachment back to the client under its original filename.
pub(crate) fn file_response(object: MediaObject, filename: &str) -> ApiResult<Response> {
    let content_type = object
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(filename))
        .body(object.body)
        .map_err(|e| ApiError::Internal(format!("failed to build download response: {}", e)))
}

fn content_disposition(filename: &str) -> String {
    // Header values must stay visible ASCII and the quoted string must not break out.
    let safe: String = filename
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("inline; filename=\"{}\"", safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_content_disposition_keeps_plain_names() {
        assert_eq!(
            content_disposition("annual report.pdf"),
            "inline; filename=\"annual report.pdf\""
        );
    }

    #[test]
    fn test_content_disposition_neutralizes_quotes_and_non_ascii() {
        assert_eq!(
            content_disposition("a\"b\\c\u{e9}.png"),
            "inline; filename=\"a_b_c_.png\""
        );
    }

    #[tokio::test]
    async fn test_file_response_falls_back_to_octet_stream() {
        let object = MediaObject {
            content_type: None,
            body: Body::from("data"),
        };

        let response = file_response(object, "x.pdf").unwrap();

        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
    }
}
