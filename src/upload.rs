use std::collections::HashMap;

use axum::{
    Form, Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::{StatusCode, header},
};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// Largest attachment accepted, in bytes.
pub const MAX_FILE_BYTES: usize = 5 * 1024 * 1024;

/// Router-wide request body limit. Leaves room for the text fields sent alongside
/// the attachment.
pub const BODY_LIMIT_BYTES: usize = MAX_FILE_BYTES + 256 * 1024;

/// Name of the multipart part carrying the attachment.
pub const FILE_FIELD: &str = "file";

const INVALID_FILE_TYPE: &str = "Invalid file type! Only PDF documents or image files are allowed.";
const FILE_TOO_LARGE: &str = "File too large";

const ALLOWED_TYPES: &[(&[&str], &[&str])] = &[
    (&["pdf"], &["application/pdf"]),
    (
        &["jpg", "jpeg", "png", "gif"],
        &["image/jpeg", "image/jpg", "image/png", "image/gif"],
    ),
];

/// UploadedFile
///
/// An attachment received from a client. Only constructed through `new`, which
/// enforces the type allow-list and the size limit.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(filename: &str, content_type: &str, bytes: Bytes) -> ApiResult<Self> {
        let filename = filename.trim();
        let content_type = content_type.trim().to_ascii_lowercase();

        if !is_allowed(filename, &content_type) {
            return Err(ApiError::Validation(INVALID_FILE_TYPE.to_string()));
        }
        if bytes.len() > MAX_FILE_BYTES {
            return Err(ApiError::Validation(FILE_TOO_LARGE.to_string()));
        }

        Ok(Self {
            filename: filename.to_string(),
            content_type,
            bytes,
        })
    }
}

/// The extension and the declared MIME type must both belong to the same allowed
/// family.
fn is_allowed(filename: &str, content_type: &str) -> bool {
    let Some((_, extension)) = filename.rsplit_once('.') else {
        return false;
    };
    let extension = extension.to_ascii_lowercase();

    ALLOWED_TYPES.iter().any(|(extensions, mime_types)| {
        extensions.contains(&extension.as_str()) && mime_types.contains(&content_type)
    })
}

/// UploadForm
///
/// Body of every write endpoint that may carry an attachment.
///
/// Accepted encodings:
/// * `multipart/form-data`: text parts become fields; the part named `file` is the
///   attachment (a part without content is ignored).
/// * `application/json`: a flat object. Strings are kept, booleans and numbers are
///   stringified, nulls are dropped.
/// * `application/x-www-form-urlencoded`.
/// * No body at all, which yields an empty form.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<UploadedFile>,
}

impl UploadForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The trimmed field, or `None` when it is absent or blank.
    pub fn non_blank(&self, name: &str) -> Option<String> {
        self.text(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Reads a boolean form field. Blank counts as absent.
    pub fn flag(&self, name: &str) -> ApiResult<Option<bool>> {
        let Some(raw) = self.non_blank(name) else {
            return Ok(None);
        };

        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(Some(true)),
            "false" | "0" | "off" | "no" => Ok(Some(false)),
            _ => Err(ApiError::Validation(format!("{} must be a boolean", name))),
        }
    }

    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn take_file(&mut self) -> Option<UploadedFile> {
        self.file.take()
    }

    async fn from_multipart(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == FILE_FIELD {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;

                // Browsers send an empty part when no file was picked.
                if bytes.is_empty() {
                    continue;
                }
                form.file = Some(UploadedFile::new(&filename, &content_type, bytes)?);
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    fn from_json(object: serde_json::Map<String, Value>) -> Self {
        let fields = object
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s,
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((key, value))
            })
            .collect();

        Self { fields, file: None }
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::Validation(FILE_TOO_LARGE.to_string())
    } else {
        ApiError::Validation(err.body_text())
    }
}

impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase);

        match content_type.as_deref() {
            None => Ok(UploadForm::default()),
            Some(ct) if ct.starts_with("multipart/form-data") => {
                let multipart = Multipart::from_request(req, state)
                    .await
                    .map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
                Self::from_multipart(multipart).await
            }
            Some(ct) if ct.starts_with("application/json") => {
                let Json(object) = Json::<serde_json::Map<String, Value>>::from_request(req, state)
                    .await
                    .map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
                Ok(Self::from_json(object))
            }
            Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
                let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                    .await
                    .map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
                Ok(Self { fields, file: None })
            }
            Some(_) => Err(ApiError::Validation(
                "Unsupported content type. Send multipart/form-data or JSON.".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_pdf_and_images() {
        for (name, mime) in [
            ("cv.pdf", "application/pdf"),
            ("photo.JPG", "image/jpeg"),
            ("photo.jpeg", "image/jpg"),
            ("logo.png", "image/png"),
            ("anim.gif", "image/gif"),
        ] {
            assert!(
                UploadedFile::new(name, mime, Bytes::from_static(b"x")).is_ok(),
                "{} should be accepted",
                name
            );
        }
    }

    #[test]
    fn test_rejects_mismatched_or_unknown_types() {
        for (name, mime) in [
            ("notes.txt", "text/plain"),
            ("cv.pdf", "image/png"),
            ("photo.png", "application/pdf"),
            ("script.exe", "application/octet-stream"),
            ("noextension", "image/png"),
        ] {
            let err = UploadedFile::new(name, mime, Bytes::from_static(b"x")).unwrap_err();
            assert_eq!(err.to_string(), INVALID_FILE_TYPE, "{}", name);
        }
    }

    #[test]
    fn test_rejects_oversized_files() {
        let bytes = Bytes::from(vec![0u8; MAX_FILE_BYTES + 1]);
        let err = UploadedFile::new("big.png", "image/png", bytes).unwrap_err();

        assert_eq!(err.to_string(), FILE_TOO_LARGE);
    }

    #[test]
    fn test_json_fields_are_flattened_to_text() {
        let object = serde_json::json!({
            "title": "Hello",
            "is_published": false,
            "count": 3,
            "missing": null,
        });
        let Value::Object(object) = object else {
            unreachable!()
        };

        let form = UploadForm::from_json(object);

        assert_eq!(form.text("title"), Some("Hello"));
        assert_eq!(form.flag("is_published").unwrap(), Some(false));
        assert_eq!(form.text("count"), Some("3"));
        assert_eq!(form.text("missing"), None);
    }

    #[test]
    fn test_flag_rejects_non_boolean_text() {
        let mut form = UploadForm::default();
        form.fields.insert("is_published".into(), "maybe".into());

        assert!(form.flag("is_published").is_err());
        assert_eq!(form.flag("absent").unwrap(), None);
    }
}
