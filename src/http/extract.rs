use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Multipart, Request};
use std::collections::HashMap;
use uuid::Uuid;

use crate::http::AppError;
use crate::infra::storage::{FileStorage, ImageUpload, ValidatedImage};

/// A fully buffered multipart body. Text parts are kept by name; parts that
/// carry a filename are kept as uploads.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, ImageUpload>,
}

impl FormData {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = FormData::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if field.file_name().is_some() {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }
                form.files.insert(
                    name,
                    ImageUpload {
                        bytes,
                        content_type,
                    },
                );
            } else {
                let text = field.text().await?;
                form.fields.insert(name, text);
            }
        }

        Ok(form)
    }

    /// Trimmed text value; blank values count as absent.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Whether the field was sent at all, blank or not.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Validates the named upload, if one was sent.
    pub fn image(&self, name: &str, storage: &FileStorage) -> Result<Option<ValidatedImage>, AppError> {
        match self.files.get(name) {
            Some(upload) => Ok(Some(storage.validate(upload)?)),
            None => Ok(None),
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequest<S> for FormData {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state).await?;
        Self::read(multipart).await
    }
}

/// `axum::Json` whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// `axum::extract::Query` whose rejections use the error envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct QueryParams<T>(pub T);

/// A single `:id` path segment parsed as a UUID.
pub struct PathId(pub Uuid);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for PathId {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(raw) =
            axum::extract::Path::<String>::from_request_parts(parts, state).await?;
        Uuid::parse_str(raw.trim())
            .map(PathId)
            .map_err(|_| AppError::bad_request("invalid id"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}
