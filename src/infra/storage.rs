use anyhow::Result;
use bytes::Bytes;
use image::ImageFormat;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;

use crate::domain::user::DEFAULT_AVATAR_URL;

const URL_PREFIX: &str = "/static";

/// Upload channels. Each writes into its own directory under the static root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    ThreadCover,
    Avatar,
    CommentImage,
}

impl UploadKind {
    const ALL: [UploadKind; 3] = [
        UploadKind::ThreadCover,
        UploadKind::Avatar,
        UploadKind::CommentImage,
    ];

    pub fn dir(&self) -> &'static str {
        match self {
            UploadKind::ThreadCover => "thread_images",
            UploadKind::Avatar => "avatars",
            UploadKind::CommentImage => "comment_images",
        }
    }

    fn file_prefix(&self) -> &'static str {
        match self {
            UploadKind::ThreadCover => "thread-",
            UploadKind::Avatar => "avatar-",
            UploadKind::CommentImage => "comment_",
        }
    }
}

/// A file part as received from a multipart form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// An upload whose size, declared type and signature have been checked.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    bytes: Bytes,
    format: ImageFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    NotAnImage,
    TooLarge { max_bytes: usize },
}

/// Outcome of a write that may have replaced a file-backed column.
pub struct Replaced<T> {
    pub value: T,
    pub previous_url: Option<String>,
}

#[derive(Clone)]
pub struct FileStorage {
    root: PathBuf,
    max_bytes: usize,
}

impl FileStorage {
    pub async fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Result<Self> {
        let root = root.into();
        for kind in UploadKind::ALL {
            fs::create_dir_all(root.join(kind.dir())).await?;
        }
        Ok(Self { root, max_bytes })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn validate(&self, upload: &ImageUpload) -> Result<ValidatedImage, UploadRejection> {
        if upload.bytes.len() > self.max_bytes {
            return Err(UploadRejection::TooLarge {
                max_bytes: self.max_bytes,
            });
        }

        let declared_image = upload
            .content_type
            .as_deref()
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .map(|mime| mime.type_() == mime::IMAGE)
            .unwrap_or(false);
        if !declared_image {
            return Err(UploadRejection::NotAnImage);
        }

        let format = image::guess_format(&upload.bytes).map_err(|_| UploadRejection::NotAnImage)?;
        match format {
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::WebP => {
                Ok(ValidatedImage {
                    bytes: upload.bytes.clone(),
                    format,
                })
            }
            _ => Err(UploadRejection::NotAnImage),
        }
    }

    /// Writes the image and returns its public URL.
    pub async fn save(&self, kind: UploadKind, image: &ValidatedImage) -> Result<String> {
        let file_name = generate_file_name(kind, image.format);
        let path = self.root.join(kind.dir()).join(&file_name);
        fs::write(&path, &image.bytes).await?;
        tracing::debug!(path = %path.display(), "stored upload");
        Ok(format!("{}/{}/{}", URL_PREFIX, kind.dir(), file_name))
    }

    /// Removes the file behind a stored URL. The shared default avatar and
    /// URLs outside the upload directories are never touched.
    pub async fn delete(&self, url: &str) -> Result<bool> {
        if url == DEFAULT_AVATAR_URL {
            return Ok(false);
        }
        let Some(path) = self.path_for_url(url) else {
            return Ok(false);
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Best-effort removal used for orphan cleanup.
    pub async fn discard(&self, url: &str) {
        if let Err(err) = self.delete(url).await {
            tracing::warn!(error = ?err, url = url, "failed to delete stored file");
        }
    }

    /// Stores `upload` (if any), runs `write` with the new URL, then removes
    /// whichever file lost: the superseded one on success, the fresh one when
    /// the write failed or matched no row.
    pub async fn replace_field<T, F, Fut>(
        &self,
        kind: UploadKind,
        upload: Option<&ValidatedImage>,
        write: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(Option<String>) -> Fut,
        Fut: Future<Output = Result<Option<Replaced<T>>>>,
    {
        let new_url = match upload {
            Some(image) => Some(self.save(kind, image).await?),
            None => None,
        };

        let outcome = write(new_url.clone()).await;
        match (outcome, new_url) {
            (Ok(Some(replaced)), new_url) => {
                if let (Some(previous), Some(current)) = (&replaced.previous_url, &new_url) {
                    if previous != current {
                        self.discard(previous).await;
                    }
                }
                Ok(Some(replaced.value))
            }
            (Ok(None), Some(new_url)) => {
                self.discard(&new_url).await;
                Ok(None)
            }
            (Ok(None), None) => Ok(None),
            (Err(err), Some(new_url)) => {
                self.discard(&new_url).await;
                Err(err)
            }
            (Err(err), None) => Err(err),
        }
    }

    fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        resolve_upload_path(&self.root, url)
    }
}

fn resolve_upload_path(root: &Path, url: &str) -> Option<PathBuf> {
    let relative = url.strip_prefix(URL_PREFIX)?.strip_prefix('/')?;
    let relative = Path::new(relative);

    let mut parts = Vec::with_capacity(2);
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }

    match parts.as_slice() {
        [dir, file] if UploadKind::ALL.iter().any(|kind| kind.dir() == *dir) => {
            Some(root.join(dir).join(file))
        }
        _ => None,
    }
}

fn generate_file_name(kind: UploadKind, format: ImageFormat) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let extension = format.extensions_str().first().copied().unwrap_or("img");
    format!("{}{}_{}.{}", kind.file_prefix(), millis, suffix.to_lowercase(), extension)
}
