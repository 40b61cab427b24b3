//! Media service
//!
//! Stores uploaded images and videos under `upload.path` with a random
//! file name and keeps a row per file. Files are served from `/uploads`.

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::db::repositories::MediaRepository;
use crate::models::{CreateMediaInput, ListParams, Media, MediaKind, PagedResult};

const MAX_ORIGINAL_NAME_LENGTH: usize = 255;

/// URL prefix under which stored files are served
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

#[derive(Debug, thiserror::Error)]
pub enum MediaServiceError {
    #[error("Media not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// An upload as received from the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

pub struct MediaService {
    repo: Arc<dyn MediaRepository>,
    config: UploadConfig,
}

impl MediaService {
    pub fn new(repo: Arc<dyn MediaRepository>, config: UploadConfig) -> Self {
        Self { repo, config }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.config.path
    }

    /// Validate, write to disk, then record the row.
    ///
    /// If the row cannot be recorded the written file is removed again.
    pub async fn upload(&self, file: UploadedFile, uploaded_by: Option<i64>) -> Result<Media, MediaServiceError> {
        let content_type = file
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        let kind = self.config.media_kind(&content_type).ok_or_else(|| {
            MediaServiceError::ValidationError(format!("Unsupported file type: {}", content_type))
        })?;

        if file.data.is_empty() {
            return Err(MediaServiceError::ValidationError("File is empty".to_string()));
        }
        let max = self.config.max_size_for(kind);
        if file.data.len() as u64 > max {
            return Err(MediaServiceError::ValidationError(format!(
                "File too large. Maximum {} size: {} MB",
                kind.as_str(),
                max / 1024 / 1024
            )));
        }

        fs::create_dir_all(&self.config.path)
            .await
            .with_context(|| format!("Failed to create upload directory {}", self.config.path.display()))?;

        let filename = format!("{}.{}", Uuid::new_v4(), self.config.get_extension(&content_type));
        let path = self.config.path.join(&filename);
        write_staged(&self.config.path, &path, &file.data).await?;

        let input = CreateMediaInput {
            url: format!("{}/{}", UPLOADS_URL_PREFIX, filename),
            filename,
            original_name: clean_original_name(&file.original_name),
            content_type,
            kind,
            size: file.data.len() as i64,
            uploaded_by,
        };

        match self.repo.create(&input).await {
            Ok(media) => {
                tracing::info!("Stored {} {} ({} bytes)", kind.as_str(), media.filename, media.size);
                Ok(media)
            }
            Err(e) => {
                let _ = fs::remove_file(&path).await;
                Err(e.context("Failed to record media").into())
            }
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Media, MediaServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(MediaServiceError::NotFound(id))
    }

    /// Newest first, optionally only one kind
    pub async fn list(
        &self,
        kind: Option<MediaKind>,
        params: &ListParams,
    ) -> Result<PagedResult<Media>, MediaServiceError> {
        let items = self.repo.list(kind, params.offset(), params.limit()).await?;
        let total = self.repo.count(kind).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Remove the row and the stored file. A file already missing from
    /// disk is not an error.
    pub async fn delete(&self, id: i64) -> Result<(), MediaServiceError> {
        let media = self.get_by_id(id).await?;
        self.repo.delete(id).await?;

        let path = self.stored_path(&media.filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Media file {} was already gone", path.display());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to delete {}", path.display()))
                    .into())
            }
        }
        tracing::info!("Deleted media {} ({})", id, media.filename);
        Ok(())
    }

    fn stored_path(&self, filename: &str) -> Result<PathBuf, MediaServiceError> {
        // stored names are generated, but never follow one out of the directory
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(anyhow::anyhow!("Refusing to touch suspicious path {}", filename).into());
        }
        Ok(self.config.path.join(filename))
    }
}

/// Write into a temporary file in `dir`, then move it into place so a
/// half-written upload is never visible under its final name
async fn write_staged(dir: &Path, target: &Path, data: &[u8]) -> anyhow::Result<()> {
    let staged = tempfile::Builder::new()
        .prefix(".upload-")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to stage upload in {}", dir.display()))?;
    let (file, staged_path) = staged.into_parts();

    let mut file = fs::File::from_std(file);
    file.write_all(data).await.context("Failed to write upload")?;
    file.sync_all().await.context("Failed to flush upload")?;
    drop(file);

    staged_path
        .persist(target)
        .with_context(|| format!("Failed to save {}", target.display()))?;
    Ok(())
}

/// Base name only, without control characters, capped in length
fn clean_original_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_ORIGINAL_NAME_LENGTH)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxMediaRepository;
    use crate::db::{create_test_pool, migrations};
    use tempfile::TempDir;

    async fn setup(max_image_size: u64) -> (MediaService, TempDir) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let dir = TempDir::new().unwrap();
        let config = UploadConfig {
            path: dir.path().join("uploads"),
            max_image_size,
            ..Default::default()
        };
        (MediaService::new(SqlxMediaRepository::boxed(pool), config), dir)
    }

    fn png(bytes: usize) -> UploadedFile {
        UploadedFile {
            original_name: "C:\\Users\\me\\shot.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![0x89; bytes],
        }
    }

    #[tokio::test]
    async fn test_upload_writes_file_and_row() {
        let (service, _dir) = setup(1024).await;
        let media = service.upload(png(100), None).await.unwrap();

        assert_eq!(media.kind, MediaKind::Image);
        assert!(media.filename.ends_with(".png"));
        assert_eq!(media.url, format!("/uploads/{}", media.filename));
        assert_eq!(media.original_name, "shot.png");
        assert_eq!(media.size, 100);

        let on_disk = fs::read(service.upload_dir().join(&media.filename)).await.unwrap();
        assert_eq!(on_disk.len(), 100);
    }

    #[tokio::test]
    async fn test_rejects_unknown_type_and_oversize() {
        let (service, _dir) = setup(10).await;

        let mut exe = png(5);
        exe.content_type = "application/x-msdownload".to_string();
        assert!(matches!(
            service.upload(exe, None).await,
            Err(MediaServiceError::ValidationError(_))
        ));

        assert!(matches!(
            service.upload(png(11), None).await,
            Err(MediaServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.upload(png(0), None).await,
            Err(MediaServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_video_uses_video_limit() {
        let (service, _dir) = setup(10).await;
        let video = UploadedFile {
            original_name: "clip.mp4".to_string(),
            content_type: "video/mp4; codecs=avc1".to_string(),
            data: vec![0; 64],
        };
        let media = service.upload(video, None).await.unwrap();
        assert_eq!(media.kind, MediaKind::Video);
        assert_eq!(media.content_type, "video/mp4");
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (service, _dir) = setup(1024).await;
        let first = service.upload(png(10), None).await.unwrap();
        service.upload(png(20), None).await.unwrap();

        let page = service.list(Some(MediaKind::Image), &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
        let videos = service.list(Some(MediaKind::Video), &ListParams::default()).await.unwrap();
        assert_eq!(videos.total, 0);

        service.delete(first.id).await.unwrap();
        assert!(!service.upload_dir().join(&first.filename).exists());
        assert!(matches!(
            service.delete(first.id).await,
            Err(MediaServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_clean_original_name() {
        assert_eq!(clean_original_name("../../etc/passwd"), "passwd");
        assert_eq!(clean_original_name(""), "unnamed");
        assert_eq!(clean_original_name("a\u{0007}b.jpg"), "ab.jpg");
    }
}
