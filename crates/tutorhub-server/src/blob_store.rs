use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tutorhub_shared::DomainError;
use tutorhub_store::{codec, Attachment};

use crate::error::ServerError;

/// Verify that a relative storage path stays within the base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, relative: &str) -> Result<PathBuf, ServerError> {
    let mut resolved = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ServerError::BadRequest(
                    "Path traversal detected".to_string(),
                ));
            }
        }
    }
    if resolved == base || !resolved.starts_with(base) {
        return Err(ServerError::BadRequest("Invalid storage path".to_string()));
    }
    Ok(resolved)
}

/// Keep a readable but harmless version of an uploaded file name.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Local directory store for offering and message attachments.
///
/// Files are addressed by a relative path such as
/// `offerings/<offering>/<uuid>_<name>`, which is what the database keeps.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl BlobStore {
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::BlobStorage(format!(
                "Failed to create blob directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Blob store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Reject a file before anything touches the disk.
    pub fn check_size(&self, size: u64) -> Result<(), ServerError> {
        if size > self.max_size {
            return Err(DomainError::validation(format!(
                "file is {size} bytes, the limit is {} bytes",
                self.max_size
            ))
            .into());
        }
        Ok(())
    }

    /// Write `data` under `folder` and return its relative path.
    pub async fn store_file(
        &self,
        folder: &str,
        original_name: &str,
        data: &[u8],
    ) -> Result<String, ServerError> {
        self.check_size(data.len() as u64)?;

        let relative = format!(
            "{}/{}_{}",
            folder.trim_matches('/'),
            Uuid::new_v4(),
            sanitize_file_name(original_name)
        );
        let path = ensure_within(&self.base_path, &relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ServerError::BlobStorage(format!("Failed to create '{}': {}", parent.display(), e))
            })?;
        }

        fs::write(&path, data).await.map_err(|e| {
            ServerError::BlobStorage(format!("Failed to write {}: {}", relative, e))
        })?;

        debug!(path = %relative, size = data.len(), "Stored file");
        Ok(relative)
    }

    /// Store an offering attachment and describe it for the offering row.
    pub async fn store_attachment(
        &self,
        folder: &str,
        original_name: &str,
        mime_type: &str,
        data: &[u8],
    ) -> Result<Attachment, ServerError> {
        let path = self.store_file(folder, original_name, data).await?;
        Ok(Attachment {
            path,
            original_name: original_name.to_string(),
            mime_type: mime_type.to_string(),
            size: data.len() as u64,
            uploaded_at: codec::now(),
        })
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, ServerError> {
        let path = ensure_within(&self.base_path, relative)?;
        fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DomainError::NotFound("file").into(),
            _ => ServerError::BlobStorage(format!("Failed to read {}: {}", relative, e)),
        })
    }

    pub async fn delete(&self, relative: &str) -> Result<(), ServerError> {
        let path = ensure_within(&self.base_path, relative)?;
        fs::remove_file(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DomainError::NotFound("file").into(),
            _ => ServerError::BlobStorage(format!("Failed to delete {}: {}", relative, e)),
        })?;
        debug!(path = %relative, "Deleted file");
        Ok(())
    }

    /// Remove files whose database rows are already gone.  Failures are
    /// logged; the database is the source of truth.
    pub async fn delete_all(&self, paths: &[String]) {
        for path in paths {
            if let Err(e) = self.delete(path).await {
                warn!(path = %path, error = %e, "Could not remove stored file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (BlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path().to_path_buf(), 1024).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_store_read_delete() {
        let (store, _dir) = test_store().await;
        let attachment = store
            .store_attachment("offerings/abc", "notes.pdf", "application/pdf", b"pdf-bytes")
            .await
            .unwrap();

        assert!(attachment.path.starts_with("offerings/abc/"));
        assert!(attachment.path.ends_with("_notes.pdf"));
        assert_eq!(attachment.size, 9);
        assert_eq!(store.read(&attachment.path).await.unwrap(), b"pdf-bytes");

        store.delete(&attachment.path).await.unwrap();
        assert!(store.read(&attachment.path).await.is_err());
    }

    #[tokio::test]
    async fn test_size_limits() {
        let (store, _dir) = test_store().await;
        // Only the upper bound is enforced; an empty file is a valid upload.
        let empty = store.store_file("m", "empty.txt", b"").await.unwrap();
        assert!(store.read(&empty).await.unwrap().is_empty());
        assert!(store.store_file("m", "a.txt", &[0u8; 1024]).await.is_ok());
        let err = store.store_file("m", "a.txt", &[0u8; 1025]).await.unwrap_err();
        assert!(matches!(err, ServerError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.read("../secret").await.is_err());
        assert!(store.delete("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_files_are_logged_not_fatal() {
        let (store, _dir) = test_store().await;
        store.delete_all(&["offerings/none/x".to_string()]).await;
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my report (v2).pdf"), "my_report__v2_.pdf");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }
}
