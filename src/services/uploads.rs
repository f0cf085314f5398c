use chrono::Utc;
use std::path::PathBuf;

/// Photo files on local disk, served back under `/uploads`.
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn ensure_dir(&self) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Write one file as `<unix_nanos>_<name>` and return its storage path.
    pub async fn save(&self, original_name: &str, data: &[u8]) -> Result<String, UploadError> {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let file_name = format!("{}_{}", nanos, sanitize_file_name(original_name));
        let path = self.dir.join(file_name);

        tokio::fs::write(&path, data).await?;
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Keep only the final path component, with anything unusual replaced.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
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
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "photo".to_string()
    } else {
        cleaned.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("File write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\photos\\cat.jpg"), "cat.jpg");
    }

    #[test]
    fn test_sanitize_replaces_odd_characters() {
        assert_eq!(sanitize_file_name("my photo (1).jpg"), "my_photo__1_.jpg");
        assert_eq!(sanitize_file_name(".."), "photo");
        assert_eq!(sanitize_file_name(""), "photo");
    }

    #[tokio::test]
    async fn test_save_writes_prefixed_file() {
        let dir = std::env::temp_dir().join(format!("photo-storage-{}", uuid::Uuid::new_v4()));
        let store = UploadStore::new(&dir);
        store.ensure_dir().await.unwrap();

        let path = store.save("cat.jpg", b"bytes").await.unwrap();
        assert!(path.ends_with("_cat.jpg"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"bytes");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
