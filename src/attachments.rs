//! Attachment blob storage
//!
//! Bytes live outside the database; the store only records name, path and size.

use async_trait::async_trait;
use base64::Engine;
use std::path::PathBuf;
use uuid::Uuid;

/// Where attachment bytes are written
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` for the task and return the stored path
    async fn put(&self, task_id: Uuid, name: &str, bytes: &[u8]) -> std::io::Result<String>;
}

/// Writes each attachment to `{dir}/{task_id}-{name}`
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, task_id: Uuid, name: &str, bytes: &[u8]) -> std::io::Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{task_id}-{name}"));
        tokio::fs::write(&path, bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Names that could escape the attachment directory are refused
pub fn is_safe_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
}

/// Decode a standard base64 payload, tolerating surrounding whitespace
pub fn decode_payload(content: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(content.trim())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_names() {
        assert!(is_safe_name("notes.txt"));
        assert!(!is_safe_name("../etc/passwd"));
        assert!(!is_safe_name("a/b.txt"));
        assert!(!is_safe_name("a\\b.txt"));
        assert!(!is_safe_name("  "));
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode_payload("aGVsbG8=\n").as_deref(), Some(&b"hello"[..]));
        assert!(decode_payload("not base64!").is_none());
    }

    #[tokio::test]
    async fn test_fs_blob_store_writes_prefixed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("attachments"));
        let task_id = Uuid::new_v4();

        let path = store.put(task_id, "log.txt", b"abc").await.unwrap();

        assert!(path.ends_with(&format!("{task_id}-log.txt")));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abc");
    }
}
