use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unsupported content type '{0}'")]
    UnsupportedContentType(String),
    #[error("File is empty")]
    Empty,
    #[error("File is too large ({size} bytes, limit is {limit} bytes)")]
    TooLarge { size: usize, limit: usize },
    #[error("Invalid storage path '{0}'")]
    InvalidPath(String),
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage buckets, one directory each under the storage root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    HabitIcons,
    OccurrencePhotos,
}

impl Bucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::HabitIcons => "habit-icons",
            Bucket::OccurrencePhotos => "occurrence-photos",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "habit-icons" => Some(Bucket::HabitIcons),
            "occurrence-photos" => Some(Bucket::OccurrencePhotos),
            _ => None,
        }
    }
}

/// File extension for an accepted image content type
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    match mime.to_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/svg+xml" => Some("svg"),
        _ => None,
    }
}

const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "webp", "gif", "svg"];

/// A stored object's relative path, split into its parts.
///
/// Paths look like `{bucket}/{owner_id}/{sha256}.{ext}`; anything else is
/// rejected so a path can never point outside its bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPath {
    pub bucket: Bucket,
    pub owner_id: Uuid,
    pub filename: String,
}

impl StoredPath {
    pub fn parse(path: &str) -> Result<Self, StorageError> {
        let invalid = || StorageError::InvalidPath(path.to_string());

        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }

        let bucket = Bucket::parse(parts[0]).ok_or_else(invalid)?;
        let owner_id = Uuid::parse_str(parts[1]).map_err(|_| invalid())?;

        let filename = parts[2];
        let (stem, extension) = filename.rsplit_once('.').ok_or_else(invalid)?;
        if stem.is_empty()
            || !stem.chars().all(|c| c.is_ascii_hexdigit())
            || !ALLOWED_EXTENSIONS.contains(&extension)
        {
            return Err(invalid());
        }

        Ok(Self {
            bucket,
            owner_id,
            filename: filename.to_string(),
        })
    }

    pub fn as_relative(&self) -> String {
        format!("{}/{}/{}", self.bucket.as_str(), self.owner_id, self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub size: usize,
}

/// Object storage for habit icons and occurrence photos
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store `bytes` for the record `record_id` and return the relative
    /// path to persist
    async fn put(
        &self,
        bucket: Bucket,
        owner_id: Uuid,
        record_id: Uuid,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredObject, StorageError>;

    /// Remove an object; removing a missing object is not an error
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Absolute location of a stored object
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError>;
}

pub struct LocalFileStore {
    root: PathBuf,
    max_bytes: usize,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(
        &self,
        bucket: Bucket,
        owner_id: Uuid,
        record_id: Uuid,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredObject, StorageError> {
        let extension = extension_for(content_type)
            .ok_or_else(|| StorageError::UnsupportedContentType(content_type.to_string()))?;

        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(StorageError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        // Keyed by record and content: re-uploading the same image to the
        // same record is a no-op, and no two records share a file
        let mut hasher = Sha256::new();
        hasher.update(record_id.as_bytes());
        hasher.update(bytes);
        let digest = hex::encode(hasher.finalize());
        let stored = StoredPath {
            bucket,
            owner_id,
            filename: format!("{}.{}", digest, extension),
        };

        let owner_dir = self.root.join(bucket.as_str()).join(owner_id.to_string());
        tokio::fs::create_dir_all(&owner_dir).await?;
        tokio::fs::write(owner_dir.join(&stored.filename), bytes).await?;

        log::info!("💾 Stored {} bytes at {}", bytes.len(), stored.as_relative());

        Ok(StoredObject {
            path: stored.as_relative(),
            size: bytes.len(),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let file_path = self.resolve(path)?;
        match tokio::fs::remove_file(&file_path).await {
            Ok(()) => {
                log::info!("🗑️  Deleted stored file {}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Stored file {} was already gone", path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let stored = StoredPath::parse(path)?;
        Ok(self
            .root
            .join(stored.bucket.as_str())
            .join(stored.owner_id.to_string())
            .join(stored.filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(max_bytes: usize) -> LocalFileStore {
        let root = std::env::temp_dir().join(format!("habitcal-storage-{}", Uuid::new_v4()));
        LocalFileStore::new(root, max_bytes)
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/jpeg; charset=binary"), Some("jpg"));
        assert_eq!(extension_for("IMAGE/WEBP"), Some("webp"));
        assert_eq!(extension_for("application/pdf"), None);
    }

    #[test]
    fn test_stored_path_rejects_traversal() {
        let owner = Uuid::new_v4();
        assert!(StoredPath::parse(&format!("habit-icons/{}/abc123.png", owner)).is_ok());
        assert!(StoredPath::parse(&format!("habit-icons/{}/../x.png", owner)).is_err());
        assert!(StoredPath::parse("../../etc/passwd").is_err());
        assert!(StoredPath::parse(&format!("secrets/{}/abc.png", owner)).is_err());
        assert!(StoredPath::parse(&format!("habit-icons/{}/abc.exe", owner)).is_err());
        assert!(StoredPath::parse("habit-icons/not-a-uuid/abc.png").is_err());
    }

    #[tokio::test]
    async fn test_put_resolve_delete() {
        let store = temp_store(1024);
        let owner = Uuid::new_v4();
        let record = Uuid::new_v4();

        let stored = store
            .put(Bucket::OccurrencePhotos, owner, record, "image/png", b"fake png bytes")
            .await
            .unwrap();
        assert!(stored.path.starts_with(&format!("occurrence-photos/{}/", owner)));
        assert!(stored.path.ends_with(".png"));
        assert_eq!(stored.size, 14);

        let file_path = store.resolve(&stored.path).unwrap();
        assert_eq!(tokio::fs::read(&file_path).await.unwrap(), b"fake png bytes");

        // Same bytes land on the same path
        let again = store
            .put(Bucket::OccurrencePhotos, owner, record, "image/png", b"fake png bytes")
            .await
            .unwrap();
        assert_eq!(again.path, stored.path);

        // Another record gets its own copy
        let other = store
            .put(Bucket::OccurrencePhotos, owner, Uuid::new_v4(), "image/png", b"fake png bytes")
            .await
            .unwrap();
        assert_ne!(other.path, stored.path);
        store.delete(&other.path).await.unwrap();

        store.delete(&stored.path).await.unwrap();
        assert!(!file_path.exists());
        // Deleting twice is fine
        store.delete(&stored.path).await.unwrap();

        let _ = tokio::fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn test_put_rejects_bad_uploads() {
        let store = temp_store(4);
        let owner = Uuid::new_v4();
        let record = Uuid::new_v4();

        assert!(matches!(
            store.put(Bucket::HabitIcons, owner, record, "text/plain", b"hi").await,
            Err(StorageError::UnsupportedContentType(_))
        ));
        assert!(matches!(
            store.put(Bucket::HabitIcons, owner, record, "image/png", b"").await,
            Err(StorageError::Empty)
        ));
        assert!(matches!(
            store.put(Bucket::HabitIcons, owner, record, "image/png", b"too big").await,
            Err(StorageError::TooLarge { size: 7, limit: 4 })
        ));
    }
}
