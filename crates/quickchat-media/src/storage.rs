use base64::Engine;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file too large: {got} bytes (max {max})")]
    TooLarge { got: u64, max: u64 },
    #[error("invalid image data: {0}")]
    InvalidData(String),
}

/// Pluggable storage backend. Local filesystem is the only variant today;
/// an S3-compatible backend would slot in as a second one.
pub enum Storage {
    Local(LocalStorage),
}

impl Storage {
    pub async fn store(&self, key: &str, data: &[u8]) -> Result<String, StorageError> {
        match self {
            Storage::Local(local) => local.store(key, data).await,
        }
    }

    pub async fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        match self {
            Storage::Local(local) => local.retrieve(key).await,
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self {
            Storage::Local(local) => local.delete(key).await,
        }
    }
}

#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        // Keys are server-generated, but reject traversal anyway since the
        // download route passes client-supplied paths through here.
        if key.split('/').any(|part| part == "..") || key.starts_with('/') {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(self.base_path.join(key))
    }

    pub async fn store(&self, key: &str, data: &[u8]) -> Result<String, StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        Ok(key.to_string())
    }

    pub async fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        if !Path::new(&path).exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(fs::read(&path).await?)
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if path.exists() {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

impl DecodedImage {
    /// Generate a collision-free storage key under `prefix`.
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{}/{}.{}", prefix, Uuid::new_v4(), self.extension)
    }
}

/// Decode an inline `data:image/...;base64,` upload as sent by web clients.
pub fn decode_data_uri(uri: &str, max_bytes: u64) -> Result<DecodedImage, StorageError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| StorageError::InvalidData("missing data: scheme".into()))?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| StorageError::InvalidData("not base64-encoded".into()))?;

    let extension = match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        other => {
            return Err(StorageError::InvalidData(format!(
                "unsupported media type '{other}'"
            )))
        }
    };

    // Base64 expands by 4/3, so a cheap length check before decoding bounds
    // the allocation.
    if payload.len() as u64 > max_bytes.saturating_mul(4) / 3 + 4 {
        return Err(StorageError::TooLarge {
            got: payload.len() as u64 * 3 / 4,
            max: max_bytes,
        });
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| StorageError::InvalidData(e.to_string()))?;
    if bytes.len() as u64 > max_bytes {
        return Err(StorageError::TooLarge {
            got: bytes.len() as u64,
            max: max_bytes,
        });
    }
    if bytes.is_empty() {
        return Err(StorageError::InvalidData("empty payload".into()));
    }

    Ok(DecodedImage { bytes, extension })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn png_uri(bytes: &[u8]) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    #[test]
    fn decodes_a_png_data_uri() {
        let decoded = decode_data_uri(&png_uri(b"fake-png-bytes"), 1024).expect("decode");
        assert_eq!(decoded.bytes, b"fake-png-bytes");
        assert_eq!(decoded.extension, "png");
        assert!(decoded.storage_key("avatars").starts_with("avatars/"));
        assert!(decoded.storage_key("avatars").ends_with(".png"));
    }

    #[test]
    fn rejects_oversized_and_malformed_uploads() {
        let too_big = png_uri(&vec![0u8; 2048]);
        assert!(matches!(
            decode_data_uri(&too_big, 1024),
            Err(StorageError::TooLarge { .. })
        ));
        assert!(decode_data_uri("not a data uri", 1024).is_err());
        assert!(decode_data_uri("data:text/plain;base64,aGk=", 1024).is_err());
        assert!(decode_data_uri("data:image/png;base64,!!!", 1024).is_err());
    }

    #[tokio::test]
    async fn local_storage_round_trip_and_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::Local(LocalStorage::new(dir.path()));

        let key = storage
            .store("avatars/test.png", b"pixels")
            .await
            .expect("store");
        assert_eq!(storage.retrieve(&key).await.expect("retrieve"), b"pixels");

        storage.delete(&key).await.expect("delete");
        assert!(matches!(
            storage.retrieve(&key).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::Local(LocalStorage::new(dir.path()));
        assert!(storage.retrieve("../etc/passwd").await.is_err());
        assert!(storage.retrieve("/etc/passwd").await.is_err());
    }
}
