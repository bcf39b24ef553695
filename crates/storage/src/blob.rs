//! Content-addressed storage service (§4.8 / C8).
//!
//! `putFile` persists a blob under a path derived from its content hash
//! (`objects/sha256/<xx>/<yy>/<hash>`, §6) and is idempotent: identical
//! bytes always resolve to the same storage key. The in-memory reference
//! driver backs this with a `DashMap`; a durable driver (S3, local FS,
//! ...) is an external collaborator satisfying the same trait, per §1
//! Non-goals ("storage-driver internals... out of scope").

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Result of a successful `putFile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutFileResult {
    pub storage_key: String,
    pub sha256: String,
    pub storage_etag: Option<String>,
    pub size: u64,
}

/// Metadata returned by `headFile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHead {
    pub storage_key: String,
    pub sha256: String,
    pub size: u64,
    pub content_type: String,
}

/// A time-bounded, opaque download link for a bundle artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// The content-addressed storage service's operations (§4.8).
///
/// All methods are async: they're the suspension points named in §5
/// (storage I/O). `get_file_stream` returns the full body as `Bytes`
/// rather than a true chunked stream — the in-memory reference driver has
/// no I/O to chunk over; a durable driver is expected to stream from its
/// backing store instead while satisfying the same signature shape.
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn put_file(&self, body: Bytes, content_type: &str) -> Result<PutFileResult, StorageError>;

    async fn get_file_stream(&self, key: &str) -> Result<Bytes, StorageError>;

    async fn head_file(&self, key: &str) -> Result<Option<FileHead>, StorageError>;

    async fn delete_file(&self, key: &str) -> Result<(), StorageError>;

    /// Issue a signed, time-bounded release link. Opaque to the core: the
    /// portal download endpoint is the verifier, not this service.
    async fn create_release_link(
        &self,
        bundle_id: &str,
        recipient_id: &str,
        ttl_seconds: u64,
    ) -> Result<ReleaseLink, StorageError>;
}

/// `objects/sha256/<xx>/<yy>/<hash>` per §6's persisted storage-key layout.
#[must_use]
pub fn storage_key_for_hash(sha256_hex: &str) -> String {
    let xx = &sha256_hex[0..2.min(sha256_hex.len())];
    let yy = &sha256_hex[2..4.min(sha256_hex.len())];
    format!("objects/sha256/{xx}/{yy}/{sha256_hex}")
}

struct StoredObject {
    body: Bytes,
    sha256: String,
    content_type: String,
}

/// In-memory reference `StorageService`. Content-addressing makes
/// `put_file` naturally idempotent: concurrent writers of the same bytes
/// converge on the same entry without coordination (§5 "Storage driver").
pub struct MemoryStorageService {
    objects: DashMap<String, Arc<StoredObject>>,
    release_link_base: String,
}

impl MemoryStorageService {
    #[must_use]
    pub fn new(release_link_base: impl Into<String>) -> Self {
        Self {
            objects: DashMap::new(),
            release_link_base: release_link_base.into(),
        }
    }
}

impl Default for MemoryStorageService {
    fn default() -> Self {
        Self::new("https://storage.local")
    }
}

#[async_trait]
impl StorageService for MemoryStorageService {
    async fn put_file(&self, body: Bytes, content_type: &str) -> Result<PutFileResult, StorageError> {
        let mut hasher = Sha256::new();
        hasher.update(&body);
        let sha256 = hex::encode(hasher.finalize());
        let storage_key = storage_key_for_hash(&sha256);
        let size = body.len() as u64;

        self.objects.insert(
            storage_key.clone(),
            Arc::new(StoredObject {
                body,
                sha256: sha256.clone(),
                content_type: content_type.to_owned(),
            }),
        );

        Ok(PutFileResult {
            storage_key,
            sha256: sha256.clone(),
            storage_etag: Some(format!("\"{sha256}\"")),
            size,
        })
    }

    async fn get_file_stream(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .get(key)
            .map(|obj| obj.body.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_owned()))
    }

    async fn head_file(&self, key: &str) -> Result<Option<FileHead>, StorageError> {
        Ok(self.objects.get(key).map(|obj| FileHead {
            storage_key: key.to_owned(),
            sha256: obj.sha256.clone(),
            size: obj.body.len() as u64,
            content_type: obj.content_type.clone(),
        }))
    }

    async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        self.objects.remove(key);
        Ok(())
    }

    async fn create_release_link(
        &self,
        bundle_id: &str,
        recipient_id: &str,
        ttl_seconds: u64,
    ) -> Result<ReleaseLink, StorageError> {
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_seconds as i64);
        let token = latchflow_core::generate_token();
        Ok(ReleaseLink {
            url: format!(
                "{}/release/{bundle_id}/{recipient_id}?token={token}&exp={}",
                self.release_link_base,
                expires_at.timestamp()
            ),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_file_is_content_addressed_and_idempotent() {
        let svc = MemoryStorageService::default();
        let a = svc.put_file(Bytes::from_static(b"hello"), "text/plain").await.unwrap();
        let b = svc.put_file(Bytes::from_static(b"hello"), "text/plain").await.unwrap();
        assert_eq!(a.storage_key, b.storage_key);
        assert_eq!(a.sha256, b.sha256);
        assert!(a.storage_key.starts_with("objects/sha256/"));
    }

    #[tokio::test]
    async fn get_head_delete_roundtrip() {
        let svc = MemoryStorageService::default();
        let put = svc.put_file(Bytes::from_static(b"data"), "application/octet-stream").await.unwrap();

        let body = svc.get_file_stream(&put.storage_key).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"data"));

        let head = svc.head_file(&put.storage_key).await.unwrap().unwrap();
        assert_eq!(head.size, 4);

        svc.delete_file(&put.storage_key).await.unwrap();
        assert!(svc.head_file(&put.storage_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_link_is_time_bounded() {
        let svc = MemoryStorageService::default();
        let link = svc.create_release_link("b-1", "r-1", 3600).await.unwrap();
        assert!(link.expires_at > Utc::now());
        assert!(link.url.contains("b-1"));
    }
}
