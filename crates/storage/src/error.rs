use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("bundle not found: {0}")]
    BundleNotFound(String),

    #[error("bundle has no storage pointer yet")]
    NoStoragePath,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("encryption error: {0}")]
    Crypto(#[from] latchflow_crypto::CryptoError),

    #[error("archive build failed: {0}")]
    BuildFailed(String),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
