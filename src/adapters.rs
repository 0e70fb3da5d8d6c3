use async_trait::async_trait;

use crate::model::fs::{BackendError, FileObject, TemporaryUrlOptions};

pub mod b2;
pub mod mock;
pub mod s3;

pub type BackendResult<T> = Result<T, BackendError>;

/// A connection to an object-storage service.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn list_buckets(&self) -> BackendResult<Vec<Box<dyn ObjectBucket>>>;

    /// Base URL public downloads are served from.
    fn download_url(&self) -> &str;
}

/// A handle bound to one bucket of an [`ObjectClient`].
#[async_trait]
pub trait ObjectBucket: Send + Sync {
    fn name(&self) -> &str;

    async fn upload_file(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> BackendResult<FileObject>;

    /// Fails with [`BackendError::NotFound`] when no object has exactly this key.
    async fn get_file_by_name(&self, key: &str) -> BackendResult<FileObject>;

    async fn file_exists(&self, key: &str) -> BackendResult<bool>;

    /// Every object whose key starts with `prefix`, across all pages.
    async fn list_file_names(&self, prefix: &str) -> BackendResult<Vec<FileObject>>;

    async fn delete_file(&self, file: &FileObject) -> BackendResult<()>;

    async fn download(&self, file: &FileObject) -> BackendResult<Vec<u8>>;

    /// Issues a token granting read access to `file` for `valid_secs` seconds.
    async fn download_authorization(
        &self,
        file: &FileObject,
        valid_secs: u64,
        options: &TemporaryUrlOptions,
    ) -> BackendResult<String>;
}
